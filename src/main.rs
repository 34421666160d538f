//! hostbench - quick system benchmark
//!
//! Measures CPU hashing, memory bandwidth, network speed and GPU compute,
//! prints a summary and emits the full report as JSON:
//! - optionally to a file (`--json`)
//! - always on stdout between `RAW_JSON_BEGIN` / `RAW_JSON_END` markers

mod benchmark;
mod benchmark_runner;
mod config;
mod deps;
mod error;
mod hardware;
mod report;
mod scaling;
mod units;

use crate::benchmark_runner::{run_benchmarks, BenchmarkRunOptions, BenchmarkSettings};
use crate::config::Config;
use crate::report::BenchmarkReport;
use anyhow::Result;
use clap::{ArgAction, Parser};
use colored::*;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

/// hostbench - measure CPU, RAM, network and GPU performance
#[derive(Parser, Debug)]
#[command(name = "hostbench")]
#[command(version)]
#[command(about = "Quick system benchmark with a JSON report")]
struct Cli {
    /// Also write the full report as indented JSON to this file
    #[arg(long = "json", value_name = "PATH")]
    json_path: Option<PathBuf>,

    /// Seconds per CPU sub-test [default: 3.0]
    #[arg(long, value_name = "SECONDS")]
    cpu_seconds: Option<f64>,

    /// Overall network test timeout in seconds [default: 60]
    #[arg(long, value_name = "SECONDS")]
    net_timeout: Option<u64>,

    /// Memory buffer size, e.g. 256M or 1G [default: 10% of RAM, 64M to 256M]
    #[arg(long, value_name = "SIZE")]
    ram_bytes: Option<String>,

    /// Hardware reduction fraction, clamped to 0.67..=0.71 [default: 0.69]
    #[arg(long, value_name = "FRACTION")]
    scale_down: Option<f64>,

    /// Performance LOSS fraction, clamped to 0.25..=0.30 [default: 0.27]
    #[arg(long = "perf-retain", visible_alias = "perf-loss", value_name = "FRACTION")]
    perf_loss: Option<f64>,

    /// Workers for the multi-worker CPU phase [default: min(logical CPUs, 8)]
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Skip the network speed test
    #[arg(long, default_value_t = false)]
    no_network: bool,

    /// Skip the GPU probe
    #[arg(long, default_value_t = false)]
    no_gpu: bool,

    /// Hide the progress bar
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Report which optional capabilities are available and exit
    #[arg(long, default_value_t = false)]
    doctor: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long, default_value_t = false)]
    init_config: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded config
    fn apply_to(&self, config: &mut Config) {
        if let Some(seconds) = self.cpu_seconds {
            config.benchmark.cpu_seconds = seconds;
        }
        if let Some(workers) = self.workers {
            config.benchmark.max_workers = Some(workers);
        }
        if let Some(size) = &self.ram_bytes {
            config.benchmark.ram_bytes = Some(size.clone());
        }
        if let Some(timeout) = self.net_timeout {
            config.network.timeout_seconds = timeout;
        }
        if self.no_network {
            config.network.enabled = false;
        }
        if let Some(scale_down) = self.scale_down {
            config.scaling.scale_down = scale_down;
        }
        if let Some(perf_loss) = self.perf_loss {
            config.scaling.perf_loss = perf_loss;
        }
    }
}

/// `RUST_LOG` when set, `warn` otherwise; `-v` raises this crate's level on top
fn build_env_filter(verbose: u8) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let crate_level = match verbose {
        0 => None,
        1 => Some("hostbench=debug"),
        _ => Some("hostbench=trace"),
    };
    if let Some(directive) = crate_level.and_then(|d| d.parse::<Directive>().ok()) {
        filter = filter.add_directive(directive);
    }
    filter
}

fn init_tracing(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(verbose))
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "{} {:#}; using defaults",
                "Warning:".bright_yellow().bold(),
                err
            );
            Config::default()
        }
    };
    cli.apply_to(&mut config);

    if cli.init_config {
        let path = config.save()?;
        println!(
            "{} {}",
            "Configuration written to".bright_green(),
            path.display().to_string().bright_white()
        );
        return Ok(());
    }

    if cli.doctor {
        run_dependency_doctor(&config);
        return Ok(());
    }

    let mut settings = BenchmarkSettings::from_config(&config);
    settings.gpu_enabled = !cli.no_gpu;

    let options = BenchmarkRunOptions { quiet: cli.quiet };
    let report = run_benchmarks(&settings, &options);

    write_report_output(
        &report,
        cli.json_path.as_deref(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )
}

/// Summary and raw JSON block go to `out`; notes about the JSON file go to `diag`
fn write_report_output(
    report: &BenchmarkReport,
    json_path: Option<&Path>,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<()> {
    writeln!(out, "{}", report.render_summary())?;

    if let Some(path) = json_path {
        match report.write_json(path) {
            Ok(()) => writeln!(
                diag,
                "{} {}",
                "Wrote JSON report to".bright_green(),
                path.display().to_string().bright_white()
            )?,
            Err(err) => writeln!(diag, "{} {:#}", "Warning:".bright_yellow().bold(), err)?,
        }
    }

    writeln!(out, "\n{}", report.raw_json_block()?)?;
    Ok(())
}

fn run_dependency_doctor(config: &Config) {
    println!("{}", "hostbench Dependency Doctor\n".bright_cyan().bold());

    println!(
        "{} {} / {}",
        "Platform:".bright_yellow(),
        std::env::consts::OS.bright_white(),
        std::env::consts::ARCH.bright_white()
    );
    match Config::config_path() {
        Ok(path) => println!(
            "{} {}",
            "Config:".bright_yellow(),
            path.display().to_string().bright_white()
        ),
        Err(err) => println!("{} {}", "Config:".bright_yellow(), err.to_string().bright_red()),
    }
    println!();

    for status in deps::collect_dependency_statuses(config) {
        let icon = if status.available {
            "✓".bright_green()
        } else {
            "!".bright_yellow()
        };
        println!(
            "{} {} ({}) - {}",
            icon,
            status.name.bright_white(),
            "optional".bright_black(),
            status.details.bright_white()
        );
    }
}
