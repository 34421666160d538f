//! Benchmark runner module
//!
//! Runs every probe in order, keeps each failure inside its own slot and
//! assembles the final report.

use chrono::Utc;
use colored::*;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::benchmark::accelerator::{self, AcceleratorResult, ENUMERATION_TOOL};
use crate::benchmark::cpu::measure_cpu;
use crate::benchmark::memory::{measure_memory, MemoryPath};
use crate::benchmark::network::{measure_network, NetworkResult, SpeedtestClient};
use crate::benchmark::ProbeOutcome;
use crate::config::{Config, NetworkConfig};
use crate::deps::{detect_tool, Capability};
use crate::hardware::HostInfo;
use crate::report::{memory_x_multiple, BenchmarkReport};
use crate::scaling::{scale_config, HardwareProfile};
use crate::units::parse_size;

const TOTAL_STEPS: usize = 5;

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub cpu_duration: Duration,
    pub max_workers: Option<usize>,
    /// Explicit memory buffer size; `None` means automatic sizing
    pub ram_bytes: Option<u64>,
    pub force_fallback_memory: bool,
    pub gemm_size: usize,
    pub tool_timeout: Duration,
    pub network: NetworkConfig,
    pub gpu_enabled: bool,
    pub scale_down: f64,
    pub perf_loss: f64,
    pub baseline: HardwareProfile,
}

impl BenchmarkSettings {
    /// Resolve settings from a config that already carries CLI overrides
    ///
    /// Unusable CPU durations and buffer sizes are reported on stderr and
    /// replaced by their defaults; nothing here aborts a run.
    pub fn from_config(config: &Config) -> Self {
        let bench = &config.benchmark;
        Self {
            cpu_duration: resolve_cpu_duration(bench.cpu_seconds),
            max_workers: bench.max_workers,
            ram_bytes: resolve_ram_bytes(bench.ram_bytes.as_deref()),
            force_fallback_memory: bench.force_fallback_memory,
            gemm_size: bench.gemm_size.max(1),
            tool_timeout: Duration::from_secs(bench.tool_timeout_seconds.max(1)),
            network: config.network.clone(),
            gpu_enabled: true,
            scale_down: config.scaling.scale_down,
            perf_loss: config.scaling.perf_loss,
            baseline: config
                .baseline
                .clone()
                .unwrap_or_else(HardwareProfile::theoretical_maximum),
        }
    }

    pub fn net_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_seconds.max(1))
    }
}

fn resolve_cpu_duration(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => {
            let fallback = crate::config::BenchmarkConfig::default().cpu_seconds;
            eprintln!(
                "{} invalid CPU duration {}; using {}s",
                "Warning:".bright_yellow().bold(),
                seconds,
                fallback
            );
            Duration::from_secs_f64(fallback)
        }
    }
}

fn resolve_ram_bytes(raw: Option<&str>) -> Option<u64> {
    let raw = raw?;
    match parse_size(raw) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            eprintln!(
                "{} ignoring --ram-bytes {:?} ({}); using automatic sizing",
                "Warning:".bright_yellow().bold(),
                raw,
                err
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BenchmarkRunOptions {
    /// Suppress the progress bar on stderr.
    pub quiet: bool,
}

/// Run every probe and assemble the report
pub fn run_benchmarks(settings: &BenchmarkSettings, options: &BenchmarkRunOptions) -> BenchmarkReport {
    let start_time = Instant::now();

    if !options.quiet {
        eprintln!(
            "\n{}",
            "⚡ Starting system benchmarks...".bright_cyan().bold()
        );
    }

    render_progress(0, TOTAL_STEPS, "Detecting host", options);
    let system = HostInfo::detect();
    tracing::debug!(?system, "host detected");

    render_progress(1, TOTAL_STEPS, "CPU hashing", options);
    let cpu = ProbeOutcome::from(measure_cpu(
        settings.cpu_duration,
        settings.max_workers,
        Some(system.cpu_logical_count),
    ));
    if let Some(err) = cpu.error() {
        tracing::warn!(%err, "CPU probe failed");
    }

    render_progress(2, TOTAL_STEPS, "Memory bandwidth", options);
    let path = MemoryPath::detect(settings.force_fallback_memory);
    let ram = ProbeOutcome::from(measure_memory(
        settings.ram_bytes,
        system.memory_total_bytes,
        path,
    ));
    if let Some(err) = ram.error() {
        tracing::warn!(%err, "memory probe failed");
    }

    render_progress(3, TOTAL_STEPS, "Network speed test", options);
    let network = run_network_probe(settings);

    render_progress(4, TOTAL_STEPS, "GPU", options);
    let gpu = run_accelerator_probe(settings);

    render_progress(TOTAL_STEPS, TOTAL_STEPS, "Done", options);

    let scaled_configuration =
        scale_config(&settings.baseline, settings.scale_down, settings.perf_loss);
    let memory_multiple = ram
        .measured()
        .map(|ram| memory_x_multiple(ram.copy_bytes_per_sec));

    let elapsed = start_time.elapsed().as_secs_f64();
    tracing::info!(elapsed, "benchmarks complete");
    if !options.quiet {
        eprintln!(
            "{}\n",
            format!("✅ Benchmarks complete! Duration: {:.1} seconds", elapsed)
                .bright_green()
                .bold()
        );
    }

    BenchmarkReport {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        system,
        cpu,
        ram,
        network,
        gpu,
        theoretical_baseline: settings.baseline.clone(),
        scaled_configuration,
        memory_x_multiple: memory_multiple,
    }
}

fn run_network_probe(settings: &BenchmarkSettings) -> NetworkResult {
    let client = SpeedtestClient::detect(&settings.network);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => return ProbeOutcome::failed(format!("failed to start async runtime: {err}")),
    };
    let result = runtime.block_on(measure_network(client, settings.net_timeout()));
    if let Some(err) = result.error() {
        tracing::warn!(%err, "network probe failed");
    }
    result
}

fn run_accelerator_probe(settings: &BenchmarkSettings) -> AcceleratorResult {
    if !settings.gpu_enabled {
        let reason = "GPU probe disabled".to_string();
        return accelerator::measure_accelerator(
            Capability::Unavailable(reason.clone()),
            Capability::Unavailable(reason),
            settings.gemm_size,
            settings.tool_timeout,
        );
    }

    accelerator::measure_accelerator(
        accelerator::detect_runtime(),
        detect_tool(ENUMERATION_TOOL),
        settings.gemm_size,
        settings.tool_timeout,
    )
}

fn render_progress(
    completed_steps: usize,
    total_steps: usize,
    status: &str,
    options: &BenchmarkRunOptions,
) {
    if !options.quiet {
        eprintln!("{}", progress_line(completed_steps, total_steps, status));
    }
}

fn progress_line(completed_steps: usize, total_steps: usize, status: &str) -> String {
    if total_steps == 0 {
        return format!("   {}", status.bright_white());
    }

    let width = 26usize;
    let completed = completed_steps.min(total_steps);
    let filled = ((completed as f64 / total_steps as f64) * width as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = ((completed as f64 / total_steps as f64) * 100.0).round() as u64;

    format!(
        "   [{}] {:>3}% {}",
        bar.bright_cyan(),
        percent,
        status.bright_white()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::network::SPEEDTEST_UNAVAILABLE;
    use crate::units::{GIB, MIB};

    fn quick_settings() -> BenchmarkSettings {
        let mut config = Config::default();
        config.benchmark.cpu_seconds = 0.1;
        config.benchmark.ram_bytes = Some("1M".to_string());
        config.network.enabled = false;
        let mut settings = BenchmarkSettings::from_config(&config);
        settings.gpu_enabled = false;
        settings
    }

    #[test]
    fn progress_line_fills_bar_in_proportion() {
        colored::control::set_override(false);
        assert_eq!(
            progress_line(2, 4, "Memory bandwidth"),
            format!("   [{}{}]  50% Memory bandwidth", "#".repeat(13), "-".repeat(13))
        );
        assert_eq!(
            progress_line(9, 4, "Done"),
            format!("   [{}] 100% Done", "#".repeat(26))
        );
        assert_eq!(progress_line(0, 0, "Detecting host"), "   Detecting host");
    }

    #[test]
    fn settings_follow_config() {
        let settings = quick_settings();
        assert_eq!(settings.cpu_duration, Duration::from_millis(100));
        assert_eq!(settings.ram_bytes, Some(MIB));
        assert_eq!(settings.net_timeout(), Duration::from_secs(60));
        assert_eq!(settings.baseline, HardwareProfile::theoretical_maximum());
    }

    #[test]
    fn bad_inputs_fall_back_to_defaults() {
        let mut config = Config::default();
        config.benchmark.cpu_seconds = -1.0;
        config.benchmark.ram_bytes = Some("lots".to_string());
        let settings = BenchmarkSettings::from_config(&config);
        assert_eq!(settings.cpu_duration, Duration::from_secs(3));
        assert_eq!(settings.ram_bytes, None);

        config.benchmark.cpu_seconds = f64::NAN;
        let settings = BenchmarkSettings::from_config(&config);
        assert_eq!(settings.cpu_duration, Duration::from_secs(3));
    }

    #[test]
    fn end_to_end_without_network_or_gpu() {
        let options = BenchmarkRunOptions { quiet: true };
        let report = run_benchmarks(&quick_settings(), &options);

        let cpu = report.cpu.measured().expect("cpu probe should succeed");
        assert!(cpu.processes >= 1);
        assert!(cpu.single_thread_bytes_per_sec > 0.0);

        let ram = report.ram.measured().expect("memory probe should succeed");
        assert_eq!(ram.buffer_size_bytes, 1_048_576);
        assert_eq!(
            report.memory_x_multiple,
            Some(ram.copy_bytes_per_sec / GIB as f64)
        );

        assert_eq!(report.network.error(), Some(SPEEDTEST_UNAVAILABLE));
        assert!(!report.gpu.available);
        assert!(report.gpu.gemm_gflops.is_none());

        assert_eq!(report.scaled_configuration.gpus, 22);
        assert_eq!(report.scaled_configuration.cpus, 11);
        assert_eq!(report.scaled_configuration.cpu_cores, 1085);
    }
}
