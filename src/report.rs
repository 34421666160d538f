//! Benchmark report: the merged result of one run
//!
//! Rendered as a short human summary and serialized to JSON, both to an
//! optional file and to stdout between sentinel markers for tooling.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::benchmark::accelerator::AcceleratorResult;
use crate::benchmark::cpu::CpuResult;
use crate::benchmark::memory::RamResult;
use crate::benchmark::network::NetworkResult;
use crate::benchmark::ProbeOutcome;
use crate::hardware::HostInfo;
use crate::scaling::HardwareProfile;
use crate::units::GIB;

pub const RAW_JSON_BEGIN: &str = "RAW_JSON_BEGIN";
pub const RAW_JSON_END: &str = "RAW_JSON_END";

/// Copy throughput that counts as 1x
const MEMORY_MULTIPLE_BASELINE_BPS: f64 = GIB as f64;

/// Everything measured and derived in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub system: HostInfo,
    pub cpu: ProbeOutcome<CpuResult>,
    pub ram: ProbeOutcome<RamResult>,
    pub network: NetworkResult,
    pub gpu: AcceleratorResult,
    pub theoretical_baseline: HardwareProfile,
    pub scaled_configuration: HardwareProfile,
    /// Copy throughput as a multiple of 1 GB/s
    pub memory_x_multiple: Option<f64>,
}

/// Copy throughput expressed as a multiple of 1 GB/s (1024^3 bytes per second)
pub fn memory_x_multiple(copy_bytes_per_sec: f64) -> f64 {
    copy_bytes_per_sec / MEMORY_MULTIPLE_BASELINE_BPS
}

impl BenchmarkReport {
    /// Multi-line human summary
    pub fn render_summary(&self) -> String {
        let mut lines = Vec::new();

        match &self.cpu {
            ProbeOutcome::Measured(cpu) => lines.push(format!(
                "{} single={} multi={} ({} procs)",
                "CPU (SHA-256):".bright_cyan().bold(),
                cpu.single_thread_human,
                cpu.multi_process_human,
                cpu.processes
            )),
            ProbeOutcome::Failed { error } => lines.push(format!(
                "{} {}",
                "CPU: error:".bright_red().bold(),
                error
            )),
        }

        match &self.network {
            ProbeOutcome::Measured(net) => lines.push(format!(
                "{} down={} up={} ping={:.1} ms",
                "NETWORK:".bright_cyan().bold(),
                net.download_human,
                net.upload_human,
                net.ping_ms
            )),
            ProbeOutcome::Failed { error } => lines.push(format!(
                "{} {}",
                "NETWORK: error:".bright_yellow().bold(),
                error
            )),
        }

        match &self.ram {
            ProbeOutcome::Measured(ram) => lines.push(format!(
                "{} copy={} write={} read={} [{}]",
                "RAM:".bright_cyan().bold(),
                ram.copy_human,
                ram.write_human,
                ram.read_human,
                ram.implementation
            )),
            ProbeOutcome::Failed { error } => lines.push(format!(
                "{} {}",
                "RAM: error:".bright_red().bold(),
                error
            )),
        }

        if let Some(multiple) = self.memory_x_multiple {
            lines.push(format!(
                "{} {:.2}x (baseline 1 GB/s)",
                "FREE-FORM MEMORY PERFORMANCE MULTIPLIER:".bright_cyan().bold(),
                multiple
            ));
        }

        lines.push(self.gpu_line());

        let scaled = &self.scaled_configuration;
        if let Some(notes) = scaled.notes {
            lines.push(format!(
                "{} {} GPUs / {} CPUs / {} cores, FP8 {:.1} PF (hardware -{:.0}%, performance -{:.0}%)",
                "SCALED CONFIG:".bright_cyan().bold(),
                scaled.gpus,
                scaled.cpus,
                scaled.cpu_cores,
                scaled.fp8_pf,
                notes.hardware_scale_down * 100.0,
                notes.performance_loss * 100.0
            ));
        }

        lines.join("\n")
    }

    fn gpu_line(&self) -> String {
        let gpu = &self.gpu;
        let label = "GPU:".bright_cyan().bold();
        match (gpu.available, gpu.gemm_gflops, gpu.gemm_time_s) {
            (true, Some(gflops), Some(secs)) => format!(
                "{} {} GEMM {:.1} GFLOP/s in {:.3}s",
                label,
                gpu.device.as_deref().unwrap_or(""),
                gflops,
                secs
            ),
            (true, _, _) => format!(
                "{} {} benchmark failed: {}",
                label,
                gpu.device.as_deref().unwrap_or(""),
                gpu.error.as_deref().unwrap_or("no timing recorded")
            ),
            (false, _, _) if gpu.nvidia_smi.is_some() => format!(
                "{} detected via nvidia-smi, no compute runtime available for benchmarking",
                label
            ),
            (false, _, _) => format!("{} not available or no compute runtime detected", label),
        }
    }

    /// Full report as indented JSON
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize benchmark report")
    }

    /// Single-line JSON between the sentinel markers
    pub fn raw_json_block(&self) -> Result<String> {
        let json = serde_json::to_string(self).context("Failed to serialize benchmark report")?;
        Ok(format!("{RAW_JSON_BEGIN}\n{json}\n{RAW_JSON_END}"))
    }

    /// Write the report as indented JSON to `path`
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_pretty_json()?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::memory::MemoryPath;
    use crate::benchmark::network::NetworkMeasurement;
    use crate::scaling::scale_config;

    fn sample_report() -> BenchmarkReport {
        let baseline = HardwareProfile::theoretical_maximum();
        let scaled = scale_config(&baseline, 0.69, 0.27);
        let copy = 12.345_678_9 * GIB as f64;
        BenchmarkReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            system: HostInfo {
                platform: "Linux-6.8.0-x86_64".to_string(),
                harness_version: "0.1.0".to_string(),
                cpu_logical_count: 8,
                cpu_physical_cores: Some(4),
                cpu_brand: Some("Test CPU".to_string()),
                memory_total_bytes: Some(16 * GIB),
                memory_available_bytes: Some(8 * GIB),
            },
            cpu: ProbeOutcome::Measured(CpuResult {
                algorithm: "sha256".to_string(),
                duration_s: 3.0,
                single_thread_bytes_per_sec: 512_345_678.9,
                multi_process_bytes_per_sec: 3_987_654_321.1,
                processes: 8,
                single_thread_human: "488.61 MB/s".to_string(),
                multi_process_human: "3.71 GB/s".to_string(),
            }),
            ram: ProbeOutcome::Measured(RamResult {
                buffer_size_bytes: 256 * 1024 * 1024,
                copy_bytes_per_sec: copy,
                write_bytes_per_sec: 20.0 * GIB as f64,
                read_bytes_per_sec: 18.5 * GIB as f64,
                copy_human: "12.35 GB/s".to_string(),
                write_human: "20.00 GB/s".to_string(),
                read_human: "18.50 GB/s".to_string(),
                implementation: MemoryPath::Vectorized,
            }),
            network: ProbeOutcome::Measured(NetworkMeasurement {
                download_bits_per_sec: 94_123_456.7,
                upload_bits_per_sec: 41_234_567.8,
                ping_ms: 12.3456,
                download_human: "11.22 MB/s".to_string(),
                upload_human: "4.92 MB/s".to_string(),
                server: Some("Test ISP (Localhost)".to_string()),
            }),
            gpu: AcceleratorResult {
                nvidia_smi: Some("NVIDIA Test GPU, 24576 MiB".to_string()),
                ..AcceleratorResult::default()
            },
            theoretical_baseline: baseline,
            scaled_configuration: scaled,
            memory_x_multiple: Some(memory_x_multiple(copy)),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(1.0)
    }

    #[test]
    fn memory_multiple_is_copy_over_one_gib() {
        assert_eq!(memory_x_multiple(GIB as f64), 1.0);
        assert_eq!(memory_x_multiple(0.0), 0.0);
        assert!(close(memory_x_multiple(2.5 * GIB as f64), 2.5));
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.generated_at, report.generated_at);
        assert_eq!(parsed.system, report.system);
        assert_eq!(parsed.gpu, report.gpu);

        let (cpu, parsed_cpu) = (report.cpu.measured().unwrap(), parsed.cpu.measured().unwrap());
        assert_eq!(parsed_cpu.processes, cpu.processes);
        assert!(close(
            parsed_cpu.multi_process_bytes_per_sec,
            cpu.multi_process_bytes_per_sec
        ));

        let (ram, parsed_ram) = (report.ram.measured().unwrap(), parsed.ram.measured().unwrap());
        assert_eq!(parsed_ram.implementation, ram.implementation);
        assert!(close(parsed_ram.copy_bytes_per_sec, ram.copy_bytes_per_sec));

        let net = parsed.network.measured().unwrap();
        assert!(close(net.ping_ms, 12.3456));
        assert_eq!(net.server.as_deref(), Some("Test ISP (Localhost)"));

        assert_eq!(parsed.theoretical_baseline.gpus, 72);
        assert_eq!(parsed.scaled_configuration.gpus, 22);
        assert!(close(
            parsed.memory_x_multiple.unwrap(),
            report.memory_x_multiple.unwrap()
        ));
    }

    #[test]
    fn failed_probes_round_trip_as_errors() {
        let mut report = sample_report();
        report.ram = ProbeOutcome::failed("could not allocate 1024 byte buffer");
        report.network = ProbeOutcome::failed("speedtest module not available");
        report.memory_x_multiple = None;

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value["network"],
            serde_json::json!({ "error": "speedtest module not available" })
        );
        assert!(value["memory_x_multiple"].is_null());

        let parsed: BenchmarkReport = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.ram.error(), Some("could not allocate 1024 byte buffer"));
        assert!(parsed.memory_x_multiple.is_none());
    }

    #[test]
    fn summary_mentions_every_probe() {
        colored::control::set_override(false);
        let summary = sample_report().render_summary();
        assert!(summary.contains("CPU (SHA-256): single=488.61 MB/s multi=3.71 GB/s (8 procs)"));
        assert!(summary.contains("NETWORK: down=11.22 MB/s up=4.92 MB/s ping=12.3 ms"));
        assert!(summary.contains("[vectorized]"));
        assert!(summary.contains("FREE-FORM MEMORY PERFORMANCE MULTIPLIER: 12.35x (baseline 1 GB/s)"));
        assert!(summary.contains("GPU: detected via nvidia-smi"));
        assert!(summary.contains("22 GPUs / 11 CPUs"));
    }

    #[test]
    fn raw_block_is_single_json_line_between_markers() {
        let report = sample_report();
        let block = report.raw_json_block().unwrap();
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RAW_JSON_BEGIN);
        assert_eq!(lines[2], RAW_JSON_END);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["cpu"]["algorithm"], "sha256");
    }

    #[test]
    fn writes_pretty_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample_report();
        report.write_json(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"system\""));
        let parsed: BenchmarkReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let err = sample_report().write_json(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to write JSON report"));
    }
}
