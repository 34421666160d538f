//! Static host facts gathered once per run

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Host facts recorded alongside the measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// OS, kernel and architecture, e.g. "Linux-6.8.0-x86_64"
    pub platform: String,
    /// Version of this harness
    pub harness_version: String,
    /// Logical CPUs visible to the process
    pub cpu_logical_count: usize,
    /// Physical cores (if detectable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_physical_cores: Option<usize>,
    /// CPU brand string (if detectable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_available_bytes: Option<u64>,
}

impl HostInfo {
    /// Detect host information
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let cpus = sys.cpus();
        let cpu_logical_count = if cpus.is_empty() {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            cpus.len()
        };
        let cpu_brand = cpus
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty());

        // sysinfo reports 0 when it cannot read memory counters
        let memory_total_bytes = Some(sys.total_memory()).filter(|bytes| *bytes > 0);
        let memory_available_bytes = memory_total_bytes.map(|_| sys.available_memory());

        Self {
            platform: platform_string(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            cpu_logical_count,
            cpu_physical_cores: sys.physical_core_count(),
            cpu_brand,
            memory_total_bytes,
            memory_available_bytes,
        }
    }
}

fn platform_string() -> String {
    let os = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
    let mut parts = vec![os];
    if let Some(kernel) = System::kernel_version() {
        parts.push(kernel);
    }
    parts.push(std::env::consts::ARCH.to_string());
    if let Some(version) = System::os_version() {
        parts.push(format!("with-{version}"));
    }
    parts.join("-")
}
