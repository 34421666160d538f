//! Optional capability detection and external tool helpers
//!
//! Every optional subsystem (vector memory path, GPU compute runtime,
//! speed-test client, `nvidia-smi`) is detected once at probe entry and
//! handed to the probe as a [`Capability`].

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::benchmark::accelerator::{self, ENUMERATION_TOOL};
use crate::benchmark::memory::MemoryPath;
use crate::benchmark::network::SpeedtestClient;
use crate::config::Config;

/// Availability of an optional subsystem
#[derive(Debug)]
pub enum Capability<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// Reason the capability is missing, if it is
    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DependencyStatus {
    pub(crate) name: &'static str,
    pub(crate) available: bool,
    pub(crate) details: String,
}

pub(crate) fn is_command_available(command: &str) -> bool {
    #[cfg(target_os = "windows")]
    let locator = "where";
    #[cfg(not(target_os = "windows"))]
    let locator = "which";

    Command::new(locator)
        .arg(command)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Capability wrapper for a command-line tool found on `PATH`
pub(crate) fn detect_tool(command: &'static str) -> Capability<&'static str> {
    if is_command_available(command) {
        Capability::Available(command)
    } else {
        Capability::Unavailable(format!("{command} not found on PATH"))
    }
}

pub(crate) fn collect_dependency_statuses(config: &Config) -> Vec<DependencyStatus> {
    let memory_path = MemoryPath::detect(config.benchmark.force_fallback_memory);
    let runtime = accelerator::detect_runtime();
    let network = SpeedtestClient::detect(&config.network);
    let enumeration = detect_tool(ENUMERATION_TOOL);

    vec![
        DependencyStatus {
            name: "vector memory path",
            available: memory_path == MemoryPath::Vectorized,
            details: format!("memory probe uses the {} path", memory_path),
        },
        DependencyStatus {
            name: "gpu compute runtime",
            available: runtime.is_available(),
            details: runtime
                .reason()
                .unwrap_or("GEMM throughput will be measured")
                .to_string(),
        },
        DependencyStatus {
            name: "speed-test client",
            available: network.is_available(),
            details: network
                .reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("servers from {}", config.network.servers_url)),
        },
        DependencyStatus {
            name: ENUMERATION_TOOL,
            available: enumeration.is_available(),
            details: enumeration
                .reason()
                .unwrap_or("used for GPU enumeration without a compute runtime")
                .to_string(),
        },
    ]
}

/// Run a command, capturing its output, and kill it if it outlives `timeout`
pub(crate) fn run_command_capture_with_timeout(
    command: &mut Command,
    timeout: Duration,
    label: &str,
) -> Result<std::process::Output> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to launch {label}"))?;

    let stdout_handle = child.stdout.take().map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut stream, &mut buf);
            buf
        })
    });
    let stderr_handle = child.stderr.take().map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut stream, &mut buf);
            buf
        })
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("Failed while waiting on {label}"))?
        {
            break status;
        }

        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            if let Some(handle) = stdout_handle {
                let _ = handle.join();
            }
            if let Some(handle) = stderr_handle {
                let _ = handle.join();
            }
            anyhow::bail!("{label} timed out after {}s", timeout.as_secs());
        }

        std::thread::sleep(Duration::from_millis(50));
    };

    let stdout = stdout_handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = stderr_handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    Ok(std::process::Output {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_unavailable_with_reason() {
        let capability = detect_tool("hostbench-definitely-not-a-real-tool");
        assert!(!capability.is_available());
        assert!(capability.reason().unwrap().contains("not found"));
    }

    #[test]
    fn capability_reason_is_none_when_available() {
        let capability = Capability::Available(42);
        assert!(capability.is_available());
        assert_eq!(capability.reason(), None);
    }

    #[cfg(unix)]
    #[test]
    fn captures_command_output() {
        let output = run_command_capture_with_timeout(
            Command::new("sh").args(["-c", "echo probe"]),
            Duration::from_secs(5),
            "sh",
        )
        .expect("sh should run");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "probe");
    }

    #[cfg(unix)]
    #[test]
    fn kills_command_that_overruns_timeout() {
        let err = run_command_capture_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(200),
            "sleep",
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn dependency_statuses_cover_every_optional_subsystem() {
        let mut config = Config::default();
        config.network.enabled = false;
        let statuses = collect_dependency_statuses(&config);
        let names: Vec<_> = statuses.iter().map(|status| status.name).collect();
        assert_eq!(
            names,
            vec![
                "vector memory path",
                "gpu compute runtime",
                "speed-test client",
                ENUMERATION_TOOL
            ]
        );
        assert!(!statuses[2].available);
    }
}
