//! Accelerator probe: GPU GEMM throughput
//!
//! Prefers a compute runtime that can run a square matrix multiply on the
//! device. Without one, falls back to enumerating devices with `nvidia-smi`
//! and storing its raw output. Throughput is only ever reported from a real
//! timed multiply.

use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::deps::{run_command_capture_with_timeout, Capability};
use crate::error::ProbeError;

pub const ENUMERATION_TOOL: &str = "nvidia-smi";
const ENUMERATION_ARGS: [&str; 2] = ["--query-gpu=name,memory.total", "--format=csv,noheader"];
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// A device-side linear algebra backend
pub trait ComputeRuntime {
    /// Name of the device the multiply runs on
    fn device_name(&self) -> Result<String, ProbeError>;

    /// Enqueue one `n`×`n` by `n`×`n` single-precision multiply
    fn matmul(&mut self, n: usize) -> Result<(), ProbeError>;

    /// Block until all enqueued work has finished
    fn synchronize(&mut self) -> Result<(), ProbeError>;
}

#[cfg(feature = "cuda")]
mod cuda;

/// Look for a GPU compute runtime: cuBLAS on the first CUDA device
#[cfg(feature = "cuda")]
pub fn detect_runtime() -> Capability<Box<dyn ComputeRuntime>> {
    match cuda::CublasRuntime::new(0) {
        Ok(runtime) => Capability::Available(Box::new(runtime)),
        Err(err) => Capability::Unavailable(err.to_string()),
    }
}

/// Look for a GPU compute runtime
///
/// Built without the `cuda` feature, so the probe always takes the
/// enumeration fallback.
#[cfg(not(feature = "cuda"))]
pub fn detect_runtime() -> Capability<Box<dyn ComputeRuntime>> {
    Capability::Unavailable("built without the cuda feature".to_string())
}

/// GPU measurement or the reason there is none
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorResult {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemm_gflops: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemm_time_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemm_size: Option<usize>,
    /// Raw `nvidia-smi` listing when no runtime could benchmark the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_smi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// FLOP/s for one `n`×`n` multiply in `secs`, in GFLOP/s
pub fn gemm_gflops(n: usize, secs: f64) -> f64 {
    let n = n as f64;
    2.0 * n * n * n / secs.max(MIN_ELAPSED_SECS) / 1e9
}

/// Measure accelerator throughput; never fails outward
pub fn measure_accelerator(
    runtime: Capability<Box<dyn ComputeRuntime>>,
    tool: Capability<&str>,
    gemm_size: usize,
    tool_timeout: Duration,
) -> AcceleratorResult {
    let mut result = AcceleratorResult::default();

    match runtime {
        Capability::Available(mut runtime) => {
            if let Err(err) = benchmark_device(runtime.as_mut(), gemm_size, &mut result) {
                tracing::warn!(%err, "GPU benchmark failed");
                result.error = Some(err.to_string());
            }
        }
        Capability::Unavailable(reason) => {
            tracing::debug!(%reason, "GPU compute runtime unavailable");
            if let Capability::Available(tool) = tool {
                match enumerate_devices(tool, tool_timeout) {
                    Ok(listing) => result.nvidia_smi = Some(listing),
                    Err(err) => result.error = Some(err.to_string()),
                }
            }
        }
    }

    result
}

fn benchmark_device(
    runtime: &mut dyn ComputeRuntime,
    n: usize,
    result: &mut AcceleratorResult,
) -> Result<(), ProbeError> {
    result.device = Some(runtime.device_name()?);
    result.available = true;

    // warm-up triggers lazy context and kernel initialization
    runtime.matmul(n)?;
    runtime.synchronize()?;

    let start = Instant::now();
    runtime.matmul(n)?;
    runtime.synchronize()?;
    let secs = start.elapsed().as_secs_f64().max(MIN_ELAPSED_SECS);

    result.gemm_gflops = Some(gemm_gflops(n, secs));
    result.gemm_time_s = Some(secs);
    result.gemm_size = Some(n);
    Ok(())
}

fn enumerate_devices(tool: &str, timeout: Duration) -> Result<String, ProbeError> {
    let output = run_command_capture_with_timeout(
        Command::new(tool).args(ENUMERATION_ARGS),
        timeout,
        tool,
    )
    .map_err(|err| ProbeError::Tool {
        tool: tool.to_string(),
        message: format!("{err:#}"),
    })?;

    if !output.status.success() {
        return Err(ProbeError::Tool {
            tool: tool.to_string(),
            message: format!("exited with {}", output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        matmul: AtomicUsize,
        sync: AtomicUsize,
    }

    struct SleepyRuntime {
        calls: Arc<Calls>,
        fail_matmul: bool,
    }

    impl ComputeRuntime for SleepyRuntime {
        fn device_name(&self) -> Result<String, ProbeError> {
            Ok("Test Accelerator".to_string())
        }

        fn matmul(&mut self, _n: usize) -> Result<(), ProbeError> {
            self.calls.matmul.fetch_add(1, Ordering::SeqCst);
            if self.fail_matmul {
                return Err(ProbeError::Runtime("out of device memory".to_string()));
            }
            Ok(())
        }

        fn synchronize(&mut self) -> Result<(), ProbeError> {
            self.calls.sync.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }
    }

    fn no_runtime() -> Capability<Box<dyn ComputeRuntime>> {
        Capability::Unavailable("no runtime".to_string())
    }

    fn runtime(fail_matmul: bool) -> (Capability<Box<dyn ComputeRuntime>>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let runtime = SleepyRuntime {
            calls: Arc::clone(&calls),
            fail_matmul,
        };
        (Capability::Available(Box::new(runtime)), calls)
    }

    #[test]
    fn warm_up_then_one_timed_multiply() {
        let (runtime, calls) = runtime(false);
        let result = measure_accelerator(
            runtime,
            Capability::Unavailable("unused".to_string()),
            256,
            Duration::from_secs(1),
        );

        assert!(result.available);
        assert_eq!(result.device.as_deref(), Some("Test Accelerator"));
        assert_eq!(calls.matmul.load(Ordering::SeqCst), 2);
        assert_eq!(calls.sync.load(Ordering::SeqCst), 2);

        let secs = result.gemm_time_s.unwrap();
        assert!(secs >= 0.005);
        let expected = 2.0 * 256f64.powi(3) / secs / 1e9;
        assert!((result.gemm_gflops.unwrap() - expected).abs() < 1e-9);
        assert_eq!(result.gemm_size, Some(256));
        assert!(result.error.is_none());
    }

    #[test]
    fn runtime_failure_is_captured_without_throughput() {
        let (runtime, _) = runtime(true);
        let result = measure_accelerator(
            runtime,
            Capability::Unavailable("unused".to_string()),
            1024,
            Duration::from_secs(1),
        );

        assert!(result.error.unwrap().contains("out of device memory"));
        assert!(result.gemm_gflops.is_none());
        assert!(result.gemm_time_s.is_none());
    }

    #[test]
    fn nothing_available_reports_unavailable() {
        let result = measure_accelerator(
            no_runtime(),
            Capability::Unavailable("nvidia-smi not found on PATH".to_string()),
            1024,
            Duration::from_secs(1),
        );

        assert!(!result.available);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({ "available": false }));
    }

    #[cfg(unix)]
    #[test]
    fn enumeration_output_is_stored_raw() {
        // echo stands in for the enumeration tool and prints its arguments back
        let result = measure_accelerator(
            no_runtime(),
            Capability::Available("echo"),
            1024,
            Duration::from_secs(5),
        );

        assert!(!result.available);
        assert_eq!(
            result.nvidia_smi.as_deref(),
            Some("--query-gpu=name,memory.total --format=csv,noheader")
        );
        assert!(result.device.is_none());
    }

    #[test]
    fn enumeration_failure_is_captured() {
        let result = measure_accelerator(
            no_runtime(),
            Capability::Available("hostbench-missing-enumeration-tool"),
            1024,
            Duration::from_secs(1),
        );

        assert!(!result.available);
        assert!(result.nvidia_smi.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn gflops_uses_two_n_cubed() {
        assert!((gemm_gflops(1000, 1.0) - 2.0).abs() < 1e-12);
        assert!(gemm_gflops(1024, 0.0).is_finite());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn default_build_has_no_runtime() {
        let runtime = detect_runtime();
        assert_eq!(runtime.reason(), Some("built without the cuda feature"));
    }
}
