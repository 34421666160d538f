//! Scaled hardware configuration model
//!
//! Projects a reduced hardware/performance profile from a fixed theoretical
//! maximum. Hardware reduction and realized-performance loss are two separate
//! factors: counts, capacities and bandwidths shrink by the first, the
//! per-precision compute tiers by the second.

use serde::{Deserialize, Serialize};

pub const HARDWARE_SCALE_RANGE: (f64, f64) = (0.67, 0.71);
pub const PERF_LOSS_RANGE: (f64, f64) = (0.25, 0.30);

/// Hardware capacity and throughput figures for a whole system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub gpus: u32,
    pub cpus: u32,
    pub dual_link_bandwidth_tbps: f64,
    pub fast_memory_tb: f64,
    pub gpu_memory_tb: f64,
    pub gpu_mem_bandwidth_tbps: f64,
    pub cpu_memory_tb: f64,
    pub cpu_mem_bandwidth_tbps: f64,
    pub cpu_cores: u32,
    pub fp4_tensor_pf: f64,
    pub fp8_pf: f64,
    pub int8_pf: f64,
    pub fp16_pf: f64,
    pub tf32_pf: f64,
    pub fp32_pf: f64,
    /// 100 TFLOPS expressed in PFLOPS
    pub fp64_tf: f64,
    /// Interconnect generation
    pub port: String,
    /// Scale factors applied, present only on derived profiles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<ScaleNotes>,
}

/// Provenance of a derived profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleNotes {
    pub hardware_scale_down: f64,
    pub performance_loss: f64,
}

impl HardwareProfile {
    /// The fixed theoretical maximum the projection starts from
    pub fn theoretical_maximum() -> Self {
        Self {
            gpus: 72,
            cpus: 36,
            dual_link_bandwidth_tbps: 150.0,
            fast_memory_tb: 50.0,
            gpu_memory_tb: 25.0,
            gpu_mem_bandwidth_tbps: 600.0,
            cpu_memory_tb: 20.0,
            cpu_mem_bandwidth_tbps: 15.9,
            cpu_cores: 3500,
            // lower bound of the quoted 1,400 | 1,100 range
            fp4_tensor_pf: 1100.0,
            fp8_pf: 720.0,
            int8_pf: 23.0,
            fp16_pf: 360.0,
            tf32_pf: 180.0,
            fp32_pf: 6.0,
            fp64_tf: 0.1,
            port: "PCIe 7.0".to_string(),
            notes: None,
        }
    }
}

pub fn clamp_hardware_scale(value: f64) -> f64 {
    clamp_to(value, HARDWARE_SCALE_RANGE)
}

pub fn clamp_perf_loss(value: f64) -> f64 {
    clamp_to(value, PERF_LOSS_RANGE)
}

fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

fn scale_count(base: u32, keep: f64) -> u32 {
    ((base as f64 * keep).round() as u32).max(1)
}

/// Derive a reduced profile from `baseline`
///
/// Both factors are clamped into their documented ranges before use.
pub fn scale_config(
    baseline: &HardwareProfile,
    hardware_scale: f64,
    perf_loss: f64,
) -> HardwareProfile {
    let hardware_scale = clamp_hardware_scale(hardware_scale);
    let perf_loss = clamp_perf_loss(perf_loss);
    let hw_keep = 1.0 - hardware_scale;
    let perf_keep = 1.0 - perf_loss;

    HardwareProfile {
        gpus: scale_count(baseline.gpus, hw_keep),
        cpus: scale_count(baseline.cpus, hw_keep),
        cpu_cores: scale_count(baseline.cpu_cores, hw_keep),
        fast_memory_tb: baseline.fast_memory_tb * hw_keep,
        gpu_memory_tb: baseline.gpu_memory_tb * hw_keep,
        cpu_memory_tb: baseline.cpu_memory_tb * hw_keep,
        dual_link_bandwidth_tbps: baseline.dual_link_bandwidth_tbps * hw_keep,
        gpu_mem_bandwidth_tbps: baseline.gpu_mem_bandwidth_tbps * hw_keep,
        cpu_mem_bandwidth_tbps: baseline.cpu_mem_bandwidth_tbps * hw_keep,
        fp4_tensor_pf: baseline.fp4_tensor_pf * perf_keep,
        fp8_pf: baseline.fp8_pf * perf_keep,
        int8_pf: baseline.int8_pf * perf_keep,
        fp16_pf: baseline.fp16_pf * perf_keep,
        tf32_pf: baseline.tf32_pf * perf_keep,
        fp32_pf: baseline.fp32_pf * perf_keep,
        fp64_tf: baseline.fp64_tf * perf_keep,
        port: baseline.port.clone(),
        notes: Some(ScaleNotes {
            hardware_scale_down: hardware_scale,
            performance_loss: perf_loss,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn default_factors_scale_counts() {
        let scaled = scale_config(&HardwareProfile::theoretical_maximum(), 0.69, 0.27);
        assert_eq!(scaled.gpus, 22);
        assert_eq!(scaled.cpus, 11);
        assert_eq!(scaled.cpu_cores, 1085);
    }

    #[test]
    fn capacities_follow_hardware_factor_and_tiers_follow_perf_factor() {
        let base = HardwareProfile::theoretical_maximum();
        let scaled = scale_config(&base, 0.69, 0.27);
        assert!(close(scaled.fast_memory_tb, 50.0 * 0.31));
        assert!(close(scaled.gpu_mem_bandwidth_tbps, 600.0 * 0.31));
        assert!(close(scaled.cpu_mem_bandwidth_tbps, 15.9 * 0.31));
        assert!(close(scaled.fp8_pf, 720.0 * 0.73));
        assert!(close(scaled.fp64_tf, 0.1 * 0.73));
        assert_eq!(scaled.port, base.port);
    }

    #[test]
    fn out_of_range_factors_are_clamped() {
        let base = HardwareProfile::theoretical_maximum();
        let scaled = scale_config(&base, 0.9, 0.01);
        let notes = scaled.notes.unwrap();
        assert_eq!(notes.hardware_scale_down, 0.71);
        assert_eq!(notes.performance_loss, 0.25);
        assert_eq!(scaled.gpus, (72.0_f64 * (1.0 - 0.71)).round() as u32);

        let low = scale_config(&base, 0.1, 0.9).notes.unwrap();
        assert_eq!(low.hardware_scale_down, 0.67);
        assert_eq!(low.performance_loss, 0.30);
    }

    #[test]
    fn nan_factor_clamps_to_lower_bound() {
        assert_eq!(clamp_hardware_scale(f64::NAN), 0.67);
        assert_eq!(clamp_perf_loss(f64::NAN), 0.25);
    }

    #[test]
    fn counts_never_drop_below_one() {
        let mut base = HardwareProfile::theoretical_maximum();
        base.gpus = 1;
        base.cpus = 0;
        let scaled = scale_config(&base, 0.71, 0.3);
        assert_eq!(scaled.gpus, 1);
        assert_eq!(scaled.cpus, 1);
    }

    #[test]
    fn baseline_has_no_notes() {
        let json = serde_json::to_value(HardwareProfile::theoretical_maximum()).unwrap();
        assert!(json.get("notes").is_none());
        assert_eq!(json["gpus"], 72);
    }
}
