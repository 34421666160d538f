//! CPU probe: SHA-256 hashing throughput
//!
//! Loops are bounded by wall-clock deadlines rather than iteration counts so
//! results stay comparable across machines and test durations.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hint::black_box;
use std::time::{Duration, Instant};

use super::pool::WorkerPool;
use crate::error::ProbeError;
use crate::units::format_bytes_per_sec;

pub const HASH_ALGORITHM: &str = "sha256";
pub const HASH_BLOCK_SIZE: usize = 1024;
/// Hard cap on CPU workers
pub const MAX_WORKERS: usize = 8;

/// CPU hashing throughput
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuResult {
    pub algorithm: String,
    pub duration_s: f64,
    pub single_thread_bytes_per_sec: f64,
    /// Aggregate throughput of all workers (not per worker)
    pub multi_process_bytes_per_sec: f64,
    /// Workers used for the aggregate phase
    pub processes: usize,
    pub single_thread_human: String,
    pub multi_process_human: String,
}

/// Hash a 1 KiB block until `duration` elapses and return the bytes processed
pub fn sha256_worker(duration: Duration) -> u64 {
    let mut data = [0u8; HASH_BLOCK_SIZE];
    rand::rng().fill_bytes(&mut data);

    let deadline = Instant::now() + duration;
    let mut count: u64 = 0;
    while Instant::now() < deadline {
        black_box(Sha256::digest(black_box(&data)));
        // keep every input distinct
        data[0] ^= (count & 0xFF) as u8;
        count += 1;
    }

    count * HASH_BLOCK_SIZE as u64
}

/// Worker count for the aggregate phase
///
/// Requests and the default are both capped at [`MAX_WORKERS`] and at the
/// logical core count when it is known.
pub fn worker_count(requested: Option<usize>, logical_cpus: Option<usize>) -> usize {
    let cap = logical_cpus
        .filter(|n| *n > 0)
        .map_or(MAX_WORKERS, |n| n.min(MAX_WORKERS));
    requested.unwrap_or(cap).clamp(1, cap)
}

/// Measure single-thread and aggregate hashing throughput
pub fn measure_cpu(
    duration: Duration,
    max_workers: Option<usize>,
    logical_cpus: Option<usize>,
) -> Result<CpuResult, ProbeError> {
    let seconds = duration.as_secs_f64().max(1e-9);

    let single_bytes = sha256_worker(duration);
    let single_bps = single_bytes as f64 / seconds;
    tracing::debug!(single_bytes, "single-thread hashing finished");

    let pool = WorkerPool::new(worker_count(max_workers, logical_cpus));
    let per_worker = pool.run(duration, sha256_worker)?;
    let multi_bytes: u64 = per_worker.iter().sum();
    let multi_bps = multi_bytes as f64 / seconds;
    tracing::debug!(workers = pool.workers(), ?per_worker, "worker hashing finished");

    Ok(CpuResult {
        algorithm: HASH_ALGORITHM.to_string(),
        duration_s: duration.as_secs_f64(),
        single_thread_bytes_per_sec: single_bps,
        multi_process_bytes_per_sec: multi_bps,
        processes: pool.workers(),
        single_thread_human: format_bytes_per_sec(single_bps),
        multi_process_human: format_bytes_per_sec(multi_bps),
    })
}
