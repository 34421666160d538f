//! Memory probe: copy, write and read bandwidth over one large buffer
//!
//! Each operation is repeated a few times and the fastest pass is reported,
//! giving the best-case throughput the host can sustain.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hint::black_box;
use std::time::Instant;

use crate::error::ProbeError;
use crate::units::{format_bytes_per_sec, MIB};

pub const MIN_AUTO_BUFFER: u64 = 64 * MIB;
pub const MAX_AUTO_BUFFER: u64 = 256 * MIB;
pub const VECTORIZED_ITERATIONS: usize = 5;
pub const FALLBACK_ITERATIONS: usize = 3;
pub const FALLBACK_CHUNK: usize = 4096;
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// Which implementation produced the memory numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPath {
    /// Whole-slice operations the compiler lowers to SIMD
    Vectorized,
    /// Chunked byte-wise loops
    Fallback,
}

impl MemoryPath {
    /// Pick the vectorized path when the CPU exposes a SIMD unit
    pub fn detect(force_fallback: bool) -> Self {
        if !force_fallback && simd_available() {
            MemoryPath::Vectorized
        } else {
            MemoryPath::Fallback
        }
    }

    fn iterations(self) -> usize {
        match self {
            MemoryPath::Vectorized => VECTORIZED_ITERATIONS,
            MemoryPath::Fallback => FALLBACK_ITERATIONS,
        }
    }
}

impl fmt::Display for MemoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryPath::Vectorized => write!(f, "vectorized"),
            MemoryPath::Fallback => write!(f, "fallback"),
        }
    }
}

fn simd_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("sse2")
    }

    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

/// Memory bandwidth figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamResult {
    pub buffer_size_bytes: u64,
    pub copy_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub read_bytes_per_sec: f64,
    pub copy_human: String,
    pub write_human: String,
    pub read_human: String,
    pub implementation: MemoryPath,
}

/// Buffer size used when none is requested: 10% of RAM within [64 MiB, 256 MiB]
pub fn auto_buffer_size(total_memory: Option<u64>) -> u64 {
    match total_memory {
        Some(total) => (total / 10).clamp(MIN_AUTO_BUFFER, MAX_AUTO_BUFFER),
        None => MAX_AUTO_BUFFER,
    }
}

/// Measure memory bandwidth
///
/// `target_bytes` is used verbatim when given; otherwise the buffer is sized
/// from `total_memory`.
pub fn measure_memory(
    target_bytes: Option<u64>,
    total_memory: Option<u64>,
    path: MemoryPath,
) -> Result<RamResult, ProbeError> {
    let size = target_bytes.unwrap_or_else(|| auto_buffer_size(total_memory));
    let len = usize::try_from(size).map_err(|_| ProbeError::Allocation {
        bytes: usize::MAX,
    })?;
    tracing::debug!(size, %path, "allocating memory probe buffers");

    let mut src = allocate(len)?;
    rand::rng().fill_bytes(&mut src);
    let mut dst = allocate(len)?;

    let iterations = path.iterations();
    let (copy_secs, write_secs, read_secs) = match path {
        MemoryPath::Vectorized => (
            fastest(iterations, || {
                dst.copy_from_slice(&src);
                black_box(&dst);
            }),
            fastest(iterations, || {
                dst.fill(0);
                black_box(&dst);
            }),
            fastest(iterations, || {
                black_box(vector_sum(&src));
            }),
        ),
        MemoryPath::Fallback => (
            fastest(iterations, || {
                chunked_copy(&mut dst, &src);
                black_box(&dst);
            }),
            fastest(iterations, || {
                chunked_zero(&mut dst);
                black_box(&dst);
            }),
            fastest(iterations, || {
                black_box(bytewise_sum(&src));
            }),
        ),
    };

    let copy_bps = throughput(size, copy_secs);
    let write_bps = throughput(size, write_secs);
    let read_bps = throughput(size, read_secs);

    Ok(RamResult {
        buffer_size_bytes: size,
        copy_bytes_per_sec: copy_bps,
        write_bytes_per_sec: write_bps,
        read_bytes_per_sec: read_bps,
        copy_human: format_bytes_per_sec(copy_bps),
        write_human: format_bytes_per_sec(write_bps),
        read_human: format_bytes_per_sec(read_bps),
        implementation: path,
    })
}

fn allocate(len: usize) -> Result<Vec<u8>, ProbeError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ProbeError::Allocation { bytes: len })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Minimum wall-clock seconds over `iterations` runs of `op`
fn fastest<F: FnMut()>(iterations: usize, mut op: F) -> f64 {
    (0..iterations.max(1))
        .map(|_| {
            let start = Instant::now();
            op();
            start.elapsed().as_secs_f64()
        })
        .fold(f64::INFINITY, f64::min)
}

fn throughput(bytes: u64, secs: f64) -> f64 {
    bytes as f64 / secs.max(MIN_ELAPSED_SECS)
}

fn vector_sum(data: &[u8]) -> u64 {
    data.iter().map(|&b| u64::from(b)).sum()
}

fn bytewise_sum(data: &[u8]) -> u64 {
    let mut total: u64 = 0;
    for chunk in data.chunks(FALLBACK_CHUNK) {
        for &byte in black_box(chunk) {
            total = total.wrapping_add(u64::from(byte));
        }
    }
    total
}

fn chunked_copy(dst: &mut [u8], src: &[u8]) {
    for (to, from) in dst
        .chunks_mut(FALLBACK_CHUNK)
        .zip(src.chunks(FALLBACK_CHUNK))
    {
        to.copy_from_slice(black_box(from));
    }
}

fn chunked_zero(dst: &mut [u8]) {
    const ZEROS: [u8; FALLBACK_CHUNK] = [0; FALLBACK_CHUNK];
    for chunk in dst.chunks_mut(FALLBACK_CHUNK) {
        let len = chunk.len();
        chunk.copy_from_slice(black_box(&ZEROS[..len]));
    }
}
