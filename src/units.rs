//! Unit conversion helpers
//!
//! Human-readable byte rates for the summary and JSON, and the size parser
//! behind `--ram-bytes`.

use crate::error::SizeParseError;

const RATE_UNITS: [&str; 5] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Format a byte rate, stepping through B/KB/MB/GB/TB per second (powers of 1024)
pub fn format_bytes_per_sec(bytes_per_sec: f64) -> String {
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < RATE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, RATE_UNITS[unit])
}

/// Parse a size like `1048576`, `512K`, `256M` or `1.5G` into bytes
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let normalized = input.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(SizeParseError::Empty);
    }

    let multiplier = match normalized.chars().last() {
        Some('G') => Some(GIB),
        Some('M') => Some(MIB),
        Some('K') => Some(KIB),
        _ => None,
    };

    let bytes = match multiplier {
        Some(multiplier) => {
            let mantissa = normalized[..normalized.len() - 1].trim();
            let value: f64 = mantissa
                .parse()
                .map_err(|_| SizeParseError::Invalid(input.to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(SizeParseError::Invalid(input.to_string()));
            }
            let bytes = value * multiplier as f64;
            if bytes >= u64::MAX as f64 {
                return Err(SizeParseError::OutOfRange(input.to_string()));
            }
            bytes as u64
        }
        None => normalized
            .parse::<u64>()
            .map_err(|_| SizeParseError::Invalid(input.to_string()))?,
    };

    if bytes == 0 || usize::try_from(bytes).is_err() {
        return Err(SizeParseError::OutOfRange(input.to_string()));
    }

    Ok(bytes)
}
