//! Benchmark probes
//!
//! One module per measured subsystem. Each probe owns its state and returns a
//! value; failures stay inside the probe's own slot of the report.

pub mod accelerator;
pub mod cpu;
pub mod memory;
pub mod network;
pub mod pool;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// A probe's numbers, or the reason it produced none
///
/// Serialized flat: either the measurement's own fields or `{"error": ...}`,
/// never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeOutcome<T> {
    Measured(T),
    Failed { error: String },
}

impl<T> ProbeOutcome<T> {
    pub fn failed(error: impl Into<String>) -> Self {
        ProbeOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn measured(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Measured(value) => Some(value),
            ProbeOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Measured(_) => None,
            ProbeOutcome::Failed { error } => Some(error),
        }
    }
}

impl<T> From<Result<T, ProbeError>> for ProbeOutcome<T> {
    fn from(result: Result<T, ProbeError>) -> Self {
        match result {
            Ok(value) => ProbeOutcome::Measured(value),
            Err(err) => ProbeOutcome::failed(err.to_string()),
        }
    }
}
