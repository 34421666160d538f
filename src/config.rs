//! Configuration management for hostbench
//!
//! Config file location:
//! - Linux: ~/.config/hostbench/config.toml
//! - macOS: ~/Library/Application Support/com.hostbench.hostbench/config.toml
//! - Windows: %APPDATA%/hostbench/hostbench/config/config.toml
//!
//! You can override the config location by setting `HOSTBENCH_CONFIG_PATH`.
//! Command-line flags take precedence over anything set here.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::scaling::HardwareProfile;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Probe settings
    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    /// Speed-test settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Scale factors for the projected configuration
    #[serde(default)]
    pub scaling: ScalingConfig,

    /// Replacement for the built-in theoretical baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<HardwareProfile>,
}

impl Config {
    /// Load configuration from file or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, toml)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        Ok(config_path)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("HOSTBENCH_CONFIG_PATH") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs = ProjectDirs::from("com", "hostbench", "hostbench")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

/// Probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Seconds per CPU sub-test
    #[serde(default = "default_cpu_seconds")]
    pub cpu_seconds: f64,

    /// Worker count for the multi-worker CPU phase (defaults to min(cores, 8))
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Memory probe buffer size, e.g. "256M" (defaults to automatic sizing)
    #[serde(default)]
    pub ram_bytes: Option<String>,

    /// Use the byte-wise memory path even when the vector path is available
    #[serde(default)]
    pub force_fallback_memory: bool,

    /// Square matrix dimension for the GPU GEMM
    #[serde(default = "default_gemm_size")]
    pub gemm_size: usize,

    /// Timeout for external tools such as nvidia-smi
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            cpu_seconds: default_cpu_seconds(),
            max_workers: None,
            ram_bytes: None,
            force_fallback_memory: false,
            gemm_size: default_gemm_size(),
            tool_timeout_seconds: default_tool_timeout(),
        }
    }
}

fn default_cpu_seconds() -> f64 {
    3.0
}

fn default_gemm_size() -> usize {
    1024
}

fn default_tool_timeout() -> u64 {
    10
}

/// Speed-test settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Run the network probe at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds before the network probe gives up
    #[serde(default = "default_net_timeout")]
    pub timeout_seconds: u64,

    /// Server list endpoint
    #[serde(default = "default_servers_url")]
    pub servers_url: String,

    /// How many candidate servers to ping when picking the best one
    #[serde(default = "default_max_servers")]
    pub max_servers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_seconds: default_net_timeout(),
            servers_url: default_servers_url(),
            max_servers: default_max_servers(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_net_timeout() -> u64 {
    60
}

fn default_servers_url() -> String {
    "https://www.speedtest.net/api/js/servers?engine=js&https_functional=true&limit=10".to_string()
}

fn default_max_servers() -> usize {
    5
}

/// Scale factors for the projected configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Hardware reduction fraction, clamped to [0.67, 0.71]
    #[serde(default = "default_scale_down")]
    pub scale_down: f64,

    /// Performance loss fraction, clamped to [0.25, 0.30]
    #[serde(default = "default_perf_loss", alias = "perf_retain")]
    pub perf_loss: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_down: default_scale_down(),
            perf_loss: default_perf_loss(),
        }
    }
}

fn default_scale_down() -> f64 {
    0.69
}

fn default_perf_loss() -> f64 {
    0.27
}
