//! Network probe: speed-test download, upload and latency
//!
//! Talks to the public speedtest.net server pool: fetch the candidate list,
//! pick the server with the lowest latency, then time parallel downloads of
//! its random image payloads and parallel uploads of generated bodies.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::ProbeOutcome;
use crate::config::NetworkConfig;
use crate::deps::Capability;
use crate::error::ProbeError;
use crate::units::{format_bytes_per_sec, KIB};

/// Reported when the speed-test client is not available on this run
pub const SPEEDTEST_UNAVAILABLE: &str = "speedtest module not available";

const LATENCY_SAMPLES: usize = 3;
const DOWNLOAD_SIZES: [u32; 6] = [350, 500, 750, 1000, 1500, 2000];
const UPLOAD_SIZES: [u64; 4] = [256 * KIB, 512 * KIB, 1024 * KIB, 2048 * KIB];

/// Speed-test figures (rates in bits per second)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMeasurement {
    pub download_bits_per_sec: f64,
    pub upload_bits_per_sec: f64,
    pub ping_ms: f64,
    pub download_human: String,
    pub upload_human: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

pub type NetworkResult = ProbeOutcome<NetworkMeasurement>;

/// Entry of the speed-test server list
#[derive(Debug, Clone, Deserialize)]
struct ServerEntry {
    /// Upload endpoint; other resources live next to it
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sponsor: Option<String>,
}

impl ServerEntry {
    fn base_url(&self) -> &str {
        self.url
            .rsplit_once('/')
            .map_or(self.url.as_str(), |(base, _)| base)
    }

    fn label(&self) -> String {
        match (&self.sponsor, &self.name) {
            (Some(sponsor), Some(name)) => format!("{sponsor} ({name})"),
            (Some(label), None) | (None, Some(label)) => label.clone(),
            (None, None) => self.url.clone(),
        }
    }
}

/// HTTP client for the speed-test service
#[derive(Debug, Clone)]
pub struct SpeedtestClient {
    http: Client,
    servers_url: String,
    max_servers: usize,
}

impl SpeedtestClient {
    /// Build a client unless the network probe is disabled
    pub fn detect(config: &NetworkConfig) -> Capability<Self> {
        if !config.enabled {
            return Capability::Unavailable(SPEEDTEST_UNAVAILABLE.to_string());
        }

        match Self::new(
            config.servers_url.clone(),
            config.max_servers,
            Duration::from_secs(config.timeout_seconds.max(1)),
        ) {
            Ok(client) => Capability::Available(client),
            Err(err) => Capability::Unavailable(format!("{SPEEDTEST_UNAVAILABLE}: {err}")),
        }
    }

    pub fn new(
        servers_url: String,
        max_servers: usize,
        request_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("hostbench/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            servers_url,
            max_servers: max_servers.max(1),
        })
    }

    async fn run(&self) -> Result<NetworkMeasurement, ProbeError> {
        let servers = self.fetch_servers().await?;
        let (server, ping_ms) = self.best_server(servers).await?;
        tracing::info!(server = %server.label(), ping_ms, "selected speed-test server");

        let download_bps = self.download(&server).await?;
        let upload_bps = self.upload(&server).await?;

        Ok(NetworkMeasurement {
            download_bits_per_sec: download_bps,
            upload_bits_per_sec: upload_bps,
            ping_ms,
            download_human: format_bytes_per_sec(download_bps / 8.0),
            upload_human: format_bytes_per_sec(upload_bps / 8.0),
            server: Some(server.label()),
        })
    }

    async fn fetch_servers(&self) -> Result<Vec<ServerEntry>, ProbeError> {
        let response = self.http.get(&self.servers_url).send().await?;
        check_status(&self.servers_url, &response)?;
        let servers: Vec<ServerEntry> = response.json().await?;
        if servers.is_empty() {
            return Err(ProbeError::NoServer);
        }
        Ok(servers)
    }

    /// Lowest average latency among the first `max_servers` candidates
    async fn best_server(
        &self,
        servers: Vec<ServerEntry>,
    ) -> Result<(ServerEntry, f64), ProbeError> {
        let mut best: Option<(ServerEntry, f64)> = None;

        for server in servers.into_iter().take(self.max_servers) {
            match self.latency_ms(&server).await {
                Ok(ms) => {
                    tracing::debug!(server = %server.label(), ms, "server latency");
                    let better = match &best {
                        Some((_, best_ms)) => ms < *best_ms,
                        None => true,
                    };
                    if better {
                        best = Some((server, ms));
                    }
                }
                Err(err) => tracing::debug!(server = %server.label(), %err, "server skipped"),
            }
        }

        best.ok_or(ProbeError::NoServer)
    }

    async fn latency_ms(&self, server: &ServerEntry) -> Result<f64, ProbeError> {
        let url = format!("{}/latency.txt", server.base_url());
        let mut total = 0.0;
        for _ in 0..LATENCY_SAMPLES {
            let start = Instant::now();
            let response = self.http.get(&url).send().await?;
            check_status(&url, &response)?;
            response.bytes().await?;
            total += start.elapsed().as_secs_f64() * 1000.0;
        }
        Ok(total / LATENCY_SAMPLES as f64)
    }

    async fn download(&self, server: &ServerEntry) -> Result<f64, ProbeError> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for size in DOWNLOAD_SIZES {
            let http = self.http.clone();
            let url = format!("{}/random{size}x{size}.jpg", server.base_url());
            tasks.spawn(async move { read_body(&http, &url).await });
        }

        let bytes = join_byte_counts(tasks).await?;
        Ok(bits_per_sec(bytes, start.elapsed()))
    }

    async fn upload(&self, server: &ServerEntry) -> Result<f64, ProbeError> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for size in UPLOAD_SIZES {
            let http = self.http.clone();
            let url = server.url.clone();
            tasks.spawn(async move { send_body(&http, &url, size as usize).await });
        }

        let bytes = join_byte_counts(tasks).await?;
        Ok(bits_per_sec(bytes, start.elapsed()))
    }
}

/// Run the network probe, bounded by `timeout` overall
pub async fn measure_network(
    client: Capability<SpeedtestClient>,
    timeout: Duration,
) -> NetworkResult {
    let client = match client {
        Capability::Available(client) => client,
        Capability::Unavailable(reason) => return ProbeOutcome::failed(reason),
    };

    match tokio::time::timeout(timeout, client.run()).await {
        Ok(result) => result.into(),
        Err(_) => ProbeOutcome::failed(ProbeError::Timeout(timeout.as_secs()).to_string()),
    }
}

fn check_status(url: &str, response: &reqwest::Response) -> Result<(), ProbeError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

async fn read_body(http: &Client, url: &str) -> Result<u64, ProbeError> {
    let mut response = http.get(url).send().await?;
    check_status(url, &response)?;
    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await? {
        bytes += chunk.len() as u64;
    }
    Ok(bytes)
}

async fn send_body(http: &Client, url: &str, size: usize) -> Result<u64, ProbeError> {
    let body = upload_body(size);
    let len = body.len() as u64;
    let response = http.post(url).body(body).send().await?;
    check_status(url, &response)?;
    response.bytes().await?;
    Ok(len)
}

async fn join_byte_counts(
    mut tasks: JoinSet<Result<u64, ProbeError>>,
) -> Result<u64, ProbeError> {
    let mut total = 0u64;
    while let Some(joined) = tasks.join_next().await {
        let bytes = joined.map_err(|err| ProbeError::Runtime(err.to_string()))??;
        total += bytes;
    }
    Ok(total)
}

fn upload_body(size: usize) -> String {
    const PREFIX: &str = "content1=";
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut body = String::with_capacity(size.max(PREFIX.len()));
    body.push_str(PREFIX);
    body.extend(
        ALPHABET
            .iter()
            .cycle()
            .take(size.saturating_sub(PREFIX.len()))
            .map(|&b| b as char),
    );
    body
}

fn bits_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    (bytes * 8) as f64 / elapsed.as_secs_f64().max(1e-9)
}
