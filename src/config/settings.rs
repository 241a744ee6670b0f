// Configuration structs

use super::constants::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings file: one table per server role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub node: ServiceConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Configuration of a node's request service.
///
/// Loaded once at startup and shared read-only; nothing mutates it after
/// the server starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Key issued by the directory administrator
    pub api_key: String,
    /// Human-readable service name shown by `/discover`
    pub name: String,
    pub modality: String,
    pub anatomy: String,
    pub task: String,
    pub description: String,
    /// Interface to bind (e.g. "0.0.0.0")
    pub bind_host: String,
    pub port: u16,
    /// Externally reachable base URL (e.g. "https://node.example:9000").
    /// When absent the address is looked up via `public_ip_url`.
    pub public_url: Option<String>,
    pub public_ip_url: String,
    /// Base URL of the directory service (without "/announce")
    pub directory_url: Option<String>,
    /// Periodically announce this node to `directory_url`
    pub announce: bool,
    pub announce_interval_secs: u64,
    /// Return a job token from `/predict` instead of waiting for the result
    pub delayed: bool,
    /// In delayed mode, run at most one job pipeline at a time
    pub exclusive_jobs: bool,
    /// Inference calls allowed to run concurrently (1 = one GPU)
    pub inference_slots: usize,
    pub max_body_mb: usize,
    /// Parent directory for per-request scratch space (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            name: String::new(),
            modality: String::new(),
            anatomy: String::new(),
            task: String::new(),
            description: String::new(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_NODE_PORT,
            public_url: None,
            public_ip_url: DEFAULT_PUBLIC_IP_URL.to_string(),
            directory_url: None,
            announce: false,
            announce_interval_secs: DEFAULT_ANNOUNCE_INTERVAL_SECS,
            delayed: false,
            exclusive_jobs: true,
            inference_slots: 1,
            max_body_mb: DEFAULT_MAX_BODY_MB,
            scratch_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inference_slots == 0 {
            anyhow::bail!("inference_slots must be at least 1");
        }
        if self.announce {
            if self.api_key.trim().is_empty() {
                anyhow::bail!(
                    "Announcement enabled but no api_key configured.\n\
                     Ask the directory administrator for a key and set [node] api_key"
                );
            }
            match self.directory_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => anyhow::bail!(
                    "Invalid directory_url '{}': expected an http(s) URL",
                    url
                ),
                None => anyhow::bail!("Announcement enabled but no directory_url configured"),
            }
            if self.announce_interval_secs == 0 {
                anyhow::bail!("announce_interval_secs must be at least 1");
            }
        }
        Ok(())
    }
}

/// Configuration of the directory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub bind_host: String,
    pub port: u16,
    /// JSON file holding the recognised API keys
    pub key_store: PathBuf,
    pub ttl_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_DIRECTORY_PORT,
            key_store: default_key_store_path(),
            ttl_secs: DEFAULT_REGISTRY_TTL_SECS,
        }
    }
}

impl DirectoryConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// `~/.perch/api_keys.json`, or `./api_keys.json` when there is no home directory.
pub fn default_key_store_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".perch").join("api_keys.json"))
        .unwrap_or_else(|| PathBuf::from("api_keys.json"))
}
