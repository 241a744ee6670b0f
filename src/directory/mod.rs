// Directory service
//
// Accepts announcements from nodes, checks their API keys, keeps one entry
// per key, and answers public discovery queries with redacted entries.

mod handlers;
pub mod keys;
mod registry;

pub use handlers::create_router;
pub use keys::{generate_api_key, ApiKeyStore, FileKeyStore, KeyStoreError, MemoryKeyStore};
pub use registry::{Announcement, DiscoveredService, Registry, RegistryEntry};

use crate::config::constants::DEFAULT_REGISTRY_TTL_SECS;
use crate::config::DirectoryConfig;
use crate::server::middleware;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Fields an announcement must carry, in the order they are reported.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "api_key",
    "prediction_url",
    "interface_url",
    "name",
    "modality",
    "anatomy",
    "task",
    "description",
];

const UNRECOGNIZED_KEY: &str =
    "Your API key has not been recognized. Contact the administrator of the directory service ";

/// Reply to `/announce`: `status` counts the problems found, `error`
/// concatenates their descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceReply {
    pub status: u32,
    pub error: String,
}

impl AnnounceReply {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    fn push(&mut self, message: &str) {
        self.status += 1;
        self.error.push_str(message);
    }
}

pub struct Directory {
    registry: Registry,
    keys: Arc<dyn ApiKeyStore>,
    ttl: Duration,
}

impl Directory {
    pub fn new(keys: Arc<dyn ApiKeyStore>) -> Self {
        Self {
            registry: Registry::new(),
            keys,
            ttl: Duration::from_secs(DEFAULT_REGISTRY_TTL_SECS),
        }
    }

    /// Directory backed by the key file named in `config`.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(Arc::new(FileKeyStore::new(&config.key_store))).with_ttl(config.ttl())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Validate and record an announcement received as raw bytes.
    pub async fn announce_bytes(&self, body: &[u8]) -> AnnounceReply {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(msg) => self.announce(&msg).await,
            Err(e) => {
                tracing::warn!("Rejected announcement with malformed JSON: {}", e);
                AnnounceReply {
                    status: 1,
                    error: "Malformed announcement: the body is not valid JSON ".to_string(),
                }
            }
        }
    }

    pub async fn announce(&self, msg: &serde_json::Value) -> AnnounceReply {
        self.announce_at(msg, Utc::now()).await
    }

    /// `announce` with an explicit clock, for expiry tests.
    pub async fn announce_at(&self, msg: &serde_json::Value, now: DateTime<Utc>) -> AnnounceReply {
        let mut reply = AnnounceReply::default();
        for field in REQUIRED_FIELDS {
            if !msg.get(field).map(|v| v.is_string()).unwrap_or(false) {
                reply.push(&format!("No {} specified ", field));
            }
        }
        if !reply.is_ok() {
            tracing::info!(
                status = reply.status,
                "Rejected incomplete announcement: {}",
                reply.error
            );
            return reply;
        }

        let announcement: Announcement = match serde_json::from_value(msg.clone()) {
            Ok(a) => a,
            Err(e) => {
                reply.push(&format!("Malformed announcement: {} ", e));
                return reply;
            }
        };

        if !self.key_known(&announcement.api_key).await {
            reply.push(UNRECOGNIZED_KEY);
            tracing::warn!(name = %announcement.name, "Rejected announcement with unknown API key");
            return reply;
        }

        tracing::info!(
            name = %announcement.name,
            prediction_url = %announcement.prediction_url,
            "Registered service"
        );
        self.registry.upsert(announcement, now, self.ttl).await;
        reply
    }

    /// Key lookups may touch the file system, so they run off the async
    /// workers. A store that cannot be read recognizes nothing.
    async fn key_known(&self, key: &str) -> bool {
        let keys = Arc::clone(&self.keys);
        let key = key.to_string();
        match tokio::task::spawn_blocking(move || keys.contains(&key)).await {
            Ok(Ok(known)) => known,
            Ok(Err(e)) => {
                tracing::error!("API key store unavailable: {}", e);
                false
            }
            Err(e) => {
                tracing::error!("API key lookup panicked: {}", e);
                false
            }
        }
    }

    pub async fn discover(&self) -> Vec<DiscoveredService> {
        self.discover_at(Utc::now()).await
    }

    pub async fn discover_at(&self, now: DateTime<Utc>) -> Vec<DiscoveredService> {
        self.registry
            .live(now, self.ttl)
            .await
            .iter()
            .map(RegistryEntry::redacted)
            .collect()
    }

    pub async fn serve(self, config: &DirectoryConfig) -> Result<()> {
        let addr: SocketAddr = config
            .bind_address()
            .parse()
            .with_context(|| format!("Invalid bind address: {}", config.bind_address()))?;

        let app = create_router(Arc::new(self)).layer(TraceLayer::new_for_http());

        tracing::info!("Starting directory service on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(middleware::shutdown_signal())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directory() -> Directory {
        Directory::new(Arc::new(MemoryKeyStore::with_keys(["K"])))
    }

    fn message(key: &str) -> serde_json::Value {
        json!({
            "api_key": key,
            "prediction_url": "http://a/predict",
            "interface_url": "http://a/interface",
            "name": "N",
            "modality": "MRI",
            "anatomy": "Brain",
            "task": "Seg",
            "description": "D",
        })
    }

    #[tokio::test]
    async fn test_announce_valid() {
        let dir = directory();
        let reply = dir.announce(&message("K")).await;
        assert_eq!(reply, AnnounceReply::default());
        assert_eq!(dir.discover().await.len(), 1);
    }

    #[tokio::test]
    async fn test_every_missing_field_counted() {
        let dir = directory();
        let reply = dir.announce(&json!({ "api_key": "K", "name": 7 })).await;
        assert_eq!(reply.status, 7);
        assert!(reply.error.starts_with("No prediction_url specified "));
        assert!(reply.error.contains("No name specified "), "non-string counts as missing");
        assert!(!reply.error.contains("api_key"));
        assert!(dir.discover().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let dir = directory();
        let reply = dir.announce(&message("nope")).await;
        assert_eq!(reply.status, 1);
        assert_eq!(reply.error, UNRECOGNIZED_KEY);
        assert!(dir.discover().await.is_empty());
    }

    #[tokio::test]
    async fn test_key_not_checked_when_incomplete() {
        let dir = directory();
        let mut msg = message("nope");
        msg.as_object_mut().unwrap().remove("task");
        let reply = dir.announce(&msg).await;
        assert_eq!(reply.status, 1);
        assert_eq!(reply.error, "No task specified ");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let reply = directory().announce_bytes(b"{ nope").await;
        assert_eq!(reply.status, 1);
        assert!(!reply.error.is_empty());
    }

    #[tokio::test]
    async fn test_non_object_body() {
        let reply = directory().announce_bytes(b"[1, 2]").await;
        assert_eq!(reply.status, REQUIRED_FIELDS.len() as u32);
    }
}
