// Directory announcement client
//
// Periodically tells the configured directory where this node can be
// reached. Announcing is fire-and-forget: failures are logged and the next
// tick simply tries again.

use crate::config::constants::DEFAULT_ANNOUNCE_INTERVAL_SECS;
use crate::config::ServiceConfig;
use crate::directory::{AnnounceReply, Announcement};
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Join `base` and `path` with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub struct Announcer {
    config: Arc<ServiceConfig>,
    http: Client,
}

impl Announcer {
    pub fn new(config: Arc<ServiceConfig>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Base URL under which clients reach this node.
    ///
    /// Uses `public_url` when configured; otherwise asks `public_ip_url`
    /// for the address the outside world sees. An empty `public_ip_url`
    /// disables the lookup and announces the local hostname instead.
    pub async fn resolve_base_url(&self) -> Result<String> {
        if let Some(url) = self.config.public_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.trim_end_matches('/').to_string());
        }

        if self.config.public_ip_url.is_empty() {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .context("Failed to determine local hostname")?;
            return Ok(format!("http://{}:{}", host, self.config.port));
        }

        let resp = self
            .http
            .get(&self.config.public_ip_url)
            .send()
            .await
            .context("Failed to reach public IP lookup service")?;
        if !resp.status().is_success() {
            anyhow::bail!("Public IP lookup returned {}", resp.status());
        }
        let ip = resp
            .text()
            .await
            .context("Failed to read public IP lookup response")?;
        let ip = ip.trim();
        if ip.is_empty() {
            anyhow::bail!("Public IP lookup returned an empty body");
        }
        Ok(format!("http://{}:{}", ip, self.config.port))
    }

    /// The message sent to the directory for a node reachable at `base_url`.
    pub fn announcement(&self, base_url: &str) -> Announcement {
        let c = &self.config;
        Announcement {
            api_key: c.api_key.clone(),
            prediction_url: join_url(base_url, "predict"),
            interface_url: join_url(base_url, "interface"),
            name: c.name.clone(),
            modality: c.modality.clone(),
            anatomy: c.anatomy.clone(),
            task: c.task.clone(),
            description: c.description.clone(),
        }
    }

    /// Send one announcement and return the directory's verdict.
    pub async fn announce_once(&self) -> Result<AnnounceReply> {
        let directory = self
            .config
            .directory_url
            .as_deref()
            .context("No directory_url configured")?;
        let base_url = self.resolve_base_url().await?;
        let url = join_url(directory, "announce");

        let resp = self
            .http
            .post(&url)
            .json(&self.announcement(&base_url))
            .send()
            .await
            .with_context(|| format!("Failed to reach directory at {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Directory error {}: {}", status, body);
        }

        resp.json::<AnnounceReply>()
            .await
            .context("Failed to parse directory reply")
    }

    /// One tick of the timer: announce and log the outcome.
    async fn tick(&self) {
        match self.announce_once().await {
            Ok(reply) if reply.is_ok() => {
                tracing::info!("Announced to directory");
            }
            Ok(reply) => {
                tracing::warn!(
                    status = reply.status,
                    "Directory refused announcement: {}",
                    reply.error
                );
            }
            Err(e) => {
                tracing::error!("Announcement failed: {:#}", e);
            }
        }
    }

    /// Announce now and then every `interval` until the handle is stopped.
    /// A zero interval falls back to the default period.
    pub fn start(self, interval: Duration) -> AnnouncerHandle {
        let interval = if interval.is_zero() {
            tracing::warn!(
                "Announce interval of zero requested, using {}s",
                DEFAULT_ANNOUNCE_INTERVAL_SECS
            );
            Duration::from_secs(DEFAULT_ANNOUNCE_INTERVAL_SECS)
        } else {
            interval
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let announcer = Arc::new(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => announcer.tick().await,
                }
            }
            tracing::debug!("Announcer stopped");
        });

        AnnouncerHandle { cancel, task }
    }
}

/// Running announcement timer.
pub struct AnnouncerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AnnouncerHandle {
    /// Cancel the timer. An announcement already in flight is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop and wait for the task to wind down.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            api_key: "K".to_string(),
            name: "N".to_string(),
            modality: "MRI".to_string(),
            anatomy: "Brain".to_string(),
            task: "Seg".to_string(),
            description: "D".to_string(),
            port: 9100,
            public_url: Some("http://node.local:9100/".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://d:8001/", "announce"), "http://d:8001/announce");
        assert_eq!(join_url("http://d:8001", "/announce"), "http://d:8001/announce");
    }

    #[tokio::test]
    async fn test_configured_public_url_wins() {
        let announcer = Announcer::new(Arc::new(config())).unwrap();
        assert_eq!(announcer.resolve_base_url().await.unwrap(), "http://node.local:9100");
    }

    #[tokio::test]
    async fn test_hostname_when_lookup_disabled() {
        let announcer = Announcer::new(Arc::new(ServiceConfig {
            public_url: None,
            public_ip_url: String::new(),
            ..config()
        }))
        .unwrap();
        let url = announcer.resolve_base_url().await.unwrap();
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(":9100"));
    }

    #[test]
    fn test_announcement_fields() {
        let announcer = Announcer::new(Arc::new(config())).unwrap();
        let msg = announcer.announcement("http://1.2.3.4:9100");
        assert_eq!(msg.prediction_url, "http://1.2.3.4:9100/predict");
        assert_eq!(msg.interface_url, "http://1.2.3.4:9100/interface");
        assert_eq!(msg.api_key, "K");
        assert_eq!(msg.task, "Seg");
    }

    #[tokio::test]
    async fn test_zero_interval_keeps_timer_alive() {
        let handle = Announcer::new(Arc::new(config()))
            .unwrap()
            .start(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_running(), "timer task must not die on a zero period");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_announce_without_directory_errors() {
        let announcer = Announcer::new(Arc::new(config())).unwrap();
        let err = announcer.announce_once().await.unwrap_err();
        assert!(err.to_string().contains("directory_url"));
    }
}
