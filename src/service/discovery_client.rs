// Directory discovery client
//
// Lists the services a directory knows about and fetches their input
// interfaces, for tools that want to browse what is available.

use crate::directory::DiscoveredService;
use crate::interface::InputInterface;
use crate::service::announcer::join_url;
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

/// Services grouped by modality, then anatomy, then task.
pub type Catalog = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<DiscoveredService>>>>;

pub struct DirectoryClient {
    base_url: String,
    http: Client,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn discover(&self) -> Result<Vec<DiscoveredService>> {
        let url = join_url(&self.base_url, "discover");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach directory at {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Directory error {}: {}", status, body);
        }

        resp.json::<Vec<DiscoveredService>>()
            .await
            .context("Failed to parse discovery listing")
    }

    pub async fn catalog(&self) -> Result<Catalog> {
        Ok(build_catalog(self.discover().await?))
    }

    /// Fetch the input interface a node publishes at `interface_url`.
    pub async fn fetch_interface(&self, interface_url: &str) -> Result<InputInterface> {
        let resp = self
            .http
            .get(interface_url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", interface_url))?;

        if !resp.status().is_success() {
            anyhow::bail!("Interface request to {} returned {}", interface_url, resp.status());
        }

        resp.json::<InputInterface>()
            .await
            .context("Failed to parse input interface")
    }
}

pub fn build_catalog(services: Vec<DiscoveredService>) -> Catalog {
    let mut catalog = Catalog::new();
    for service in services {
        catalog
            .entry(service.modality.clone())
            .or_default()
            .entry(service.anatomy.clone())
            .or_default()
            .entry(service.task.clone())
            .or_default()
            .push(service);
    }
    catalog
}
