// Service registry
//
// Ordered list of announced services, one entry per API key. Writers
// replace by key or append; expired entries are hidden from readers and
// physically dropped on the next write.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::constants::SID_PREFIX_LEN;

/// What a node tells the directory about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub api_key: String,
    pub prediction_url: String,
    pub interface_url: String,
    pub name: String,
    pub modality: String,
    pub anatomy: String,
    pub task: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub announcement: Announcement,
    pub created_at: DateTime<Utc>,
}

impl RegistryEntry {
    fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.created_at
    }

    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::weeks(52 * 100));
        self.age(now) < ttl
    }

    /// Public view: full key blanked, short prefix exposed as `SID`.
    pub fn redacted(&self) -> DiscoveredService {
        let a = &self.announcement;
        DiscoveredService {
            sid: a.api_key.chars().take(SID_PREFIX_LEN).collect(),
            api_key: String::new(),
            prediction_url: a.prediction_url.clone(),
            interface_url: a.interface_url.clone(),
            name: a.name.clone(),
            modality: a.modality.clone(),
            anatomy: a.anatomy.clone(),
            task: a.task.clone(),
            description: a.description.clone(),
            created_at: self.created_at,
        }
    }
}

/// One row of a `/discover` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredService {
    #[serde(rename = "SID")]
    pub sid: String,
    #[serde(default)]
    pub api_key: String,
    pub prediction_url: String,
    pub interface_url: String,
    pub name: String,
    pub modality: String,
    pub anatomy: String,
    pub task: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `announcement.api_key`, pruning
    /// anything already expired at `now`.
    pub async fn upsert(&self, announcement: Announcement, now: DateTime<Utc>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.is_live(now, ttl));

        let entry = RegistryEntry {
            announcement,
            created_at: now,
        };
        match entries
            .iter_mut()
            .find(|e| e.announcement.api_key == entry.announcement.api_key)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Live entries in registry order.
    pub async fn live(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.is_live(now, ttl))
            .cloned()
            .collect()
    }

    /// Stored entries including expired ones not yet pruned.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
