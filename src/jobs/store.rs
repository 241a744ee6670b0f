// Job store for delayed-mode results
//
// Written by detached workers, read by `/responses` pollers. A finished
// record is handed out at most once: the first successful poll removes it.
// Records are never expired; an unpolled result stays until the process
// exits.

use crate::interface::ResponseItem;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque 128-bit job handle, rendered as 32 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobToken(Uuid);

impl JobToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for JobToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Done(Vec<ResponseItem>),
    /// The worker died before producing a result
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub token: JobToken,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(token: JobToken) -> Self {
        Self {
            token,
            status: JobStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, JobStatus::Pending)
    }

    /// Items returned to the poller for a finished record.
    pub fn into_items(self) -> Vec<ResponseItem> {
        match self.status {
            JobStatus::Done(items) => items,
            JobStatus::Failed(reason) => vec![ResponseItem::error(format!(
                "The request {} failed: {}",
                self.token, reason
            ))],
            JobStatus::Pending => vec![ResponseItem::delayed(self.token.to_string())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found")]
    NotFound,
    #[error("job still pending")]
    Pending,
}

/// Thread-safe job table; clones share the same map.
#[derive(Clone, Default)]
pub struct JobStore {
    records: Arc<DashMap<JobToken, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token and record it as pending.
    pub fn mint(&self) -> JobToken {
        loop {
            let token = JobToken::generate();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.records.entry(token) {
                slot.insert(JobRecord::pending(token));
                return token;
            }
        }
    }

    pub fn put(&self, token: JobToken, record: JobRecord) {
        self.records.insert(token, record);
    }

    /// Store the finished result of a job.
    pub fn complete(&self, token: JobToken, items: Vec<ResponseItem>) {
        self.finish(token, JobStatus::Done(items));
    }

    /// Record that the job's worker died without a result.
    pub fn fail(&self, token: JobToken, reason: impl Into<String>) {
        self.finish(token, JobStatus::Failed(reason.into()));
    }

    fn finish(&self, token: JobToken, status: JobStatus) {
        let created_at = self
            .records
            .get(&token)
            .map(|r| r.created_at)
            .unwrap_or_else(Utc::now);
        self.put(
            token,
            JobRecord {
                token,
                status,
                created_at,
            },
        );
    }

    /// Atomically take a finished record.
    ///
    /// Of several concurrent pollers for the same finished token exactly one
    /// receives the record; the rest see `NotFound`.
    pub fn get_and_clear(&self, token: &JobToken) -> Result<JobRecord, JobStoreError> {
        if let Some((_, record)) = self.records.remove_if(token, |_, r| !r.is_pending()) {
            return Ok(record);
        }
        if self.records.contains_key(token) {
            Err(JobStoreError::Pending)
        } else {
            Err(JobStoreError::NotFound)
        }
    }

    pub fn contains(&self, token: &JobToken) -> bool {
        self.records.contains_key(token)
    }

    /// Records held, pending or finished.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }
}
