//! External collaborators
//!
//! The engine talks to three systems it does not own:
//! - [`BackingStore`]: the key-value store holding raw configuration
//! - [`PagingSink`]: incident/paging service
//! - [`AuditSink`]: durable remediation ledger
//!
//! Paging and audit failures are logged and swallowed by the caller; store
//! delete failures are collected per key.

use crate::error::{SinkError, StoreError};
use crate::types::{GroupKey, InvalidationSet, STORE_SEPARATOR};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;

/// Raw entry returned by the backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Native key (slash-separated)
    #[serde(rename = "Key")]
    pub key: String,
    /// Opaquely encoded (base64) value
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl StoreEntry {
    /// Create entry
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Key-value store client
///
/// A path ending in `/` addresses a directory recursively; anything else
/// addresses a single key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read a key or directory
    async fn get(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError>;

    /// Delete a key or directory
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Incident urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Wake someone up
    High,
    /// Next business day
    Low,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::High => f.write_str("high"),
            Urgency::Low => f.write_str("low"),
        }
    }
}

/// Incident to raise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Urgency
    pub urgency: Urgency,
    /// Title
    pub title: String,
    /// Details
    pub body: String,
}

/// Paging service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PagingSink: Send + Sync {
    /// Raise an incident
    async fn raise_incident(&self, incident: &Incident) -> Result<(), SinkError>;
}

/// Remediation ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Upsert the group's ledger row with `invalidations`
    async fn record(&self, group: &GroupKey, invalidations: &InvalidationSet)
        -> Result<(), SinkError>;
}

/// In-process store with native directory semantics
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with raw entries
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = StoreEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().map(|e| (e.key, e.value)).collect()),
        }
    }

    /// Insert a raw entry
    pub async fn put(&self, entry: StoreEntry) {
        self.entries.write().await.insert(entry.key, entry.value);
    }

    /// Check if a key exists
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Number of keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn is_directory(path: &str) -> bool {
    path.ends_with(STORE_SEPARATOR)
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let entries = self.entries.read().await;
        let found = if is_directory(path) {
            entries
                .range(path.to_string()..)
                .take_while(|(key, _)| key.starts_with(path))
                .map(|(key, value)| StoreEntry::new(key.clone(), value.clone()))
                .collect()
        } else {
            entries
                .get(path)
                .map(|value| vec![StoreEntry::new(path, value.clone())])
                .unwrap_or_default()
        };
        Ok(found)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if is_directory(path) {
            entries.retain(|key, _| !key.starts_with(path));
        } else {
            entries.remove(path);
        }
        Ok(())
    }
}

/// Pager that only emits the incident to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPager;

#[async_trait]
impl PagingSink for LogPager {
    async fn raise_incident(&self, incident: &Incident) -> Result<(), SinkError> {
        tracing::warn!(
            urgency = %incident.urgency,
            title = %incident.title,
            body = %incident.body,
            "incident raised"
        );
        Ok(())
    }
}
