//! Audit ledger
//!
//! A tabular ledger with one row per group, under the columns
//! `KVGroup, Time, Details, Link`. Every remediation event loads the whole
//! ledger, replaces the group's row (moving it last) and stores the ledger
//! again. On disk it is a CSV sheet with a header row, or a JSON array.

use crate::error::SinkError;
use crate::knowledge::{Clock, SystemClock};
use crate::sinks::AuditSink;
use crate::types::{GroupKey, InvalidationSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Timestamp layout of ledger rows
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One ledger row
///
/// Columns are matched by header name, so a sheet with reordered or
/// missing columns still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerRow {
    /// Group identity (`namespace/name`)
    #[serde(rename = "KVGroup")]
    pub group_key: String,
    /// Time of the last remediation event
    #[serde(rename = "Time")]
    pub timestamp: String,
    /// Invalidations, one JSON object per line
    #[serde(rename = "Details")]
    pub details: String,
    /// Where to follow up
    #[serde(rename = "Link")]
    pub reference_link: String,
}

/// Whole ledger, ordered oldest update first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLedger {
    rows: Vec<LedgerRow>,
}

impl AuditLedger {
    /// Create empty ledger
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the row of `row.group_key`, appending it last
    pub fn upsert(&mut self, row: LedgerRow) {
        self.rows.retain(|r| r.group_key != row.group_key);
        self.rows.push(row);
    }

    /// Row of a group
    #[must_use]
    pub fn row(&self, group_key: &str) -> Option<&LedgerRow> {
        self.rows.iter().find(|r| r.group_key == group_key)
    }

    /// All rows
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the ledger has no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Durable location of the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the whole ledger
    async fn load(&self) -> Result<AuditLedger, SinkError>;

    /// Replace the whole ledger
    async fn save(&self, ledger: &AuditLedger) -> Result<(), SinkError>;
}

/// Ledger kept in memory
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: Mutex<AuditLedger>,
}

impl MemoryLedgerStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current ledger
    pub async fn snapshot(&self) -> AuditLedger {
        self.ledger.lock().await.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<AuditLedger, SinkError> {
        Ok(self.ledger.lock().await.clone())
    }

    async fn save(&self, ledger: &AuditLedger) -> Result<(), SinkError> {
        *self.ledger.lock().await = ledger.clone();
        Ok(())
    }
}

/// Ledger persisted as a JSON file
///
/// A missing file reads as an empty ledger.
#[derive(Debug, Clone)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    /// Create store at path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn load(&self) -> Result<AuditLedger, SinkError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(AuditLedger::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SinkError::LedgerLoad(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AuditLedger::new()),
            Err(e) => Err(SinkError::LedgerLoad(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, ledger: &AuditLedger) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(ledger)
            .map_err(|e| SinkError::LedgerSave(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| SinkError::LedgerSave(format!("{}: {e}", self.path.display())))
    }
}

/// Ledger persisted as a CSV sheet with a `KVGroup,Time,Details,Link` header
///
/// A missing or empty file reads as an empty ledger.
#[derive(Debug, Clone)]
pub struct CsvFileLedgerStore {
    path: PathBuf,
}

impl CsvFileLedgerStore {
    /// Create store at path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_error(&self, e: impl std::fmt::Display) -> SinkError {
        SinkError::LedgerLoad(format!("{}: {e}", self.path.display()))
    }

    fn save_error(&self, e: impl std::fmt::Display) -> SinkError {
        SinkError::LedgerSave(format!("{}: {e}", self.path.display()))
    }
}

#[async_trait]
impl LedgerStore for CsvFileLedgerStore {
    async fn load(&self) -> Result<AuditLedger, SinkError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AuditLedger::new()),
            Err(e) => return Err(self.load_error(e)),
        };

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut ledger = AuditLedger::new();
        for row in reader.deserialize::<LedgerRow>() {
            ledger.upsert(row.map_err(|e| self.load_error(e))?);
        }
        Ok(ledger)
    }

    async fn save(&self, ledger: &AuditLedger) -> Result<(), SinkError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if ledger.is_empty() {
            writer
                .write_record(["KVGroup", "Time", "Details", "Link"])
                .map_err(|e| self.save_error(e))?;
        }
        for row in ledger.rows() {
            writer.serialize(row).map_err(|e| self.save_error(e))?;
        }
        let bytes = writer.into_inner().map_err(|e| self.save_error(e))?;

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.save_error(e))
    }
}

/// [`AuditSink`] doing read-modify-write on a [`LedgerStore`]
#[derive(Debug)]
pub struct LedgerAuditSink<S> {
    store: S,
    reference_link: String,
    clock: Arc<dyn Clock>,
    // serializes read-modify-write between concurrent group cycles
    write_guard: Mutex<()>,
}

impl<S: LedgerStore> LedgerAuditSink<S> {
    /// Create sink writing `reference_link` into every row
    #[inline]
    #[must_use]
    pub fn new(store: S, reference_link: impl Into<String>) -> Self {
        Self {
            store,
            reference_link: reference_link.into(),
            clock: Arc::new(SystemClock),
            write_guard: Mutex::new(()),
        }
    }

    /// With custom clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: LedgerStore> AuditSink for LedgerAuditSink<S> {
    async fn record(
        &self,
        group: &GroupKey,
        invalidations: &InvalidationSet,
    ) -> Result<(), SinkError> {
        let _guard = self.write_guard.lock().await;

        let mut ledger = self.store.load().await?;
        ledger.upsert(LedgerRow {
            group_key: group.to_string(),
            timestamp: self.clock.now().format(TIMESTAMP_FORMAT).to_string(),
            reference_link: self.reference_link.clone(),
            details: invalidations.to_string(),
        });
        self.store.save(&ledger).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Invalidation;

    fn row(group: &str, details: &str) -> LedgerRow {
        LedgerRow {
            group_key: group.to_string(),
            timestamp: "2024-01-01 00:00:00".to_string(),
            reference_link: String::new(),
            details: details.to_string(),
        }
    }

    #[test]
    fn upsert_replaces_and_moves_last() {
        let mut ledger = AuditLedger::new();
        ledger.upsert(row("ns/a", "first"));
        ledger.upsert(row("ns/b", "other"));
        ledger.upsert(row("ns/a", "second"));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.rows()[1].group_key, "ns/a");
        assert_eq!(ledger.row("ns/a").unwrap().details, "second");
    }

    #[tokio::test]
    async fn sink_upserts_one_row_per_group() {
        let sink = LedgerAuditSink::new(MemoryLedgerStore::new(), "https://pager/incidents");
        let group = GroupKey::new("ns", "app");
        let set: InvalidationSet = vec![Invalidation::new("a", "x@y.com", "email")].into();

        sink.record(&group, &set).await.unwrap();
        sink.record(&group, &set).await.unwrap();

        let ledger = sink.store().snapshot().await;
        assert_eq!(ledger.len(), 1);
        let row = ledger.row("ns/app").unwrap();
        assert_eq!(row.reference_link, "https://pager/incidents");
        assert_eq!(row.details, set.to_string());
        assert_eq!(row.timestamp.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[tokio::test]
    async fn json_file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLedgerStore::new(dir.path().join("ledger.json"));

        assert!(store.load().await.unwrap().is_empty());

        let mut ledger = AuditLedger::new();
        ledger.upsert(row("ns/a", "details"));
        store.save(&ledger).await.unwrap();

        assert_eq!(store.load().await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn csv_file_store_writes_header_and_quotes_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let store = CsvFileLedgerStore::new(&path);

        assert!(store.load().await.unwrap().is_empty());

        let mut ledger = AuditLedger::new();
        ledger.upsert(row("ns/a", "{\"path\":\"a\"}\n{\"path\":\"b\"}"));
        ledger.upsert(row("ns/b", "x"));
        store.save(&ledger).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("KVGroup,Time,Details,Link\n"), "{text}");
        assert_eq!(store.load().await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn csv_columns_are_matched_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        std::fs::write(&path, "Link,KVGroup,Details\nhttps://x,ns/a,old\n").unwrap();
        let sink = LedgerAuditSink::new(CsvFileLedgerStore::new(&path), "https://y");

        let loaded = sink.store().load().await.unwrap();
        assert_eq!(loaded.row("ns/a").unwrap().reference_link, "https://x");
        assert_eq!(loaded.row("ns/a").unwrap().timestamp, "");

        sink.record(&GroupKey::new("ns", "b"), &InvalidationSet::new())
            .await
            .unwrap();
        let ledger = sink.store().load().await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.rows()[1].group_key, "ns/b");
    }

    #[tokio::test]
    async fn empty_csv_ledger_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let store = CsvFileLedgerStore::new(&path);

        store.save(&AuditLedger::new()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "KVGroup,Time,Details,Link\n"
        );
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_ledger_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileLedgerStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, SinkError::LedgerLoad(_)));
    }
}
