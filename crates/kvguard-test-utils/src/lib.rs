//! Testing utilities for the KVGuard workspace
//!
//! Recording sinks, a store with injectable failures, a manual clock, and
//! fixture builders.

#![allow(missing_docs)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use kvguard_core::{
    AuditSink, BackingStore, Clock, Collaborators, ConfigPayload, CycleOrchestrator, GroupKey,
    GuardConfig, InMemoryStore, Incident, InvalidationSet, KnowledgeBase, PagingSink, PathWeights,
    SinkError, StoreEntry, StoreError,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Pager that keeps every incident it receives
#[derive(Debug, Default)]
pub struct RecordingPager {
    incidents: Mutex<Vec<Incident>>,
    fail: bool,
}

impl RecordingPager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pager that records the attempt and then reports an error
    pub fn failing() -> Self {
        Self {
            incidents: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.incidents.lock().len()
    }
}

#[async_trait]
impl PagingSink for RecordingPager {
    async fn raise_incident(&self, incident: &Incident) -> Result<(), SinkError> {
        self.incidents.lock().push(incident.clone());
        if self.fail {
            return Err(SinkError::Paging("pager unavailable".to_string()));
        }
        Ok(())
    }
}

/// Audit sink that keeps every record call
#[derive(Debug, Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<(GroupKey, InvalidationSet)>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(GroupKey, InvalidationSet)> {
        self.records.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(
        &self,
        group: &GroupKey,
        invalidations: &InvalidationSet,
    ) -> Result<(), SinkError> {
        self.records
            .lock()
            .push((group.clone(), invalidations.clone()));
        Ok(())
    }
}

/// In-memory store that fails reads or deletes on chosen paths
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing_reads: Mutex<BTreeSet<String>>,
    failing_deletes: Mutex<BTreeSet<String>>,
}

impl FlakyStore {
    pub fn with_entries(entries: impl IntoIterator<Item = StoreEntry>) -> Self {
        Self {
            inner: InMemoryStore::with_entries(entries),
            ..Self::default()
        }
    }

    pub fn fail_read(self, path: impl Into<String>) -> Self {
        self.failing_reads.lock().insert(path.into());
        self
    }

    pub fn fail_delete(self, path: impl Into<String>) -> Self {
        self.failing_deletes.lock().insert(path.into());
        self
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.contains(key).await
    }
}

#[async_trait]
impl BackingStore for FlakyStore {
    async fn get(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        if self.failing_reads.lock().contains(path) {
            return Err(StoreError::read(path, "injected read failure"));
        }
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if self.failing_deletes.lock().contains(path) {
            return Err(StoreError::delete(path, "injected delete failure"));
        }
        self.inner.delete(path).await
    }
}

/// Clock moved forward by hand
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock fixed at 2024-01-01 00:00:00 UTC
    pub fn epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Harness wiring an orchestrator to recording sinks and a manual clock
pub struct Harness {
    pub orchestrator: CycleOrchestrator,
    pub pager: Arc<RecordingPager>,
    pub audit: Arc<RecordingAudit>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self::with_pager(store, Arc::new(RecordingPager::new()))
    }

    pub fn with_pager(store: Arc<dyn BackingStore>, pager: Arc<RecordingPager>) -> Self {
        let config = GuardConfig::default();
        let clock = Arc::new(ManualClock::epoch());
        let knowledge = Arc::new(KnowledgeBase::with_clock(
            config.debounce_window(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let audit = Arc::new(RecordingAudit::new());
        let orchestrator = CycleOrchestrator::with_knowledge(
            &config,
            Collaborators {
                store,
                pager: Arc::clone(&pager) as Arc<dyn PagingSink>,
                audit: Arc::clone(&audit) as Arc<dyn AuditSink>,
            },
            knowledge,
        );
        Self {
            orchestrator,
            pager,
            audit,
            clock,
        }
    }
}

/// Build a payload from literal pairs
pub fn payload(pairs: &[(&str, &str)]) -> ConfigPayload {
    pairs
        .iter()
        .map(|(path, value)| ((*path).to_string(), (*value).to_string()))
        .collect()
}

/// Build path weights from literal pairs
pub fn weights(pairs: &[(&str, u32)]) -> PathWeights {
    pairs
        .iter()
        .map(|(path, weight)| ((*path).to_string(), *weight))
        .collect()
}

/// Encode a value the way the store holds it
pub fn encode(value: &str) -> String {
    STANDARD.encode(value)
}

/// Raw store entry with an encoded value
pub fn entry(key: &str, value: &str) -> StoreEntry {
    StoreEntry::new(key, encode(value))
}
