//! Knowledge base for alert debounce
//!
//! Remembers, per `(group, mode)`, the last invalidation set that was acted
//! on and when. Created once per process and shared by every cycle; losing
//! it on restart only costs a repeated page.
//!
//! Entries live in a [`DashMap`], so different groups never contend and a
//! write to one entry excludes only readers of that entry.

use crate::types::{AdaptationMode, GroupKey, InvalidationSet};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time
pub trait Clock: Debug + Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Debounce entry key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    /// Group identity
    pub group: GroupKey,
    /// Mode the record belongs to
    pub mode: AdaptationMode,
}

/// Last alerted set and when it was recorded
#[derive(Debug, Clone, PartialEq)]
pub struct DebounceRecord {
    /// Snapshot of the recorded set
    pub invalidations: InvalidationSet,
    /// Recording time
    pub last_seen: DateTime<Utc>,
}

/// Process-lifetime debounce store
#[derive(Debug)]
pub struct KnowledgeBase {
    records: DashMap<DebounceKey, DebounceRecord>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl KnowledgeBase {
    /// Create knowledge base on the wall clock
    #[inline]
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Create knowledge base on a custom clock
    #[inline]
    #[must_use]
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            window,
            clock,
        }
    }

    /// Decide whether paging about `invalidations` should be skipped
    ///
    /// Suppressed when the set is empty, or when it equals the last recorded
    /// set for `(group, mode)` and that record is younger than the window.
    #[must_use]
    pub fn should_suppress_paging(
        &self,
        group: &GroupKey,
        mode: AdaptationMode,
        invalidations: &InvalidationSet,
    ) -> bool {
        if invalidations.is_empty() {
            return true;
        }

        let key = DebounceKey {
            group: group.clone(),
            mode,
        };
        let Some(record) = self.records.get(&key) else {
            return false;
        };
        if record.invalidations != *invalidations {
            return false;
        }

        let age = self.clock.now().signed_duration_since(record.last_seen);
        // a record from the future (clock skew) counts as fresh
        age.to_std().map_or(true, |age| age < self.window)
    }

    /// Overwrite the record for `(group, mode)` with `invalidations` and now
    pub fn record_invalidations(
        &self,
        group: &GroupKey,
        mode: AdaptationMode,
        invalidations: InvalidationSet,
    ) {
        let record = DebounceRecord {
            invalidations,
            last_seen: self.clock.now(),
        };
        self.records.insert(
            DebounceKey {
                group: group.clone(),
                mode,
            },
            record,
        );
    }

    /// Last record for `(group, mode)`
    #[must_use]
    pub fn last_record(&self, group: &GroupKey, mode: AdaptationMode) -> Option<DebounceRecord> {
        self.records
            .get(&DebounceKey {
                group: group.clone(),
                mode,
            })
            .map(|r| r.value().clone())
    }

    /// Number of `(group, mode)` records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing has been recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Debounce window
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}
