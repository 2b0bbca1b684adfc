//! Per-group exclusive locks
//!
//! Each [`GroupKey`] owns exactly one mutex for the lifetime of the process.
//! The mutex is created on first reference through an atomic get-or-create
//! on the [`DashMap`] entry, so concurrent first references converge on the
//! same instance and it is never replaced afterwards.
//!
//! Acquisition returns a [`GroupLease`]; the lock is held until the lease is
//! released or dropped, which covers every exit path of a cycle.

use crate::types::GroupKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock handle of one group
pub type GroupLock = Arc<Mutex<()>>;

/// Registry of group locks
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: DashMap<GroupKey, GroupLock>,
}

impl GroupLocks {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable lock handle of a group, created on first reference
    #[must_use]
    pub fn lock_for(&self, group: &GroupKey) -> GroupLock {
        if let Some(existing) = self.locks.get(group) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.locks
                .entry(group.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Wait until the group's lock is granted
    pub async fn acquire(&self, group: &GroupKey) -> GroupLease {
        let lock = self.lock_for(group);
        let guard = lock.lock_owned().await;
        tracing::trace!(group = %group, "group lock acquired");
        GroupLease {
            group: group.clone(),
            _guard: guard,
        }
    }

    /// Check if a group's lock is currently held
    #[must_use]
    pub fn is_locked(&self, group: &GroupKey) -> bool {
        self.locks
            .get(group)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of groups that have a lock
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no lock was created yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on a group's lock
#[derive(Debug)]
#[must_use = "the group lock is released as soon as the lease is dropped"]
pub struct GroupLease {
    group: GroupKey,
    _guard: OwnedMutexGuard<()>,
}

impl GroupLease {
    /// Group this lease belongs to
    #[inline]
    #[must_use]
    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    /// Release the lock
    #[inline]
    pub fn release(self) {
        tracing::trace!(group = %self.group, "group lock released");
    }
}
