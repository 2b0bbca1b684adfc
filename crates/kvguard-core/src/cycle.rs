//! Adaptation cycle orchestrator
//!
//! Entry point of the engine. One cycle for one group:
//!
//! ```text
//! acquire group lock
//!   -> scan -> decide -> debounce -> remediate (-> record)
//! release group lock
//! ```
//!
//! The lease is dropped on every exit path, so a failed read never leaves a
//! group locked. Cycles of different groups run fully in parallel.

use crate::config::{GroupSpec, GuardConfig};
use crate::decision::{decide, Decision};
use crate::error::GuardError;
use crate::knowledge::KnowledgeBase;
use crate::lock::GroupLocks;
use crate::payload::fetch_group_payload;
use crate::remediation::{RemediationContext, Remediator};
use crate::scanner::Scanner;
use crate::sinks::{AuditSink, BackingStore, PagingSink};
use crate::types::{
    AdaptationMode, ConfigPayload, GroupKey, InvalidationSet, ObservedStatus, PathWeights,
    PolicySpec,
};
use serde::Serialize;
use std::sync::Arc;

/// Result of one cycle, consumed by the driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    /// Group the cycle ran for
    pub group: GroupKey,
    /// Payload safe to publish; empty means the artifact should be removed
    pub sanitized: ConfigPayload,
    /// Status to persist
    pub status: ObservedStatus,
    /// Entries flagged by the scanner
    pub invalidations: InvalidationSet,
    /// Flagged entries that could not be purged
    pub failed_deletions: InvalidationSet,
    /// Whether an incident was raised
    pub paged: bool,
}

/// External systems the engine drives
#[derive(Clone)]
pub struct Collaborators {
    /// Raw configuration source
    pub store: Arc<dyn BackingStore>,
    /// Paging service
    pub pager: Arc<dyn PagingSink>,
    /// Remediation ledger
    pub audit: Arc<dyn AuditSink>,
}

/// Runs adaptation cycles
pub struct CycleOrchestrator {
    locks: Arc<GroupLocks>,
    scanner: Scanner,
    knowledge: Arc<KnowledgeBase>,
    remediator: Remediator,
    store: Arc<dyn BackingStore>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for CycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleOrchestrator")
            .field("locks", &self.locks)
            .field("scanner", &self.scanner)
            .field("remediator", &self.remediator)
            .finish_non_exhaustive()
    }
}

impl CycleOrchestrator {
    /// Create orchestrator with its own knowledge base on the wall clock
    #[must_use]
    pub fn new(config: &GuardConfig, collaborators: Collaborators) -> Self {
        let knowledge = Arc::new(KnowledgeBase::new(config.debounce_window()));
        Self::with_knowledge(config, collaborators, knowledge)
    }

    /// Create orchestrator sharing an existing knowledge base
    #[must_use]
    pub fn with_knowledge(
        config: &GuardConfig,
        collaborators: Collaborators,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        let remediator = Remediator::new(
            Arc::clone(&collaborators.store),
            collaborators.pager,
            collaborators.audit,
            Arc::clone(&knowledge),
        )
        .with_incident_title(config.incident_title.clone());

        Self {
            locks: Arc::new(GroupLocks::new()),
            scanner: Scanner::new(config.pattern_cache_capacity),
            knowledge,
            remediator,
            store: collaborators.store,
        }
    }

    /// Run one cycle on a payload the driver already fetched
    pub async fn run(
        &self,
        group: &GroupKey,
        payload: ConfigPayload,
        policy: &PolicySpec,
        weights: &PathWeights,
    ) -> CycleOutcome {
        let lease = self.locks.acquire(group).await;
        let outcome = self.adapt(group, payload, policy, weights).await;
        lease.release();
        outcome
    }

    /// Fetch a group's payload and run one cycle on it
    ///
    /// # Errors
    /// Returns the read or decode error; no remediation has happened then.
    pub async fn run_group(&self, spec: &GroupSpec) -> Result<CycleOutcome, GuardError> {
        let group = spec.key();
        let lease = self.locks.acquire(&group).await;

        let (payload, weights) = match fetch_group_payload(self.store.as_ref(), spec).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!(group = %group, error = %e, "cycle aborted");
                return Err(e);
            }
        };
        let outcome = self.adapt(&group, payload, &spec.policy(), &weights).await;

        lease.release();
        Ok(outcome)
    }

    async fn adapt(
        &self,
        group: &GroupKey,
        payload: ConfigPayload,
        policy: &PolicySpec,
        weights: &PathWeights,
    ) -> CycleOutcome {
        let invalidations = self.scanner.scan(&payload, policy);
        let Decision {
            score,
            mode,
            page_hint,
        } = decide(&invalidations, weights);

        tracing::info!(
            group = %group,
            flagged = invalidations.len(),
            score = %score,
            mode = %mode,
            "adaptation cycle"
        );

        let mut page_hint = page_hint;
        if mode != AdaptationMode::NonAdaptive
            && self
                .knowledge
                .should_suppress_paging(group, mode, &invalidations)
        {
            tracing::debug!(group = %group, mode = %mode, "paging debounced");
            page_hint = false;
        }

        let ctx = RemediationContext {
            group,
            qos: policy.qos,
            invalidations: &invalidations,
            page_hint,
        };
        let report = self.remediator.remediate(mode, ctx, payload).await;

        CycleOutcome {
            group: group.clone(),
            sanitized: report.sanitized,
            status: ObservedStatus {
                utility_value: score,
                adaptation_mode: mode,
            },
            invalidations,
            failed_deletions: report.failed_deletions,
            paged: report.paged,
        }
    }

    /// Shared knowledge base
    #[inline]
    #[must_use]
    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Group lock registry
    #[inline]
    #[must_use]
    pub fn locks(&self) -> &GroupLocks {
        &self.locks
    }
}
