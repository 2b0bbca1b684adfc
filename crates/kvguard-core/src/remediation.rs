//! Remediation strategies
//!
//! - **non-adaptive**: payload returned as-is, no side effects.
//! - **self-healing**: every flagged key is deleted at the source; failures
//!   are collected, audited and may force a page.
//! - **self-protecting**: nothing is deleted; flagged keys are only withheld
//!   from the published payload.
//!
//! Both active strategies withhold every flagged path from the sanitized
//! payload and finish by writing the knowledge base record for their mode.

use crate::alerting::{alert_policy, healing_body, masking_body};
use crate::knowledge::KnowledgeBase;
use crate::sinks::{AuditSink, BackingStore, Incident, PagingSink, Urgency};
use crate::types::{
    to_store_path, AdaptationMode, ConfigPayload, GroupKey, InvalidationSet, QosTier,
};
use std::fmt;
use std::sync::Arc;

/// Inputs of one remediation
#[derive(Debug, Clone, Copy)]
pub struct RemediationContext<'a> {
    /// Group being remediated
    pub group: &'a GroupKey,
    /// Group severity
    pub qos: QosTier,
    /// Flagged entries
    pub invalidations: &'a InvalidationSet,
    /// Paging hint after debounce
    pub page_hint: bool,
}

/// Outcome of one remediation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemediationReport {
    /// Payload safe to publish
    pub sanitized: ConfigPayload,
    /// Whether an incident was raised
    pub paged: bool,
    /// Flagged entries the store refused to delete
    pub failed_deletions: InvalidationSet,
}

/// Executes the strategy selected for a cycle
pub struct Remediator {
    store: Arc<dyn BackingStore>,
    pager: Arc<dyn PagingSink>,
    audit: Arc<dyn AuditSink>,
    knowledge: Arc<KnowledgeBase>,
    incident_title: String,
}

impl fmt::Debug for Remediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remediator")
            .field("knowledge", &self.knowledge)
            .field("incident_title", &self.incident_title)
            .finish_non_exhaustive()
    }
}

impl Remediator {
    /// Create remediator
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore>,
        pager: Arc<dyn PagingSink>,
        audit: Arc<dyn AuditSink>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            store,
            pager,
            audit,
            knowledge,
            incident_title: crate::config::DEFAULT_INCIDENT_TITLE.to_string(),
        }
    }

    /// With incident title
    #[inline]
    #[must_use]
    pub fn with_incident_title(mut self, title: impl Into<String>) -> Self {
        self.incident_title = title.into();
        self
    }

    /// Run the strategy for `mode`
    pub async fn remediate(
        &self,
        mode: AdaptationMode,
        ctx: RemediationContext<'_>,
        payload: ConfigPayload,
    ) -> RemediationReport {
        match mode {
            AdaptationMode::NonAdaptive => RemediationReport {
                sanitized: payload,
                ..RemediationReport::default()
            },
            AdaptationMode::SelfHealing => self.self_heal(ctx, &payload).await,
            AdaptationMode::SelfProtecting => self.self_protect(ctx, &payload).await,
        }
    }

    /// Purge flagged keys at the source
    pub async fn self_heal(
        &self,
        ctx: RemediationContext<'_>,
        payload: &ConfigPayload,
    ) -> RemediationReport {
        let mut failed = InvalidationSet::new();
        for inv in ctx.invalidations {
            let path = to_store_path(&inv.path);
            if let Err(e) = self.store.delete(&path).await {
                tracing::warn!(
                    group = %ctx.group,
                    path = %path,
                    error = %e,
                    "failed to delete flagged key"
                );
                failed.push(inv.clone());
            }
        }

        if !failed.is_empty() {
            self.write_audit(ctx.group, &failed).await;
        }

        let policy = alert_policy(ctx.qos, !failed.is_empty());
        let paged = policy.should_page(ctx.page_hint);
        if paged {
            let body = healing_body(ctx.group, ctx.invalidations, &failed);
            self.page(ctx.group, policy.urgency, body).await;
        }

        self.knowledge
            .record_invalidations(ctx.group, AdaptationMode::SelfHealing, failed.clone());

        RemediationReport {
            sanitized: ctx.invalidations.withhold_from(payload),
            paged,
            failed_deletions: failed,
        }
    }

    /// Withhold flagged keys from the published payload only
    pub async fn self_protect(
        &self,
        ctx: RemediationContext<'_>,
        payload: &ConfigPayload,
    ) -> RemediationReport {
        self.write_audit(ctx.group, ctx.invalidations).await;

        let policy = alert_policy(ctx.qos, false);
        let paged = policy.should_page(ctx.page_hint);
        if paged {
            let body = masking_body(ctx.group, ctx.invalidations);
            self.page(ctx.group, policy.urgency, body).await;
        }

        self.knowledge.record_invalidations(
            ctx.group,
            AdaptationMode::SelfProtecting,
            ctx.invalidations.clone(),
        );

        RemediationReport {
            sanitized: ctx.invalidations.withhold_from(payload),
            paged,
            failed_deletions: InvalidationSet::new(),
        }
    }

    async fn page(&self, group: &GroupKey, urgency: Urgency, body: String) {
        let incident = Incident {
            urgency,
            title: self.incident_title.clone(),
            body,
        };
        if let Err(e) = self.pager.raise_incident(&incident).await {
            tracing::warn!(group = %group, error = %e, "failed to raise incident");
        }
    }

    async fn write_audit(&self, group: &GroupKey, invalidations: &InvalidationSet) {
        if let Err(e) = self.audit.record(group, invalidations).await {
            tracing::warn!(group = %group, error = %e, "failed to update audit ledger");
        }
    }
}
