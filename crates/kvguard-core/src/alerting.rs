//! Alerting policy shared by both remediation strategies
//!
//! A single table maps `(QoS, has failed deletions)` to an urgency and a
//! paging directive, so self-healing and self-protecting cannot drift apart.

use crate::sinks::Urgency;
use crate::types::{GroupKey, InvalidationSet, QosTier};

const HEALED_PREFIX: &str = "[ALREADY SAFELY TAKEN CARE OF BY GETTING RID OF THE KEYS]\n";

const MASKED_NOTE: &str = "\n[NOTE]\nMitigation: The published artifact is rendered to ignore all the aforementioned sensitive keys.";

/// How the debounced paging hint is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingDirective {
    /// Never page
    Suppress,
    /// Page iff the debounced hint says so
    FollowHint,
    /// Page regardless of the hint
    Force,
}

/// Urgency and paging directive for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Urgency of a raised incident
    pub urgency: Urgency,
    /// Paging directive
    pub paging: PagingDirective,
}

impl AlertPolicy {
    /// Resolve the directive against the debounced hint
    #[inline]
    #[must_use]
    pub fn should_page(&self, hint: bool) -> bool {
        match self.paging {
            PagingDirective::Suppress => false,
            PagingDirective::FollowHint => hint,
            PagingDirective::Force => true,
        }
    }
}

/// Look up the alert policy
///
/// Only a critical group with keys that failed to self-heal forces a page.
#[must_use]
pub fn alert_policy(qos: QosTier, has_failures: bool) -> AlertPolicy {
    let (urgency, paging) = match (qos, has_failures) {
        (QosTier::Relaxed, _) => (Urgency::Low, PagingDirective::Suppress),
        (QosTier::Medium, _) => (Urgency::Low, PagingDirective::FollowHint),
        (QosTier::Critical, true) => (Urgency::High, PagingDirective::Force),
        (QosTier::Critical, false) => (Urgency::High, PagingDirective::FollowHint),
    };
    AlertPolicy { urgency, paging }
}

/// Body describing a leak
#[must_use]
pub fn leak_body(group: &GroupKey, invalidations: &InvalidationSet) -> String {
    format!("A KV group ({group}) was found to leak some sensitive data\nDetails:\n{invalidations}")
}

/// Body for a self-healing cycle
#[must_use]
pub fn healing_body(
    group: &GroupKey,
    invalidations: &InvalidationSet,
    failed: &InvalidationSet,
) -> String {
    let body = leak_body(group, invalidations);
    if failed.is_empty() {
        format!("{HEALED_PREFIX}{body}")
    } else {
        format!("{body}\nSome keys failed to get deleted\nDetails:\n{failed}")
    }
}

/// Body for a self-protecting cycle
#[must_use]
pub fn masking_body(group: &GroupKey, invalidations: &InvalidationSet) -> String {
    format!("{}{MASKED_NOTE}", leak_body(group, invalidations))
}
