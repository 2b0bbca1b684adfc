//! KVGuard Core - decision and remediation engine
//!
//! Audits configuration groups sourced from a key-value store and remediates
//! sensitive-data exposure on its own:
//! - Scans payload values against guard patterns, honoring whitelists
//! - Scores weighted exposure and selects an adaptation mode
//! - Purges offending keys at the source, or withholds them from the
//!   published artifact
//! - Debounces repeated alerts per group and mode
//! - Serializes cycles of the same group behind a per-group lock
//!
//! # Example
//!
//! ```rust,ignore
//! use kvguard_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GuardConfig::new();
//! let orchestrator = CycleOrchestrator::new(
//!     &config,
//!     Collaborators {
//!         store: Arc::new(InMemoryStore::new()),
//!         pager: Arc::new(LogPager),
//!         audit: Arc::new(LedgerAuditSink::new(MemoryLedgerStore::new(), "")),
//!     },
//! );
//!
//! let spec = GroupSpec::new("prod", "billing", QosTier::Critical)
//!     .with_path("billing/", 1)
//!     .with_guard("email");
//! let outcome = orchestrator.run_group(&spec).await?;
//!
//! println!("{} -> {}", outcome.status.utility_value, outcome.status.adaptation_mode);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod alerting;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod error;
pub mod knowledge;
pub mod ledger;
pub mod lock;
pub mod payload;
pub mod remediation;
pub mod scanner;
pub mod sinks;
pub mod types;

// Re-exports for convenience
pub use alerting::{alert_policy, AlertPolicy, PagingDirective};
pub use config::{GroupSpec, GuardConfig, GuardFile, PathSpec};
pub use cycle::{Collaborators, CycleOrchestrator, CycleOutcome};
pub use decision::{decide, Decision};
pub use error::{GuardError, GuardResult, SinkError, StoreError};
pub use knowledge::{Clock, DebounceRecord, KnowledgeBase, SystemClock};
pub use ledger::{
    AuditLedger, CsvFileLedgerStore, JsonFileLedgerStore, LedgerAuditSink, LedgerRow, LedgerStore,
    MemoryLedgerStore,
};
pub use lock::{GroupLease, GroupLocks};
pub use remediation::{RemediationContext, RemediationReport, Remediator};
pub use scanner::{ScanOutcome, Scanner};
pub use sinks::{
    AuditSink, BackingStore, InMemoryStore, Incident, LogPager, PagingSink, StoreEntry, Urgency,
};
pub use types::{
    AdaptationMode, ConfigPayload, GroupKey, Invalidation, InvalidationSet, ObservedStatus,
    PathWeights, PolicySpec, QosTier, UtilityScore,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving KVGuard cycles
    pub use crate::{
        AdaptationMode, Collaborators, ConfigPayload, CycleOrchestrator, CycleOutcome, GroupKey,
        GroupSpec, GuardConfig, InMemoryStore, LedgerAuditSink, LogPager, MemoryLedgerStore,
        PathWeights, PolicySpec, QosTier,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
