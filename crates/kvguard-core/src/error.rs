//! Error types for KVGuard Core
//!
//! Provides error handling for:
//! - Backing store reads and deletes
//! - Decoding of opaque store values
//! - Paging and audit ledger sinks
//! - Configuration loading
//!
//! Only [`GuardError`] ever reaches the caller of a cycle. Store deletes and
//! sink writes are recovered inside the remediator.

/// Cycle-level error
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Reading the group's keys from the backing store failed
    #[error("store read failed: {0}")]
    StoreRead(#[from] StoreError),

    /// A store value could not be decoded
    #[error("failed to decode value of key '{key}': {detail}")]
    Decode { key: String, detail: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl GuardError {
    /// Create decode error for key
    #[inline]
    pub fn decode(key: impl Into<String>, detail: impl ToString) -> Self {
        Self::Decode {
            key: key.into(),
            detail: detail.to_string(),
        }
    }

    /// Check if the next scheduled cycle may succeed without intervention
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreRead(_))
    }
}

/// Backing store operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// GET of a path failed
    #[error("failed to GET '{path}': {detail}")]
    Read { path: String, detail: String },

    /// DELETE of a path failed
    #[error("failed to DELETE '{path}': {detail}")]
    Delete { path: String, detail: String },
}

impl StoreError {
    /// Create read error for path
    #[inline]
    pub fn read(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create delete error for path
    #[inline]
    pub fn delete(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Delete {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Paging and audit sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Incident could not be raised
    #[error("paging failed: {0}")]
    Paging(String),

    /// Ledger could not be loaded
    #[error("ledger load failed: {0}")]
    LedgerLoad(String),

    /// Ledger could not be persisted
    #[error("ledger save failed: {0}")]
    LedgerSave(String),
}

/// Result type alias for cycle operations
pub type GuardResult<T> = Result<T, GuardError>;
