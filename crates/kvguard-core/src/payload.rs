//! Flattening store entries into a cycle payload
//!
//! Values arrive base64-encoded under slash-separated keys. The payload
//! uses decoded values under dot-separated paths, and every key found under
//! a watched path inherits that path's criticality weight.

use crate::config::GroupSpec;
use crate::error::GuardError;
use crate::sinks::{BackingStore, StoreEntry};
use crate::types::{to_payload_path, ConfigPayload, PathWeights};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Decode one raw store entry into `(path, value)`
///
/// # Errors
/// Returns `GuardError::Decode` if the value is not valid base64 or the
/// decoded bytes are not UTF-8.
pub fn decode_entry(entry: &StoreEntry) -> Result<(String, String), GuardError> {
    let bytes = STANDARD
        .decode(entry.value.as_bytes())
        .map_err(|e| GuardError::decode(&entry.key, e))?;
    let value = String::from_utf8(bytes).map_err(|e| GuardError::decode(&entry.key, e))?;
    Ok((to_payload_path(&entry.key), value))
}

/// Read every watched path of a group
///
/// # Errors
/// Any read or decode failure aborts with the corresponding `GuardError`.
pub async fn fetch_group_payload(
    store: &dyn BackingStore,
    spec: &GroupSpec,
) -> Result<(ConfigPayload, PathWeights), GuardError> {
    let mut payload = ConfigPayload::new();
    let mut weights = PathWeights::new();

    for path_spec in &spec.paths {
        let entries = store.get(&path_spec.path).await?;
        for entry in &entries {
            let (path, value) = decode_entry(entry)?;
            weights.insert(path.clone(), path_spec.criticality_weight);
            payload.insert(path, value);
        }
    }

    tracing::debug!(
        group = %spec.key(),
        keys = payload.len(),
        "fetched group payload"
    );
    Ok((payload, weights))
}
