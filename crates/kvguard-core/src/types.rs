//! Core types for KVGuard
//!
//! Defines the data shared by every stage of a cycle:
//! - Group identity and per-cycle policy
//! - Flattened configuration payloads and path weights
//! - Invalidations found by the scanner
//! - Utility scores, adaptation modes and observed status

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator of normalized payload paths
pub const PATH_SEPARATOR: char = '.';

/// Separator of native backing store keys
pub const STORE_SEPARATOR: char = '/';

/// Flattened configuration: normalized path -> decoded value
pub type ConfigPayload = BTreeMap<String, String>;

/// Criticality weight per normalized path
pub type PathWeights = BTreeMap<String, u32>;

/// Convert a normalized (dot-separated) path to the store's native form
#[inline]
#[must_use]
pub fn to_store_path(path: &str) -> String {
    path.replace(PATH_SEPARATOR, &STORE_SEPARATOR.to_string())
}

/// Convert a native store key to its normalized (dot-separated) form
#[inline]
#[must_use]
pub fn to_payload_path(key: &str) -> String {
    key.replace(STORE_SEPARATOR, &PATH_SEPARATOR.to_string())
}

/// Stable identity of a configuration group (`namespace/name`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Owning namespace
    pub namespace: String,
    /// Group name
    pub name: String,
}

impl GroupKey {
    /// Create new group key
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Severity class of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosTier {
    /// Never page
    #[default]
    Relaxed,
    /// Page with low urgency
    Medium,
    /// Page with high urgency
    Critical,
}

impl QosTier {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QosTier::Relaxed => "relaxed",
            QosTier::Medium => "medium",
            QosTier::Critical => "critical",
        }
    }
}

impl fmt::Display for QosTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensitive-data policy for one cycle
///
/// Rebuilt by the driver every cycle and only ever borrowed by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Alerting severity
    pub qos: QosTier,
    /// Ordered guard patterns or alias names
    pub guard_rules: Vec<String>,
    /// Exact paths, or directory prefixes ending in `/`
    pub whitelist: Vec<String>,
}

impl PolicySpec {
    /// Create policy for tier
    #[inline]
    #[must_use]
    pub fn new(qos: QosTier) -> Self {
        Self {
            qos,
            ..Self::default()
        }
    }

    /// With guard rules
    #[inline]
    #[must_use]
    pub fn with_guard_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guard_rules = rules.into_iter().map(Into::into).collect();
        self
    }

    /// With whitelist
    #[inline]
    #[must_use]
    pub fn with_whitelist<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = entries.into_iter().map(Into::into).collect();
        self
    }
}

/// One flagged payload entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invalidation {
    /// Normalized path
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub path: String,
    /// Offending value
    pub value: String,
    /// Compilation error of the rule, when the entry was flagged fail-closed
    #[serde(rename = "any_error", skip_serializing_if = "Option::is_none", default)]
    pub rule_error: Option<String>,
    /// Resolved pattern that flagged the entry
    #[serde(rename = "failing_regex", skip_serializing_if = "String::is_empty", default)]
    pub matched_rule: String,
}

impl Invalidation {
    /// Create invalidation for a matching rule
    #[inline]
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        value: impl Into<String>,
        matched_rule: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            rule_error: None,
            matched_rule: matched_rule.into(),
        }
    }

    /// Attach rule error detail
    #[inline]
    #[must_use]
    pub fn with_rule_error(mut self, detail: impl Into<String>) -> Self {
        self.rule_error = Some(detail.into());
        self
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{{\"path\":\"{}\"}}", self.path),
        }
    }
}

/// Ordered invalidations of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationSet(Vec<Invalidation>);

impl InvalidationSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append invalidation
    #[inline]
    pub fn push(&mut self, invalidation: Invalidation) {
        self.0.push(invalidation);
    }

    /// Number of invalidations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing was flagged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate invalidations
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Invalidation> {
        self.0.iter()
    }

    /// Flagged paths, in order
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|inv| inv.path.as_str()).collect()
    }

    /// Check if a path was flagged
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.0.iter().any(|inv| inv.path == path)
    }

    /// Copy of the payload with every flagged path removed
    #[must_use]
    pub fn withhold_from(&self, payload: &ConfigPayload) -> ConfigPayload {
        payload
            .iter()
            .filter(|(path, _)| !self.contains_path(path))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect()
    }
}

impl From<Vec<Invalidation>> for InvalidationSet {
    fn from(items: Vec<Invalidation>) -> Self {
        Self(items)
    }
}

impl FromIterator<Invalidation> for InvalidationSet {
    fn from_iter<T: IntoIterator<Item = Invalidation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a InvalidationSet {
    type Item = &'a Invalidation;
    type IntoIter = std::slice::Iter<'a, Invalidation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for InvalidationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, inv) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{inv}")?;
        }
        Ok(())
    }
}

/// Weighted compliance of a payload
///
/// Normally in `[-1, 1]`; exactly `-1` when no path carries weight.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtilityScore(pub f64);

impl UtilityScore {
    /// Score reported when no weighted paths are configured
    pub const UNWEIGHTED: Self = Self(-1.0);

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for UtilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remediation strategy of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptationMode {
    /// Leave the payload untouched
    #[default]
    NonAdaptive,
    /// Purge flagged keys at the source
    SelfHealing,
    /// Withhold flagged keys from the artifact only
    SelfProtecting,
}

impl AdaptationMode {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationMode::NonAdaptive => "non-adaptive",
            AdaptationMode::SelfHealing => "self-healing",
            AdaptationMode::SelfProtecting => "self-protecting",
        }
    }
}

impl fmt::Display for AdaptationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status the driver persists after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedStatus {
    /// Utility score of the cycle
    pub utility_value: UtilityScore,
    /// Mode the cycle ran in
    pub adaptation_mode: AdaptationMode,
}
