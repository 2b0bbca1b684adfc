//! Configuration for KVGuard
//!
//! [`GuardConfig`] tunes the engine; [`GroupSpec`] describes one
//! configuration group the way the driver sees it. A [`GuardFile`] bundles
//! both and is loaded from TOML:
//!
//! ```toml
//! debounce_window_secs = 1800
//! reference_link = "https://example.pagerduty.com/incidents"
//!
//! [[groups]]
//! namespace = "prod"
//! name = "billing"
//! qos = "critical"
//! guard_against = ["email", "bitcoin-address"]
//! whitelisted_paths = ["billing/public/"]
//!
//! [[groups.paths]]
//! path = "billing/"
//! criticality_weight = 3
//! ```

use crate::error::GuardError;
use crate::types::{GroupKey, PolicySpec, QosTier};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default debounce window (30 minutes)
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 30 * 60;

/// Default incident title
pub const DEFAULT_INCIDENT_TITLE: &str = "Sensitive Incident";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Identical alerts inside this window are suppressed
    pub debounce_window_secs: u64,
    /// Title of raised incidents
    pub incident_title: String,
    /// Link recorded in the audit ledger's reference column
    pub reference_link: String,
    /// Maximum number of compiled guard patterns kept around
    pub pattern_cache_capacity: u64,
}

impl GuardConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window_secs = window.as_secs();
        self
    }

    /// With incident title
    #[inline]
    #[must_use]
    pub fn with_incident_title(mut self, title: impl Into<String>) -> Self {
        self.incident_title = title.into();
        self
    }

    /// With ledger reference link
    #[inline]
    #[must_use]
    pub fn with_reference_link(mut self, link: impl Into<String>) -> Self {
        self.reference_link = link.into();
        self
    }

    /// Debounce window as a duration
    #[inline]
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            debounce_window_secs: DEFAULT_DEBOUNCE_WINDOW_SECS,
            incident_title: DEFAULT_INCIDENT_TITLE.to_string(),
            reference_link: String::new(),
            pattern_cache_capacity: 512,
        }
    }
}

/// A store path watched by a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSpec {
    /// Store path; a trailing `/` reads the whole directory
    pub path: String,
    /// Weight of every key found under `path`
    #[serde(default = "default_weight")]
    pub criticality_weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl PathSpec {
    /// Create path spec
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, criticality_weight: u32) -> Self {
        Self {
            path: path.into(),
            criticality_weight,
        }
    }
}

/// One configuration group as declared to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Owning namespace
    pub namespace: String,
    /// Group name
    pub name: String,
    /// Alerting severity
    #[serde(default)]
    pub qos: QosTier,
    /// Watched store paths
    #[serde(default)]
    pub paths: Vec<PathSpec>,
    /// Guard patterns or alias names
    #[serde(default)]
    pub guard_against: Vec<String>,
    /// Whitelisted paths or directory prefixes
    #[serde(default)]
    pub whitelisted_paths: Vec<String>,
}

impl GroupSpec {
    /// Create group spec
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, qos: QosTier) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            qos,
            paths: Vec::new(),
            guard_against: Vec::new(),
            whitelisted_paths: Vec::new(),
        }
    }

    /// With watched path
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>, weight: u32) -> Self {
        self.paths.push(PathSpec::new(path, weight));
        self
    }

    /// With guard rule
    #[inline]
    #[must_use]
    pub fn with_guard(mut self, rule: impl Into<String>) -> Self {
        self.guard_against.push(rule.into());
        self
    }

    /// With whitelisted path
    #[inline]
    #[must_use]
    pub fn with_whitelisted(mut self, path: impl Into<String>) -> Self {
        self.whitelisted_paths.push(path.into());
        self
    }

    /// Group identity
    #[inline]
    #[must_use]
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Fresh policy for this cycle
    #[must_use]
    pub fn policy(&self) -> PolicySpec {
        PolicySpec::new(self.qos)
            .with_guard_rules(self.guard_against.iter().cloned())
            .with_whitelist(self.whitelisted_paths.iter().cloned())
    }
}

/// Configuration file: engine settings plus declared groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardFile {
    /// Engine settings
    #[serde(flatten)]
    pub config: GuardConfig,
    /// Declared groups
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

impl GuardFile {
    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns `GuardError::Config` on malformed TOML or an empty path.
    pub fn from_toml_str(text: &str) -> Result<Self, GuardError> {
        let file: Self = toml::from_str(text).map_err(|e| GuardError::Config(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `GuardError::Config` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GuardError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), GuardError> {
        for group in &self.groups {
            if group.paths.iter().any(|p| p.path.is_empty()) {
                return Err(GuardError::Config(format!(
                    "group {} declares an empty path",
                    group.key()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
reference_link = "https://example.pagerduty.com/incidents"

[[groups]]
namespace = "prod"
name = "billing"
qos = "critical"
guard_against = ["email"]
whitelisted_paths = ["billing/public/"]

[[groups.paths]]
path = "billing/"
criticality_weight = 3

[[groups.paths]]
path = "shared/smtp"
"#;

    #[test]
    fn defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.debounce_window(), Duration::from_secs(1800));
        assert_eq!(config.incident_title, "Sensitive Incident");
    }

    #[test]
    fn parse_sample_file() {
        let file = GuardFile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(file.config.debounce_window_secs, DEFAULT_DEBOUNCE_WINDOW_SECS);
        assert_eq!(
            file.config.reference_link,
            "https://example.pagerduty.com/incidents"
        );

        let group = &file.groups[0];
        assert_eq!(group.key().to_string(), "prod/billing");
        assert_eq!(group.qos, QosTier::Critical);
        assert_eq!(group.paths[0].criticality_weight, 3);
        assert_eq!(group.paths[1].criticality_weight, 1);
    }

    #[test]
    fn policy_is_derived_from_group() {
        let group = GroupSpec::new("ns", "app", QosTier::Medium)
            .with_guard("email")
            .with_whitelisted("app/public/");
        let policy = group.policy();

        assert_eq!(policy.qos, QosTier::Medium);
        assert_eq!(policy.guard_rules, vec!["email".to_string()]);
        assert_eq!(policy.whitelist, vec!["app/public/".to_string()]);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = GuardFile::from_toml_str("groups = 3").unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn empty_path_is_rejected() {
        let text = r#"
[[groups]]
namespace = "ns"
name = "app"
[[groups.paths]]
path = ""
"#;
        assert!(GuardFile::from_toml_str(text).is_err());
    }
}
