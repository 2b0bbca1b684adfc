//! Sensitive-data scanner
//!
//! Maps a payload and a policy to the set of entries violating the policy's
//! guard rules:
//!
//! 1. Guard rules are resolved through the alias table; anything that is not
//!    an alias is used verbatim as a pattern.
//! 2. Whitelisted paths are never flagged.
//! 3. Rules are tried in configured order against each value; the first
//!    match wins.
//! 4. A rule that does not compile counts as a match, and the compilation
//!    error travels with the resulting [`Invalidation`].
//!
//! Compiled patterns are memoized in a bounded [`moka`] cache. The scan
//! itself has no observable side effects.

use crate::types::{
    ConfigPayload, Invalidation, InvalidationSet, PolicySpec, PATH_SEPARATOR, STORE_SEPARATOR,
};
use moka::sync::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Alias name -> concrete pattern
static ALIASES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("email", r"^[\w.-]+@([\w-]+\.)+[\w-]{2,4}$"),
        (
            "contact",
            r"^\s*(?:\+?(\d{1,3}))?([-. (]*(\d{3})[-. )]*)?((\d{3})[-. ]*(\d{2,4})(?:[-.x ]*(\d+))?)\s*$",
        ),
        ("bitcoin-address", r"([13][a-km-zA-HJ-NP-Z0-9]{26,33})"),
        (
            "badwords",
            r"\b(?:(?:ass+(?:\s+)?|i+(?:\s+)?|butt+(?:\s+)?|mo(?:(?:m|t|d)h?(?:e|a)?r?)(?:\s+)?)?f(?:(?:\s+)?u+)?(?:(?:\s+)?c+)?(?:(?:\s+)?k+)?(?:(?:e|a)(?:r+)?|i(?:n(?:g)?)?)?(?:s+)?(?:\s+)?(?:hole|head|(?:yo?)?u?)?)+\b",
        ),
        (
            "html-tags",
            r#"</?\w+((\s+\w+(\s*=\s*(?:".*?"|'.*?'|[^'">\s]+))?)+\s*|\s*)/?>"#,
        ),
        (
            "sql-injection",
            r#""((SELECT|DELETE|UPDATE|INSERT INTO) (\*|[A-Z0-9_]+) (FROM) ([A-Z0-9_]+))( (WHERE) ([A-Z0-9_]+) (=|<|>|>=|<=|==|!=) (\?|\$[A-Z]{1}[A-Z_]+)( (AND) ([A-Z0-9_]+) (=|<|>|>=|<=|==|!=) (\?))?)?""#,
        ),
    ])
});

/// Iterate the alias table in name order
pub fn aliases() -> impl Iterator<Item = (&'static str, &'static str)> {
    ALIASES.iter().map(|(name, pattern)| (*name, *pattern))
}

/// Resolve one guard rule to the pattern it stands for
#[inline]
#[must_use]
pub fn resolve_rule(rule: &str) -> &str {
    ALIASES.get(rule).copied().unwrap_or(rule)
}

/// Check whether a payload path is exempt from scanning
///
/// An entry ending in `/` whitelists a whole directory: the path is
/// normalized to slash form and compared by prefix. Any other entry must
/// equal the path exactly.
#[must_use]
pub fn is_whitelisted(path: &str, whitelist: &[String]) -> bool {
    let mut slashed: Option<String> = None;
    whitelist.iter().any(|entry| {
        if entry.ends_with(STORE_SEPARATOR) {
            let normalized =
                slashed.get_or_insert_with(|| path.replace(PATH_SEPARATOR, "/"));
            normalized.starts_with(entry.as_str())
        } else {
            entry == path
        }
    })
}

/// Outcome of evaluating a value against the ordered rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No rule matched
    NoMatch,
    /// A rule matched
    Matched(String),
    /// A rule failed to compile and is treated as matching
    RuleError {
        /// Offending pattern
        rule: String,
        /// Compiler diagnostic
        detail: String,
    },
}

impl ScanOutcome {
    /// Collapse into an invalidation (fail closed on rule errors)
    #[must_use]
    pub fn into_invalidation(self, path: &str, value: &str) -> Option<Invalidation> {
        match self {
            ScanOutcome::NoMatch => None,
            ScanOutcome::Matched(rule) => Some(Invalidation::new(path, value, rule)),
            ScanOutcome::RuleError { rule, detail } => {
                Some(Invalidation::new(path, value, rule).with_rule_error(detail))
            }
        }
    }
}

type CompiledRule = Result<Arc<Regex>, Arc<str>>;

/// Policy scanner with a compiled-pattern cache
#[derive(Debug, Clone)]
pub struct Scanner {
    patterns: Cache<String, CompiledRule>,
}

impl Scanner {
    /// Create scanner caching at most `capacity` compiled patterns
    #[inline]
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            patterns: Cache::new(capacity),
        }
    }

    /// Find every payload entry violating the policy
    #[must_use]
    pub fn scan(&self, payload: &ConfigPayload, policy: &PolicySpec) -> InvalidationSet {
        if policy.guard_rules.is_empty() {
            return InvalidationSet::new();
        }

        let rules: Vec<&str> = policy.guard_rules.iter().map(|r| resolve_rule(r)).collect();

        payload
            .iter()
            .filter(|(path, _)| !is_whitelisted(path, &policy.whitelist))
            .filter_map(|(path, value)| self.evaluate(value, &rules).into_invalidation(path, value))
            .collect()
    }

    /// Evaluate a value against resolved rules in order
    #[must_use]
    pub fn evaluate(&self, value: &str, rules: &[&str]) -> ScanOutcome {
        for rule in rules {
            match self.compile(rule) {
                Ok(regex) => {
                    if regex.is_match(value) {
                        return ScanOutcome::Matched((*rule).to_string());
                    }
                }
                Err(detail) => {
                    return ScanOutcome::RuleError {
                        rule: (*rule).to_string(),
                        detail: detail.to_string(),
                    };
                }
            }
        }
        ScanOutcome::NoMatch
    }

    /// Number of cached patterns
    #[inline]
    #[must_use]
    pub fn cached_patterns(&self) -> u64 {
        self.patterns.run_pending_tasks();
        self.patterns.entry_count()
    }

    fn compile(&self, rule: &str) -> CompiledRule {
        self.patterns.get_with_by_ref(rule, || {
            Regex::new(rule).map(Arc::new).map_err(|e| {
                tracing::debug!(rule, error = %e, "guard pattern failed to compile");
                Arc::from(format!("validation regex '{rule}' failed to get compiled: {e}"))
            })
        })
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(512)
    }
}
