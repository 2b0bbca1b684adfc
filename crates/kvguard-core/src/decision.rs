//! Utility function and mode selection
//!
//! `score = 1 - flagged_weight / total_weight`. The score is partitioned
//! into adaptation modes:
//!
//! | score          | mode             |
//! |----------------|------------------|
//! | `[0, 0.3]`     | self-healing     |
//! | `<= 0.8` else  | self-protecting  |
//! | `> 0.8`        | non-adaptive     |
//!
//! Paging is hinted for any score `<= 0.95`. With no weighted paths the
//! score is the `-1` sentinel, the mode non-adaptive and paging off.

use crate::types::{AdaptationMode, InvalidationSet, PathWeights, UtilityScore};

/// Upper bound of the self-healing band
pub const SELF_HEALING_CEILING: f64 = 0.3;

/// Upper bound of the self-protecting band
pub const SELF_PROTECTING_CEILING: f64 = 0.8;

/// Scores at or below this hint that paging is warranted
pub const PAGING_CEILING: f64 = 0.95;

/// Result of the utility function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Weighted compliance
    pub score: UtilityScore,
    /// Selected strategy
    pub mode: AdaptationMode,
    /// Whether the score warrants paging, before debounce
    pub page_hint: bool,
}

/// Compute the utility score and pick the adaptation mode
#[must_use]
pub fn decide(invalidations: &InvalidationSet, weights: &PathWeights) -> Decision {
    let denominator: u64 = weights.values().map(|w| u64::from(*w)).sum();
    if denominator == 0 {
        return Decision {
            score: UtilityScore::UNWEIGHTED,
            mode: AdaptationMode::NonAdaptive,
            page_hint: false,
        };
    }

    let numerator: u64 = invalidations
        .iter()
        .map(|inv| weights.get(&inv.path).copied().map_or(0, u64::from))
        .sum();

    // Subtract before dividing so band edges like 0.3 stay exact.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    let score = (denominator as i64 - numerator as i64) as f64 / denominator as f64;

    Decision {
        score: UtilityScore(score),
        mode: mode_for(score),
        page_hint: score <= PAGING_CEILING,
    }
}

/// Partition a score into an adaptation mode
#[must_use]
pub fn mode_for(score: f64) -> AdaptationMode {
    if (0.0..=SELF_HEALING_CEILING).contains(&score) {
        AdaptationMode::SelfHealing
    } else if score <= SELF_PROTECTING_CEILING {
        AdaptationMode::SelfProtecting
    } else {
        AdaptationMode::NonAdaptive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Invalidation;
    use proptest::prelude::*;

    fn weights(entries: &[(&str, u32)]) -> PathWeights {
        entries.iter().map(|(k, w)| ((*k).to_string(), *w)).collect()
    }

    fn flagged(paths: &[&str]) -> InvalidationSet {
        paths
            .iter()
            .map(|p| Invalidation::new(*p, "v", "r"))
            .collect()
    }

    #[test]
    fn no_weights_is_sentinel() {
        let d = decide(&flagged(&["a"]), &PathWeights::new());
        assert_eq!(d.score, UtilityScore::UNWEIGHTED);
        assert_eq!(d.mode, AdaptationMode::NonAdaptive);
        assert!(!d.page_hint);

        let zero = decide(&flagged(&["a"]), &weights(&[("a", 0)]));
        assert_eq!(zero.score, UtilityScore::UNWEIGHTED);
    }

    #[test]
    fn half_flagged_is_self_protecting() {
        let d = decide(&flagged(&["a"]), &weights(&[("a", 1), ("b", 1)]));
        assert_eq!(d.score, UtilityScore(0.5));
        assert_eq!(d.mode, AdaptationMode::SelfProtecting);
        assert!(d.page_hint);
    }

    #[test]
    fn fully_flagged_is_self_healing() {
        let d = decide(&flagged(&["a", "b"]), &weights(&[("a", 1), ("b", 1)]));
        assert_eq!(d.score, UtilityScore(0.0));
        assert_eq!(d.mode, AdaptationMode::SelfHealing);
    }

    #[test]
    fn clean_payload_is_non_adaptive_without_page() {
        let d = decide(&InvalidationSet::new(), &weights(&[("a", 1)]));
        assert_eq!(d.score, UtilityScore(1.0));
        assert_eq!(d.mode, AdaptationMode::NonAdaptive);
        assert!(!d.page_hint);
    }

    #[test]
    fn unweighted_flagged_paths_count_zero() {
        let d = decide(&flagged(&["unknown"]), &weights(&[("a", 4)]));
        assert_eq!(d.score, UtilityScore(1.0));
    }

    #[test]
    fn band_edges_are_inclusive() {
        // 7 of 10 flagged -> exactly 0.3
        let d = decide(&flagged(&["a"]), &weights(&[("a", 7), ("b", 3)]));
        assert_eq!(d.mode, AdaptationMode::SelfHealing);

        // 2 of 10 flagged -> exactly 0.8
        let d = decide(&flagged(&["a"]), &weights(&[("a", 2), ("b", 8)]));
        assert_eq!(d.mode, AdaptationMode::SelfProtecting);

        // 1 of 20 flagged -> exactly 0.95, pages but leaves payload alone
        let d = decide(&flagged(&["a"]), &weights(&[("a", 1), ("b", 19)]));
        assert_eq!(d.mode, AdaptationMode::NonAdaptive);
        assert!(d.page_hint);
    }

    #[test]
    fn negative_scores_are_self_protecting() {
        // duplicated invalidation double-counts the weight
        let d = decide(&flagged(&["a", "a"]), &weights(&[("a", 1)]));
        assert_eq!(d.score, UtilityScore(-1.0));
        assert_eq!(d.mode, AdaptationMode::SelfProtecting);
    }

    proptest! {
        #[test]
        fn mode_partition(score in -2.0f64..2.0) {
            let mode = mode_for(score);
            if (0.0..=0.3).contains(&score) {
                prop_assert_eq!(mode, AdaptationMode::SelfHealing);
            } else if score <= 0.8 {
                prop_assert_eq!(mode, AdaptationMode::SelfProtecting);
            } else {
                prop_assert_eq!(mode, AdaptationMode::NonAdaptive);
            }
        }

        #[test]
        fn score_matches_formula(flag_a in any::<bool>(), wa in 1u32..100, wb in 1u32..100) {
            let set = if flag_a { flagged(&["a"]) } else { InvalidationSet::new() };
            let d = decide(&set, &weights(&[("a", wa), ("b", wb)]));
            let numerator = if flag_a { f64::from(wa) } else { 0.0 };
            let expected = 1.0 - numerator / f64::from(wa + wb);
            prop_assert!((d.score.value() - expected).abs() < 1e-9);
        }
    }
}
