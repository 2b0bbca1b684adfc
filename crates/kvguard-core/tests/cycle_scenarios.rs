//! End-to-end adaptation cycles against recording collaborators

use kvguard_core::{
    AdaptationMode, BackingStore, GroupKey, GroupSpec, GuardError, InMemoryStore, PolicySpec,
    QosTier, Urgency,
};
use kvguard_test_utils::{entry, payload, weights, FlakyStore, Harness, RecordingPager};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn group() -> GroupKey {
    GroupKey::new("prod", "billing")
}

fn email_policy(qos: QosTier) -> PolicySpec {
    PolicySpec::new(qos).with_guard_rules(["email"])
}

#[tokio::test]
async fn scenario_a_partial_leak_is_masked() {
    let store = Arc::new(InMemoryStore::with_entries([entry("a", "x@y.com"), entry("b", "hi")]));
    let h = Harness::new(Arc::clone(&store) as Arc<dyn BackingStore>);

    let outcome = h
        .orchestrator
        .run(
            &group(),
            payload(&[("a", "x@y.com"), ("b", "hi")]),
            &email_policy(QosTier::Medium),
            &weights(&[("a", 1), ("b", 1)]),
        )
        .await;

    assert_eq!(outcome.invalidations.paths(), vec!["a"]);
    assert_eq!(outcome.status.utility_value.value(), 0.5);
    assert_eq!(outcome.status.adaptation_mode, AdaptationMode::SelfProtecting);
    assert_eq!(outcome.sanitized, payload(&[("b", "hi")]));

    // Masking never touches the source.
    assert!(store.contains("a").await);
    assert_eq!(h.audit.count(), 1);
    assert_eq!(h.pager.count(), 1);
    assert_eq!(h.pager.incidents()[0].urgency, Urgency::Low);
}

#[tokio::test]
async fn scenario_b_full_leak_heals_despite_failed_delete() {
    let store = Arc::new(
        FlakyStore::with_entries([entry("a", "x@y.com"), entry("b", "y@z.com")]).fail_delete("a"),
    );
    let h = Harness::new(Arc::clone(&store) as Arc<dyn BackingStore>);

    let outcome = h
        .orchestrator
        .run(
            &group(),
            payload(&[("a", "x@y.com"), ("b", "y@z.com")]),
            &email_policy(QosTier::Medium),
            &weights(&[("a", 1), ("b", 1)]),
        )
        .await;

    assert_eq!(outcome.status.utility_value.value(), 0.0);
    assert_eq!(outcome.status.adaptation_mode, AdaptationMode::SelfHealing);
    assert!(outcome.sanitized.is_empty());
    assert_eq!(outcome.failed_deletions.paths(), vec!["a"]);
    assert!(store.contains("a").await);
    assert!(!store.contains("b").await);

    let record = h
        .orchestrator
        .knowledge()
        .last_record(&group(), AdaptationMode::SelfHealing)
        .unwrap();
    assert_eq!(record.invalidations.paths(), vec!["a"]);

    // Only the keys that survived are written to the ledger.
    let audits = h.audit.records();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].1.paths(), vec!["a"]);
}

#[tokio::test]
async fn unresolved_heal_failures_are_debounced() {
    let store = Arc::new(
        FlakyStore::with_entries([entry("a", "x@y.com"), entry("b", "y@z.com")])
            .fail_delete("a")
            .fail_delete("b"),
    );
    let h = Harness::new(Arc::clone(&store) as Arc<dyn BackingStore>);
    let input = payload(&[("a", "x@y.com"), ("b", "y@z.com")]);
    let policy = email_policy(QosTier::Medium);
    let w = weights(&[("a", 1), ("b", 1)]);

    let first = h.orchestrator.run(&group(), input.clone(), &policy, &w).await;
    h.clock.advance_minutes(5);
    let second = h.orchestrator.run(&group(), input, &policy, &w).await;

    assert_eq!(first.status.adaptation_mode, AdaptationMode::SelfHealing);
    assert_eq!(second.status.adaptation_mode, AdaptationMode::SelfHealing);
    assert!(first.paged);
    assert!(!second.paged);
    assert_eq!(h.pager.count(), 1);
    assert_eq!(h.audit.count(), 2);
    assert!(first.sanitized.is_empty());
    assert!(second.sanitized.is_empty());
    assert_eq!(second.failed_deletions.paths(), vec!["a", "b"]);
    assert!(store.contains("a").await && store.contains("b").await);
}

#[tokio::test]
async fn scenario_c_directory_whitelist_shields_entries() {
    let h = Harness::new(Arc::new(InMemoryStore::new()));
    let policy = PolicySpec::new(QosTier::Critical)
        .with_guard_rules(["bitcoin-address"])
        .with_whitelist(["secrets/"]);
    let input = payload(&[("secrets.token", "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2")]);

    let outcome = h
        .orchestrator
        .run(&group(), input.clone(), &policy, &weights(&[("secrets.token", 1)]))
        .await;

    assert!(outcome.invalidations.is_empty());
    assert_eq!(outcome.status.adaptation_mode, AdaptationMode::NonAdaptive);
    assert_eq!(outcome.sanitized, input);
    assert_eq!(h.pager.count(), 0);
}

#[tokio::test]
async fn scenario_d_repeated_leak_is_debounced() {
    let h = Harness::new(Arc::new(InMemoryStore::new()));
    let input = payload(&[("a", "x@y.com"), ("b", "hi")]);
    let policy = email_policy(QosTier::Medium);
    let w = weights(&[("a", 1), ("b", 1)]);

    let first = h.orchestrator.run(&group(), input.clone(), &policy, &w).await;
    h.clock.advance_minutes(10);
    let second = h.orchestrator.run(&group(), input, &policy, &w).await;

    assert!(first.paged);
    assert!(!second.paged);
    assert_eq!(h.pager.count(), 1);
    assert_eq!(h.audit.count(), 2);
    assert_eq!(second.sanitized, payload(&[("b", "hi")]));
}

#[tokio::test]
async fn debounce_expires_after_window() {
    let h = Harness::new(Arc::new(InMemoryStore::new()));
    let input = payload(&[("a", "x@y.com"), ("b", "hi")]);
    let policy = email_policy(QosTier::Medium);
    let w = weights(&[("a", 1), ("b", 1)]);

    h.orchestrator.run(&group(), input.clone(), &policy, &w).await;
    h.clock.advance_minutes(30);
    let later = h.orchestrator.run(&group(), input, &policy, &w).await;

    assert!(later.paged);
    assert_eq!(h.pager.count(), 2);
}

#[tokio::test]
async fn critical_failures_page_through_debounce() {
    let store = Arc::new(
        FlakyStore::with_entries([entry("a", "x@y.com"), entry("b", "ok")]).fail_delete("a"),
    );
    let h = Harness::new(store);
    let input = payload(&[("a", "x@y.com"), ("b", "ok")]);
    let policy = email_policy(QosTier::Critical);
    let w = weights(&[("a", 9), ("b", 1)]);

    let first = h.orchestrator.run(&group(), input.clone(), &policy, &w).await;
    h.clock.advance_minutes(1);
    let second = h.orchestrator.run(&group(), input, &policy, &w).await;

    assert_eq!(first.status.adaptation_mode, AdaptationMode::SelfHealing);
    assert!(first.paged && second.paged);
    let incidents = h.pager.incidents();
    assert_eq!(incidents.len(), 2);
    assert!(incidents.iter().all(|i| i.urgency == Urgency::High));
    assert!(incidents[1].body.contains("Some keys failed to get deleted"));
}

#[tokio::test]
async fn pager_failure_does_not_fail_the_cycle() {
    let pager = Arc::new(RecordingPager::failing());
    let h = Harness::with_pager(Arc::new(InMemoryStore::new()), pager);

    let outcome = h
        .orchestrator
        .run(
            &group(),
            payload(&[("a", "x@y.com"), ("b", "hi")]),
            &email_policy(QosTier::Critical),
            &weights(&[("a", 1), ("b", 1)]),
        )
        .await;

    assert_eq!(outcome.sanitized, payload(&[("b", "hi")]));
    assert_eq!(h.pager.count(), 1);
    assert!(h
        .orchestrator
        .knowledge()
        .last_record(&group(), AdaptationMode::SelfProtecting)
        .is_some());
}

#[tokio::test]
async fn read_failure_aborts_without_side_effects() {
    let store = Arc::new(
        FlakyStore::with_entries([entry("billing/owner", "x@y.com")]).fail_read("billing/"),
    );
    let h = Harness::new(store);
    let spec = GroupSpec::new("prod", "billing", QosTier::Critical)
        .with_path("billing/", 1)
        .with_guard("email");

    let err = h.orchestrator.run_group(&spec).await.unwrap_err();

    assert!(matches!(err, GuardError::StoreRead(_)));
    assert!(err.is_retryable());
    assert!(!h.orchestrator.locks().is_locked(&spec.key()));
    assert_eq!(h.pager.count(), 0);
    assert_eq!(h.audit.count(), 0);
    assert!(h.orchestrator.knowledge().is_empty());
}

#[tokio::test]
async fn run_group_reads_decodes_and_heals() {
    let store = Arc::new(InMemoryStore::with_entries([
        entry("billing/owner", "ops@example.com"),
        entry("billing/region", "eu-west-1"),
    ]));
    let h = Harness::new(Arc::clone(&store) as Arc<dyn BackingStore>);
    let spec = GroupSpec::new("prod", "billing", QosTier::Medium)
        .with_path("billing/owner", 8)
        .with_path("billing/region", 2)
        .with_guard("email");

    let outcome = h.orchestrator.run_group(&spec).await.unwrap();

    assert_eq!(outcome.status.adaptation_mode, AdaptationMode::SelfHealing);
    assert_eq!(outcome.sanitized, payload(&[("billing.region", "eu-west-1")]));
    assert!(!store.contains("billing/owner").await);
    assert_eq!(h.audit.count(), 0);
}

#[tokio::test]
async fn concurrent_cycles_of_one_group_are_serialized() {
    let h = Harness::new(Arc::new(InMemoryStore::new()));
    let input = payload(&[("a", "x@y.com"), ("b", "hi")]);
    let policy = email_policy(QosTier::Medium);
    let w = weights(&[("a", 1), ("b", 1)]);

    let (g1, g2) = (group(), group());
    let (first, second) = futures::join!(
        h.orchestrator.run(&g1, input.clone(), &policy, &w),
        h.orchestrator.run(&g2, input.clone(), &policy, &w),
    );

    // The later cycle sees the earlier one's record and stays quiet.
    assert_eq!(u8::from(first.paged) + u8::from(second.paged), 1);
    assert_eq!(h.audit.count(), 2);
    assert_eq!(h.orchestrator.locks().len(), 1);
    assert!(!h.orchestrator.locks().is_locked(&group()));
}

#[tokio::test]
async fn different_groups_do_not_share_debounce() {
    let h = Harness::new(Arc::new(InMemoryStore::new()));
    let input = payload(&[("a", "x@y.com"), ("b", "hi")]);
    let policy = email_policy(QosTier::Medium);
    let w = weights(&[("a", 1), ("b", 1)]);
    let other = GroupKey::new("prod", "payments");

    let g = group();
    let (first, second) = futures::join!(
        h.orchestrator.run(&g, input.clone(), &policy, &w),
        h.orchestrator.run(&other, input.clone(), &policy, &w),
    );

    assert!(first.paged && second.paged);
    assert_eq!(h.orchestrator.locks().len(), 2);
}
