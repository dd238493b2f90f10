//! Unit tests for the lifecycle engine: intent validation, the per-component
//! operation slot, retries, timeouts and the startup reconcile.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{fast_config, harness, harness_with};
use tharnax::error::AppError;
use tharnax::services::{
    ComponentStatus, InstallRecord, IntentStatus, ObservedState, OperationKind,
};

// ============================================================================
// Intent validation (synchronous rejections)
// ============================================================================

#[tokio::test]
async fn install_unknown_component_is_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .request_intent("ghost", OperationKind::Install)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn install_with_unmet_dependency_is_rejected() {
    let h = harness().await;

    // nfs depends on k3s, which is not installed
    let err = h
        .engine
        .request_intent("nfs", OperationKind::Install)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependencyUnmet(_)));
    assert!(err.to_string().contains("k3s"));
}

#[tokio::test]
async fn rejected_install_mutates_nothing() {
    let h = harness().await;

    let _ = h.engine.request_intent("nfs", OperationKind::Install).await;

    assert!(h.store.get("nfs").await.unwrap().is_none());
    assert_eq!(h.engine.operations_in_flight().await, 0);
    assert_eq!(h.runner.install_calls("nfs"), 0);
}

#[tokio::test]
async fn install_with_satisfied_dependency_is_accepted() {
    let h = harness().await;
    h.mark_installed("k3s").await;

    let ack = h
        .engine
        .request_intent("nfs", OperationKind::Install)
        .await
        .unwrap();

    assert_eq!(ack.status, IntentStatus::Accepted);
    h.wait_for_settled("nfs").await;
}

#[tokio::test]
async fn uninstall_protected_component_is_rejected() {
    let h = harness().await;
    h.mark_installed("argocd").await;

    let err = h
        .engine
        .request_intent("argocd", OperationKind::Uninstall)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Protected(_)));
    assert!(err.to_string().contains("Protected"));
    assert_eq!(h.engine.operations_in_flight().await, 0);
}

#[tokio::test]
async fn uninstall_protected_component_is_rejected_even_when_not_installed() {
    let h = harness().await;

    let err = h
        .engine
        .request_intent("argocd", OperationKind::Uninstall)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Protected(_)));
}

#[tokio::test]
async fn uninstall_of_protected_component_is_rejected_mid_install() {
    let h = harness_with(fast_config(), Duration::from_millis(200)).await;
    h.mark_installed("k3s").await;

    let ack = h
        .engine
        .request_intent("argocd", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);

    // Protected wins over the in-flight short-circuit.
    let err = h
        .engine
        .request_intent("argocd", OperationKind::Uninstall)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Protected(_)));

    h.wait_for_settled("argocd").await;
    assert_eq!(h.runner.uninstall_calls("argocd"), 0);
}

#[tokio::test]
async fn uninstall_with_installed_dependents_is_rejected() {
    let h = harness().await;
    h.mark_installed("k3s").await;
    h.mark_installed("nfs").await;

    let err = h
        .engine
        .request_intent("k3s", OperationKind::Uninstall)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependentsExist(_)));
    assert!(err.to_string().contains("nfs"));
}

#[tokio::test]
async fn uninstall_allowed_once_dependents_are_gone() {
    let h = harness().await;
    h.mark_installed("k3s").await;
    h.mark_installed("nfs").await;

    let ack = h
        .engine
        .request_intent("nfs", OperationKind::Uninstall)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);
    let record = h.wait_for_settled("nfs").await;
    assert_eq!(record.status, ComponentStatus::NotInstalled);

    let ack = h
        .engine
        .request_intent("k3s", OperationKind::Uninstall)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);
    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::NotInstalled);
}

#[tokio::test]
async fn restart_requires_installed_state() {
    let h = harness().await;

    let err = h
        .engine
        .request_intent("jellyfin", OperationKind::Restart)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.runner.restart_calls("jellyfin"), 0);
}

#[tokio::test]
async fn restart_of_installed_component_succeeds() {
    let h = harness().await;
    h.mark_installed("jellyfin").await;

    let ack = h
        .engine
        .request_intent("jellyfin", OperationKind::Restart)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);

    let record = h.wait_for_settled("jellyfin").await;
    assert_eq!(record.status, ComponentStatus::Installed);
    assert_eq!(h.runner.restart_calls("jellyfin"), 1);
}

#[tokio::test]
async fn restart_while_restarting_is_a_noop() {
    let h = harness().await;

    // A stale Restarting record with no live operation (e.g. mid-crash)
    h.store
        .upsert(&InstallRecord::transitional(
            "jellyfin",
            ComponentStatus::Restarting,
            40,
            "restarting",
        ))
        .await
        .unwrap();

    let ack = h
        .engine
        .request_intent("jellyfin", OperationKind::Restart)
        .await
        .unwrap();

    assert_eq!(ack.status, IntentStatus::AlreadyProcessing);
    assert_eq!(ack.record.status, ComponentStatus::Restarting);
    assert_eq!(h.runner.restart_calls("jellyfin"), 0);
}

// ============================================================================
// Operation slot: idempotent requests, no duplicate actions
// ============================================================================

#[tokio::test]
async fn repeated_install_while_in_flight_coalesces() {
    let h = harness_with(fast_config(), Duration::from_millis(200)).await;

    let first = h
        .engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(first.status, IntentStatus::Accepted);

    let second = h
        .engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(second.status, IntentStatus::AlreadyProcessing);
    let third = h
        .engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(third.status, IntentStatus::AlreadyProcessing);

    h.wait_for_settled("k3s").await;
    assert_eq!(h.runner.install_calls("k3s"), 1);
}

#[tokio::test]
async fn concurrent_installs_start_exactly_one_operation() {
    let h = harness_with(fast_config(), Duration::from_millis(200)).await;

    let (a, b) = tokio::join!(
        h.engine.request_intent("k3s", OperationKind::Install),
        h.engine.request_intent("k3s", OperationKind::Install),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let accepted = [a.status, b.status]
        .iter()
        .filter(|s| **s == IntentStatus::Accepted)
        .count();
    assert_eq!(accepted, 1, "exactly one of the two intents may start");
    assert_eq!(h.engine.operations_in_flight().await, 1);

    h.wait_for_settled("k3s").await;
    assert_eq!(h.runner.install_calls("k3s"), 1);
}

#[tokio::test]
async fn coalesced_ack_always_reports_the_in_flight_record() {
    let h = harness_with(fast_config(), Duration::from_millis(200)).await;

    let (a, b) = tokio::join!(
        h.engine.request_intent("k3s", OperationKind::Install),
        h.engine.request_intent("k3s", OperationKind::Install),
    );

    // Whichever intent loses the race must see the transitional record the
    // winner seeded, never a lazily probed terminal one.
    for ack in [a.unwrap(), b.unwrap()] {
        assert!(ack.record.status.is_transitional());
        assert!(ack.record.progress < 100);
    }

    h.wait_for_settled("k3s").await;
    assert_eq!(h.runner.install_calls("k3s"), 1);
}

#[tokio::test]
async fn operations_on_different_components_run_in_parallel() {
    let h = harness_with(fast_config(), Duration::from_millis(200)).await;
    h.mark_installed("k3s").await;

    let a = h
        .engine
        .request_intent("nfs", OperationKind::Install)
        .await
        .unwrap();
    let b = h
        .engine
        .request_intent("jellyfin", OperationKind::Install)
        .await
        .unwrap();

    assert_eq!(a.status, IntentStatus::Accepted);
    assert_eq!(b.status, IntentStatus::Accepted);
    assert_eq!(h.engine.operations_in_flight().await, 2);

    h.wait_for_settled("nfs").await;
    h.wait_for_settled("jellyfin").await;
}

// ============================================================================
// Full install scenario
// ============================================================================

#[tokio::test]
async fn install_scenario_reaches_installed_with_full_progress() {
    let h = harness().await;
    h.mark_installed("k3s").await;

    let ack = h
        .engine
        .request_intent("nfs", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);
    assert_eq!(ack.record.status, ComponentStatus::Installing);
    assert_eq!(ack.record.progress, 5);

    let record = h.wait_for_settled("nfs").await;
    assert_eq!(record.status, ComponentStatus::Installed);
    assert_eq!(record.progress, 100);
    assert!(record.message.contains("installed"));
    assert_eq!(h.runner.install_calls("nfs"), 1);
}

#[tokio::test]
async fn install_surfaces_discovered_access_urls() {
    let h = harness().await;
    h.runner
        .set_install_urls(&[("web", "http://10.0.0.5:30080")]);

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Installed);
    assert_eq!(
        record.access_urls.get("web").map(String::as_str),
        Some("http://10.0.0.5:30080")
    );
}

#[tokio::test]
async fn restart_preserves_access_urls() {
    let h = harness().await;
    h.mark_installed("k3s").await;
    h.runner
        .set_install_urls(&[("web", "http://10.0.0.5:30080")]);

    h.engine
        .request_intent("jellyfin", OperationKind::Install)
        .await
        .unwrap();
    let record = h.wait_for_settled("jellyfin").await;
    assert!(!record.access_urls.is_empty());

    h.engine
        .request_intent("jellyfin", OperationKind::Restart)
        .await
        .unwrap();

    let record = h.wait_for_settled("jellyfin").await;
    assert_eq!(record.status, ComponentStatus::Installed);
    assert_eq!(
        record.access_urls.get("web").map(String::as_str),
        Some("http://10.0.0.5:30080")
    );
}

// ============================================================================
// Retries and the Error state
// ============================================================================

#[tokio::test]
async fn failing_action_is_retried_then_errors() {
    let h = harness().await;
    h.runner.fail_installs.store(true, Ordering::SeqCst);

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Error);
    assert!(record.progress < 100);
    assert!(record.message.contains("failed"));
    assert_eq!(h.runner.install_calls("k3s"), 3);
}

#[tokio::test]
async fn verification_failure_is_retried_then_errors() {
    let h = harness().await;
    // Action "succeeds" but ground truth never changes
    h.runner.sync_prober.store(false, Ordering::SeqCst);

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Error);
    assert!(record.message.contains("verification failed"));
    assert_eq!(h.runner.install_calls("k3s"), 3);
}

#[tokio::test]
async fn unknown_probe_results_surface_after_retries() {
    let h = harness().await;
    h.runner.sync_prober.store(false, Ordering::SeqCst);
    h.prober
        .set("k3s", ObservedState::unknown("probe timed out"));

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Error);
    assert!(record.message.contains("probe timed out"));
}

#[tokio::test]
async fn error_state_is_reenterable_by_a_fresh_intent() {
    let h = harness().await;
    h.runner.fail_installs.store(true, Ordering::SeqCst);

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Error);

    // The engine does not auto-retry across the Error boundary; a new
    // intent does.
    h.runner.fail_installs.store(false, Ordering::SeqCst);
    let ack = h
        .engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Installed);
}

// ============================================================================
// Operation timeout
// ============================================================================

#[tokio::test]
async fn stuck_operation_times_out_and_releases_the_slot() {
    let mut config = fast_config();
    config.operation_timeout = Duration::from_millis(200);
    let h = harness_with(config, Duration::from_secs(60)).await;

    h.engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();

    let record = h.wait_for_settled("k3s").await;
    assert_eq!(record.status, ComponentStatus::Error);
    assert!(record.message.contains("timed out"));
    assert!(record.progress < 100);

    // Slot released: a fresh attempt is accepted
    assert_eq!(h.engine.operations_in_flight().await, 0);
    let ack = h
        .engine
        .request_intent("k3s", OperationKind::Install)
        .await
        .unwrap();
    assert_eq!(ack.status, IntentStatus::Accepted);
}

// ============================================================================
// Startup reconcile and lazy status
// ============================================================================

#[tokio::test]
async fn reconcile_seeds_records_from_ground_truth() {
    let h = harness().await;
    h.prober.set("k3s", ObservedState::present(true, "unit active"));

    h.engine.reconcile_all().await.unwrap();

    let k3s = h.store.get("k3s").await.unwrap().unwrap();
    assert_eq!(k3s.status, ComponentStatus::Installed);
    assert_eq!(k3s.progress, 100);

    // Everything else is absent in the fake cluster
    let nfs = h.store.get("nfs").await.unwrap().unwrap();
    assert_eq!(nfs.status, ComponentStatus::NotInstalled);
    assert_eq!(nfs.progress, 100);
}

#[tokio::test]
async fn reconcile_resolves_stale_transitional_records() {
    let h = harness().await;
    h.store
        .upsert(&InstallRecord::transitional(
            "jellyfin",
            ComponentStatus::Installing,
            40,
            "interrupted by crash",
        ))
        .await
        .unwrap();
    h.prober
        .set("jellyfin", ObservedState::unknown("api unreachable"));

    h.engine.reconcile_all().await.unwrap();

    let record = h.store.get("jellyfin").await.unwrap().unwrap();
    assert_eq!(record.status, ComponentStatus::Error);
    assert!(record.message.contains("interrupted"));
}

#[tokio::test]
async fn status_lazily_creates_a_record_on_first_probe() {
    let h = harness().await;

    assert!(h.store.get("jellyfin").await.unwrap().is_none());
    let record = h.engine.status("jellyfin").await.unwrap();

    assert_eq!(record.status, ComponentStatus::NotInstalled);
    assert_eq!(record.progress, 100);
    assert!(h.store.get("jellyfin").await.unwrap().is_some());
}

#[tokio::test]
async fn status_all_returns_catalog_order() {
    let h = harness().await;
    let records = h.engine.status_all().await.unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.component.as_str()).collect();
    assert_eq!(ids, vec!["k3s", "nfs", "argocd", "jellyfin"]);
}
