//! Connect phase: exactly-once state change, both-sides confirmation, and
//! synchronous rejection handling.

mod common;

use common::{fast_config, FaultPlan, LoopbackStack, PhaseStatus, SessionFixtures};
use gattcheck_harness::run_session;
use gattcheck_model::gatt;

/// A flaky stack that duplicates the CONNECTED notification must fail the
/// Connect phase with an assertion — the final state being correct does not
/// excuse the duplicate.
#[tokio::test]
async fn duplicate_connected_event_is_an_assertion_failure() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().duplicate_connected(1));
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(!report.passed());
    let failing = report.failing_phase().unwrap();
    assert_eq!(failing.phase, "Connect");
    assert_eq!(failing.status, PhaseStatus::Fail, "duplicate is not a timeout");
    assert!(
        failing.diagnostic.as_deref().unwrap_or_default().contains("onConnectionStateChange"),
        "diagnostic should name the duplicated event"
    );
    // Discover passed, Connect failed, nothing after.
    assert_eq!(report.phases.len(), 2);
}

/// A synchronously refused connect command is fatal immediately — reported
/// as a failure, not retried, not a timeout.
#[tokio::test]
async fn synchronous_rejection_fails_the_phase_without_retry() {
    let stack =
        LoopbackStack::with_faults(FaultPlan::default().reject_action(gatt::CONNECT_GATT));
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(!report.passed());
    let failing = report.failing_phase().unwrap();
    assert_eq!(failing.phase, "Connect");
    assert_eq!(failing.status, PhaseStatus::Fail);
    assert!(failing
        .diagnostic
        .as_deref()
        .unwrap_or_default()
        .contains("rejected"));
}

/// The service-added confirmation is checked by characteristic membership;
/// a clean stack passes Connect with both sides observing CONNECTED.
#[tokio::test]
async fn connect_verifies_server_confirmation_and_both_sides() {
    let stack = LoopbackStack::new();
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.phases[1].phase, "Connect");
    assert_eq!(report.phases[1].status, PhaseStatus::Pass);
}
