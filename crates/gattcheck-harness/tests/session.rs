//! End-to-end session runs: the literal reference scenario, report
//! rendering, and the session-level retry layer.

mod common;

use common::{
    fast_config, run_session_with_retries, FaultPlan, LoopbackStack, PhaseStatus, SessionConfig,
    SessionFixtures, SessionRetry,
};
use gattcheck_harness::run_session;
use gattcheck_model::fixtures::TEST_SERVICE_UUID;

/// Canonical end-to-end scenario: fixture service UUID `0000fe23-…`, a fixed
/// 16-char advertise payload, and the default 20-second scan window. All six
/// phases pass in order.
#[tokio::test]
async fn end_to_end_session_with_literal_fixture_payloads() {
    let stack = LoopbackStack::new();
    let fixtures = SessionFixtures::default()
        .with_advertise_data("AbCdEfGh12345678")
        .with_scan_response_data("Qr5tUvWx87654321");
    assert_eq!(fixtures.service.uuid, TEST_SERVICE_UUID);

    // Default windows (20 s scan, 60 s connect) — the passing path never
    // waits, so the full-size windows cost nothing here.
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        fixtures,
        SessionConfig::default(),
    )
    .await;

    assert!(report.passed(), "{}", report.generate_text());
    let names: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(
        names,
        vec!["Discover", "Connect", "DiscoverServices", "Read", "Write", "Disconnect"]
    );
    assert!(report.phases.iter().all(|p| p.status == PhaseStatus::Pass));
}

/// The duplicate-connected scenario end to end: the session must report an
/// assertion failure at Connect, and no later phase may run.
#[tokio::test]
async fn end_to_end_duplicate_connected_halts_at_connect() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().duplicate_connected(1));
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(!report.passed());
    let names: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(names, vec!["Discover", "Connect"]);
    assert_eq!(report.phases[1].status, PhaseStatus::Fail);
}

/// Text rendering names the verdict and every phase; JSON serializes the
/// ordered phase list.
#[tokio::test]
async fn report_renders_text_and_json() {
    let stack = LoopbackStack::new();
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    let text = report.generate_text();
    assert!(text.contains("Overall: PASS"));
    for phase in &report.phases {
        assert!(text.contains(&phase.phase));
    }
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["phases"].as_array().unwrap().len(), 6);
}

/// Session-level retry is a layer above the phase-level policy: with only
/// one advertise attempt per session, the first session times out, and the
/// rerun succeeds once the dropped command is out of the way.
#[tokio::test]
async fn session_retry_reruns_a_failed_session_from_scratch() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().drop_advertise_starts(1));
    let initiator = stack.initiator();
    let receiver = stack.receiver();
    let config = fast_config().with_max_start_attempts(1);

    let single = run_session(
        initiator.clone(),
        receiver.clone(),
        SessionFixtures::default(),
        config,
    )
    .await;
    assert!(!single.passed(), "first session must fail without the outer retry");

    let stack = LoopbackStack::with_faults(FaultPlan::default().drop_advertise_starts(1));
    let report = run_session_with_retries(
        &stack.initiator(),
        &stack.receiver(),
        &SessionFixtures::default(),
        config,
        SessionRetry { max_attempts: 2 },
    )
    .await;
    assert!(report.passed(), "{}", report.generate_text());
}
