//! Discover phase: advertising under retry, scan-record matching, and the
//! separate scan-response check.

mod common;

use common::{fast_config, FaultPlan, LoopbackStack, PhaseStatus, SessionFixtures};
use gattcheck_harness::run_session;

/// The receiver's advertisement and scan response are both found by the
/// scanner, and the whole session runs clean.
#[tokio::test]
async fn discover_finds_advertisement_and_scan_response() {
    let stack = LoopbackStack::new();
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.phases[0].phase, "Discover");
    assert_eq!(report.phases[0].status, PhaseStatus::Pass);
}

/// The platform may silently drop the first advertise command; the retry
/// policy reissues it and the session still passes.
#[tokio::test]
async fn discover_recovers_from_dropped_first_advertise_command() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().drop_advertise_starts(1));
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config().with_max_start_attempts(2),
    )
    .await;
    assert!(report.passed(), "{}", report.generate_text());
}

/// When advertising never starts, the bounded retry exhausts and the session
/// reports a Discover timeout without running later phases.
#[tokio::test]
async fn discover_times_out_when_advertising_never_starts() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().drop_advertise_starts(u32::MAX));
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config().with_max_start_attempts(2),
    )
    .await;
    assert!(!report.passed());
    assert_eq!(report.phases.len(), 1, "no phase may run after a failure");
    let failing = report.failing_phase().unwrap();
    assert_eq!(failing.phase, "Discover");
    assert_eq!(failing.status, PhaseStatus::Timeout);
}

/// Advertise data and scan-response data are verified as two separate
/// payloads: a missing scan response fails Discover even though the
/// advertisement itself was found.
#[tokio::test]
async fn discover_fails_without_scan_response_entry() {
    let stack = LoopbackStack::with_faults(FaultPlan::default().omit_scan_response());
    let report = run_session(
        stack.initiator(),
        stack.receiver(),
        SessionFixtures::default(),
        fast_config(),
    )
    .await;
    assert!(!report.passed());
    let failing = report.failing_phase().unwrap();
    assert_eq!(failing.phase, "Discover");
    assert_eq!(failing.status, PhaseStatus::Fail);
}
