#![allow(unused_imports, dead_code)]

pub use gattcheck_harness::{
    run_session, run_session_with_retries, Device, EventQueue, FaultPlan, LoopbackStack, Role,
    SessionConfig, SessionRetry,
};
pub use gattcheck_model::{fixtures, PhaseStatus, SessionFixtures};

use std::time::Duration;

/// Shrinks every wait window so failure paths do not stall the suite; the
/// loopback pair delivers events immediately, so passing paths never wait.
#[must_use]
pub fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_advertise_start_window(Duration::from_millis(40))
        .with_scan_window(Duration::from_millis(80))
        .with_connection_timeout(Duration::from_millis(80))
        .with_operation_timeout(Duration::from_millis(80))
}
