//! Two-actor asynchronous GATT conformance harness.
//!
//! Drives an initiator (scanner / GATT client) and a receiver (advertiser /
//! GATT server) through discovery, connection, service discovery,
//! characteristic read/write, and teardown, reconciling the two independently
//! scheduled event streams into a single pass/fail [`SessionReport`].
//!
//! Bounded retries ([`RetryPolicy`]) mask the documented flakiness of start
//! commands without masking real protocol violations — a duplicate connected
//! notification or a mismatched payload always fails the session. The
//! [`loopback`] module provides an in-process scripted device pair so the
//! harness can be exercised without real radios.
//!
//! [`SessionReport`]: gattcheck_model::SessionReport

#![warn(clippy::pedantic)]

pub mod device;
pub mod loopback;
pub mod queue;
pub mod retry;
pub mod session;

pub use device::{CommandHandle, Device, DeviceControl, Role};
pub use loopback::{FaultPlan, LoopbackStack};
pub use queue::EventQueue;
pub use retry::RetryPolicy;
pub use session::{
    run_session, run_session_with_retries, Session, SessionConfig, SessionRetry, SessionState,
};
