//! Bounded re-issuance of flakiness-prone start commands.

use gattcheck_model::{Event, HarnessError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded-attempt wrapper for commands the platform is known to silently
/// drop after certain state transitions.
///
/// Each attempt re-issues the triggering command (the closure must create a
/// fresh command handle, so every attempt's queue is independently observed)
/// and waits up to `attempt_window` for the success event. Only timeouts are
/// retried: a synchronous rejection or an assertion failure aborts
/// immediately, and a phase is never retried once inside its wait — only the
/// initial command issuance is.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_window: Duration,
}

impl RetryPolicy {
    /// # Panics
    /// Panics if `max_attempts` is zero.
    #[must_use]
    pub fn new(max_attempts: u32, attempt_window: Duration) -> Self {
        assert!(max_attempts > 0, "retry policy needs at least one attempt");
        Self {
            max_attempts,
            attempt_window,
        }
    }

    /// Runs `attempt` (called with the 1-based attempt number) until it
    /// yields an event or the attempts are exhausted.
    ///
    /// # Errors
    /// Returns [`HarnessError::Timeout`] naming `waiting_for` and the number
    /// of attempts after exactly `max_attempts` windows elapse; any
    /// non-timeout error is returned from the failing attempt unchanged.
    pub async fn run<F, Fut>(&self, waiting_for: &str, mut attempt: F) -> Result<Event>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Event>>,
    {
        for number in 1..=self.max_attempts {
            match attempt(number).await {
                Ok(event) => return Ok(event),
                Err(err) if !err.is_timeout() => return Err(err),
                Err(_) if number < self.max_attempts => {
                    warn!(
                        attempt = number,
                        waiting_for, "event not received within window, reissuing command"
                    );
                }
                Err(_) => {}
            }
        }
        Err(HarnessError::Timeout {
            waiting_for: waiting_for.to_string(),
            window: self.attempt_window,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattcheck_model::HarnessError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let event = policy
            .run("onStartSuccess", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Event::new("onStartSuccess", json!({}))) }
            })
            .await
            .unwrap();
        assert!(event.is("onStartSuccess"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reissues_after_timeout_then_succeeds() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let event = policy
            .run("onStartSuccess", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(HarnessError::timeout(
                            "onStartSuccess",
                            Duration::from_millis(10),
                        ))
                    } else {
                        Ok(Event::new("onStartSuccess", json!({})))
                    }
                }
            })
            .await
            .unwrap();
        assert!(event.is("onStartSuccess"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_exactly_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let err = policy
            .run("onStartSuccess", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Event, _>(HarnessError::timeout(
                        "onStartSuccess",
                        Duration::from_millis(5),
                    ))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly N attempts, not more");
        match err {
            HarnessError::Timeout {
                waiting_for,
                attempts,
                ..
            } => {
                assert_eq!(waiting_for, "onStartSuccess");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test]
    async fn rejection_is_never_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let err = policy
            .run("onStartSuccess", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Event, _>(HarnessError::rejected(
                        "bleStartAdvertising",
                        "malformed arguments",
                    ))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, HarnessError::Rejected { .. }));
    }
}
