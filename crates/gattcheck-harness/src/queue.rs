//! Per-callback bounded event buffer with blocking predicate waits.

use gattcheck_model::{Event, HarnessError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// Number of events retained for failure diagnostics, independent of the
/// live buffer.
const HISTORY_KEEP: usize = 16;

/// Bounded drop-oldest buffer for one (device, callback-identity) pair.
///
/// Thread-safe and clone-friendly: delivery contexts push while the single
/// coordinating task waits. Eviction under back-pressure can mask a real
/// protocol event and cause a false failure, so it is logged and counted;
/// size the capacity generously relative to expected per-phase event volume.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

struct Inner {
    label: String,
    capacity: usize,
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    events: VecDeque<Event>,
    history: VecDeque<Event>,
    evicted: u64,
}

impl EventQueue {
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        assert!(capacity > 0, "event queue capacity must be non-zero");
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                capacity,
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Appends an event, evicting the oldest entry at capacity.
    pub fn push(&self, event: Event) {
        {
            let mut state = self.inner.state.lock().expect("event queue lock poisoned");
            if state.events.len() == self.inner.capacity {
                if let Some(dropped) = state.events.pop_front() {
                    state.evicted += 1;
                    warn!(
                        queue = %self.inner.label,
                        event = %dropped.name,
                        "queue at capacity, evicting oldest event"
                    );
                }
            }
            state.history.push_back(event.clone());
            if state.history.len() > HISTORY_KEEP {
                state.history.pop_front();
            }
            state.events.push_back(event);
        }
        self.inner.notify.notify_waiters();
    }

    /// Blocks until a queued or newly-arriving event satisfies `predicate`,
    /// consuming the match so later queries cannot re-match it.
    ///
    /// # Errors
    /// Returns [`HarnessError::Timeout`] naming `waiting_for` when `window`
    /// elapses first.
    pub async fn wait_for_match<P>(
        &self,
        waiting_for: &str,
        window: Duration,
        mut predicate: P,
    ) -> Result<Event>
    where
        P: FnMut(&Event) -> bool,
    {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before the check so a push between the check
            // and the await cannot be missed.
            notified.as_mut().enable();
            if let Some(event) = self.take_match(&mut predicate) {
                return Ok(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(HarnessError::timeout(waiting_for, window));
            }
        }
    }

    /// Removes and returns all queued events named `name`, non-blocking.
    ///
    /// Used for exactly-once checks: wait for one occurrence, then drain to
    /// prove no concurrent extras existed.
    pub fn drain_all(&self, name: &str) -> Vec<Event> {
        let mut state = self.inner.state.lock().expect("event queue lock poisoned");
        let mut drained = Vec::new();
        let mut kept = VecDeque::with_capacity(state.events.len());
        for event in state.events.drain(..) {
            if event.is(name) {
                drained.push(event);
            } else {
                kept.push_back(event);
            }
        }
        state.events = kept;
        drained
    }

    /// Snapshot of recently observed events (matched or not) for diagnostics.
    #[must_use]
    pub fn recent(&self) -> Vec<Event> {
        let state = self.inner.state.lock().expect("event queue lock poisoned");
        state.history.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.state.lock().expect("event queue lock poisoned");
        state.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of events lost to drop-oldest eviction so far.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        let state = self.inner.state.lock().expect("event queue lock poisoned");
        state.evicted
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    fn take_match<P>(&self, predicate: &mut P) -> Option<Event>
    where
        P: FnMut(&Event) -> bool,
    {
        let mut state = self.inner.state.lock().expect("event queue lock poisoned");
        let index = state.events.iter().position(|e| predicate(e))?;
        state.events.remove(index)
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("label", &self.inner.label)
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
