//! Command invocation against a controlled device.

use crate::queue::EventQueue;
use gattcheck_model::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

/// Default per-command queue capacity: ample headroom over the per-phase
/// event volume so drop-oldest eviction stays a pathological case.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// Black-box command capability of one controlled device.
///
/// `invoke` issues the named action and wires `events` as the sink for the
/// push notifications this command produces. A malformed or unsupported call
/// is refused synchronously with [`HarnessError::Rejected`] — a fatal,
/// non-retryable condition distinct from "no event observed".
///
/// [`HarnessError::Rejected`]: gattcheck_model::HarnessError::Rejected
pub trait DeviceControl: Send + Sync {
    /// # Errors
    /// Returns [`HarnessError::Rejected`] on synchronous refusal.
    ///
    /// [`HarnessError::Rejected`]: gattcheck_model::HarnessError::Rejected
    fn invoke(&self, action: &str, args: &Value, events: &EventQueue) -> Result<()>;
}

/// One session participant: a fixed role plus its control capability.
#[derive(Clone)]
pub struct Device {
    role: Role,
    control: Arc<dyn DeviceControl>,
    queue_capacity: usize,
}

impl Device {
    #[must_use]
    pub fn new(role: Role, control: Arc<dyn DeviceControl>) -> Self {
        Self {
            role,
            control,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Issues `action` and returns the handle bound to the fresh event queue
    /// that will receive this command's notifications. Every issuance gets
    /// its own queue; a retried command is a new attempt observed from the
    /// point of issuance, never a silent resend into an old queue.
    ///
    /// # Errors
    /// Propagates the transport's synchronous rejection.
    pub fn invoke(&self, action: &str, args: Value) -> Result<CommandHandle> {
        let id = Ulid::new();
        let queue = EventQueue::new(format!("{}/{action}/{id}", self.role), self.queue_capacity);
        debug!(device = %self.role, action, callback = %id, "issuing command");
        self.control.invoke(action, &args, &queue)?;
        Ok(CommandHandle {
            id,
            action: action.to_string(),
            queue,
        })
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("role", &self.role)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

/// Handle for one issued command: its callback identity and event queue.
#[derive(Debug)]
pub struct CommandHandle {
    id: Ulid,
    action: String,
    queue: EventQueue,
}

impl CommandHandle {
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.id
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn events(&self) -> &EventQueue {
        &self.queue
    }
}
