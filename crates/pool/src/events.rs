//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted during pool operations and an
//! [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::managed::InstanceId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool operations.
///
/// Subscribers receive cloned copies via [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A new instance was created by the factory.
    Created {
        /// The new instance.
        instance_id: InstanceId,
    },
    /// An instance was lent out.
    Acquired {
        /// The lent instance.
        instance_id: InstanceId,
        /// Time spent inside `acquire`, including any bounded wait.
        waited: Duration,
    },
    /// An instance was returned to the idle set.
    Released {
        /// The returned instance.
        instance_id: InstanceId,
        /// How long the instance was held by the caller.
        usage_duration: Duration,
    },
    /// An acquire gave up because every instance stayed checked out.
    Exhausted {
        /// How long the caller waited.
        waited: Duration,
    },
    /// An instance was torn down.
    CleanedUp {
        /// The destroyed instance.
        instance_id: InstanceId,
        /// Why the instance was destroyed.
        reason: CleanupReason,
    },
    /// Tearing down an instance failed; the instance is gone from the pool
    /// regardless.
    CleanupFailed {
        /// The instance whose teardown failed.
        instance_id: InstanceId,
        /// Why the instance was being destroyed.
        reason: CleanupReason,
        /// Human-readable error description.
        error: String,
    },
    /// The pool was shut down.
    Closed,
}

// ---------------------------------------------------------------------------
// CleanupReason
// ---------------------------------------------------------------------------

/// Reason an instance was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// The validator reported the idle instance as unhealthy.
    ValidationFailed,
    /// The validator itself failed on the idle instance.
    ValidationError,
    /// The pool is shutting down.
    Shutdown,
    /// Construction failed part-way and rolled back.
    Aborted,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the pool).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// Subscribers that fall more than `buffer_size` events behind receive
    /// a `Lagged` error and skip ahead.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // Err only means there are no active receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
