//! Domain event system: decoupled observation of the turn cycle.
//!
//! The engine publishes an event when something interesting happens;
//! callers subscribe to react without coupling to the control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn cycle started
    TurnStarted {
        history_len: usize,
        contributor_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The backend was invoked
    BackendCalled {
        message_count: usize,
        tool_count: usize,
        flattened: bool,
        timestamp: DateTime<Utc>,
    },

    /// The backend produced an assistant reply
    ReplyGenerated {
        tool_call_count: usize,
        reply_index: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The turn exited early on the caller's cancellation signal
    TurnCancelled {
        partial_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// The turn cycle finished
    TurnCompleted {
        reply_count: u32,
        new_message_count: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
