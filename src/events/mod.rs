//! # Diagnostic Event System
//!
//! Broadcast-based diagnostic channel for the sequencing pipeline. Nothing in
//! the core propagates a fatal error; observers subscribe here to see
//! rejected admissions, unroutable directives, and lifecycle outcomes.
//!
//! Publishing succeeds whether or not anyone is subscribed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Diagnostic events emitted by the sequencing core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SequencerEvent {
    /// A directive was rejected at admission because its dialog-request-id
    /// did not match the active turn.
    DirectiveRejected {
        message_id: String,
        dialog_request_id: String,
        active_dialog_request_id: String,
    },
    /// No handler is bound for the directive's `(namespace, name)` key.
    UnroutableDirective {
        namespace: String,
        name: String,
        message_id: String,
    },
    /// The handler signalled successful completion.
    DirectiveCompleted { message_id: String },
    /// Pre-handle failed or the handler signalled failure.
    DirectiveFailed {
        message_id: String,
        description: String,
    },
    /// The directive was cancelled by turn supersession, handler removal,
    /// or shutdown.
    DirectiveCancelled { message_id: String },
}

/// An event together with its publication timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    #[serde(flatten)]
    pub event: SequencerEvent,
    pub published_at: DateTime<Utc>,
}

/// Shared publisher for diagnostic events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a diagnostic event. Having no subscribers is not an error.
    pub fn publish(&self, event: SequencerEvent) {
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };
        // send() fails only when there are no receivers, which is acceptable
        let _ = self.sender.send(published);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
