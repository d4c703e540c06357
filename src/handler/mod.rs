//! # Directive Handler Capability
//!
//! The pluggable handler interface and its binding metadata. A handler is an
//! opaque capability with three lifecycle operations:
//!
//! - `pre_handle` — synchronous preparation, awaited inline by the turn
//!   worker; failure prevents `handle` from running.
//! - `handle` — starts the actual work and returns promptly; the handler
//!   later signals completion or failure through the [`DirectiveCompletion`]
//!   token it was given.
//! - `cancel` — best-effort cancellation acknowledgement for an in-flight
//!   directive; stopping the underlying work is the handler's business.
//!
//! Bindings pair a handler with a [`BlockingPolicy`] controlling whether
//! subsequent same-turn directives must wait for this one's completion.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::directive::{Directive, NamespaceAndName};

/// Failure reported by a handler's pre-handle or handle step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Handler failure: {description}")]
pub struct HandlerFailure {
    pub description: String,
}

impl HandlerFailure {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Per-binding rule for queue advancement within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPolicy {
    /// No later directive in the same turn begins pre-handle until this one
    /// reaches a terminal state.
    Blocking,
    /// Later directives may proceed while this one's handle step is still
    /// outstanding; only pre-handle ordering is guaranteed.
    NonBlocking,
}

impl fmt::Display for BlockingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::NonBlocking => write!(f, "non_blocking"),
        }
    }
}

impl std::str::FromStr for BlockingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(Self::Blocking),
            "non_blocking" => Ok(Self::NonBlocking),
            _ => Err(format!("Invalid blocking policy: {s}")),
        }
    }
}

/// Outcome carried by an asynchronous completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    Failed(HandlerFailure),
}

/// A completion signal funneled back to the owning turn processor.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    pub message_id: String,
    pub outcome: CompletionOutcome,
}

/// Consumable token a handler uses to report the outcome of its handle step.
///
/// The token is tied to the turn processor that dispatched the directive. If
/// that processor has since been discarded, the signal is dropped silently;
/// late completions never crash or corrupt sequencer state.
#[derive(Debug)]
pub struct DirectiveCompletion {
    message_id: String,
    tx: mpsc::UnboundedSender<CompletionSignal>,
}

impl DirectiveCompletion {
    pub(crate) fn new(message_id: String, tx: mpsc::UnboundedSender<CompletionSignal>) -> Self {
        Self { message_id, tx }
    }

    /// The message id of the directive this token belongs to.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Signal successful completion.
    pub fn completed(self) {
        self.send(CompletionOutcome::Completed);
    }

    /// Signal failure with a description.
    pub fn failed(self, description: impl Into<String>) {
        self.send(CompletionOutcome::Failed(HandlerFailure::new(description)));
    }

    fn send(self, outcome: CompletionOutcome) {
        let signal = CompletionSignal {
            message_id: self.message_id,
            outcome,
        };
        if let Err(err) = self.tx.send(signal) {
            debug!(
                message_id = %err.0.message_id,
                "Dropping completion signal for a discarded turn processor"
            );
        }
    }
}

/// The handler capability invoked by the routing gateway.
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    /// Synchronous preparation step. An error here fails the directive
    /// without `handle` ever running.
    async fn pre_handle(&self, directive: &Directive) -> Result<(), HandlerFailure>;

    /// Begin handling. Implementations should return promptly and signal the
    /// eventual outcome through `completion`.
    async fn handle(&self, directive: &Directive, completion: DirectiveCompletion);

    /// Best-effort cancellation of an in-flight directive.
    async fn cancel(&self, directive: &Directive);
}

/// A handler bound together with its blocking policy.
///
/// The table holds a shared reference to the handler; handler identity (for
/// the remove contract) is pointer identity, not value equality.
#[derive(Clone)]
pub struct HandlerAndPolicy {
    pub handler: Arc<dyn DirectiveHandler>,
    pub policy: BlockingPolicy,
}

impl HandlerAndPolicy {
    pub fn new(handler: Arc<dyn DirectiveHandler>, policy: BlockingPolicy) -> Self {
        Self { handler, policy }
    }

    /// Exact-match check used by batch removal: same handler instance and
    /// same policy.
    pub fn matches(&self, other: &HandlerAndPolicy) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler) && self.policy == other.policy
    }
}

impl fmt::Debug for HandlerAndPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerAndPolicy")
            .field("handler", &Arc::as_ptr(&self.handler))
            .field("policy", &self.policy)
            .finish()
    }
}

/// A transient batch of bindings submitted atomically to add or remove.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfiguration {
    bindings: HashMap<NamespaceAndName, HandlerAndPolicy>,
}

impl HandlerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of one binding.
    pub fn with_binding(
        mut self,
        key: NamespaceAndName,
        handler: Arc<dyn DirectiveHandler>,
        policy: BlockingPolicy,
    ) -> Self {
        self.bindings
            .insert(key, HandlerAndPolicy::new(handler, policy));
        self
    }

    pub fn insert(
        &mut self,
        key: NamespaceAndName,
        handler: Arc<dyn DirectiveHandler>,
        policy: BlockingPolicy,
    ) {
        self.bindings
            .insert(key, HandlerAndPolicy::new(handler, policy));
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &NamespaceAndName> {
        self.bindings.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NamespaceAndName, &HandlerAndPolicy)> {
        self.bindings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl DirectiveHandler for NoopHandler {
        async fn pre_handle(&self, _directive: &Directive) -> Result<(), HandlerFailure> {
            Ok(())
        }

        async fn handle(&self, _directive: &Directive, completion: DirectiveCompletion) {
            completion.completed();
        }

        async fn cancel(&self, _directive: &Directive) {}
    }

    #[test]
    fn test_blocking_policy_string_conversion() {
        assert_eq!(BlockingPolicy::Blocking.to_string(), "blocking");
        assert_eq!(
            "non_blocking".parse::<BlockingPolicy>().unwrap(),
            BlockingPolicy::NonBlocking
        );
        assert!("sometimes".parse::<BlockingPolicy>().is_err());
    }

    #[test]
    fn test_handler_identity_matching() {
        let h1: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);
        let h2: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let a = HandlerAndPolicy::new(h1.clone(), BlockingPolicy::Blocking);
        let same = HandlerAndPolicy::new(h1.clone(), BlockingPolicy::Blocking);
        let different_policy = HandlerAndPolicy::new(h1, BlockingPolicy::NonBlocking);
        let different_handler = HandlerAndPolicy::new(h2, BlockingPolicy::Blocking);

        assert!(a.matches(&same));
        assert!(!a.matches(&different_policy));
        assert!(!a.matches(&different_handler));
    }

    #[tokio::test]
    async fn test_completion_token_delivers_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = DirectiveCompletion::new("msg-1".to_string(), tx);
        token.completed();

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.message_id, "msg-1");
        assert_eq!(signal.outcome, CompletionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_late_completion_is_dropped_silently() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let token = DirectiveCompletion::new("msg-2".to_string(), tx);
        // Receiver gone; must not panic
        token.failed("too late");
    }
}
