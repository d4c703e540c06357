//! # Directive Router
//!
//! The routing gateway between the turn processor and the opaque handlers.
//! Resolution consults the binding table; lifecycle calls are forwarded with
//! structured tracing. An unresolved lookup drops the directive and surfaces
//! an `UnroutableDirective` diagnostic event.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::directive::Directive;
use crate::events::{EventPublisher, SequencerEvent};
use crate::handler::{DirectiveCompletion, DirectiveHandler, HandlerAndPolicy, HandlerFailure};
use crate::routing::HandlerBindingTable;

/// Forwards directive lifecycle calls to the bound handlers.
#[derive(Debug, Clone)]
pub struct DirectiveRouter {
    table: Arc<HandlerBindingTable>,
    events: EventPublisher,
}

impl DirectiveRouter {
    pub fn new(table: Arc<HandlerBindingTable>, events: EventPublisher) -> Self {
        Self { table, events }
    }

    /// The binding table this router consults.
    pub fn table(&self) -> &Arc<HandlerBindingTable> {
        &self.table
    }

    /// Resolve a directive to its binding. An unbound `(namespace, name)`
    /// key emits a diagnostic event and yields `None`; the caller drops the
    /// directive.
    pub fn resolve(&self, directive: &Directive) -> Option<HandlerAndPolicy> {
        match self.table.lookup(directive.namespace_and_name()) {
            Some(binding) => Some(binding),
            None => {
                warn!(
                    namespace = directive.namespace(),
                    name = directive.name(),
                    message_id = directive.message_id(),
                    "No handler bound for directive; dropping"
                );
                self.events.publish(SequencerEvent::UnroutableDirective {
                    namespace: directive.namespace().to_string(),
                    name: directive.name().to_string(),
                    message_id: directive.message_id().to_string(),
                });
                None
            }
        }
    }

    /// Invoke the handler's pre-handle step.
    pub async fn pre_handle(
        &self,
        directive: &Directive,
        handler: &Arc<dyn DirectiveHandler>,
    ) -> Result<(), HandlerFailure> {
        debug!(
            message_id = directive.message_id(),
            directive = %directive,
            "Invoking pre-handle"
        );
        let result = handler.pre_handle(directive).await;
        if let Err(failure) = &result {
            warn!(
                message_id = directive.message_id(),
                description = %failure.description,
                "Pre-handle failed"
            );
        }
        result
    }

    /// Invoke the handler's handle step. Completion arrives asynchronously
    /// through the supplied token.
    pub async fn handle(
        &self,
        directive: &Directive,
        handler: &Arc<dyn DirectiveHandler>,
        completion: DirectiveCompletion,
    ) {
        debug!(
            message_id = directive.message_id(),
            directive = %directive,
            "Invoking handle"
        );
        handler.handle(directive, completion).await;
    }

    /// Invoke the handler's best-effort cancellation step.
    pub async fn cancel(&self, directive: &Directive, handler: &Arc<dyn DirectiveHandler>) {
        debug!(
            message_id = directive.message_id(),
            directive = %directive,
            "Invoking cancel"
        );
        handler.cancel(directive).await;
    }
}
