//! # Directive Sequencer
//!
//! The public coordinator of the sequencing core. It accepts incoming
//! directives, filters them against the active dialog-request-id, forwards
//! handler configuration batches to the binding table, replaces the active
//! turn processor when the turn changes, and implements blocking shutdown.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use directive_sequencer::config::SequencerConfig;
//! use directive_sequencer::directive::{Directive, NamespaceAndName};
//! use directive_sequencer::handler::{BlockingPolicy, HandlerConfiguration};
//! use directive_sequencer::sequencer::DirectiveSequencer;
//! # use directive_sequencer::handler::{DirectiveHandler, DirectiveCompletion, HandlerFailure};
//! # struct Player;
//! # #[async_trait::async_trait]
//! # impl DirectiveHandler for Player {
//! #     async fn pre_handle(&self, _d: &Directive) -> Result<(), HandlerFailure> { Ok(()) }
//! #     async fn handle(&self, _d: &Directive, c: DirectiveCompletion) { c.completed(); }
//! #     async fn cancel(&self, _d: &Directive) {}
//! # }
//!
//! # async fn example() -> Result<(), directive_sequencer::SequencerError> {
//! let sequencer = DirectiveSequencer::new(SequencerConfig::default());
//!
//! let configuration = HandlerConfiguration::new().with_binding(
//!     NamespaceAndName::new("Speaker", "Play")?,
//!     Arc::new(Player),
//!     BlockingPolicy::Blocking,
//! );
//! assert!(sequencer.add_directive_handlers(&configuration));
//!
//! sequencer.set_dialog_request_id("turn-1");
//! let directive = Directive::new("Speaker", "Play", serde_json::json!({}))?
//!     .with_dialog_request_id("turn-1");
//! assert!(sequencer.on_directive(directive));
//!
//! sequencer.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SequencerConfig;
use crate::directive::Directive;
use crate::events::{EventPublisher, PublishedEvent, SequencerEvent};
use crate::handler::HandlerConfiguration;
use crate::routing::{DirectiveRouter, HandlerBindingTable};
use crate::turn::TurnProcessor;

/// Turn bookkeeping guarded by the sequencer's state lock.
///
/// The dialog-request-id is a single-writer value: only
/// `set_dialog_request_id` replaces it, tagged with a monotonically
/// increasing turn version.
struct SequencerState {
    dialog_request_id: String,
    turn_version: u64,
    active: Arc<TurnProcessor>,
    /// Superseded processors that may still have handler callbacks pending.
    /// Settled processors are pruned on every turn change; stragglers are
    /// settled by shutdown.
    retired: Vec<Arc<TurnProcessor>>,
}

/// The directive-sequencing coordinator.
///
/// Admission (`on_directive`), configuration edits, and turn changes may be
/// invoked from arbitrary threads. `on_directive` and
/// `set_dialog_request_id` never block on handler completion; `shutdown` is
/// the only blocking call.
pub struct DirectiveSequencer {
    table: Arc<HandlerBindingTable>,
    router: Arc<DirectiveRouter>,
    events: EventPublisher,
    config: SequencerConfig,
    state: Mutex<SequencerState>,
    shut_down: AtomicBool,
}

impl DirectiveSequencer {
    /// Create a sequencer with the given configuration. The initial active
    /// turn is unscoped (empty dialog-request-id). Must be called from
    /// within a Tokio runtime.
    pub fn new(config: SequencerConfig) -> Self {
        let table = Arc::new(HandlerBindingTable::new());
        let events = EventPublisher::new(config.event_channel_capacity);
        let router = Arc::new(DirectiveRouter::new(Arc::clone(&table), events.clone()));

        let active = Arc::new(TurnProcessor::new(
            String::new(),
            Arc::clone(&router),
            events.clone(),
        ));

        Self {
            table,
            router,
            events,
            config,
            state: Mutex::new(SequencerState {
                dialog_request_id: String::new(),
                turn_version: 0,
                active,
                retired: Vec::new(),
            }),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Install a batch of handler bindings. Refused wholesale if any key is
    /// already bound.
    pub fn add_directive_handlers(&self, configuration: &HandlerConfiguration) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            warn!("Ignoring handler configuration: sequencer is shut down");
            return false;
        }
        self.table.add(configuration)
    }

    /// Remove a batch of handler bindings. Refused wholesale unless every
    /// listed binding matches exactly. On success, directives already in
    /// flight for the removed bindings are cancelled.
    pub fn remove_directive_handlers(&self, configuration: &HandlerConfiguration) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            warn!("Ignoring handler configuration: sequencer is shut down");
            return false;
        }
        if !self.table.remove(configuration) {
            return false;
        }

        let keys: Vec<_> = configuration.keys().cloned().collect();
        let state = self.state.lock();
        state.active.cancel_bindings(keys.clone());
        for retired in &state.retired {
            retired.cancel_bindings(keys.clone());
        }
        true
    }

    /// Set the active dialog-request-id.
    ///
    /// If a turn processor is active for a different, non-empty previous id,
    /// it is cancelled and discarded; an empty previous turn is drained
    /// instead, letting unscoped in-flight work settle naturally. A fresh
    /// processor is created for the new id. Setting the same id again is a
    /// no-op. This call never blocks on handler completion.
    pub fn set_dialog_request_id(&self, dialog_request_id: impl Into<String>) {
        if self.shut_down.load(Ordering::Acquire) {
            warn!("Ignoring dialog request id change: sequencer is shut down");
            return;
        }
        let dialog_request_id = dialog_request_id.into();

        let mut state = self.state.lock();
        if state.dialog_request_id == dialog_request_id {
            debug!(
                dialog_request_id = %dialog_request_id,
                "Dialog request id unchanged"
            );
            return;
        }

        let previous_id =
            std::mem::replace(&mut state.dialog_request_id, dialog_request_id.clone());
        state.turn_version += 1;

        let replacement = Arc::new(TurnProcessor::new(
            dialog_request_id.clone(),
            Arc::clone(&self.router),
            self.events.clone(),
        ));
        let superseded = std::mem::replace(&mut state.active, replacement);

        if previous_id.is_empty() {
            superseded.drain();
        } else {
            superseded.cancel();
        }

        state.retired.retain(|turn| !turn.is_settled());
        state.retired.push(superseded);

        info!(
            previous_dialog_request_id = %previous_id,
            dialog_request_id = %dialog_request_id,
            turn_version = state.turn_version,
            "Active dialog request id changed"
        );
    }

    /// Admit a directive for eventual processing.
    ///
    /// Returns `false` (a silent drop from the transport's perspective) if
    /// the directive is scoped to a turn other than the active one, or if
    /// the sequencer has been shut down. Acceptance means "queued in arrival
    /// order", not "handled"; this call never suspends.
    pub fn on_directive(&self, directive: Directive) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            debug!(
                message_id = directive.message_id(),
                "Rejecting directive: sequencer is shut down"
            );
            return false;
        }

        let state = self.state.lock();

        if !directive.is_unscoped() && directive.dialog_request_id() != state.dialog_request_id {
            debug!(
                message_id = directive.message_id(),
                dialog_request_id = directive.dialog_request_id(),
                active_dialog_request_id = %state.dialog_request_id,
                "Rejecting directive: dialog request id mismatch"
            );
            self.events.publish(SequencerEvent::DirectiveRejected {
                message_id: directive.message_id().to_string(),
                dialog_request_id: directive.dialog_request_id().to_string(),
                active_dialog_request_id: state.dialog_request_id.clone(),
            });
            return false;
        }

        state.active.enqueue(directive)
    }

    /// Stop accepting directives, give in-flight handler callbacks a grace
    /// period to settle, then force-cancel whatever remains. Idempotent;
    /// subsequent calls return immediately.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Sequencer already shut down");
            return;
        }
        info!("Shutting down directive sequencer");

        let processors: Vec<Arc<TurnProcessor>> = {
            let mut state = self.state.lock();
            let mut all = std::mem::take(&mut state.retired);
            all.push(Arc::clone(&state.active));
            all
        };

        for processor in &processors {
            processor.drain();
        }

        let deadline = Instant::now() + self.config.shutdown_grace_period();
        let settled = join_all(
            processors
                .iter()
                .map(|processor| processor.wait_settled(deadline)),
        )
        .await;

        if settled.iter().any(|ok| !ok) {
            for processor in &processors {
                if !processor.is_settled() {
                    warn!(
                        dialog_request_id = processor.dialog_request_id(),
                        "Shutdown grace period elapsed; force-cancelling remaining directives"
                    );
                    processor.cancel();
                }
            }
        }

        join_all(
            processors
                .iter()
                .map(|processor| processor.join(self.config.force_terminate_timeout())),
        )
        .await;

        info!("Directive sequencer shut down");
    }

    /// The currently active dialog-request-id (empty when unscoped).
    pub fn active_dialog_request_id(&self) -> String {
        self.state.lock().dialog_request_id.clone()
    }

    /// Subscribe to the diagnostic event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    /// The handler binding table, for registrants that need to re-derive
    /// the current binding set after a refused batch.
    pub fn binding_table(&self) -> &Arc<HandlerBindingTable> {
        &self.table
    }
}

impl std::fmt::Debug for DirectiveSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DirectiveSequencer")
            .field("dialog_request_id", &state.dialog_request_id)
            .field("turn_version", &state.turn_version)
            .field("retired_turns", &state.retired.len())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}
