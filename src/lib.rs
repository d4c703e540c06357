#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Directive Sequencer
//!
//! The directive-sequencing core of a voice-assistant client. A cloud
//! service emits a continuous, ordered stream of command messages
//! ("directives"); this crate guarantees each one is delivered to the
//! correct local handler, in arrival order, filtered and cancelled according
//! to a conversational turn identifier (the "dialog request id").
//!
//! ## Architecture
//!
//! - [`routing::HandlerBindingTable`] — atomic batch-swapped mapping from
//!   `(namespace, name)` to handler-plus-policy bindings.
//! - [`routing::DirectiveRouter`] — resolves directives and forwards
//!   pre-handle / handle / cancel lifecycle calls to the bound handlers.
//! - `turn` (internal) — per-turn FIFO queue and in-flight state machine,
//!   drained by a dedicated worker task; cancellable wholesale.
//! - [`sequencer::DirectiveSequencer`] — the public coordinator: admission
//!   filtering, turn replacement, configuration pass-through, and blocking
//!   shutdown.
//!
//! ## Guarantees
//!
//! - Directives admitted to the same turn are pre-handled strictly in
//!   admission order; a blocking directive additionally gates the queue
//!   until it settles.
//! - A directive scoped to a non-active turn is rejected at admission.
//! - Changing the dialog request id cancels every non-terminal directive of
//!   the superseded turn.
//! - Nothing in this core is fatal: failures surface as boolean returns,
//!   lifecycle states, and diagnostic events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use directive_sequencer::config::SequencerConfig;
//! use directive_sequencer::directive::{Directive, NamespaceAndName};
//! use directive_sequencer::handler::{BlockingPolicy, HandlerConfiguration};
//! use directive_sequencer::DirectiveSequencer;
//! # use directive_sequencer::handler::{DirectiveHandler, DirectiveCompletion, HandlerFailure};
//! # struct SpeakerHandler;
//! # #[async_trait::async_trait]
//! # impl DirectiveHandler for SpeakerHandler {
//! #     async fn pre_handle(&self, _d: &Directive) -> Result<(), HandlerFailure> { Ok(()) }
//! #     async fn handle(&self, _d: &Directive, c: DirectiveCompletion) { c.completed(); }
//! #     async fn cancel(&self, _d: &Directive) {}
//! # }
//!
//! # async fn example() -> Result<(), directive_sequencer::SequencerError> {
//! let sequencer = DirectiveSequencer::new(SequencerConfig::default());
//!
//! let bindings = HandlerConfiguration::new().with_binding(
//!     NamespaceAndName::new("Speaker", "Play")?,
//!     Arc::new(SpeakerHandler),
//!     BlockingPolicy::Blocking,
//! );
//! assert!(sequencer.add_directive_handlers(&bindings));
//!
//! sequencer.set_dialog_request_id("turn-1");
//! sequencer.on_directive(
//!     Directive::new("Speaker", "Play", serde_json::json!({"volume": 40}))?
//!         .with_dialog_request_id("turn-1"),
//! );
//!
//! sequencer.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directive;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod routing;
pub mod sequencer;
mod turn;

pub use config::SequencerConfig;
pub use directive::{Directive, DirectiveState, NamespaceAndName};
pub use error::{Result, SequencerError};
pub use events::{EventPublisher, PublishedEvent, SequencerEvent};
pub use handler::{
    BlockingPolicy, DirectiveCompletion, DirectiveHandler, HandlerAndPolicy, HandlerConfiguration,
    HandlerFailure,
};
pub use routing::{DirectiveRouter, HandlerBindingTable};
pub use sequencer::DirectiveSequencer;
