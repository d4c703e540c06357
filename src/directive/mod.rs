//! # Directive Data Model
//!
//! Core message types for the sequencing pipeline: the `(namespace, name)`
//! routing key, the immutable [`Directive`] message itself, and the
//! per-directive lifecycle state machine.
//!
//! ## Usage
//!
//! ```rust
//! use directive_sequencer::directive::Directive;
//!
//! # fn main() -> Result<(), directive_sequencer::SequencerError> {
//! let directive = Directive::new("Speaker", "Play", serde_json::json!({"volume": 40}))?
//!     .with_dialog_request_id("turn-1");
//!
//! assert_eq!(directive.namespace(), "Speaker");
//! assert!(!directive.is_unscoped());
//! # Ok(())
//! # }
//! ```

pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SequencerError};

pub use state::DirectiveState;

/// Routing key for directives: an immutable `(namespace, name)` pair with
/// value equality and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespaceAndName {
    namespace: String,
    name: String,
}

impl NamespaceAndName {
    /// Create a new routing key. Both components must be non-empty.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace.is_empty() {
            return Err(SequencerError::invalid_directive(
                "namespace must not be empty",
            ));
        }
        if name.is_empty() {
            return Err(SequencerError::invalid_directive("name must not be empty"));
        }

        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NamespaceAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// An inbound command message from the cloud service.
///
/// Directives are immutable once constructed. A directive with an empty
/// dialog-request-id is *unscoped*: it is admitted regardless of the
/// sequencer's active turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    namespace_and_name: NamespaceAndName,
    message_id: String,
    #[serde(default)]
    dialog_request_id: String,
    payload: serde_json::Value,
}

impl Directive {
    /// Create an unscoped directive with a generated message id.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self> {
        Ok(Self {
            namespace_and_name: NamespaceAndName::new(namespace, name)?,
            message_id: Uuid::new_v4().to_string(),
            dialog_request_id: String::new(),
            payload,
        })
    }

    /// Scope this directive to a conversational turn.
    pub fn with_dialog_request_id(mut self, dialog_request_id: impl Into<String>) -> Self {
        self.dialog_request_id = dialog_request_id.into();
        self
    }

    /// Override the generated message id (transports carry their own ids).
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn namespace_and_name(&self) -> &NamespaceAndName {
        &self.namespace_and_name
    }

    pub fn namespace(&self) -> &str {
        self.namespace_and_name.namespace()
    }

    pub fn name(&self) -> &str {
        self.namespace_and_name.name()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn dialog_request_id(&self) -> &str {
        &self.dialog_request_id
    }

    /// Whether this directive matches any active turn (empty id).
    pub fn is_unscoped(&self) -> bool {
        self.dialog_request_id.is_empty()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[messageId={}, dialogRequestId={}]",
            self.namespace_and_name, self.message_id, self.dialog_request_id
        )
    }
}
