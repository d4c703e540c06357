//! # Sequencer Error Types
//!
//! Structured error handling for the directive sequencing core using thiserror
//! for typed errors instead of `Box<dyn Error>` patterns.
//!
//! Note that most runtime outcomes in this crate are deliberately *not* errors:
//! rejected admissions and refused configuration batches are reported through
//! boolean returns, and handler failures surface as directive lifecycle states
//! and diagnostic events. The types here cover the remaining, caller-visible
//! failure modes: invalid inputs and configuration problems.

use thiserror::Error;

use crate::config::ConfigurationError;

/// Top-level error type for the directive sequencing core.
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid directive: {message}")]
    InvalidDirective { message: String },
}

impl SequencerError {
    /// Create an invalid-directive error
    pub fn invalid_directive(message: impl Into<String>) -> Self {
        Self::InvalidDirective {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
