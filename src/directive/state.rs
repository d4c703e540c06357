use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a directive inside its turn processor.
///
/// `Queued → PreHandling → Handling → {Completed | Failed | Cancelled}`.
/// Cancellation is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveState {
    /// Admitted, waiting for its turn at the head of the queue
    Queued,
    /// The handler's pre-handle step is running
    PreHandling,
    /// The handler's handle step has started; completion is asynchronous
    Handling,
    /// Handler signalled successful completion
    Completed,
    /// Pre-handle failed, no handler was bound, or handle signalled failure
    Failed,
    /// Cancelled by turn supersession, handler removal, or shutdown
    Cancelled,
}

impl DirectiveState {
    /// Check if this is a terminal state (the directive leaves in-flight tracking)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if a handler call is currently outstanding for this directive
    pub fn is_active(&self) -> bool {
        matches!(self, Self::PreHandling | Self::Handling)
    }

    /// Whether the lifecycle permits a transition from `self` to `next`.
    pub fn can_transition_to(&self, next: DirectiveState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Queued => false,
            Self::PreHandling => matches!(self, Self::Queued),
            Self::Handling => matches!(self, Self::PreHandling),
            Self::Completed => matches!(self, Self::Handling),
            Self::Failed => matches!(self, Self::PreHandling | Self::Handling),
            Self::Cancelled => true,
        }
    }
}

impl Default for DirectiveState {
    fn default() -> Self {
        Self::Queued
    }
}

impl fmt::Display for DirectiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::PreHandling => write!(f, "pre_handling"),
            Self::Handling => write!(f, "handling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for DirectiveState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "pre_handling" => Ok(Self::PreHandling),
            "handling" => Ok(Self::Handling),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid directive state: {s}")),
        }
    }
}
