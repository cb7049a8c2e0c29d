//! Session error types.

use std::fmt;

use crate::providers::ProviderError;
use crate::session::state::StateKind;

/// Why the last generation call failed, kept on `Idle` for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    /// The provider refused or stopped generation.
    SafetyBlocked { reason: String },
    /// Transport, format, or unexpected-response failure.
    ProviderFailure {
        message: String,
        detail: Option<String>,
    },
}

impl GenerationFailure {
    pub fn is_safety_block(&self) -> bool {
        matches!(self, GenerationFailure::SafetyBlocked { .. })
    }
}

impl From<ProviderError> for GenerationFailure {
    fn from(err: ProviderError) -> Self {
        if err.is_safety_block() {
            GenerationFailure::SafetyBlocked {
                reason: err.message,
            }
        } else {
            GenerationFailure::ProviderFailure {
                message: format!("{} ({})", err.message, err.kind),
                detail: err.details,
            }
        }
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationFailure::SafetyBlocked { reason } => {
                write!(f, "Generation blocked ({reason}). Try a different prompt.")
            }
            GenerationFailure::ProviderFailure { message, .. } => {
                write!(f, "Generation failed: {message}")
            }
        }
    }
}

impl std::error::Error for GenerationFailure {}

/// An intent was sent in a state that does not accept it.
///
/// This is a caller bug, not a runtime condition: the session is left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub intent: &'static str,
    pub state: StateKind,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} while {}", self.intent, self.state)
    }
}

impl std::error::Error for TransitionError {}
