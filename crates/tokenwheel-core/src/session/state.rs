//! Session state shapes.

use std::fmt;
use std::sync::Arc;

use crate::generation::{Distribution, GenerationId, GenerationResult};
use crate::session::effects::TicketId;
use crate::session::error::GenerationFailure;
use crate::session::speculation::SpeculationStatus;

/// Tagged session state. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No active generation. Holds the last failure, if any.
    Idle { error: Option<GenerationFailure> },
    /// Waiting on the provider call identified by `awaiting`.
    Loading { prompt: String, awaiting: TicketId },
    /// `position` is the next token to decide.
    Stepping {
        generation: Arc<GenerationResult>,
        position: usize,
    },
    /// A token other than the model's choice is proposed at `position`.
    Diverging {
        generation: Arc<GenerationResult>,
        position: usize,
        token: String,
    },
    /// The generation ran out of tokens with nothing pending.
    Complete,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle { error: None }
    }
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Idle { .. } => StateKind::Idle,
            SessionState::Loading { .. } => StateKind::Loading,
            SessionState::Stepping { .. } => StateKind::Stepping,
            SessionState::Diverging { .. } => StateKind::Diverging,
            SessionState::Complete => StateKind::Complete,
        }
    }

    pub fn generation(&self) -> Option<&Arc<GenerationResult>> {
        match self {
            SessionState::Stepping { generation, .. }
            | SessionState::Diverging { generation, .. } => Some(generation),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            SessionState::Stepping { position, .. } | SessionState::Diverging { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

/// State variant without payload, for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Idle,
    Loading,
    Stepping,
    Diverging,
    Complete,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StateKind::Idle => "idle",
            StateKind::Loading => "loading",
            StateKind::Stepping => "stepping",
            StateKind::Diverging => "diverging",
            StateKind::Complete => "complete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoKind {
    /// Pushed when the model's token was accepted.
    Normal,
    /// Pushed when a divergent token was confirmed.
    Ghost,
}

/// Snapshot restored by undo. Holding the prior generation is what lets
/// undo skip the provider entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub kind: UndoKind,
    pub generation: Arc<GenerationResult>,
    pub position: usize,
}

/// Speculation state as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeculationState {
    Pending,
    Ready,
    Failed,
}

impl From<&SpeculationStatus> for SpeculationState {
    fn from(status: &SpeculationStatus) -> Self {
        match status {
            SpeculationStatus::Pending => SpeculationState::Pending,
            SpeculationStatus::Resolved(_) => SpeculationState::Ready,
            SpeculationStatus::Failed(_) => SpeculationState::Failed,
        }
    }
}

/// Read-only projection rendered by a presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView<'a> {
    pub kind: StateKind,
    /// Original prompt of this session.
    pub prompt: Option<&'a str>,
    /// Prompt plus every accepted token.
    pub text: &'a str,
    /// Proposed token while diverging.
    pub divergent_token: Option<&'a str>,
    /// Probability of the divergent token, if it is a known candidate.
    pub divergent_probability: Option<f64>,
    /// Model's chosen token at the current position.
    pub chosen_token: Option<&'a str>,
    pub position: Option<usize>,
    pub total: Option<usize>,
    pub distribution: Option<&'a Distribution>,
    pub generation_id: Option<GenerationId>,
    pub accepted_tokens: &'a [String],
    pub error: Option<&'a GenerationFailure>,
    pub can_undo: bool,
    pub can_retry: bool,
    pub speculation: Option<(&'a str, SpeculationState)>,
}
