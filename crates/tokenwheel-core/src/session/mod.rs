//! Token-stepping session: the state machine behind the wheel.
//!
//! `Session::apply` is the reducer. It takes an `Intent`, mutates state, and
//! returns `SessionEffect`s (provider calls) for a runtime to execute. Call
//! outcomes come back through `Session::settle`. Nothing here awaits or
//! performs I/O.
//!
//! Accepted tokens and the undo log live beside the tagged state rather than
//! inside it, so a failed call that drops the session to `Idle` keeps the
//! history needed to undo or retry.

mod effects;
mod error;
mod events;
#[cfg(test)]
mod props;
mod speculation;
mod state;
mod update;

use std::sync::Arc;

pub use effects::{GenerationTicket, SessionEffect, TicketId, TicketPurpose, TicketSeq};
pub use error::{GenerationFailure, TransitionError};
pub use events::Intent;
pub use speculation::{SpeculationCoordinator, SpeculationEntry, SpeculationStatus};
pub use state::{
    SessionState, SessionView, SpeculationState, StateKind, UndoEntry, UndoKind,
};
pub use update::SettleOutcome;

use crate::generation::{GenerationResult, GenerationSeq};
use crate::stitch::{self, StitchMode};

#[derive(Debug, Default)]
pub struct Session {
    stitch_mode: StitchMode,
    original_prompt: Option<String>,
    accepted_tokens: Vec<String>,
    /// Cache of `stitch_all(original_prompt, accepted_tokens)`.
    prefix_text: String,
    undo_log: Vec<UndoEntry>,
    state: SessionState,
    speculation: SpeculationCoordinator,
    tickets: TicketSeq,
    generations: GenerationSeq,
}

impl Session {
    pub fn new(stitch_mode: StitchMode) -> Self {
        Self {
            stitch_mode,
            ..Self::default()
        }
    }

    pub fn stitch_mode(&self) -> StitchMode {
        self.stitch_mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn is_loading(&self) -> bool {
        self.kind() == StateKind::Loading
    }

    pub fn original_prompt(&self) -> Option<&str> {
        self.original_prompt.as_deref()
    }

    pub fn accepted_tokens(&self) -> &[String] {
        &self.accepted_tokens
    }

    pub fn prefix_text(&self) -> &str {
        &self.prefix_text
    }

    pub fn undo_log(&self) -> &[UndoEntry] {
        &self.undo_log
    }

    pub fn speculation(&self) -> &SpeculationCoordinator {
        &self.speculation
    }

    pub fn error(&self) -> Option<&GenerationFailure> {
        match &self.state {
            SessionState::Idle { error } => error.as_ref(),
            _ => None,
        }
    }

    pub fn can_undo(&self) -> bool {
        let state_allows = match &self.state {
            SessionState::Stepping { .. }
            | SessionState::Diverging { .. }
            | SessionState::Complete => true,
            SessionState::Idle { error } => error.is_some(),
            SessionState::Loading { .. } => false,
        };
        state_allows && !self.undo_log.is_empty() && !self.accepted_tokens.is_empty()
    }

    pub fn can_retry(&self) -> bool {
        matches!(&self.state, SessionState::Idle { error: Some(_) })
            && self.original_prompt.is_some()
    }

    /// Text shown while diverging: the current text with the proposed token
    /// stitched on.
    pub fn divergent_preview(&self) -> Option<String> {
        match &self.state {
            SessionState::Diverging { token, .. } => {
                Some(stitch::stitch(self.stitch_mode, &self.prefix_text, token))
            }
            _ => None,
        }
    }

    pub fn view(&self) -> SessionView<'_> {
        let generation: Option<&Arc<GenerationResult>> = self.state.generation();
        let position = self.state.position();
        let distribution = generation
            .zip(position)
            .and_then(|(g, p)| g.distribution_at(p));
        let divergent_token = match &self.state {
            SessionState::Diverging { token, .. } => Some(token.as_str()),
            _ => None,
        };

        SessionView {
            kind: self.kind(),
            prompt: self.original_prompt.as_deref(),
            text: &self.prefix_text,
            divergent_token,
            divergent_probability: divergent_token
                .zip(distribution)
                .and_then(|(t, d)| d.probability_of(t)),
            chosen_token: generation.zip(position).and_then(|(g, p)| g.token_at(p)),
            position,
            total: generation.map(|g| g.len()),
            distribution,
            generation_id: generation.map(|g| g.id),
            accepted_tokens: &self.accepted_tokens,
            error: self.error(),
            can_undo: self.can_undo(),
            can_retry: self.can_retry(),
            speculation: self
                .speculation
                .current()
                .map(|e| (e.token.as_str(), SpeculationState::from(&e.status))),
        }
    }

    /// Recomputes the text from the authoritative token list.
    fn rebuild_prefix(&mut self) {
        let prompt = self.original_prompt.as_deref().unwrap_or_default();
        self.prefix_text = stitch::stitch_all(self.stitch_mode, prompt, &self.accepted_tokens);
    }

    fn push_accepted(&mut self, token: String) {
        self.prefix_text = stitch::stitch(self.stitch_mode, &self.prefix_text, &token);
        self.accepted_tokens.push(token);
    }

    fn debug_check_invariants(&self) {
        debug_assert_eq!(
            self.prefix_text,
            stitch::stitch_all(
                self.stitch_mode,
                self.original_prompt.as_deref().unwrap_or_default(),
                &self.accepted_tokens
            ),
            "prefix text drifted from accepted tokens"
        );
        debug_assert_eq!(
            self.undo_log.len(),
            self.accepted_tokens.len(),
            "one undo entry per accepted token"
        );
        if let SessionState::Stepping {
            generation,
            position,
        } = &self.state
        {
            debug_assert!(*position < generation.len(), "stepping past the end");
        }
    }
}
