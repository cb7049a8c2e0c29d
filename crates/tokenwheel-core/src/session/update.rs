//! Session reducer.
//!
//! All state mutations happen here. Each intent either returns the effects
//! to execute or a `TransitionError` with the session left untouched.

use std::sync::Arc;

use super::effects::{GenerationTicket, SessionEffect, TicketPurpose};
use super::error::TransitionError;
use super::events::Intent;
use super::speculation::SpeculationStatus;
use super::state::{SessionState, UndoEntry, UndoKind};
use super::Session;
use crate::generation::{GenerationOutput, GenerationResult};
use crate::providers::{ProviderError, ProviderResult};
use crate::stitch;

/// What `Session::settle` did with a call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// A generation was adopted; the session is stepping or complete.
    Adopted,
    /// The awaited call failed; the session is idle with an error.
    Failed,
    /// A live speculation was resolved in place.
    Speculated,
    /// Nobody was waiting for this call any more.
    Discarded,
}

impl Session {
    /// Applies one intent.
    ///
    /// # Errors
    /// Returns `TransitionError` when the current state does not accept the
    /// intent.
    pub fn apply(&mut self, intent: Intent) -> Result<Vec<SessionEffect>, TransitionError> {
        let from = self.kind();
        let name = intent.name();
        let result = match intent {
            Intent::Start(prompt) => self.start(prompt),
            Intent::AcceptCurrent => self.accept_current(),
            Intent::SelectToken(candidate) => self.select_token(candidate),
            Intent::NotifyDivergentCandidate(candidate) => {
                self.notify_divergent_candidate(&candidate)
            }
            Intent::ConfirmDivergence => self.confirm_divergence(),
            Intent::CancelDivergence => self.cancel_divergence(),
            Intent::Undo => self.undo(),
            Intent::Retry => self.retry(),
            Intent::Reset => Ok(self.reset()),
        };

        match &result {
            Ok(effects) => tracing::debug!(
                intent = name,
                from = %from,
                to = %self.kind(),
                effects = effects.len(),
                accepted = self.accepted_tokens.len(),
                "session transition"
            ),
            Err(err) => tracing::warn!(%err, "rejected session intent"),
        }
        self.debug_check_invariants();
        result
    }

    /// Feeds back the outcome of a call issued through `SessionEffect::Generate`.
    pub fn settle(
        &mut self,
        ticket: &GenerationTicket,
        outcome: ProviderResult<GenerationOutput>,
    ) -> SettleOutcome {
        let outcome = outcome.and_then(|output| {
            output
                .validate()
                .map(|()| output)
                .map_err(|e| ProviderError::parse(e.to_string()))
        });

        let awaited = matches!(
            &self.state,
            SessionState::Loading { awaiting, .. } if *awaiting == ticket.id
        );

        let settled = if awaited {
            match outcome {
                Ok(output) => {
                    self.adopt(output);
                    SettleOutcome::Adopted
                }
                Err(err) => {
                    tracing::info!(error = %err, "generation failed");
                    self.state = SessionState::Idle {
                        error: Some(err.into()),
                    };
                    SettleOutcome::Failed
                }
            }
        } else {
            match &ticket.purpose {
                TicketPurpose::Speculation { token } => {
                    if self.speculation.settle(ticket.id, token, outcome) {
                        SettleOutcome::Speculated
                    } else {
                        SettleOutcome::Discarded
                    }
                }
                TicketPurpose::Explicit => {
                    tracing::debug!(ticket = ticket.id.0, "discarding stale generation");
                    SettleOutcome::Discarded
                }
            }
        };

        tracing::debug!(ticket = ticket.id.0, outcome = ?settled, state = %self.kind(), "call settled");
        self.debug_check_invariants();
        settled
    }

    fn invalid(&self, intent: &'static str) -> TransitionError {
        TransitionError {
            intent,
            state: self.kind(),
        }
    }

    fn start(&mut self, prompt: String) -> Result<Vec<SessionEffect>, TransitionError> {
        if !matches!(
            self.state,
            SessionState::Idle { .. } | SessionState::Complete
        ) {
            return Err(self.invalid("start"));
        }

        self.speculation.clear();
        self.accepted_tokens.clear();
        self.undo_log.clear();
        self.prefix_text.clone_from(&prompt);
        self.original_prompt = Some(prompt);
        Ok(vec![self.request_explicit()])
    }

    fn accept_current(&mut self) -> Result<Vec<SessionEffect>, TransitionError> {
        let SessionState::Stepping {
            generation,
            position,
        } = &self.state
        else {
            return Err(self.invalid("accept"));
        };
        let (generation, position) = (Arc::clone(generation), *position);
        let Some(token) = generation.token_at(position).map(str::to_string) else {
            return Err(self.invalid("accept"));
        };

        self.undo_log.push(UndoEntry {
            kind: UndoKind::Normal,
            generation: Arc::clone(&generation),
            position,
        });
        self.push_accepted(token);
        self.speculation.clear();

        self.state = if position + 1 >= generation.len() {
            SessionState::Complete
        } else {
            SessionState::Stepping {
                generation,
                position: position + 1,
            }
        };
        Ok(Vec::new())
    }

    fn select_token(&mut self, candidate: String) -> Result<Vec<SessionEffect>, TransitionError> {
        let SessionState::Stepping {
            generation,
            position,
        } = &self.state
        else {
            return Err(self.invalid("select a token"));
        };

        if generation.token_at(*position) == Some(candidate.as_str()) {
            return self.accept_current();
        }

        if !generation
            .distribution_at(*position)
            .is_some_and(|d| d.contains(&candidate))
        {
            tracing::warn!(
                token = %candidate,
                position,
                "selected token is not a known candidate; probability unknown"
            );
        }

        self.state = SessionState::Diverging {
            generation: Arc::clone(generation),
            position: *position,
            token: candidate,
        };
        Ok(Vec::new())
    }

    fn notify_divergent_candidate(
        &mut self,
        candidate: &str,
    ) -> Result<Vec<SessionEffect>, TransitionError> {
        let chosen = match &self.state {
            SessionState::Stepping {
                generation,
                position,
            } => generation.token_at(*position),
            SessionState::Diverging {
                generation,
                position,
                token,
            } if token == candidate => generation.token_at(*position),
            _ => return Err(self.invalid("speculate")),
        };
        if chosen == Some(candidate) {
            return Ok(Vec::new());
        }

        let predicted_prefix = stitch::stitch(self.stitch_mode, &self.prefix_text, candidate);
        let mut predicted_accepted = self.accepted_tokens.clone();
        predicted_accepted.push(candidate.to_string());

        let ticket = self.speculation.begin(
            candidate,
            predicted_prefix.clone(),
            predicted_accepted,
            &mut self.tickets,
        );
        Ok(ticket
            .map(|ticket| SessionEffect::Generate {
                ticket,
                prompt: predicted_prefix,
            })
            .into_iter()
            .collect())
    }

    fn confirm_divergence(&mut self) -> Result<Vec<SessionEffect>, TransitionError> {
        let SessionState::Diverging {
            generation,
            position,
            token,
        } = &self.state
        else {
            return Err(self.invalid("confirm"));
        };
        let (generation, position, token) = (Arc::clone(generation), *position, token.clone());

        self.undo_log.push(UndoEntry {
            kind: UndoKind::Ghost,
            generation,
            position,
        });
        let entry = self.speculation.consume(&token);
        self.speculation.clear();
        self.push_accepted(token);

        let entry = entry.filter(|e| {
            e.predicted_prefix_text == self.prefix_text
                && e.predicted_accepted_tokens == self.accepted_tokens
        });
        let Some(entry) = entry else {
            return Ok(vec![self.request_explicit()]);
        };

        match entry.status {
            SpeculationStatus::Resolved(output) => {
                tracing::debug!(token = %entry.token, "adopting speculated generation");
                self.adopt(output);
            }
            SpeculationStatus::Failed(err) => {
                self.state = SessionState::Idle {
                    error: Some(err.into()),
                };
            }
            SpeculationStatus::Pending => {
                self.state = SessionState::Loading {
                    prompt: self.prefix_text.clone(),
                    awaiting: entry.ticket,
                };
            }
        }
        Ok(Vec::new())
    }

    fn cancel_divergence(&mut self) -> Result<Vec<SessionEffect>, TransitionError> {
        let SessionState::Diverging {
            generation,
            position,
            ..
        } = &self.state
        else {
            return Err(self.invalid("cancel"));
        };
        self.state = SessionState::Stepping {
            generation: Arc::clone(generation),
            position: *position,
        };
        self.speculation.clear();
        Ok(Vec::new())
    }

    fn undo(&mut self) -> Result<Vec<SessionEffect>, TransitionError> {
        if !self.can_undo() {
            return Err(self.invalid("undo"));
        }
        let Some(entry) = self.undo_log.pop() else {
            return Err(self.invalid("undo"));
        };

        self.accepted_tokens.pop();
        self.rebuild_prefix();
        self.speculation.clear();
        self.state = SessionState::Stepping {
            generation: entry.generation,
            position: entry.position,
        };
        Ok(Vec::new())
    }

    fn retry(&mut self) -> Result<Vec<SessionEffect>, TransitionError> {
        if !self.can_retry() {
            return Err(self.invalid("retry"));
        }
        Ok(vec![self.request_explicit()])
    }

    fn reset(&mut self) -> Vec<SessionEffect> {
        self.speculation.clear();
        self.accepted_tokens.clear();
        self.undo_log.clear();
        self.prefix_text.clear();
        self.original_prompt = None;
        self.state = SessionState::Idle { error: None };
        Vec::new()
    }

    /// Moves to `Loading` on a fresh call for the current text.
    fn request_explicit(&mut self) -> SessionEffect {
        let ticket = self.tickets.next_ticket(TicketPurpose::Explicit);
        let prompt = self.prefix_text.clone();
        self.state = SessionState::Loading {
            prompt: prompt.clone(),
            awaiting: ticket.id,
        };
        SessionEffect::Generate { ticket, prompt }
    }

    fn adopt(&mut self, output: GenerationOutput) {
        let generation = GenerationResult::new(self.generations.next_id(), output);
        self.state = if generation.is_empty() {
            SessionState::Complete
        } else {
            SessionState::Stepping {
                generation,
                position: 0,
            }
        };
    }
}
