//! Speculative regeneration for a divergent candidate.
//!
//! A single-slot cache keyed by token. Starting a speculation for a new
//! token supersedes the slot; the superseded call is never aborted, its
//! outcome is simply dropped when it arrives because the slot no longer
//! carries its token and ticket.

use crate::generation::GenerationOutput;
use crate::providers::ProviderError;
use crate::session::effects::{GenerationTicket, TicketId, TicketPurpose, TicketSeq};

#[derive(Debug, Clone, PartialEq)]
pub enum SpeculationStatus {
    Pending,
    Resolved(GenerationOutput),
    Failed(ProviderError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeculationEntry {
    pub token: String,
    pub predicted_prefix_text: String,
    pub predicted_accepted_tokens: Vec<String>,
    pub ticket: TicketId,
    pub status: SpeculationStatus,
}

#[derive(Debug, Default)]
pub struct SpeculationCoordinator {
    slot: Option<SpeculationEntry>,
}

impl SpeculationCoordinator {
    /// Tracks a speculation for `token` and returns the ticket to run, or
    /// `None` when a live entry for the same token and prefix already covers
    /// it. A failed entry is replaced so hovering again retries.
    pub fn begin(
        &mut self,
        token: &str,
        predicted_prefix_text: String,
        predicted_accepted_tokens: Vec<String>,
        tickets: &mut TicketSeq,
    ) -> Option<GenerationTicket> {
        if let Some(entry) = &self.slot
            && entry.token == token
            && entry.predicted_prefix_text == predicted_prefix_text
            && !matches!(entry.status, SpeculationStatus::Failed(_))
        {
            tracing::trace!(token, "reusing speculation");
            return None;
        }

        if let Some(old) = self.slot.take() {
            tracing::debug!(superseded = %old.token, token, "superseding speculation");
        }

        let ticket = tickets.next_ticket(TicketPurpose::Speculation {
            token: token.to_string(),
        });
        self.slot = Some(SpeculationEntry {
            token: token.to_string(),
            predicted_prefix_text,
            predicted_accepted_tokens,
            ticket: ticket.id,
            status: SpeculationStatus::Pending,
        });
        Some(ticket)
    }

    /// Records a call outcome in place. Returns `false` (and drops the
    /// outcome) when the slot has moved on to another token or call.
    pub fn settle(
        &mut self,
        ticket: TicketId,
        token: &str,
        outcome: Result<GenerationOutput, ProviderError>,
    ) -> bool {
        match &mut self.slot {
            Some(entry) if entry.token == token && entry.ticket == ticket => {
                entry.status = match outcome {
                    Ok(output) => SpeculationStatus::Resolved(output),
                    Err(err) => {
                        tracing::debug!(token, error = %err, "speculation failed");
                        SpeculationStatus::Failed(err)
                    }
                };
                true
            }
            _ => {
                tracing::debug!(token, "discarding superseded speculation");
                false
            }
        }
    }

    /// Takes the entry if it is for `token`. At most one consumption.
    pub fn consume(&mut self, token: &str) -> Option<SpeculationEntry> {
        if self.slot.as_ref().is_some_and(|e| e.token == token) {
            self.slot.take()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn current(&self) -> Option<&SpeculationEntry> {
        self.slot.as_ref()
    }
}
