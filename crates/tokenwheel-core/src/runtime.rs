//! Session runtime: executes the effects returned by the session reducer.
//!
//! The session stays pure; this module owns the provider and spawns calls.
//!
//! ## Inbox Pattern
//!
//! - Each `SessionEffect::Generate` is spawned as a tokio task
//! - The task sends a `Settlement` to `inbox_tx` when the call finishes
//! - The runtime drains `inbox_rx` and feeds each settlement back through
//!   `Session::settle`, which decides whether it is still wanted
//!
//! Calls are never aborted. Superseded or stale results are discarded when
//! they arrive.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::generation::GenerationOutput;
use crate::providers::{GenerationProvider, GenerationRequest, ProviderResult, SamplingParams};
use crate::session::{
    GenerationTicket, Intent, Session, SessionEffect, SessionView, SettleOutcome,
    TransitionError,
};
use crate::stitch::StitchMode;

/// A finished provider call, tagged with the ticket it was issued under.
#[derive(Debug)]
pub struct Settlement {
    pub ticket: GenerationTicket,
    pub outcome: ProviderResult<GenerationOutput>,
}

type SettlementSender = mpsc::UnboundedSender<Settlement>;
type SettlementReceiver = mpsc::UnboundedReceiver<Settlement>;

/// Drives a `Session` against a `GenerationProvider`.
///
/// `dispatch` must be called from within a tokio runtime.
pub struct SessionRuntime<P> {
    session: Session,
    provider: Arc<P>,
    sampling: SamplingParams,
    system_instruction: Option<String>,
    /// Inbox sender - spawned calls send settlements here.
    inbox_tx: SettlementSender,
    /// Inbox receiver - drained before every dispatch.
    inbox_rx: SettlementReceiver,
    /// Calls spawned but not yet drained.
    in_flight: usize,
}

impl<P: GenerationProvider> SessionRuntime<P> {
    pub fn new(provider: P, stitch_mode: StitchMode, sampling: SamplingParams) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(stitch_mode),
            provider: Arc::new(provider),
            sampling: sampling.clamped(),
            system_instruction: None,
            inbox_tx,
            inbox_rx,
            in_flight: 0,
        }
    }

    #[must_use]
    pub fn with_system_instruction(mut self, system: Option<String>) -> Self {
        self.system_instruction = system.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn view(&self) -> SessionView<'_> {
        self.session.view()
    }

    /// Sampling parameters used for calls issued from now on.
    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    /// Replaces the sampling parameters for calls issued from now on.
    pub fn set_sampling(&mut self, sampling: SamplingParams) {
        self.sampling = sampling.clamped();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Applies an intent and spawns any provider calls it produces.
    ///
    /// Pending settlements are drained first so the intent sees the latest
    /// state.
    ///
    /// # Errors
    /// Returns `TransitionError` if the session rejects the intent.
    pub fn dispatch(&mut self, intent: Intent) -> Result<(), TransitionError> {
        self.drain();
        let effects = self.session.apply(intent)?;
        for effect in effects {
            self.execute_effect(effect);
        }
        Ok(())
    }

    /// Settles every finished call without waiting. Returns how many were
    /// processed.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(settlement) = self.inbox_rx.try_recv() {
            self.apply_settlement(settlement);
            count += 1;
        }
        count
    }

    /// Waits for the next call to finish and settles it.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn wait_next(&mut self) -> Option<SettleOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let settlement = self.inbox_rx.recv().await?;
        Some(self.apply_settlement(settlement))
    }

    /// Waits until the session is no longer loading.
    pub async fn wait_until_settled(&mut self) {
        self.drain();
        while self.session.is_loading() {
            if self.wait_next().await.is_none() {
                tracing::warn!("session is loading with no call in flight");
                break;
            }
        }
    }

    fn apply_settlement(&mut self, settlement: Settlement) -> SettleOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.session.settle(&settlement.ticket, settlement.outcome)
    }

    fn execute_effect(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::Generate { ticket, prompt } => {
                let request = GenerationRequest::new(prompt, self.sampling)
                    .with_system_instruction(self.system_instruction.clone());
                tracing::debug!(
                    ticket = ticket.id.0,
                    speculative = ticket.is_speculation(),
                    "spawning generation"
                );
                self.spawn_generation(ticket, request);
            }
        }
    }

    fn spawn_generation(&mut self, ticket: GenerationTicket, request: GenerationRequest) {
        let tx = self.inbox_tx.clone();
        let provider = Arc::clone(&self.provider);
        self.in_flight += 1;
        tokio::spawn(async move {
            let outcome = provider.generate(request).await;
            let _ = tx.send(Settlement { ticket, outcome });
        });
    }
}
