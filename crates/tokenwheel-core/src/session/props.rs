//! Property-based tests for the session state machine.
//!
//! Random intent sequences run against scripted outputs. After every step:
//! - `prefix_text` equals `stitch_all(original_prompt, accepted_tokens)`
//! - the undo log holds exactly one entry per accepted token

use std::collections::VecDeque;

use proptest::prelude::*;

use super::{Intent, Session, SessionEffect};
use crate::generation::{Distribution, GenerationOutput};
use crate::providers::ProviderError;
use crate::stitch::{self, StitchMode};

// =============================================================================
// Arbitrary Generators
// =============================================================================

const VOCAB: &[&str] = &[" the", "cat", " mat", ".", ",", "(", ")", "\n", "'", "-", " "];

/// Alternatives offered at every position besides the chosen token.
const ALTERNATIVES: &[&str] = &[" floor", "rug", "!"];

fn arb_stitch_mode() -> impl Strategy<Value = StitchMode> {
    prop_oneof![Just(StitchMode::Concat), Just(StitchMode::Smart)]
}

fn arb_output() -> impl Strategy<Value = GenerationOutput> {
    prop::collection::vec(prop::sample::select(VOCAB), 0..5).prop_map(|tokens| {
        GenerationOutput {
            text: tokens.concat(),
            tokens: tokens.iter().map(ToString::to_string).collect(),
            distributions: tokens
                .iter()
                .map(|t| {
                    Distribution::from_weights(
                        std::iter::once((*t, 0.6)).chain(ALTERNATIVES.iter().map(|a| (*a, 0.1))),
                    )
                })
                .collect(),
        }
    })
}

#[derive(Debug, Clone)]
enum Op {
    Accept,
    Select(usize),
    Notify(usize),
    Confirm,
    Cancel,
    Undo,
    Retry,
    /// Settle the oldest outstanding call successfully.
    Settle,
    /// Settle the oldest outstanding call with an error.
    Fail,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Accept),
        2 => (0usize..4).prop_map(Op::Select),
        2 => (0usize..4).prop_map(Op::Notify),
        2 => Just(Op::Confirm),
        1 => Just(Op::Cancel),
        2 => Just(Op::Undo),
        1 => Just(Op::Retry),
        3 => Just(Op::Settle),
        1 => Just(Op::Fail),
    ]
}

// =============================================================================
// Driver
// =============================================================================

struct Harness {
    session: Session,
    outputs: Vec<GenerationOutput>,
    next_output: usize,
    outstanding: VecDeque<SessionEffect>,
}

impl Harness {
    fn apply(&mut self, intent: Intent) {
        if let Ok(effects) = self.session.apply(intent) {
            self.outstanding.extend(effects);
        }
    }

    fn candidate(&self, index: usize) -> Option<String> {
        let distribution = self.session.view().distribution?;
        distribution
            .get(index % distribution.len().max(1))
            .map(|c| c.token.clone())
    }

    fn step(&mut self, op: Op) {
        match op {
            Op::Accept => self.apply(Intent::AcceptCurrent),
            Op::Select(index) => {
                if let Some(token) = self.candidate(index) {
                    self.apply(Intent::SelectToken(token));
                }
            }
            Op::Notify(index) => {
                if let Some(token) = self.candidate(index) {
                    self.apply(Intent::NotifyDivergentCandidate(token));
                }
            }
            Op::Confirm => self.apply(Intent::ConfirmDivergence),
            Op::Cancel => self.apply(Intent::CancelDivergence),
            Op::Undo => self.apply(Intent::Undo),
            Op::Retry => self.apply(Intent::Retry),
            Op::Settle => {
                if let Some(SessionEffect::Generate { ticket, .. }) = self.outstanding.pop_front() {
                    let output = self.outputs[self.next_output % self.outputs.len()].clone();
                    self.next_output += 1;
                    self.session.settle(&ticket, Ok(output));
                }
            }
            Op::Fail => {
                if let Some(SessionEffect::Generate { ticket, .. }) = self.outstanding.pop_front() {
                    self.session
                        .settle(&ticket, Err(ProviderError::timeout("scripted failure")));
                }
            }
        }
    }
}

fn check_history(session: &Session) -> Result<(), TestCaseError> {
    let prompt = session.original_prompt().unwrap_or_default();
    prop_assert_eq!(
        session.prefix_text(),
        stitch::stitch_all(session.stitch_mode(), prompt, session.accepted_tokens())
    );
    prop_assert_eq!(session.undo_log().len(), session.accepted_tokens().len());
    Ok(())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn history_stays_consistent_across_transitions(
        mode in arb_stitch_mode(),
        prompt in prop::sample::select(&["The cat sat on the", "(", "word", ""][..]),
        outputs in prop::collection::vec(arb_output(), 1..4),
        ops in prop::collection::vec(arb_op(), 0..64),
    ) {
        let mut harness = Harness {
            session: Session::new(mode),
            outputs,
            next_output: 0,
            outstanding: VecDeque::new(),
        };
        harness.apply(Intent::Start(prompt.to_string()));
        check_history(&harness.session)?;

        for op in ops {
            harness.step(op);
            check_history(&harness.session)?;
        }
    }
}
