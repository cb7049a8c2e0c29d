//! Generation values: chosen tokens plus per-position candidate distributions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One candidate token and its probability at a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub token: String,
    pub probability: f64,
}

/// Candidate set considered at one position, sorted by descending probability.
///
/// Probabilities are renormalized over the returned candidates only; the
/// model's tail beyond the top-K set is not represented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    candidates: Vec<Candidate>,
}

impl Distribution {
    /// Builds a distribution from raw `(token, probability)` weights.
    ///
    /// Non-finite and non-positive weights are dropped, duplicate tokens keep
    /// the highest weight, and the remainder is normalized to sum to 1.0.
    pub fn from_weights<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut candidates: Vec<Candidate> = Vec::new();
        for (token, weight) in weights {
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            let token = token.into();
            match candidates.iter_mut().find(|c| c.token == token) {
                Some(existing) => existing.probability = existing.probability.max(weight),
                None => candidates.push(Candidate {
                    token,
                    probability: weight,
                }),
            }
        }

        let total: f64 = candidates.iter().map(|c| c.probability).sum();
        if total > 0.0 {
            for candidate in &mut candidates {
                candidate.probability /= total;
            }
        }
        candidates.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Self { candidates }
    }

    /// Builds a distribution from log-probabilities (`p = exp(logp)`, then
    /// renormalized over the returned set).
    ///
    /// `chosen` always stays a candidate: if its probability underflows to
    /// zero it is kept at `f64::MIN_POSITIVE`.
    pub fn from_logprobs<I, S>(logprobs: I, chosen: &str) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::from_weights(logprobs.into_iter().map(|(token, logp)| {
            let token = token.into();
            let weight = logp.exp();
            if token == chosen && !(weight.is_finite() && weight > 0.0) {
                (token, f64::MIN_POSITIVE)
            } else {
                (token, weight)
            }
        }))
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.candidates.iter().any(|c| c.token == token)
    }

    pub fn probability_of(&self, token: &str) -> Option<f64> {
        self.candidates
            .iter()
            .find(|c| c.token == token)
            .map(|c| c.probability)
    }

    /// Returns the candidate at `index` in display order.
    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }
}

/// Raw output of one provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Full text as reported by the provider.
    pub text: String,
    /// The model's chosen continuation.
    pub tokens: Vec<String>,
    /// One distribution per entry in `tokens`.
    pub distributions: Vec<Distribution>,
}

/// Shape violation in a provider's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputShapeError {
    LengthMismatch { tokens: usize, distributions: usize },
    ChosenTokenMissing { position: usize, token: String },
}

impl fmt::Display for OutputShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputShapeError::LengthMismatch {
                tokens,
                distributions,
            } => write!(
                f,
                "{tokens} tokens but {distributions} distributions in generation output"
            ),
            OutputShapeError::ChosenTokenMissing { position, token } => write!(
                f,
                "chosen token {token:?} missing from distribution at position {position}"
            ),
        }
    }
}

impl std::error::Error for OutputShapeError {}

impl GenerationOutput {
    /// Checks that tokens and distributions line up and that every chosen
    /// token is a positive-probability candidate at its position.
    ///
    /// # Errors
    /// Returns the first shape violation found.
    pub fn validate(&self) -> Result<(), OutputShapeError> {
        if self.tokens.len() != self.distributions.len() {
            return Err(OutputShapeError::LengthMismatch {
                tokens: self.tokens.len(),
                distributions: self.distributions.len(),
            });
        }
        for (position, (token, dist)) in self.tokens.iter().zip(&self.distributions).enumerate() {
            if !dist.probability_of(token).is_some_and(|p| p > 0.0) {
                return Err(OutputShapeError::ChosenTokenMissing {
                    position,
                    token: token.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Display identifier of a generation. Not used for ordering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Allocates generation ids. Owned by the session, not process-wide.
#[derive(Debug, Default)]
pub struct GenerationSeq {
    next: u64,
}

impl GenerationSeq {
    pub fn next_id(&mut self) -> GenerationId {
        self.next = self.next.wrapping_add(1);
        GenerationId(self.next)
    }
}

/// Immutable generation adopted by a session.
#[derive(Debug, PartialEq)]
pub struct GenerationResult {
    pub id: GenerationId,
    output: GenerationOutput,
}

impl GenerationResult {
    pub fn new(id: GenerationId, output: GenerationOutput) -> Arc<Self> {
        Arc::new(Self { id, output })
    }

    pub fn tokens(&self) -> &[String] {
        &self.output.tokens
    }

    pub fn token_at(&self, position: usize) -> Option<&str> {
        self.output.tokens.get(position).map(String::as_str)
    }

    pub fn distribution_at(&self, position: usize) -> Option<&Distribution> {
        self.output.distributions.get(position)
    }

    pub fn len(&self) -> usize {
        self.output.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.tokens.is_empty()
    }
}
