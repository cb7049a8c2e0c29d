//! Generation providers.
//!
//! A provider performs exactly one model call per `generate` and returns the
//! chosen tokens with a candidate distribution for each position. There is no
//! streaming and no cancellation: callers that lose interest simply ignore
//! the result.

pub mod gemini;
pub mod shared;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use gemini::{GeminiClient, GeminiConfig};
pub use shared::{
    ProviderError, ProviderErrorKind, ProviderResult, resolve_api_key, resolve_base_url,
};

use crate::generation::GenerationOutput;

/// Sampling parameters sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Candidates returned per position.
    pub candidates: u32,
}

impl SamplingParams {
    pub const DEFAULT_MAX_TOKENS: u32 = 32;
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;
    pub const DEFAULT_TOP_P: f32 = 0.95;
    pub const DEFAULT_TOP_K: u32 = 40;
    pub const DEFAULT_CANDIDATES: u32 = 8;
    /// Upper bound on per-position candidates accepted by the API.
    pub const MAX_CANDIDATES: u32 = 20;

    /// Returns a copy with values clamped into the ranges the API accepts.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            max_tokens: self.max_tokens.max(1),
            temperature: self.temperature.clamp(0.0, 2.0),
            top_p: self.top_p.clamp(0.0, 1.0),
            top_k: self.top_k.max(1),
            candidates: self.candidates.clamp(1, Self::MAX_CANDIDATES),
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            top_p: Self::DEFAULT_TOP_P,
            top_k: Self::DEFAULT_TOP_K,
            candidates: Self::DEFAULT_CANDIDATES,
        }
    }
}

/// One provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, sampling: SamplingParams) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            sampling,
        }
    }

    #[must_use]
    pub fn with_system_instruction(mut self, system: Option<String>) -> Self {
        self.system_instruction = system;
        self
    }
}

/// Backend that turns a prompt into tokens plus candidate distributions.
pub trait GenerationProvider: Send + Sync + 'static {
    /// Performs one model call.
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = ProviderResult<GenerationOutput>> + Send;
}
