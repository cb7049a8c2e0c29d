//! Gemini API key provider (Generative Language API) with token logprobs.

use std::time::Duration;

use anyhow::Result;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::shared::{USER_AGENT, classify_reqwest_error, resolve_api_key, resolve_base_url};
use super::{GenerationProvider, GenerationRequest, ProviderError, ProviderResult};
use crate::generation::{Distribution, GenerationOutput};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the provider stopped for content-safety reasons.
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
    "IMAGE_SAFETY",
];

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    /// Creates a new config from config values and environment.
    ///
    /// Environment variables:
    /// - `GEMINI_API_KEY` (fallback if not in config)
    /// - `GEMINI_BASE_URL` (optional, wins over config)
    ///
    /// # Errors
    /// Returns an error if no API key is available or the base URL is invalid.
    pub fn from_env(
        model: String,
        config_base_url: Option<&str>,
        config_api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(config_api_key, "GEMINI_API_KEY", "gemini")?;
        let base_url = resolve_base_url(
            config_base_url,
            "GEMINI_BASE_URL",
            DEFAULT_BASE_URL,
            "Gemini",
        )?;

        Ok(Self {
            api_key,
            base_url,
            model,
            timeout,
        })
    }
}

/// Gemini client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        #[cfg(test)]
        assert!(
            config.base_url != DEFAULT_BASE_URL,
            "Tests must not use the production Gemini API! Point base_url at a mock server."
        );

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        });
        Self { config, http }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, request: &GenerationRequest) -> ProviderResult<GenerationOutput> {
        let body = build_request_body(request);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        tracing::info!(
            model = %self.config.model,
            prompt_chars = request.prompt.len(),
            candidates = request.sampling.candidates,
            "gemini generateContent"
        );

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        if !status.is_success() {
            return Err(ProviderError::http_status(status.as_u16(), &text));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::parse(format!("Failed to parse Gemini response JSON: {e}"))
                .with_details(text.clone())
        })?;
        let output = parse_generation_response(&value)?;
        tracing::debug!(tokens = output.len(), "gemini response parsed");
        Ok(output)
    }
}

impl GenerationProvider for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> ProviderResult<GenerationOutput> {
        self.send(&request).await
    }
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(api_key) {
        headers.insert("x-goog-api-key", value);
    }
    headers
}

/// Builds the `generateContent` request body.
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let sampling = request.sampling.clamped();
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }]
        }],
        "generationConfig": {
            "maxOutputTokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "topP": sampling.top_p,
            "topK": sampling.top_k,
            "responseLogprobs": true,
            "logprobs": sampling.candidates,
        }
    });

    if let Some(system) = request
        .system_instruction
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Parses a `generateContent` response into tokens and distributions.
///
/// # Errors
/// Returns `SafetyBlocked` for prompt blocks and safety finish reasons,
/// `ApiError` when there is no candidate, and `Parse` when text came back
/// without logprobs.
pub fn parse_generation_response(value: &Value) -> ProviderResult<GenerationOutput> {
    if let Some(reason) = value
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(ProviderError::safety_blocked(reason));
    }

    let Some(candidate) = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return Err(ProviderError::api_error("Gemini returned no candidates"));
    };

    let finish_reason = candidate.get("finishReason").and_then(Value::as_str);
    let text = candidate_text(candidate);

    let chosen = candidate
        .pointer("/logprobsResult/chosenCandidates")
        .and_then(Value::as_array);

    if let Some(reason) = finish_reason.filter(|r| SAFETY_FINISH_REASONS.contains(r)) {
        return Err(ProviderError::safety_blocked(reason));
    }

    let Some(chosen) = chosen.filter(|c| !c.is_empty()) else {
        if text.is_empty() {
            return Ok(GenerationOutput::default());
        }
        return Err(ProviderError::parse(
            "Gemini response has text but no logprobs (model may not support responseLogprobs)",
        ));
    };

    let top = candidate
        .pointer("/logprobsResult/topCandidates")
        .and_then(Value::as_array);

    let mut tokens = Vec::with_capacity(chosen.len());
    let mut distributions = Vec::with_capacity(chosen.len());
    for (position, entry) in chosen.iter().enumerate() {
        let Some(token) = entry.get("token").and_then(Value::as_str) else {
            return Err(ProviderError::parse(format!(
                "chosen candidate at position {position} has no token"
            )));
        };
        let chosen_logp = entry.get("logProbability").and_then(Value::as_f64);

        let mut logprobs: Vec<(String, f64)> = top
            .and_then(|t| t.get(position))
            .and_then(|t| t.get("candidates"))
            .and_then(Value::as_array)
            .map(|cands| cands.iter().filter_map(logprob_pair).collect())
            .unwrap_or_default();
        if !logprobs.iter().any(|(t, _)| t == token) {
            logprobs.push((token.to_string(), chosen_logp.unwrap_or(f64::NEG_INFINITY)));
        }
        let dist = Distribution::from_logprobs(logprobs, token);

        tokens.push(token.to_string());
        distributions.push(dist);
    }

    let output = GenerationOutput {
        text,
        tokens,
        distributions,
    };
    output
        .validate()
        .map_err(|e| ProviderError::parse(e.to_string()))?;
    Ok(output)
}

fn candidate_text(candidate: &Value) -> String {
    candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn logprob_pair(value: &Value) -> Option<(String, f64)> {
    let token = value.get("token").and_then(Value::as_str)?;
    let logp = value.get("logProbability").and_then(Value::as_f64)?;
    Some((token.to_string(), logp))
}
