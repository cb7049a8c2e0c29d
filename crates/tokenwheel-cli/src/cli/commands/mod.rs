//! CLI command handlers.

pub mod config;
pub mod generate;
pub mod step;

use anyhow::{Context, Result};
use tokenwheel_core::config::Config;
use tokenwheel_core::providers::{GeminiClient, GeminiConfig};

/// Builds the Gemini provider from config and environment.
pub fn gemini_client(config: &Config) -> Result<GeminiClient> {
    let gemini = &config.providers.gemini;
    let provider_config = GeminiConfig::from_env(
        config.model.clone(),
        gemini.effective_base_url(),
        gemini.effective_api_key(),
        config.request_timeout(),
    )
    .context("configure gemini provider")?;
    Ok(GeminiClient::new(provider_config))
}
