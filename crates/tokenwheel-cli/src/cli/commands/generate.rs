//! Generate command handler: one call, full distribution table.

use anyhow::{Context, Result};
use tokenwheel_core::config::Config;
use tokenwheel_core::providers::{GenerationProvider, GenerationRequest};
use tokenwheel_core::stitch;

use super::gemini_client;
use crate::cli::render;

/// Alternatives listed next to each chosen token.
const ALTERNATIVES: usize = 3;

pub async fn run(prompt: &str, config: &Config) -> Result<()> {
    let client = gemini_client(config)?;
    let request = GenerationRequest::new(prompt, config.sampling_params())
        .with_system_instruction(config.effective_system_prompt()?);

    let output = client.generate(request).await.context("generate")?;
    if output.is_empty() {
        println!("{prompt}");
        println!("(no tokens generated)");
        return Ok(());
    }

    println!(
        "{}",
        stitch::stitch_all(config.stitching, prompt, &output.tokens)
    );
    println!("{}", render::generation_table(&output, ALTERNATIVES));
    Ok(())
}
