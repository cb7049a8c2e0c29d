//! Plain-text rendering of sessions and distributions.

use std::fmt::Write as _;

use comfy_table::{ContentArrangement, Table};
use tokenwheel_core::generation::{Distribution, GenerationOutput};
use tokenwheel_core::session::{SessionView, SpeculationState, StateKind};

const TABLE_WIDTH: u16 = 80;

/// Quotes a token so leading and trailing whitespace stays visible.
pub fn token_label(token: &str) -> String {
    format!("{token:?}")
}

fn percent(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Candidate table for one position. The model's chosen token is marked.
pub fn distribution_table(distribution: &Distribution, chosen: Option<&str>) -> Table {
    let mut table = Table::new();
    table.set_width(TABLE_WIDTH);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "token", "p", ""]);

    for (index, candidate) in distribution.candidates().iter().enumerate() {
        let marker = if chosen == Some(candidate.token.as_str()) {
            "chosen"
        } else {
            ""
        };
        table.add_row(vec![
            (index + 1).to_string(),
            token_label(&candidate.token),
            percent(candidate.probability),
            marker.to_string(),
        ]);
    }
    table
}

/// One row per generated position with its strongest alternatives.
pub fn generation_table(output: &GenerationOutput, alternatives: usize) -> Table {
    let mut table = Table::new();
    table.set_width(TABLE_WIDTH);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["pos", "token", "p", "alternatives"]);

    for (position, (token, distribution)) in output
        .tokens
        .iter()
        .zip(&output.distributions)
        .enumerate()
    {
        let others = distribution
            .candidates()
            .iter()
            .filter(|c| c.token != *token)
            .take(alternatives)
            .map(|c| format!("{} {}", token_label(&c.token), percent(c.probability)))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            position.to_string(),
            token_label(token),
            distribution
                .probability_of(token)
                .map(percent)
                .unwrap_or_default(),
            others,
        ]);
    }
    table
}

/// Renders the whole session view as it appears after each step command.
pub fn session_view(view: &SessionView<'_>) -> String {
    let mut out = String::new();

    let status = match (view.kind, view.position, view.total) {
        (StateKind::Stepping | StateKind::Diverging, Some(position), Some(total)) => {
            format!("{} {}/{}", view.kind, position + 1, total)
        }
        _ => view.kind.to_string(),
    };
    let _ = writeln!(out, "[{status}]");

    match view.divergent_token {
        Some(token) => {
            let _ = writeln!(out, "{}[{token}]", view.text);
        }
        None if view.kind == StateKind::Idle && view.text.is_empty() => {}
        None => {
            let _ = writeln!(out, "{}", view.text);
        }
    }

    if let Some(token) = view.divergent_token {
        let probability = view
            .divergent_probability
            .map_or_else(|| "unknown".to_string(), percent);
        let _ = writeln!(
            out,
            "diverging to {} (p {probability}), c to confirm, x to cancel",
            token_label(token)
        );
    }

    if let Some(distribution) = view.distribution {
        let _ = writeln!(out, "{}", distribution_table(distribution, view.chosen_token));
    }

    if let Some((token, state)) = view.speculation {
        let label = match state {
            SpeculationState::Pending => "pending",
            SpeculationState::Ready => "ready",
            SpeculationState::Failed => "failed",
        };
        let _ = writeln!(out, "speculation {}: {label}", token_label(token));
    }

    if let Some(error) = view.error {
        let _ = writeln!(out, "error: {error}");
        if view.can_retry {
            let _ = writeln!(out, "type `retry` to try again");
        }
    }

    out
}
