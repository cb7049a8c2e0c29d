//! Step command handler: a line-oriented driver over `SessionRuntime`.
//!
//! Commands are read from stdin one per line. After each command the
//! session view is printed to stdout; errors go to stderr.

use std::io::BufRead;

use anyhow::{Context, Result};
use tokenwheel_core::config::Config;
use tokenwheel_core::providers::{GenerationProvider, SamplingParams};
use tokenwheel_core::runtime::SessionRuntime;
use tokenwheel_core::session::{Intent, SessionView};

use super::gemini_client;
use crate::cli::render;

const HELP: &str = "\
commands:
  start <prompt>   begin a new generation
  a                accept the model's token
  s <n|token>      select candidate n (or a token) at this position
  h <n|token>      hint a candidate you may diverge to (speculates)
  c                confirm the divergent token
  x                cancel the divergent token
  u                undo the last accepted token
  retry            retry the failed call
  temp <t>         set the temperature for later calls
  r                reset
  q                quit";

/// Candidate reference typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// 1-based row in the candidate table.
    Index(usize),
    Token(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepCommand {
    Start(String),
    Accept,
    Select(Choice),
    Hint(Choice),
    Confirm,
    Cancel,
    Undo,
    Retry,
    Reset,
    Temperature(f32),
    Help,
    Quit,
}

/// Parses one input line.
pub fn parse_command(line: &str) -> Result<StepCommand, String> {
    let trimmed = line.trim_start();
    let (head, rest) = match trimmed.split_once(' ') {
        Some((head, rest)) => (head, Some(rest)),
        None => (trimmed.trim_end(), None),
    };
    let argument = rest
        .map(|r| r.trim_end_matches(['\r', '\n']))
        .filter(|r| !r.trim().is_empty());

    let command = match (head, argument) {
        ("start", Some(prompt)) => StepCommand::Start(prompt.to_string()),
        ("start", None) => return Err("usage: start <prompt>".to_string()),
        ("a", None) => StepCommand::Accept,
        ("s", Some(arg)) => StepCommand::Select(parse_choice(arg)?),
        ("h", Some(arg)) => StepCommand::Hint(parse_choice(arg)?),
        ("s" | "h", None) => return Err(format!("usage: {head} <n|token>")),
        ("c", None) => StepCommand::Confirm,
        ("x", None) => StepCommand::Cancel,
        ("u", None) => StepCommand::Undo,
        ("retry", None) => StepCommand::Retry,
        ("r", None) => StepCommand::Reset,
        ("temp", Some(arg)) => StepCommand::Temperature(
            arg.trim()
                .parse()
                .map_err(|_| format!("not a temperature: {}", arg.trim()))?,
        ),
        ("temp", None) => return Err("usage: temp <t>".to_string()),
        ("help" | "?", None) => StepCommand::Help,
        ("q" | "quit", None) => StepCommand::Quit,
        _ => return Err(format!("unknown command: {}", trimmed.trim_end())),
    };
    Ok(command)
}

fn parse_choice(arg: &str) -> Result<Choice, String> {
    match arg.trim().parse::<usize>() {
        Ok(0) => Err("candidates are numbered from 1".to_string()),
        Ok(n) => Ok(Choice::Index(n)),
        Err(_) => Ok(Choice::Token(arg.to_string())),
    }
}

/// Resolves a choice against the active distribution.
///
/// Typed tokens match a candidate exactly first, then ignoring surrounding
/// whitespace, so `s floor` finds `" floor"`. Unknown tokens pass through.
pub fn resolve_choice(choice: &Choice, view: &SessionView<'_>) -> Result<String, String> {
    match choice {
        Choice::Index(n) => {
            let distribution = view
                .distribution
                .ok_or_else(|| "no candidates at this point".to_string())?;
            n.checked_sub(1)
                .and_then(|i| distribution.get(i))
                .map(|c| c.token.clone())
                .ok_or_else(|| format!("no candidate {n} (have {})", distribution.len()))
        }
        Choice::Token(raw) => {
            let Some(distribution) = view.distribution else {
                return Ok(raw.clone());
            };
            let candidates = distribution.candidates();
            let matched = candidates
                .iter()
                .find(|c| c.token == *raw)
                .or_else(|| candidates.iter().find(|c| c.token.trim() == raw.trim()));
            Ok(matched.map_or_else(|| raw.clone(), |c| c.token.clone()))
        }
    }
}

/// Maps a parsed command to a session intent.
pub fn to_intent(command: StepCommand, view: &SessionView<'_>) -> Result<Intent, String> {
    let intent = match command {
        StepCommand::Start(prompt) => Intent::Start(prompt),
        StepCommand::Accept => Intent::AcceptCurrent,
        StepCommand::Select(choice) => Intent::SelectToken(resolve_choice(&choice, view)?),
        StepCommand::Hint(choice) => {
            Intent::NotifyDivergentCandidate(resolve_choice(&choice, view)?)
        }
        StepCommand::Confirm => Intent::ConfirmDivergence,
        StepCommand::Cancel => Intent::CancelDivergence,
        StepCommand::Undo => Intent::Undo,
        StepCommand::Retry => Intent::Retry,
        StepCommand::Reset => Intent::Reset,
        StepCommand::Temperature(_) | StepCommand::Help | StepCommand::Quit => {
            return Err("not a session command".to_string());
        }
    };
    Ok(intent)
}

pub async fn run(initial_prompt: Option<&str>, config: &Config) -> Result<()> {
    let client = gemini_client(config)?;
    let system = config.effective_system_prompt()?;
    let mut runtime = SessionRuntime::new(client, config.stitching, config.sampling_params())
        .with_system_instruction(system);

    if let Some(prompt) = initial_prompt {
        execute(&mut runtime, StepCommand::Start(prompt.to_string())).await;
    } else {
        println!("{HELP}");
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read command from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(StepCommand::Quit) => break,
            Ok(StepCommand::Help) => println!("{HELP}"),
            Ok(StepCommand::Temperature(temperature)) => {
                set_temperature(&mut runtime, temperature);
            }
            Ok(command) => execute(&mut runtime, command).await,
            Err(message) => eprintln!("{message}"),
        }
    }
    tracing::debug!(in_flight = runtime.in_flight(), "step loop finished");
    Ok(())
}

/// Applies to calls issued afterwards, including speculations.
fn set_temperature<P: GenerationProvider>(runtime: &mut SessionRuntime<P>, temperature: f32) {
    runtime.set_sampling(SamplingParams {
        temperature,
        ..runtime.sampling()
    });
    println!("temperature {:.2}", runtime.sampling().temperature);
}

/// Dispatches one command and prints the resulting view.
///
/// Commands that leave the session loading wait for the call to settle
/// first. Speculative calls keep running in the background.
async fn execute<P: GenerationProvider>(runtime: &mut SessionRuntime<P>, command: StepCommand) {
    runtime.drain();
    let intent = match to_intent(command, &runtime.view()) {
        Ok(intent) => intent,
        Err(message) => {
            eprintln!("{message}");
            return;
        }
    };

    if let Err(err) = runtime.dispatch(intent) {
        eprintln!("{err}");
        return;
    }
    runtime.wait_until_settled().await;
    print!("{}", render::session_view(&runtime.view()));
}
