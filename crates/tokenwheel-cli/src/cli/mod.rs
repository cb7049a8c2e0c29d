//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokenwheel_core::config;
use tokenwheel_core::logging::{self, LogFormat};

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "tokenwheel")]
#[command(version)]
#[command(about = "Step through LLM generations token by token and steer them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Override the model from config
    #[arg(short, long, global = true, env = "TOKENWHEEL_MODEL")]
    model: Option<String>,

    /// Override the sampling temperature from config
    #[arg(short, long, global = true)]
    temperature: Option<f32>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run one generation and print every position's candidates
    Generate {
        /// The prompt to continue
        #[arg(short, long)]
        prompt: String,
    },

    /// Step through a generation interactively (commands on stdin)
    Step {
        /// Start immediately with this prompt
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set a single config value, keeping comments
    Set {
        /// Key, e.g. `temperature` or `providers.gemini.base_url`
        key: String,
        /// New value
        value: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let _log_guard = logging::init_logging(cli.verbose, cli.log_file.as_deref(), format)?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        model,
        temperature,
        ..
    } = cli;

    if let Commands::Config { command } = command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Set { key, value } => commands::config::set(&key, &value),
        };
    }

    let mut config = config::Config::load().context("load config")?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(temperature) = temperature {
        config.temperature = temperature;
    }
    tracing::debug!(model = %config.model, stitching = config.stitching.display_name(), "config loaded");

    match command {
        Commands::Generate { prompt } => commands::generate::run(&prompt, &config).await,
        Commands::Step { prompt } => commands::step::run(prompt.as_deref(), &config).await,
        Commands::Config { .. } => Ok(()),
    }
}
