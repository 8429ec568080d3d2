use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use walkthrough::actions::ActionRegistry;
use walkthrough::config::Config;
use walkthrough::definition::TutorialDefinition;
use walkthrough::director::Director;
use walkthrough::logging;
use walkthrough::playback::Playback;
use walkthrough::presenter::ConsolePresenter;

#[derive(Parser)]
#[command(name = "walkthrough")]
#[command(about = "Play and validate step-based tutorial definitions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a definition file and print its sessions
    Check {
        /// Definition file (.toml or .json)
        file: PathBuf,
    },

    /// Play a definition interactively
    Play {
        /// Definition file (.toml or .json)
        file: PathBuf,

        /// Queue a session by name at startup (repeatable, in order)
        #[arg(short, long = "queue")]
        queue: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;

    let result = match cli.command {
        Commands::Check { file } => cmd_check(&file),
        Commands::Play { file, queue } => cmd_play(&config, &file, &queue).await,
    };

    // Point at the log file if anything was written to it
    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.metadata().is_ok_and(|m| m.len() > 0) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

/// Actions available to every definition
fn builtin_actions() -> ActionRegistry {
    let mut actions = ActionRegistry::new();
    actions.register("print", |args| println!("  ┃ {}", args.join(" ")));
    actions.register("log", |args| tracing::info!(args = ?args, "action"));
    actions
}

fn load_definition(file: &Path) -> Result<TutorialDefinition> {
    TutorialDefinition::load(file).with_context(|| format!("Failed to load {}", file.display()))
}

fn cmd_check(file: &Path) -> Result<()> {
    let definition = load_definition(file)?;
    let sessions = definition
        .build(&builtin_actions())
        .with_context(|| format!("Invalid definition {}", file.display()))?;

    println!("{} ({} sessions)", file.display(), sessions.len());
    println!("{}", "─".repeat(60));
    for (def, session) in definition.sessions.iter().zip(&sessions) {
        println!(
            "{:<24} {:>2} steps{}{}",
            session.name().unwrap_or("<unnamed>"),
            session.total_steps(),
            if session.auto_advance() { "" } else { ", manual" },
            if def.queue_on_load { ", queued on load" } else { "" },
        );
        for (i, step) in session.steps().iter().enumerate() {
            println!("    {:>2}. {}", i + 1, step.tag());
        }
    }
    Ok(())
}

async fn cmd_play(config: &Config, file: &Path, queue: &[String]) -> Result<()> {
    let definition = load_definition(file)?;

    let mut director = Director::with_config(
        ConsolePresenter::new(),
        builtin_actions(),
        config.director.clone(),
    );
    definition
        .install(&mut director)
        .with_context(|| format!("Invalid definition {}", file.display()))?;

    for name in queue {
        let Some(id) = director
            .sessions()
            .find(|(_, s)| s.matches_name(name))
            .map(|(id, _)| id)
        else {
            bail!("No session named '{}' in {}", name, file.display());
        };
        director.queue(id)?;
    }

    Playback::new(director, &config.playback).run().await
}
