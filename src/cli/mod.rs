//! CLI module for Storyloom
//!
//! - `run`: open a session and generate scenes
//! - `brainstorm`: query knowledge sources without generating
//! - `summary`, `steps`, `sessions`: inspect recorded sessions
//! - `templates`: list writing templates and source bindings

use crate::app;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyloom_replay::{SceneRef, StepKind};

pub mod inspect;
pub mod progress;
pub mod run;

/// Storyloom scene generation pipeline
#[derive(Parser, Debug)]
#[command(name = "storyloom")]
#[command(about = "Transparent, replayable scene generation")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over config/
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate scenes in a new session
    Run {
        /// Knowledge sources to consult (comma separated)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Extra direction for every scene
        #[arg(long)]
        guidance: Option<String>,
        /// Scenes to generate as ACT.SCENE (default: every outlined scene)
        #[arg(long = "scene")]
        scenes: Vec<SceneRef>,
        /// Do not print live step progress
        #[arg(long)]
        quiet: bool,
    },
    /// Query knowledge sources for scenes without generating them
    Brainstorm {
        /// Knowledge sources to consult (comma separated)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Extra direction for every scene
        #[arg(long)]
        guidance: Option<String>,
        /// Scenes to brainstorm as ACT.SCENE (default: every outlined scene)
        #[arg(long = "scene")]
        scenes: Vec<SceneRef>,
        /// Do not print live step progress
        #[arg(long)]
        quiet: bool,
    },
    /// Show a session summary
    Summary {
        /// Session identifier
        session_id: String,
    },
    /// Show the step timeline of a session
    Steps {
        /// Session identifier
        session_id: String,
        /// Only steps of this kind
        #[arg(long)]
        kind: Option<StepKind>,
    },
    /// List recent sessions
    Sessions {
        /// Number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// List writing templates and source bindings
    Templates,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = app::load_config(cli.config.as_deref())?;
    match command {
        Commands::Run {
            sources,
            guidance,
            scenes,
            quiet,
        } => run::run(&config, sources, guidance, scenes, quiet).await,
        Commands::Brainstorm {
            sources,
            guidance,
            scenes,
            quiet,
        } => run::brainstorm(&config, sources, guidance, scenes, quiet).await,
        Commands::Summary { session_id } => inspect::summary(&config, &session_id).await,
        Commands::Steps { session_id, kind } => inspect::steps(&config, &session_id, kind).await,
        Commands::Sessions { limit } => inspect::sessions(&config, limit).await,
        Commands::Templates => inspect::templates(&config),
    }
}
