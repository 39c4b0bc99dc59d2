//! `storyloom run` and `storyloom brainstorm` - drive a new session

use super::progress;
use crate::app::{self, AppConfig};
use anyhow::{Context, Result};
use std::time::Duration;
use storyloom_replay::{SceneRef, SessionSummary};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Brainstorm,
}

/// Open a session and generate the requested scenes (or every outlined one)
pub async fn run(
    config: &AppConfig,
    sources: Vec<String>,
    guidance: Option<String>,
    scenes: Vec<SceneRef>,
    quiet: bool,
) -> Result<()> {
    drive(config, Mode::Write, sources, guidance, scenes, quiet).await
}

/// Open a session and query sources for the requested scenes without
/// generating them
pub async fn brainstorm(
    config: &AppConfig,
    sources: Vec<String>,
    guidance: Option<String>,
    scenes: Vec<SceneRef>,
    quiet: bool,
) -> Result<()> {
    drive(config, Mode::Brainstorm, sources, guidance, scenes, quiet).await
}

async fn drive(
    config: &AppConfig,
    mode: Mode,
    sources: Vec<String>,
    guidance: Option<String>,
    scenes: Vec<SceneRef>,
    quiet: bool,
) -> Result<()> {
    let sources = if sources.is_empty() {
        config.knowledge.default_sources.clone()
    } else {
        sources
    };
    match mode {
        Mode::Write => app::validate_run_config(config, &sources)?,
        Mode::Brainstorm => app::validate_brainstorm_config(config, &sources)?,
    }

    let pipeline = app::build_pipeline(config).await?;
    let view = (!quiet).then(|| progress::follow(pipeline.event_bus()));

    let mut session = pipeline
        .start_session(sources, guidance)
        .await
        .context("Failed to start session")?;
    info!(session_id = %session.id, ?mode, "Session started");

    let outcome = match (mode, scenes.is_empty()) {
        (Mode::Write, true) => pipeline.run_project(&mut session).await,
        (Mode::Write, false) => pipeline.run_all_scenes(&mut session, scenes).await,
        (Mode::Brainstorm, true) => pipeline.brainstorm_project(&mut session).await,
        (Mode::Brainstorm, false) => pipeline.brainstorm_all_scenes(&mut session, scenes).await,
    };

    if let Some(view) = view {
        if session.status.is_terminal() {
            // Let the view print the final event
            let _ = tokio::time::timeout(Duration::from_secs(1), view).await;
        } else {
            view.abort();
        }
    }

    match outcome {
        Ok(summary) => {
            match mode {
                Mode::Write => print_result(&summary),
                Mode::Brainstorm => print_brainstorm(&summary),
            }
            Ok(())
        }
        Err(e) => {
            error!(session_id = %session.id, error = %e, "Run failed");
            if let Some(hint) = e.suggestion() {
                eprintln!("💡 {hint}");
            }
            eprintln!("   Inspect with: storyloom steps {}", session.id);
            Err(e.into())
        }
    }
}

fn print_brainstorm(summary: &SessionSummary) {
    let session = &summary.session;
    println!();
    println!("🧠 Brainstorm session {}", session.id);
    println!(
        "  Scenes: {}/{} fully answered",
        session.scenes_succeeded, session.scenes_processed
    );
    for outcome in &summary.scenes {
        match &outcome.error {
            Some(error) => println!("    {} {error}", outcome.scene),
            None => println!(
                "    {} {}/{} sources",
                outcome.scene,
                outcome.sources_succeeded,
                outcome.sources_succeeded + outcome.sources_failed
            ),
        }
    }
    println!("  Later `storyloom run` sessions use these answers as insights");
}

fn print_result(summary: &SessionSummary) {
    let session = &summary.session;
    println!();
    println!("📊 Session {}", session.id);
    println!(
        "  Scenes: {}/{} generated, {} words (avg {:.0})",
        session.scenes_succeeded, session.scenes_processed, summary.total_words, summary.average_words
    );

    let failed: Vec<_> = summary.failed_scenes().collect();
    if !failed.is_empty() {
        println!("  Failed scenes:");
        for outcome in failed {
            println!(
                "    {} {}",
                outcome.scene,
                outcome.error.as_deref().unwrap_or("no output")
            );
        }
    }
    println!("  Replay with: storyloom steps {}", session.id);
}
