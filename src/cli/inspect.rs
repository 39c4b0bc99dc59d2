//! Session inspection commands
//!
//! `summary`, `steps` and `sessions` read the pipeline store only; no
//! knowledge or completion service is needed.

use crate::app::{self, AppConfig};
use anyhow::{Context, Result};
use storyloom_replay::{SessionId, SessionViewer, StepKind};

async fn viewer(config: &AppConfig) -> Result<SessionViewer> {
    Ok(SessionViewer::new(app::open_store(config).await?))
}

/// `storyloom summary <SESSION_ID>`
pub async fn summary(config: &AppConfig, session_id: &str) -> Result<()> {
    let viewer = viewer(config).await?;
    let id = SessionId::from(session_id);
    let summary = viewer
        .summary(&id)
        .await
        .with_context(|| format!("Session {session_id} not found"))?;
    let stats = viewer.stats(&id).await?;

    let session = &summary.session;
    println!("\n📜 Session {}\n", session.id);
    println!("  Status:   {}", session.status);
    println!("  Sources:  {}", session.sources.join(", "));
    if let Some(guidance) = &session.guidance {
        println!("  Guidance: {guidance}");
    }
    println!("  Started:  {}", session.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(ms) = summary.duration_ms {
        println!("  Duration: {:.1}s", ms as f64 / 1000.0);
    }
    if let Some(error) = &session.error {
        println!("  Error:    {error}");
    }

    println!(
        "\n  Scenes: {}/{} generated, {} words (avg {:.0})",
        session.scenes_succeeded, session.scenes_processed, summary.total_words, summary.average_words
    );
    for outcome in &summary.scenes {
        let mark = if outcome.succeeded { "✓" } else { "✗" };
        let detail = match (&outcome.word_count, &outcome.error) {
            (Some(words), _) => format!("{words} words"),
            (None, Some(error)) => error.clone(),
            (None, None) => "no output".to_string(),
        };
        println!(
            "    [{mark}] {:<5} {detail} (sources {} ok, {} failed)",
            outcome.scene.to_string(),
            outcome.sources_succeeded,
            outcome.sources_failed
        );
    }

    println!("\n  Steps: {}", summary.step_count);
    for (kind, count) in &summary.step_counts {
        println!("    {:<10} {count}", kind.as_str());
    }
    println!(
        "\n  Queries: {} ({} failed, {} ms total)",
        stats.query_count, stats.failed_query_count, stats.total_query_duration_ms
    );
    println!(
        "  Generations: {} ({} failed, {} ms total)",
        stats.generation_count, stats.failed_generation_count, stats.total_generation_duration_ms
    );
    println!();
    Ok(())
}

/// `storyloom steps <SESSION_ID> [--kind KIND]`
pub async fn steps(config: &AppConfig, session_id: &str, kind: Option<StepKind>) -> Result<()> {
    let viewer = viewer(config).await?;
    let id = SessionId::from(session_id);

    let timeline = viewer
        .timeline(&id)
        .await
        .with_context(|| format!("Failed to load steps for {session_id}"))?;
    let entries: Vec<_> = timeline
        .into_iter()
        .filter(|entry| kind.is_none_or(|k| entry.kind == k))
        .collect();

    if entries.is_empty() {
        println!("  No steps recorded.");
        return Ok(());
    }

    for entry in entries {
        let mark = if entry.success { " " } else { "!" };
        let scene = entry.scene.map(|s| s.to_string()).unwrap_or_default();
        println!(
            "{mark}{:>4}  {}  {:<10} {:<5} {}",
            entry.sequence,
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.kind.as_str(),
            scene,
            entry.summary
        );
    }
    Ok(())
}

/// `storyloom sessions [--limit N]`
pub async fn sessions(config: &AppConfig, limit: i64) -> Result<()> {
    let viewer = viewer(config).await?;
    let summaries = viewer.recent_summaries(limit).await?;

    if summaries.is_empty() {
        println!("  No sessions found.");
        println!("  Start one with: storyloom run --sources scripts,books");
        return Ok(());
    }

    println!("\n📚 Sessions\n");
    for summary in summaries {
        let session = &summary.session;
        println!(
            "  {}  {:<9}  {}  {:>3}/{:<3} scenes  {:>6} words  [{}]",
            session.id,
            session.status.as_str(),
            session.started_at.format("%Y-%m-%d %H:%M"),
            session.scenes_succeeded,
            session.scenes_processed,
            summary.total_words,
            session.sources.join(",")
        );
    }
    println!();
    Ok(())
}

/// `storyloom templates`
pub fn templates(config: &AppConfig) -> Result<()> {
    let registry = app::load_templates(config)?;

    println!("\n📝 Templates\n");
    for template in registry.templates() {
        println!("  {}", template.name);
        if !template.focus_areas.is_empty() {
            println!("    focus: {}", template.focus_areas.join("; "));
        }
    }

    if !registry.bindings().is_empty() {
        println!("\n  Bindings:");
        for (source, template) in registry.bindings() {
            println!("    {source} -> {template}");
        }
    }
    println!("\n  Sources without a binding use the template of the same name, else generic.");
    println!();
    Ok(())
}
