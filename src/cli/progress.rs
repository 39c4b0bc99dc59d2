//! Console progress view
//!
//! Prints one line per pipeline event, fed by an event bus subscription.

use storyloom_core::{EventBus, PipelineEvent};
use storyloom_replay::{Step, StepKind};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

/// Render an event as a console line. Returns `None` for events not shown.
pub fn render_event(event: &PipelineEvent) -> Option<String> {
    let line = match event {
        PipelineEvent::SessionStarted {
            session_id,
            sources,
        } => format!("▶ Session {session_id} started ({})", sources.join(", ")),
        PipelineEvent::SceneStarted { scene, .. } => format!("\n🎬 Scene {scene}"),
        PipelineEvent::StepRecorded { step } => render_step(step)?,
        PipelineEvent::SceneCompleted {
            scene, word_count, ..
        } => format!("  ✅ Scene {scene} saved ({word_count} words)"),
        PipelineEvent::SceneBrainstormed {
            scene,
            sources_answered,
            sources_queried,
            ..
        } => format!("  💡 Scene {scene} brainstormed ({sources_answered}/{sources_queried} sources)"),
        PipelineEvent::SceneFailed { scene, error, .. } => {
            format!("  ❌ Scene {scene} failed: {error}")
        }
        PipelineEvent::SessionCompleted {
            session_id,
            scenes_processed,
            scenes_succeeded,
        } => format!(
            "\n🏁 Session {session_id} completed: {scenes_succeeded}/{scenes_processed} scenes"
        ),
        PipelineEvent::SessionFailed { session_id, error } => {
            format!("\n💥 Session {session_id} failed: {error}")
        }
    };
    Some(line)
}

fn render_step(step: &Step) -> Option<String> {
    let source = step.payload["source"].as_str().unwrap_or("?");
    let line = match step.kind {
        StepKind::Context if !step.succeeded() => format!(
            "  [{:>3}] context failed: {}",
            step.sequence,
            step.payload["error"].as_str().unwrap_or("unknown error")
        ),
        StepKind::Context => format!("  [{:>3}] context assembled", step.sequence),
        StepKind::Prompt => format!("  [{:>3}] prompts compiled", step.sequence),
        StepKind::Query => format!("  [{:>3}] → {source}", step.sequence),
        StepKind::Response if step.succeeded() => format!(
            "  [{:>3}] ← {source} ({} ms)",
            step.sequence,
            step.payload["duration_ms"].as_u64().unwrap_or(0)
        ),
        StepKind::Response => format!(
            "  [{:>3}] ← {source} failed: {}",
            step.sequence,
            step.payload["error"].as_str().unwrap_or("unknown error")
        ),
        StepKind::Generation if step.succeeded() => format!(
            "  [{:>3}] generated {} words",
            step.sequence,
            step.metadata["word_count"].as_u64().unwrap_or(0)
        ),
        StepKind::Generation => format!(
            "  [{:>3}] generation failed: {}",
            step.sequence,
            step.payload["error"].as_str().unwrap_or("unknown error")
        ),
        // Reported by SceneCompleted
        StepKind::Persisted => return None,
    };
    Some(line)
}

/// Print events from `bus` until a session ends
pub fn follow(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe_all();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                    if matches!(
                        event,
                        PipelineEvent::SessionCompleted { .. } | PipelineEvent::SessionFailed { .. }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress view fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
