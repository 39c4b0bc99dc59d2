//! Viewer Timeline - Timeline building and step summarization

use super::types::truncate;
use crate::event::{Step, StepKind, TimelineEntry};

pub(super) fn build_timeline(steps: &[Step]) -> Vec<TimelineEntry> {
    steps
        .iter()
        .map(|step| TimelineEntry {
            sequence: step.sequence,
            timestamp: step.timestamp,
            kind: step.kind,
            scene: step.scene,
            summary: summarize_step(step),
            success: step.succeeded(),
        })
        .collect()
}

fn payload_str<'a>(step: &'a Step, key: &str) -> &'a str {
    step.payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

pub(super) fn summarize_step(step: &Step) -> String {
    let scene = step
        .scene
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    match step.kind {
        StepKind::Context => {
            if step.succeeded() {
                let characters = step
                    .payload
                    .pointer("/context/characters")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                let continuity = step
                    .payload
                    .pointer("/context/continuity")
                    .is_some_and(|v| !v.is_null());
                format!(
                    "Context for {scene}: {characters} characters{}",
                    if continuity { ", with continuity" } else { "" }
                )
            } else {
                format!("Context for {scene} failed: {}", truncate(payload_str(step, "error"), 60))
            }
        }
        StepKind::Prompt => {
            let sources = step
                .payload
                .get("prompts")
                .and_then(|v| v.as_object())
                .map(|m| m.len())
                .unwrap_or(0);
            format!("Compiled {sources} prompts for {scene}")
        }
        StepKind::Query => format!("Query {} for {scene}", payload_str(step, "source")),
        StepKind::Response => {
            let source = payload_str(step, "source");
            if step.succeeded() {
                format!(
                    "Response from {source}: {}",
                    truncate(payload_str(step, "response"), 50)
                )
            } else {
                format!(
                    "Response from {source} failed: {}",
                    truncate(payload_str(step, "error"), 50)
                )
            }
        }
        StepKind::Generation => {
            if step.succeeded() {
                let words = step
                    .metadata
                    .get("word_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                format!("Generated {scene} ({words} words)")
            } else {
                format!(
                    "Generation for {scene} failed: {}",
                    truncate(payload_str(step, "error"), 60)
                )
            }
        }
        StepKind::Persisted => format!("Persisted {scene}"),
    }
}
