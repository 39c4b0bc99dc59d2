//! Viewer Stats - Session statistics and summaries

use super::types::{SceneOutcome, SessionStats, SessionSummary};
use crate::event::{SceneRef, Session, Step, StepKind};
use std::collections::BTreeMap;

fn duration_of(step: &Step) -> u64 {
    step.payload
        .get("duration_ms")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

fn error_of(step: &Step) -> Option<String> {
    step.payload
        .get("error")
        .and_then(|v| v.as_str())
        .map(String::from)
}

pub(super) fn scene_outcomes(steps: &[Step]) -> Vec<SceneOutcome> {
    let mut outcomes: BTreeMap<SceneRef, SceneOutcome> = BTreeMap::new();

    for step in steps {
        let Some(scene) = step.scene else { continue };
        let outcome = outcomes
            .entry(scene)
            .or_insert_with(|| SceneOutcome::new(scene));

        match step.kind {
            StepKind::Context | StepKind::Generation if !step.succeeded() => {
                outcome.error = error_of(step);
            }
            StepKind::Response => {
                if step.succeeded() {
                    outcome.sources_succeeded += 1;
                } else {
                    outcome.sources_failed += 1;
                }
            }
            StepKind::Persisted => {
                outcome.succeeded = true;
                outcome.error = None;
                outcome.word_count = step.payload.get("word_count").and_then(|v| v.as_u64());
            }
            _ => {}
        }
    }

    outcomes.into_values().collect()
}

pub(super) fn build_summary(session: Session, steps: &[Step]) -> SessionSummary {
    let mut step_counts = BTreeMap::new();
    for step in steps {
        *step_counts.entry(step.kind).or_insert(0) += 1;
    }

    let scenes = scene_outcomes(steps);
    let persisted: Vec<u64> = scenes.iter().filter_map(|s| s.word_count).collect();
    let total_words: u64 = persisted.iter().sum();
    let average_words = if persisted.is_empty() {
        0.0
    } else {
        total_words as f64 / persisted.len() as f64
    };

    let duration_ms = session
        .ended_at
        .map(|ended| (ended - session.started_at).num_milliseconds().max(0) as u64);

    SessionSummary {
        session,
        step_counts,
        step_count: steps.len(),
        scenes,
        total_words,
        average_words,
        duration_ms,
    }
}

pub(super) fn calculate_stats(steps: &[Step]) -> SessionStats {
    let responses = steps.iter().filter(|s| s.kind == StepKind::Response);
    let generations: Vec<&Step> = steps
        .iter()
        .filter(|s| s.kind == StepKind::Generation)
        .collect();

    let total_duration_ms = steps
        .first()
        .zip(steps.last())
        .map(|(f, l)| (l.timestamp - f.timestamp).num_milliseconds().max(0) as u64);

    SessionStats {
        step_count: steps.len(),
        query_count: steps.iter().filter(|s| s.kind == StepKind::Query).count(),
        failed_query_count: responses.clone().filter(|s| !s.succeeded()).count(),
        generation_count: generations.len(),
        failed_generation_count: generations.iter().filter(|s| !s.succeeded()).count(),
        total_query_duration_ms: responses.map(duration_of).sum(),
        total_generation_duration_ms: generations.iter().map(|s| duration_of(s)).sum(),
        total_duration_ms,
    }
}
