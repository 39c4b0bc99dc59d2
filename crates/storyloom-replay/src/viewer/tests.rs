use super::*;
use crate::event::{SceneRef, Session, SessionId, Step, StepKind};
use crate::store::{PipelineStore, SqliteStore, StepRecorder};
use serde_json::json;
use std::sync::Arc;

fn step(kind: StepKind, scene: SceneRef, payload: serde_json::Value, success: bool) -> Step {
    Step::new(SessionId::from("S_test"), 0, kind)
        .with_scene(Some(scene))
        .with_payload(payload)
        .with_metadata(json!({ "success": success }))
}

#[test]
fn test_scene_outcomes() {
    let ok = SceneRef::new(1, 1);
    let broken = SceneRef::new(1, 2);
    let steps = vec![
        step(StepKind::Context, ok, json!({}), true),
        step(StepKind::Response, ok, json!({"source": "scripts"}), true),
        step(StepKind::Response, ok, json!({"source": "books", "error": "timeout"}), false),
        step(StepKind::Generation, ok, json!({"text": "..."}), true),
        step(StepKind::Persisted, ok, json!({"word_count": 120}), true),
        step(StepKind::Context, broken, json!({}), true),
        step(StepKind::Generation, broken, json!({"error": "provider down"}), false),
    ];

    let outcomes = stats::scene_outcomes(&steps);
    assert_eq!(outcomes.len(), 2);

    assert!(outcomes[0].succeeded);
    assert_eq!(outcomes[0].word_count, Some(120));
    assert_eq!(outcomes[0].sources_succeeded, 1);
    assert_eq!(outcomes[0].sources_failed, 1);

    assert!(!outcomes[1].succeeded);
    assert_eq!(outcomes[1].error.as_deref(), Some("provider down"));
}

#[test]
fn test_summarize_steps() {
    let scene = SceneRef::new(2, 3);
    let failed = step(StepKind::Response, scene, json!({"source": "books", "error": "timeout after 10ms"}), false);
    assert_eq!(
        timeline::summarize_step(&failed),
        "Response from books failed: timeout after 10ms"
    );

    let generated = Step::new(SessionId::from("S_test"), 1, StepKind::Generation)
        .with_scene(Some(scene))
        .with_metadata(json!({"success": true, "word_count": 42}));
    assert_eq!(timeline::summarize_step(&generated), "Generated 2.3 (42 words)");
}

#[test]
fn test_truncate_is_char_safe() {
    assert_eq!(types::truncate("short", 10), "short");
    assert_eq!(types::truncate("ééééééééééé", 6), "ééé...");
}

#[tokio::test]
async fn test_summary_from_store() {
    let store = SqliteStore::in_memory().await.unwrap();
    let mut session = Session::new(["scripts"], None);
    store.create_session(&session).await.unwrap();
    session.mark_running().unwrap();

    let shared: Arc<dyn PipelineStore> = Arc::new(store);
    let recorder = StepRecorder::new(shared.clone(), session.id.clone());
    let scene = SceneRef::new(1, 1);
    for (kind, payload) in [
        (StepKind::Context, json!({})),
        (StepKind::Prompt, json!({"prompts": {"scripts": {}}})),
        (StepKind::Query, json!({"source": "scripts"})),
        (StepKind::Response, json!({"source": "scripts", "response": "ok", "duration_ms": 15})),
        (StepKind::Generation, json!({"text": "a b c d", "duration_ms": 30})),
        (StepKind::Persisted, json!({"word_count": 4})),
    ] {
        recorder
            .record_scene(kind, scene, payload, json!({"success": true}))
            .await
            .unwrap();
    }
    session.mark_completed().unwrap();
    shared.update_session(&session).await.unwrap();

    let viewer = SessionViewer::new(shared);
    let summary = viewer.summary(&session.id).await.unwrap();
    assert_eq!(summary.step_count, 6);
    assert_eq!(summary.step_counts[&StepKind::Response], 1);
    assert_eq!(summary.total_words, 4);
    assert_eq!(summary.average_words, 4.0);
    assert_eq!(summary.failed_scenes().count(), 0);
    assert!(summary.duration_ms.is_some());

    let stats = viewer.stats(&session.id).await.unwrap();
    assert_eq!(stats.query_count, 1);
    assert_eq!(stats.total_query_duration_ms, 15);
    assert_eq!(stats.total_generation_duration_ms, 30);

    let timeline = viewer.timeline(&session.id).await.unwrap();
    assert_eq!(timeline.len(), 6);
    assert_eq!(timeline[1].summary, "Compiled 1 prompts for 1.1");

    let queries = viewer
        .steps(&session.id, Some(StepKind::Query))
        .await
        .unwrap();
    assert_eq!(queries.len(), 1);

    assert_eq!(viewer.recent_summaries(5).await.unwrap().len(), 1);
}
