//! Integration tests for Storyloom
//!
//! These tests drive the whole pipeline across crates:
//! - storyloom-core: sessions, fan-out, synthesis, event bus
//! - storyloom-replay: SQLite persistence and session summaries
//! - storyloom-llm: service traits, backed here by scripted fakes

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storyloom_core::{
    CharacterSummary, Error, EventBus, InMemoryRecordStore, Pipeline, PipelineConfig,
    PipelineEvent, RetryConfig, SceneOutline,
};
use storyloom_llm::{CompletionProvider, CompletionRequest, CompletionResponse, KnowledgeSource};
use storyloom_replay::{
    GeneratedOutput, PipelineStore, SceneRef, Session, SessionId, SessionStatus, SourceResult,
    SqliteStore, Step, StepKind,
};

// ============================================================================
// Fakes
// ============================================================================

/// Answers every source except those listed as down
struct FakeKnowledge {
    down: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeKnowledge {
    fn new(down: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            down: down.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for FakeKnowledge {
    fn name(&self) -> &str {
        "fake"
    }

    async fn query(&self, source: &str, _prompt: &str, _mode: &str) -> storyloom_llm::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.contains(&source) {
            return Err(storyloom_llm::Error::Api(format!("bucket {source} unavailable")));
        }
        Ok(format!("{source} says: end on a visual gag"))
    }
}

/// Writes a short scene naming the scene it was asked for
struct FakeWriter;

#[async_trait::async_trait]
impl CompletionProvider for FakeWriter {
    fn name(&self) -> &str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-writer"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> storyloom_llm::Result<CompletionResponse> {
        let prompt = request.prompt_text();
        let heading = prompt
            .lines()
            .find_map(|line| line.strip_prefix("SCENE TO WRITE: "))
            .unwrap_or("Unknown scene");
        Ok(CompletionResponse {
            content: format!("{heading}\n\nINT. FLOWER SHOP - NIGHT\n\nEmma drops the vase."),
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: request.model,
        })
    }
}

/// SQLite store that starts failing output writes after a number of them
struct FlakyStore {
    inner: SqliteStore,
    outputs_before_outage: usize,
    outputs_saved: AtomicUsize,
    down: AtomicBool,
}

impl FlakyStore {
    async fn new(outputs_before_outage: usize) -> Self {
        Self {
            inner: SqliteStore::in_memory().await.unwrap(),
            outputs_before_outage,
            outputs_saved: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl PipelineStore for FlakyStore {
    async fn create_session(&self, session: &Session) -> storyloom_replay::Result<()> {
        self.inner.create_session(session).await
    }

    async fn update_session(&self, session: &Session) -> storyloom_replay::Result<()> {
        PipelineStore::update_session(&self.inner, session).await
    }

    async fn get_session(&self, id: &SessionId) -> storyloom_replay::Result<Session> {
        PipelineStore::get_session(&self.inner, id).await
    }

    async fn list_sessions(&self, limit: i64) -> storyloom_replay::Result<Vec<Session>> {
        PipelineStore::list_sessions(&self.inner, limit).await
    }

    async fn append_step(&self, step: &Step) -> storyloom_replay::Result<()> {
        self.inner.append_step(step).await
    }

    async fn get_steps(&self, session_id: &SessionId) -> storyloom_replay::Result<Vec<Step>> {
        self.inner.get_steps(session_id).await
    }

    async fn get_steps_by_kind(
        &self,
        session_id: &SessionId,
        kind: StepKind,
    ) -> storyloom_replay::Result<Vec<Step>> {
        self.inner.get_steps_by_kind(session_id, kind).await
    }

    async fn next_sequence(&self, session_id: &SessionId) -> storyloom_replay::Result<i64> {
        self.inner.next_sequence(session_id).await
    }

    async fn save_source_result(&self, result: &SourceResult) -> storyloom_replay::Result<()> {
        self.inner.save_source_result(result).await
    }

    async fn get_source_results(
        &self,
        session_id: &SessionId,
        scene: SceneRef,
    ) -> storyloom_replay::Result<Vec<SourceResult>> {
        self.inner.get_source_results(session_id, scene).await
    }

    async fn prior_insights(
        &self,
        scene: SceneRef,
        exclude: &SessionId,
    ) -> storyloom_replay::Result<BTreeMap<String, String>> {
        self.inner.prior_insights(scene, exclude).await
    }

    async fn save_output(&self, output: &GeneratedOutput) -> storyloom_replay::Result<()> {
        if self.outputs_saved.load(Ordering::SeqCst) >= self.outputs_before_outage {
            self.down.store(true, Ordering::SeqCst);
            return Err(storyloom_replay::Error::Database("disk I/O error".to_string()));
        }
        self.inner.save_output(output).await?;
        self.outputs_saved.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn latest_output_before(
        &self,
        scene: SceneRef,
        session_id: Option<&SessionId>,
    ) -> storyloom_replay::Result<Option<GeneratedOutput>> {
        self.inner.latest_output_before(scene, session_id).await
    }

    async fn get_outputs(
        &self,
        session_id: &SessionId,
    ) -> storyloom_replay::Result<Vec<GeneratedOutput>> {
        self.inner.get_outputs(session_id).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn project() -> InMemoryRecordStore {
    InMemoryRecordStore::new()
        .with_character(
            CharacterSummary::new("Emma")
                .with_age("29")
                .with_gender("female")
                .with_challenge("Falls for people who are leaving")
                .with_lovable_trait("Names every plant")
                .with_flaw("Cannot lie without giggling"),
        )
        .with_character(CharacterSummary::new("Jake").with_age("31").with_gender("male"))
        .with_outline(SceneOutline::new(
            SceneRef::new(1, 1),
            "Emma",
            "Emma's shop floods",
        ))
        .with_outline(SceneOutline::new(
            SceneRef::new(1, 2),
            "Emma, Jake",
            "Jake the plumber arrives",
        ))
        .with_outline(SceneOutline::new(
            SceneRef::new(1, 3),
            "Jake",
            "Jake finds the note",
        ))
        .with_outline(SceneOutline::new(
            SceneRef::new(2, 1),
            "Emma, Jake",
            "The second flood is suspicious",
        ))
}

fn quick_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_scene_pause(Duration::ZERO)
        .with_query_delay(Duration::ZERO)
        .with_retry(RetryConfig::none())
}

fn pipeline(store: Arc<dyn PipelineStore>, knowledge: Arc<FakeKnowledge>) -> Pipeline {
    Pipeline::new(
        Arc::new(project()),
        store,
        knowledge,
        Arc::new(FakeWriter),
        quick_config(),
    )
    .unwrap()
}

async fn context_continuity(pipeline: &Pipeline, session: &SessionId) -> Vec<Option<String>> {
    pipeline
        .steps_by_kind(session, StepKind::Context)
        .await
        .unwrap()
        .iter()
        .map(|step| step.payload["context"]["continuity"].as_str().map(String::from))
        .collect()
}

// ============================================================================
// Pipeline runs
// ============================================================================

#[tokio::test]
async fn test_run_project_covers_every_outlined_scene() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let knowledge = FakeKnowledge::new(&["plays"]);
    let pipeline = pipeline(store.clone(), knowledge.clone());

    let mut session = pipeline
        .start_session(["scripts", "books", "plays"], None)
        .await
        .unwrap();
    let summary = pipeline.run_project(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.ended_at.is_some());
    assert_eq!(summary.session.scenes_processed, 4);
    assert_eq!(summary.session.scenes_succeeded, 4);
    assert_eq!(summary.scenes.len(), 4);
    assert_eq!(knowledge.calls.load(Ordering::SeqCst), 12);

    // One result per active source per scene, whatever the outcome
    for scene in [
        SceneRef::new(1, 1),
        SceneRef::new(1, 2),
        SceneRef::new(1, 3),
        SceneRef::new(2, 1),
    ] {
        let results = store.get_source_results(&session.id, scene).await.unwrap();
        assert_eq!(results.len(), 3, "scene {scene}");
        assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
    }

    let outputs = store.get_outputs(&session.id).await.unwrap();
    let scenes: Vec<_> = outputs.iter().map(|o| o.scene).collect();
    assert_eq!(
        scenes,
        vec![
            SceneRef::new(1, 1),
            SceneRef::new(1, 2),
            SceneRef::new(1, 3),
            SceneRef::new(2, 1)
        ]
    );
    assert_eq!(
        summary.total_words,
        outputs.iter().map(|o| o.word_count).sum::<u64>()
    );
}

#[tokio::test]
async fn test_continuity_follows_narrative_order() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = pipeline(store.clone(), FakeKnowledge::new(&[]));

    let mut session = pipeline.start_session(["scripts"], None).await.unwrap();
    pipeline
        .run_all_scenes(
            &mut session,
            [SceneRef::new(1, 2), SceneRef::new(1, 1), SceneRef::new(1, 3)],
        )
        .await
        .unwrap();

    let outputs = store.get_outputs(&session.id).await.unwrap();
    let continuity = context_continuity(&pipeline, &session.id).await;
    assert_eq!(continuity.len(), 3);
    assert_eq!(continuity[0], None);
    assert_eq!(continuity[1].as_deref(), Some(outputs[0].text.as_str()));
    assert_eq!(continuity[2].as_deref(), Some(outputs[1].text.as_str()));
    assert!(outputs[1].text.starts_with("Act 1, Scene 2"));
}

#[tokio::test]
async fn test_store_outage_fails_session_and_keeps_steps() {
    let store = Arc::new(FlakyStore::new(1).await);
    let pipeline = pipeline(store.clone(), FakeKnowledge::new(&[]));
    let mut events = pipeline.event_bus().subscribe_all();

    let mut session = pipeline
        .start_session(["scripts", "books"], None)
        .await
        .unwrap();
    let err = pipeline
        .run_all_scenes(
            &mut session,
            [SceneRef::new(1, 1), SceneRef::new(1, 2), SceneRef::new(1, 3)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert!(store.down.load(Ordering::SeqCst));
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error.as_deref().unwrap().contains("disk I/O error"));

    let stored = store.get_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);

    // Processing halted inside 1.2; everything recorded before the outage stays
    let steps = store.get_steps(&session.id).await.unwrap();
    assert!(steps.iter().all(|s| s.scene != Some(SceneRef::new(1, 3))));
    assert!(steps
        .iter()
        .any(|s| s.kind == StepKind::Generation && s.scene == Some(SceneRef::new(1, 2))));
    assert_eq!(
        steps.iter().filter(|s| s.kind == StepKind::Persisted).count(),
        1
    );
    assert_eq!(store.get_outputs(&session.id).await.unwrap().len(), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::SessionFailed { session_id, .. } = event {
            assert_eq!(session_id, session.id);
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_prior_session_insights_reach_the_prompt() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = pipeline(store.clone(), FakeKnowledge::new(&[]));

    let mut first = pipeline.start_session(["scripts"], None).await.unwrap();
    pipeline
        .run_all_scenes(&mut first, [SceneRef::new(2, 1)])
        .await
        .unwrap();

    let mut second = pipeline
        .start_session(["books"], Some("lean into slapstick".to_string()))
        .await
        .unwrap();
    pipeline
        .run_all_scenes(&mut second, [SceneRef::new(2, 1)])
        .await
        .unwrap();

    let generation = pipeline
        .steps_by_kind(&second.id, StepKind::Generation)
        .await
        .unwrap();
    let prompt = generation[0].payload["prompt"].as_str().unwrap();
    assert!(prompt.contains("BRAINSTORMING INSIGHTS:\n[scripts]: scripts says"));
    assert!(prompt.contains("WRITING GUIDANCE:\n[books]: books says"));
    assert!(prompt.contains("SPECIFIC REQUIREMENTS: lean into slapstick"));
}

#[tokio::test]
async fn test_brainstorm_session_feeds_later_writing() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = pipeline(store.clone(), FakeKnowledge::new(&[]));

    let mut brainstorm = pipeline.start_session(["plays"], None).await.unwrap();
    let summary = pipeline
        .brainstorm_all_scenes(&mut brainstorm, [SceneRef::new(2, 1)])
        .await
        .unwrap();
    assert_eq!(summary.session.status, SessionStatus::Completed);
    assert_eq!(summary.session.scenes_succeeded, 1);
    assert!(!summary.step_counts.contains_key(&StepKind::Generation));
    assert!(store.get_outputs(&brainstorm.id).await.unwrap().is_empty());

    let mut write = pipeline.start_session(["scripts"], None).await.unwrap();
    pipeline
        .run_all_scenes(&mut write, [SceneRef::new(2, 1)])
        .await
        .unwrap();

    let generation = pipeline
        .steps_by_kind(&write.id, StepKind::Generation)
        .await
        .unwrap();
    let prompt = generation[0].payload["prompt"].as_str().unwrap();
    assert!(prompt.contains("BRAINSTORMING INSIGHTS:\n[plays]: plays says"));
    assert!(prompt.contains("WRITING GUIDANCE:\n[scripts]: scripts says"));
}

// ============================================================================
// Event bus and replay
// ============================================================================

#[tokio::test]
async fn test_callback_subscribers_see_every_response() {
    let bus = Arc::new(EventBus::new(64));
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = pipeline(store, FakeKnowledge::new(&["books"])).with_event_bus(bus.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = bus.on(StepKind::Response, move |step| {
        let source = step.payload["source"].as_str().unwrap_or_default().to_string();
        sink.lock().unwrap().push((source, step.succeeded()));
        Ok(())
    });
    // A failing subscriber does not disturb the run
    let noisy = bus.on(StepKind::Response, |_| anyhow::bail!("subscriber offline"));
    assert_eq!(bus.subscription_count(), 2);

    let mut session = pipeline
        .start_session(["scripts", "books"], None)
        .await
        .unwrap();
    pipeline
        .run_all_scenes(&mut session, [SceneRef::new(1, 1), SceneRef::new(1, 2)])
        .await
        .unwrap();

    // Callbacks run on their own tasks
    for _ in 0..50 {
        if seen.lock().unwrap().len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("books".to_string(), false),
            ("books".to_string(), false),
            ("scripts".to_string(), true),
            ("scripts".to_string(), true),
        ]
    );

    assert!(bus.unsubscribe(id));
    assert!(bus.unsubscribe(noisy));
    assert!(!bus.unsubscribe(id));
    assert_eq!(bus.subscription_count(), 0);
}

#[tokio::test]
async fn test_session_summary_and_listing() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = pipeline(store, FakeKnowledge::new(&[]));

    let mut session = pipeline.start_session(["scripts"], None).await.unwrap();
    pipeline
        .run_all_scenes(&mut session, [SceneRef::new(1, 1), SceneRef::new(9, 9)])
        .await
        .unwrap();

    let summary = pipeline.session_summary(&session.id).await.unwrap();
    assert_eq!(summary.session.status, SessionStatus::Completed);
    assert_eq!(summary.session.scenes_processed, 2);
    assert_eq!(summary.session.scenes_succeeded, 1);
    assert_eq!(summary.step_counts[&StepKind::Context], 2);
    assert_eq!(summary.step_counts[&StepKind::Persisted], 1);
    assert_eq!(summary.average_words, summary.total_words as f64);

    let failed: Vec<_> = summary.failed_scenes().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].scene, SceneRef::new(9, 9));

    let sessions = pipeline.list_sessions(5).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session.id);
}
