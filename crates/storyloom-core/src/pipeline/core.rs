//! Pipeline core structure
//!
//! Contains the `Pipeline` struct, its builder methods and the session and
//! scene drivers.

use super::compiler::PromptCompiler;
use super::config::PipelineConfig;
use super::context::{ContextAssembler, SceneContext};
use super::fanout::KnowledgeFanout;
use super::synthesizer::Synthesizer;
use super::templates::TemplateRegistry;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, PipelineEvent};
use crate::records::RecordStore;
use dashmap::DashMap;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use storyloom_llm::{CompletionProvider, KnowledgeSource};
use storyloom_replay::{
    GeneratedOutput, PipelineStore, SceneRef, Session, SessionId, SessionSummary, SessionViewer,
    SourceResult, Step, StepKind, StepRecorder,
};
use tracing::{error, info, instrument, warn};

/// Drives sessions through the generation pipeline
pub struct Pipeline {
    records: Arc<dyn RecordStore>,
    store: Arc<dyn PipelineStore>,
    config: Arc<PipelineConfig>,
    assembler: ContextAssembler,
    compiler: PromptCompiler,
    fanout: KnowledgeFanout,
    synthesizer: Synthesizer,
    event_bus: Arc<EventBus>,
    /// Step recorders of sessions started or resumed by this pipeline
    recorders: DashMap<SessionId, Arc<StepRecorder>>,
}

impl Pipeline {
    /// Create a pipeline with the built-in templates and a private event bus
    pub fn new(
        records: Arc<dyn RecordStore>,
        store: Arc<dyn PipelineStore>,
        knowledge: Arc<dyn KnowledgeSource>,
        completion: Arc<dyn CompletionProvider>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            assembler: ContextAssembler::new(records.clone(), store.clone()),
            compiler: PromptCompiler::new(Arc::new(TemplateRegistry::with_builtins())),
            fanout: KnowledgeFanout::new(knowledge, store.clone(), config.clone()),
            synthesizer: Synthesizer::new(completion, store.clone(), config.clone()),
            records,
            store,
            config,
            event_bus: Arc::new(EventBus::default()),
            recorders: DashMap::new(),
        })
    }

    /// Set the template registry
    #[must_use]
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.compiler = PromptCompiler::new(Arc::new(templates));
        self
    }

    /// Set the event bus for live step and lifecycle events
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    /// Get the event bus
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the template registry
    #[must_use]
    pub fn templates(&self) -> &TemplateRegistry {
        self.compiler.templates()
    }

    /// Create a session and move it to running
    #[instrument(skip(self, active_sources, guidance))]
    pub async fn start_session<I, S>(
        &self,
        active_sources: I,
        guidance: Option<String>,
    ) -> Result<Session>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut session = Session::new(active_sources, guidance);
        if session.sources.is_empty() {
            return Err(Error::InvalidConfig {
                field: "sources".to_string(),
                message: "at least one knowledge source is required".to_string(),
            });
        }

        self.store.create_session(&session).await?;
        session.mark_running()?;
        self.store.update_session(&session).await?;

        let recorder = StepRecorder::new(self.store.clone(), session.id.clone())
            .with_observer(self.event_bus.clone());
        self.recorders
            .insert(session.id.clone(), Arc::new(recorder));

        self.event_bus.publish(PipelineEvent::SessionStarted {
            session_id: session.id.clone(),
            sources: session.sources.clone(),
        });
        info!(session_id = %session.id, sources = ?session.sources, "Session started");
        Ok(session)
    }

    async fn recorder_for(&self, session: &Session) -> Result<Arc<StepRecorder>> {
        if let Some(recorder) = self.recorders.get(&session.id) {
            return Ok(recorder.clone());
        }

        let recorder = Arc::new(
            StepRecorder::new_from_existing(self.store.clone(), session.id.clone())
                .await?
                .with_observer(self.event_bus.clone()),
        );
        Ok(self
            .recorders
            .entry(session.id.clone())
            .or_insert(recorder)
            .clone())
    }

    /// Generate one scene.
    ///
    /// Scene-level failures leave the session running. A store failure
    /// marks the session failed before the error is returned.
    #[instrument(skip(self, session), fields(session_id = %session.id, scene = %scene))]
    pub async fn run_scene(
        &self,
        session: &mut Session,
        scene: SceneRef,
    ) -> Result<GeneratedOutput> {
        if !session.is_running() {
            return Err(Error::SessionNotRunning(session.id.to_string()));
        }

        info!("Processing scene {}", scene);
        self.event_bus.publish(PipelineEvent::SceneStarted {
            session_id: session.id.clone(),
            scene,
        });

        let outcome = self.process_scene(session, scene).await;
        session.record_scene(outcome.as_ref().ok());

        self.settle_scene(session, scene, outcome, |session_id, output| {
            PipelineEvent::SceneCompleted {
                session_id,
                scene,
                word_count: output.word_count,
            }
        })
        .await
    }

    /// Query every active source for one scene without generating it.
    ///
    /// The responses are stored like a writing run's, so later sessions
    /// see them as brainstorming insights. Failure handling matches
    /// [`Pipeline::run_scene`].
    #[instrument(skip(self, session), fields(session_id = %session.id, scene = %scene))]
    pub async fn brainstorm_scene(
        &self,
        session: &mut Session,
        scene: SceneRef,
    ) -> Result<BTreeMap<String, SourceResult>> {
        if !session.is_running() {
            return Err(Error::SessionNotRunning(session.id.to_string()));
        }

        info!("Brainstorming scene {}", scene);
        self.event_bus.publish(PipelineEvent::SceneStarted {
            session_id: session.id.clone(),
            scene,
        });

        let outcome = match self.recorder_for(session).await {
            Ok(recorder) => self
                .gather(&recorder, session, scene)
                .await
                .map(|(_, results)| results),
            Err(e) => Err(e),
        };
        session.record_brainstorm(
            outcome
                .as_ref()
                .is_ok_and(|results| results.values().all(|r| r.success)),
        );

        self.settle_scene(session, scene, outcome, |session_id, results| {
            PipelineEvent::SceneBrainstormed {
                session_id,
                scene,
                sources_answered: results.values().filter(|r| r.success).count(),
                sources_queried: results.len(),
            }
        })
        .await
    }

    /// Persist the session counters after a scene and publish its outcome
    async fn settle_scene<T>(
        &self,
        session: &mut Session,
        scene: SceneRef,
        outcome: Result<T>,
        completed: impl FnOnce(SessionId, &T) -> PipelineEvent,
    ) -> Result<T> {
        match outcome {
            Err(e) if e.is_session_fatal() => {
                self.fail_session(session, &e).await;
                Err(e)
            }
            outcome => {
                if let Err(e) = self.store.update_session(session).await {
                    let e = Error::from(e);
                    self.fail_session(session, &e).await;
                    return Err(e);
                }

                match &outcome {
                    Ok(value) => {
                        self.event_bus.publish(completed(session.id.clone(), value));
                    }
                    Err(e) => {
                        warn!(error = %e, "Scene failed");
                        self.event_bus.publish(PipelineEvent::SceneFailed {
                            session_id: session.id.clone(),
                            scene,
                            error: e.to_string(),
                        });
                    }
                }
                outcome
            }
        }
    }

    async fn process_scene(&self, session: &Session, scene: SceneRef) -> Result<GeneratedOutput> {
        let recorder = self.recorder_for(session).await?;
        let (context, results) = self.gather(&recorder, session, scene).await?;

        self.synthesizer
            .synthesize(&recorder, &session.id, &context, &results)
            .await
    }

    /// Assemble the context, compile the prompts and query every source
    async fn gather(
        &self,
        recorder: &StepRecorder,
        session: &Session,
        scene: SceneRef,
    ) -> Result<(SceneContext, BTreeMap<String, SourceResult>)> {
        let context = match self.assembler.assemble(session, scene).await {
            Ok(context) => context,
            Err(e) => {
                recorder
                    .record_scene(
                        StepKind::Context,
                        scene,
                        json!({ "error": e.to_string() }),
                        json!({ "success": false }),
                    )
                    .await?;
                return Err(e);
            }
        };
        recorder
            .record_scene(
                StepKind::Context,
                scene,
                json!({ "context": context }),
                json!({
                    "success": true,
                    "characters": context.characters.len(),
                    "has_continuity": context.continuity.is_some(),
                    "insights": context.prior_insights.len(),
                }),
            )
            .await?;

        let prompts = match self.compiler.compile(&context, &session.sources) {
            Ok(prompts) => prompts,
            Err(e) => {
                recorder
                    .record_scene(
                        StepKind::Prompt,
                        scene,
                        json!({ "error": e.to_string() }),
                        json!({ "success": false }),
                    )
                    .await?;
                return Err(e);
            }
        };
        recorder
            .record_scene(
                StepKind::Prompt,
                scene,
                json!({ "prompts": prompts }),
                json!({ "success": true, "sources": prompts.len() }),
            )
            .await?;

        let results = self
            .fanout
            .execute(recorder, &session.id, scene, &prompts)
            .await?;
        Ok((context, results))
    }

    async fn fail_session(&self, session: &mut Session, cause: &Error) {
        error!(session_id = %session.id, error = %cause, "Session failed");
        if let Err(e) = session.mark_failed(cause.to_string()) {
            warn!(session_id = %session.id, error = %e, "Could not mark session failed");
        }
        if let Err(e) = self.store.update_session(session).await {
            error!(session_id = %session.id, error = %e, "Could not persist failed session");
        }

        self.recorders.remove(&session.id);
        self.event_bus.publish(PipelineEvent::SessionFailed {
            session_id: session.id.clone(),
            error: cause.to_string(),
        });
    }

    /// Generate scenes in narrative order, then complete the session.
    ///
    /// Scenes are sorted and de-duplicated. A scene failure does not stop
    /// the run; a session-fatal error does.
    #[instrument(skip(self, session, scenes), fields(session_id = %session.id))]
    pub async fn run_all_scenes<I>(&self, session: &mut Session, scenes: I) -> Result<SessionSummary>
    where
        I: IntoIterator<Item = SceneRef>,
    {
        for (index, scene) in narrative_order(scenes).into_iter().enumerate() {
            if index > 0 && self.config.scene_pause_ms > 0 {
                tokio::time::sleep(self.config.scene_pause()).await;
            }
            stop_on_fatal(self.run_scene(session, scene).await)?;
        }
        self.complete_session(session).await
    }

    /// Brainstorm scenes in narrative order, then complete the session.
    /// Nothing is generated or persisted as output.
    #[instrument(skip(self, session, scenes), fields(session_id = %session.id))]
    pub async fn brainstorm_all_scenes<I>(
        &self,
        session: &mut Session,
        scenes: I,
    ) -> Result<SessionSummary>
    where
        I: IntoIterator<Item = SceneRef>,
    {
        for (index, scene) in narrative_order(scenes).into_iter().enumerate() {
            if index > 0 && self.config.scene_pause_ms > 0 {
                tokio::time::sleep(self.config.scene_pause()).await;
            }
            stop_on_fatal(self.brainstorm_scene(session, scene).await)?;
        }
        self.complete_session(session).await
    }

    async fn complete_session(&self, session: &mut Session) -> Result<SessionSummary> {
        let mut finished = session.clone();
        finished.mark_completed()?;
        if let Err(e) = self.store.update_session(&finished).await {
            let e = Error::from(e);
            self.fail_session(session, &e).await;
            return Err(e);
        }
        *session = finished;
        self.recorders.remove(&session.id);

        self.event_bus.publish(PipelineEvent::SessionCompleted {
            session_id: session.id.clone(),
            scenes_processed: session.scenes_processed,
            scenes_succeeded: session.scenes_succeeded,
        });
        info!(
            processed = session.scenes_processed,
            succeeded = session.scenes_succeeded,
            words = session.total_words,
            "Session completed"
        );

        self.session_summary(&session.id).await
    }

    async fn outlined_scenes(&self, session: &mut Session) -> Result<Vec<SceneRef>> {
        match self.records.scenes().await {
            Ok(scenes) => {
                info!(session_id = %session.id, scenes = scenes.len(), "Outline loaded");
                Ok(scenes)
            }
            Err(e) => {
                if e.is_session_fatal() && session.is_running() {
                    self.fail_session(session, &e).await;
                }
                Err(e)
            }
        }
    }

    /// Generate every outlined scene
    pub async fn run_project(&self, session: &mut Session) -> Result<SessionSummary> {
        let scenes = self.outlined_scenes(session).await?;
        self.run_all_scenes(session, scenes).await
    }

    /// Brainstorm every outlined scene
    pub async fn brainstorm_project(&self, session: &mut Session) -> Result<SessionSummary> {
        let scenes = self.outlined_scenes(session).await?;
        self.brainstorm_all_scenes(session, scenes).await
    }

    /// Summary of a stored session
    pub async fn session_summary(&self, session_id: &SessionId) -> Result<SessionSummary> {
        Ok(SessionViewer::new(self.store.clone())
            .summary(session_id)
            .await?)
    }

    /// All steps of a session in sequence order
    pub async fn steps(&self, session_id: &SessionId) -> Result<Vec<Step>> {
        Ok(self.store.get_steps(session_id).await?)
    }

    /// Steps of one kind in sequence order
    pub async fn steps_by_kind(&self, session_id: &SessionId, kind: StepKind) -> Result<Vec<Step>> {
        Ok(self.store.get_steps_by_kind(session_id, kind).await?)
    }

    /// Most recent sessions, newest first
    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(limit).await?)
    }
}

fn narrative_order<I: IntoIterator<Item = SceneRef>>(scenes: I) -> Vec<SceneRef> {
    let mut scenes: Vec<SceneRef> = scenes.into_iter().collect();
    scenes.sort();
    scenes.dedup();
    scenes
}

/// Scene failures are absorbed; fatal errors and a halted session end the run
fn stop_on_fatal<T>(outcome: Result<T>) -> Result<()> {
    match outcome {
        Err(e) if e.is_session_fatal() => Err(e),
        Err(e @ Error::SessionNotRunning(_)) => Err(e),
        _ => Ok(()),
    }
}
