//! Fanout - knowledge queries for one scene
//!
//! Every active source gets exactly one [`SourceResult`]. A failure, timeout
//! or panic in one query is captured as a failed result and never affects
//! the other sources. Only store failures propagate.

use super::compiler::CompiledPrompt;
use super::config::{FanoutMode, PipelineConfig};
use crate::error::{Error, Result};
use crate::utils::retry_with_backoff;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use storyloom_llm::KnowledgeSource;
use storyloom_replay::{PipelineStore, SceneRef, SessionId, SourceResult, StepKind, StepRecorder};
use tracing::{debug, warn};

/// Issues compiled prompts to the knowledge sources
#[derive(Clone)]
pub struct KnowledgeFanout {
    knowledge: Arc<dyn KnowledgeSource>,
    store: Arc<dyn PipelineStore>,
    config: Arc<PipelineConfig>,
}

impl KnowledgeFanout {
    /// Create an executor
    #[must_use]
    pub fn new(
        knowledge: Arc<dyn KnowledgeSource>,
        store: Arc<dyn PipelineStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            knowledge,
            store,
            config,
        }
    }

    /// Query every source in `prompts`, recording a `query` step before and
    /// a `response` step after each call.
    pub async fn execute(
        &self,
        recorder: &StepRecorder,
        session_id: &SessionId,
        scene: SceneRef,
        prompts: &BTreeMap<String, CompiledPrompt>,
    ) -> Result<BTreeMap<String, SourceResult>> {
        let outcomes: Vec<Result<SourceResult>> = match self.config.fanout {
            FanoutMode::Concurrent => {
                stream::iter(prompts.values())
                    .map(|prompt| self.query_one(recorder, session_id, scene, prompt))
                    .buffer_unordered(self.config.max_concurrent_queries.max(1))
                    .collect()
                    .await
            }
            FanoutMode::Sequential => {
                let mut outcomes = Vec::with_capacity(prompts.len());
                for (index, prompt) in prompts.values().enumerate() {
                    if index > 0 && self.config.query_delay_ms > 0 {
                        tokio::time::sleep(self.config.query_delay()).await;
                    }
                    outcomes.push(self.query_one(recorder, session_id, scene, prompt).await);
                }
                outcomes
            }
        };

        let mut results = BTreeMap::new();
        for outcome in outcomes {
            let result = outcome?;
            results.insert(result.source.clone(), result);
        }

        let failed = results.values().filter(|r| !r.success).count();
        debug!(
            scene = %scene,
            sources = results.len(),
            failed,
            "Fan-out complete"
        );
        Ok(results)
    }

    async fn query_one(
        &self,
        recorder: &StepRecorder,
        session_id: &SessionId,
        scene: SceneRef,
        prompt: &CompiledPrompt,
    ) -> Result<SourceResult> {
        recorder
            .record_scene(
                StepKind::Query,
                scene,
                json!({
                    "source": prompt.source,
                    "template": prompt.template,
                    "prompt": prompt.text,
                    "mode": self.config.query_mode,
                }),
                json!({ "source": prompt.source, "prompt_length": prompt.length }),
            )
            .await?;

        let started = Instant::now();
        let outcome = self.call(prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (result, payload) = match outcome {
            Ok(response) => (
                SourceResult::succeeded(
                    session_id.clone(),
                    scene,
                    &prompt.source,
                    &prompt.text,
                    &response,
                    duration_ms,
                ),
                json!({
                    "source": prompt.source,
                    "response": response,
                    "duration_ms": duration_ms,
                }),
            ),
            Err(e) => {
                warn!(scene = %scene, source = %prompt.source, error = %e, "Knowledge query failed");
                let message = match e {
                    Error::SourceQuery { message, .. } => message,
                    other => other.to_string(),
                };
                (
                    SourceResult::failed(
                        session_id.clone(),
                        scene,
                        &prompt.source,
                        &prompt.text,
                        &message,
                        duration_ms,
                    ),
                    json!({
                        "source": prompt.source,
                        "error": message,
                        "duration_ms": duration_ms,
                    }),
                )
            }
        };

        recorder
            .record_scene(
                StepKind::Response,
                scene,
                payload,
                json!({ "source": result.source, "success": result.success }),
            )
            .await?;
        self.store.save_source_result(&result).await?;
        Ok(result)
    }

    /// Run one query on its own task, under the per-attempt timeout and the
    /// retry policy.
    async fn call(&self, prompt: &CompiledPrompt) -> Result<String> {
        let knowledge = self.knowledge.clone();
        let retry = self.config.retry.clone();
        let timeout = self.config.query_timeout();
        let source = prompt.source.clone();
        let text = prompt.text.clone();
        let mode = self.config.query_mode.clone();

        let task = tokio::spawn(async move {
            retry_with_backoff(
                &retry,
                || {
                    let knowledge = knowledge.clone();
                    let (source, text, mode) = (source.clone(), text.clone(), mode.clone());
                    async move {
                        match tokio::time::timeout(timeout, knowledge.query(&source, &text, &mode))
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                Err(storyloom_llm::Error::Timeout(timeout.as_millis() as u64))
                            }
                        }
                    }
                },
                storyloom_llm::Error::is_retryable,
            )
            .await
        });

        match task.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::SourceQuery {
                bucket: prompt.source.clone(),
                message: e.to_string(),
            }),
            Err(join) => Err(Error::SourceQuery {
                bucket: prompt.source.clone(),
                message: if join.is_panic() {
                    "query task panicked".to_string()
                } else {
                    "query task was cancelled".to_string()
                },
            }),
        }
    }
}
