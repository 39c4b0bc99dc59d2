//! Synthesizer - final generation for one scene

use super::config::PipelineConfig;
use super::context::SceneContext;
use crate::error::{Error, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use storyloom_llm::util::{sanitize_api_error, truncate_safe};
use storyloom_llm::{CompletionProvider, CompletionRequest, Message};
use storyloom_replay::{GeneratedOutput, PipelineStore, SessionId, SourceResult, StepKind, StepRecorder};
use tracing::{debug, error, info, instrument};

/// Merges context and source responses into the final generation request
#[derive(Clone)]
pub struct Synthesizer {
    completion: Arc<dyn CompletionProvider>,
    store: Arc<dyn PipelineStore>,
    config: Arc<PipelineConfig>,
}

/// Last `max_chars` characters of `s`, with a leading `...` when cut
fn tail_excerpt(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let start = s
        .char_indices()
        .nth(count - max_chars)
        .map_or(s.len(), |(idx, _)| idx);
    format!("...{}", &s[start..])
}

/// First `max_chars` characters of `s`, with a trailing `...` when cut
fn head_excerpt(s: &str, max_chars: usize) -> String {
    let head = truncate_safe(s, max_chars);
    if head.len() < s.len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}

impl Synthesizer {
    /// Create a synthesizer
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        store: Arc<dyn PipelineStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            completion,
            store,
            config,
        }
    }

    /// System instructions from the configured preamble
    #[must_use]
    pub fn system_message(&self) -> Option<Message> {
        let preamble = self.config.preamble.join("\n");
        (!preamble.trim().is_empty()).then(|| Message::system(preamble))
    }

    /// Build the final user prompt. Only successful source responses are used.
    #[must_use]
    pub fn build_prompt(
        &self,
        context: &SceneContext,
        results: &BTreeMap<String, SourceResult>,
    ) -> String {
        let excerpt_len = self.config.excerpt_len;
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!(
            "SCENE TO WRITE: Act {}, Scene {}",
            context.scene.act, context.scene.sequence
        ));
        parts.push(String::new());
        parts.push("REQUIRED EVENTS:".to_string());
        parts.push(context.required_events.clone());
        parts.push(String::new());
        parts.push("CHARACTERS IN SCENE:".to_string());
        parts.push(context.character_lines());

        if let Some(previous) = context.continuity.as_deref().filter(|t| !t.is_empty()) {
            parts.push(String::new());
            parts.push("CONTINUITY FROM PREVIOUS SCENE:".to_string());
            parts.push(tail_excerpt(previous, self.config.continuity_window));
        }

        if !context.prior_insights.is_empty() {
            parts.push(String::new());
            parts.push("BRAINSTORMING INSIGHTS:".to_string());
            for (source, insight) in &context.prior_insights {
                parts.push(format!("[{source}]: {}", head_excerpt(insight, excerpt_len)));
            }
        }

        let suggestions: Vec<&SourceResult> = results.values().filter(|r| r.success).collect();
        if !suggestions.is_empty() {
            parts.push(String::new());
            parts.push("WRITING GUIDANCE:".to_string());
            for result in suggestions {
                parts.push(format!(
                    "[{}]: {}",
                    result.source,
                    head_excerpt(&result.response, excerpt_len)
                ));
            }
        }

        if let Some(guidance) = &context.guidance {
            parts.push(String::new());
            parts.push(format!("SPECIFIC REQUIREMENTS: {guidance}"));
        }

        parts.push(String::new());
        parts.push("WRITING REQUIREMENTS:".to_string());
        parts.extend(self.config.requirements.iter().map(|r| format!("- {r}")));
        parts.push(String::new());
        parts.push("WRITE THE COMPLETE SCENE NOW:".to_string());

        parts.join("\n")
    }

    /// Generate, record and persist the scene.
    ///
    /// A completion failure or timeout is recorded as a failed `generation`
    /// step and returned as [`Error::Generation`].
    #[instrument(skip_all, fields(session_id = %session_id, scene = %context.scene))]
    pub async fn synthesize(
        &self,
        recorder: &StepRecorder,
        session_id: &SessionId,
        context: &SceneContext,
        results: &BTreeMap<String, SourceResult>,
    ) -> Result<GeneratedOutput> {
        let scene = context.scene;
        let prompt = self.build_prompt(context, results);
        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| self.completion.default_model().to_string());

        let mut request = CompletionRequest::new(model.clone());
        if let Some(system) = self.system_message() {
            request = request.with_message(system);
        }
        request = request.with_message(Message::user(&prompt));
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        debug!(prompt_length = prompt.len(), model = %model, "Requesting generation");
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.generation_timeout(), self.completion.complete(request))
                .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(Ok(response)) if !response.content.trim().is_empty() => response,
            failure => {
                let message = match failure {
                    Ok(Ok(_)) => "completion returned no text".to_string(),
                    Ok(Err(e)) => sanitize_api_error(&e.to_string()),
                    Err(_) => format!("timed out after {}ms", self.config.generation_timeout_ms),
                };
                error!(error = %message, "Generation failed");
                recorder
                    .record_scene(
                        StepKind::Generation,
                        scene,
                        json!({
                            "prompt": prompt,
                            "error": message,
                            "duration_ms": duration_ms,
                            "model": model,
                        }),
                        json!({ "success": false }),
                    )
                    .await?;
                return Err(Error::Generation(message));
            }
        };

        let output = GeneratedOutput::new(session_id.clone(), scene, response.content);
        recorder
            .record_scene(
                StepKind::Generation,
                scene,
                json!({
                    "prompt": prompt,
                    "text": output.text,
                    "duration_ms": duration_ms,
                    "model": response.model,
                }),
                json!({
                    "success": true,
                    "word_count": output.word_count,
                    "char_count": output.char_count,
                }),
            )
            .await?;

        self.store.save_output(&output).await?;
        recorder
            .record_scene(
                StepKind::Persisted,
                scene,
                json!({
                    "scene": scene.to_string(),
                    "word_count": output.word_count,
                    "char_count": output.char_count,
                }),
                json!({ "success": true }),
            )
            .await?;

        info!(words = output.word_count, "Scene generated");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storyloom_llm::{CompletionResponse, MessageRole};
    use storyloom_replay::{SceneRef, SqliteStore};

    #[derive(Default)]
    struct CapturingCompletion {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for CapturingCompletion {
        fn name(&self) -> &str {
            "capturing"
        }

        fn default_model(&self) -> &str {
            "capturing-1"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> storyloom_llm::Result<CompletionResponse> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: "INT. CAFE - NIGHT".to_string(),
                usage: None,
                finish_reason: None,
                model,
            })
        }
    }

    fn context() -> SceneContext {
        SceneContext {
            scene: SceneRef::new(1, 2),
            required_events: "Jake spills coffee".to_string(),
            characters: Vec::new(),
            continuity: None,
            prior_insights: BTreeMap::new(),
            guidance: None,
            sources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_preamble_sent_as_system_message() {
        let completion = Arc::new(CapturingCompletion::default());
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let synthesizer = Synthesizer::new(
            completion.clone(),
            store.clone(),
            Arc::new(PipelineConfig::default()),
        );
        let session_id = SessionId::from("S_synth");
        let recorder = StepRecorder::new(store, session_id.clone());

        synthesizer
            .synthesize(&recorder, &session_id, &context(), &BTreeMap::new())
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.starts_with("You are writing a Hollywood"));
        assert_eq!(messages[1].role, MessageRole::User);
        assert!(messages[1].content.starts_with("SCENE TO WRITE: Act 1, Scene 2"));
    }

    #[tokio::test]
    async fn test_empty_preamble_sends_no_system_message() {
        let config = PipelineConfig {
            preamble: Vec::new(),
            ..PipelineConfig::default()
        };
        let synthesizer = Synthesizer::new(
            Arc::new(CapturingCompletion::default()),
            Arc::new(SqliteStore::in_memory().await.unwrap()),
            Arc::new(config),
        );
        assert!(synthesizer.system_message().is_none());
    }

    #[test]
    fn test_excerpts_are_char_safe() {
        assert_eq!(tail_excerpt("short", 10), "short");
        assert_eq!(tail_excerpt("abcdef", 3), "...def");
        assert_eq!(tail_excerpt("ééééé", 2), "...éé");

        assert_eq!(head_excerpt("abcdef", 6), "abcdef");
        assert_eq!(head_excerpt("abcdef", 4), "abcd...");
        assert_eq!(head_excerpt("ééééé", 1), "é...");
    }
}
