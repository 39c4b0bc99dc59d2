//! Compiler - per-source query prompts

use super::context::SceneContext;
use super::templates::TemplateRegistry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A rendered query for one knowledge source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPrompt {
    /// Knowledge source
    pub source: String,
    /// Template that produced the text
    pub template: String,
    /// Prompt text
    pub text: String,
    /// Prompt length in bytes
    pub length: usize,
}

/// Expands a scene context against each source's template
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    templates: Arc<TemplateRegistry>,
}

impl PromptCompiler {
    /// Create a compiler
    #[must_use]
    pub fn new(templates: Arc<TemplateRegistry>) -> Self {
        Self { templates }
    }

    /// Template registry in use
    #[must_use]
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// One prompt per active source. Same context and templates give
    /// byte-identical output.
    pub fn compile(
        &self,
        context: &SceneContext,
        active_sources: &[String],
    ) -> Result<BTreeMap<String, CompiledPrompt>> {
        let mut vars = BTreeMap::from([
            ("act", context.scene.act.to_string()),
            ("sequence", context.scene.sequence.to_string()),
            ("scene", context.scene.to_string()),
            ("required_events", context.required_events.clone()),
            ("characters", context.character_lines()),
            ("character_names", context.character_names()),
            ("continuity", context.continuity.clone().unwrap_or_default()),
            ("guidance", context.guidance.clone().unwrap_or_default()),
        ]);

        let mut prompts = BTreeMap::new();
        for source in active_sources {
            let template = self.templates.resolve(source)?;
            vars.insert("source", source.clone());
            vars.insert("focus_areas", template.focus_list());

            let text = template.render(&vars);
            prompts.insert(
                source.clone(),
                CompiledPrompt {
                    source: source.clone(),
                    template: template.name.clone(),
                    length: text.len(),
                    text,
                },
            );
        }
        Ok(prompts)
    }
}
