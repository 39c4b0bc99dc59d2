//! Templates - per-source query templates
//!
//! A template is resolved per knowledge source: an explicit binding wins,
//! then a template named like the source, then the built-in `generic` one.
//! Placeholders use `{name}` syntax; unknown placeholders are left as is.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Name of the fallback template
pub const GENERIC_TEMPLATE: &str = "generic";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z_]+)\}").expect("PLACEHOLDER is a compile-time constant")
});

/// A query template for one kind of knowledge source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name
    #[serde(default)]
    pub name: String,
    /// Preamble prepended to the rendered body
    #[serde(default)]
    pub system: Option<String>,
    /// Body with `{placeholders}`
    pub body: String,
    /// Points the source should address, rendered as `{focus_areas}`
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

impl PromptTemplate {
    /// Create a template
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: None,
            body: body.into(),
            focus_areas: Vec::new(),
        }
    }

    /// Set the system preamble
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set focus areas
    #[must_use]
    pub fn with_focus_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_areas = areas.into_iter().map(Into::into).collect();
        self
    }

    /// Focus areas as a bullet list
    #[must_use]
    pub fn focus_list(&self) -> String {
        self.focus_areas
            .iter()
            .map(|area| format!("- {area}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render against `vars`, prepending the preamble if there is one
    #[must_use]
    pub fn render(&self, vars: &BTreeMap<&str, String>) -> String {
        let body = render(&self.body, vars);
        match self.system.as_deref().map(str::trim) {
            Some(system) if !system.is_empty() => format!("{}\n\n{}", render(system, vars), body),
            _ => body,
        }
    }
}

/// Substitute `{name}` placeholders
#[must_use]
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[derive(Debug, Default, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: BTreeMap<String, PromptTemplate>,
    #[serde(default)]
    bindings: BTreeMap<String, String>,
}

/// Named templates plus source bindings
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, PromptTemplate>,
    bindings: BTreeMap<String, String>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TemplateRegistry {
    /// Registry with only the `generic` template
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            templates: BTreeMap::new(),
            bindings: BTreeMap::new(),
        };
        registry.register(generic_template());
        registry
    }

    /// Registry with the built-in `scripts`, `books`, `plays` and `generic` templates
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.register(template);
        }
        registry
    }

    /// Built-ins overlaid with a TOML template file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Template(format!("failed to read {}: {e}", path.display())))?;
        let mut registry = Self::with_builtins();
        registry.merge_toml(&content)?;
        info!(
            "Loaded templates from {} ({} total)",
            path.display(),
            registry.templates.len()
        );
        Ok(registry)
    }

    /// Overlay templates and bindings from TOML:
    ///
    /// ```toml
    /// [templates.scripts]
    /// body = "..."
    /// focus_areas = ["..."]
    ///
    /// [bindings]
    /// shakespeare = "plays"
    /// ```
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let file: TemplateFile =
            toml::from_str(content).map_err(|e| Error::Template(e.to_string()))?;

        for (name, mut template) in file.templates {
            if template.body.trim().is_empty() {
                return Err(Error::Template(format!("template '{name}' has an empty body")));
            }
            template.name = name;
            self.register(template);
        }
        for (source, template) in file.bindings {
            self.bind(source, template)?;
        }
        Ok(())
    }

    /// Add or replace a template
    pub fn register(&mut self, template: PromptTemplate) {
        debug!(template = %template.name, "Registered template");
        self.templates.insert(template.name.clone(), template);
    }

    /// Bind a source to a named template
    pub fn bind(&mut self, source: impl Into<String>, template: impl Into<String>) -> Result<()> {
        let template = template.into();
        if !self.templates.contains_key(&template) {
            return Err(Error::Template(format!("unknown template: {template}")));
        }
        self.bindings.insert(source.into(), template);
        Ok(())
    }

    /// Get a template by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Template for a source: binding, then same name, then `generic`
    pub fn resolve(&self, source: &str) -> Result<&PromptTemplate> {
        if let Some(bound) = self.bindings.get(source) {
            return self
                .templates
                .get(bound)
                .ok_or_else(|| Error::Template(format!("unknown template: {bound}")));
        }
        self.templates
            .get(source)
            .or_else(|| self.templates.get(GENERIC_TEMPLATE))
            .ok_or_else(|| Error::Template(format!("no template for source {source}")))
    }

    /// All templates by name
    pub fn templates(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates.values()
    }

    /// Source bindings
    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }
}

const SCENE_BLOCK: &str = "Scene: Act {act}, Scene {sequence}\nEvents: {required_events}\nCharacters:\n{characters}";

const NOTES_BLOCK: &str = "Previous scene ending:\n{continuity}\n\nWriter's notes: {guidance}";

fn generic_template() -> PromptTemplate {
    PromptTemplate::new(
        GENERIC_TEMPLATE,
        format!(
            "Drawing on the {{source}} collection, provide writing guidance for this scene:\n\n{SCENE_BLOCK}\n\nAddress:\n{{focus_areas}}\n\n{NOTES_BLOCK}"
        ),
    )
    .with_focus_areas([
        "What the scene needs to accomplish",
        "Techniques that fit its events and characters",
    ])
}

fn builtin_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "scripts",
            format!(
                "Provide specific writing guidance for a romantic comedy scene:\n\n{SCENE_BLOCK}\n\nFocus on:\n{{focus_areas}}\n\n{NOTES_BLOCK}"
            ),
        )
        .with_focus_areas([
            "Dialogue techniques and comedic timing",
            "Physical comedy opportunities",
            "Romantic tension building",
            "Scene pacing and structure",
        ]),
        PromptTemplate::new(
            "books",
            format!(
                "Apply screenwriting theory to guide this scene:\n\n{SCENE_BLOCK}\n\nConsider:\n{{focus_areas}}\n\n{NOTES_BLOCK}"
            ),
        )
        .with_focus_areas([
            "Three-act structure positioning",
            "Character arc development",
            "Conflict escalation",
            "Theme reinforcement",
        ]),
        PromptTemplate::new(
            "plays",
            format!(
                "Enhance this scene with theatrical techniques:\n\n{SCENE_BLOCK}\n\nEmphasize:\n{{focus_areas}}\n\n{NOTES_BLOCK}"
            ),
        )
        .with_focus_areas([
            "Dramatic moments and reversals",
            "Subtext and tension",
            "Visual storytelling",
            "Emotional authenticity",
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("act", "1".to_string()),
            ("sequence", "2".to_string()),
            ("source", "scripts".to_string()),
        ])
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(
            render("Act {act}.{sequence} {mystery} {Act}", &vars()),
            "Act 1.2 {mystery} {Act}"
        );
    }

    #[test]
    fn test_resolution_order() {
        let mut registry = TemplateRegistry::with_builtins();
        assert_eq!(registry.resolve("books").unwrap().name, "books");
        assert_eq!(registry.resolve("screenplays").unwrap().name, GENERIC_TEMPLATE);

        registry.bind("screenplays", "scripts").unwrap();
        assert_eq!(registry.resolve("screenplays").unwrap().name, "scripts");
        assert!(registry.bind("x", "missing").is_err());
    }

    #[test]
    fn test_builtins_carry_scene_notes() {
        let registry = TemplateRegistry::with_builtins();
        for template in registry.templates() {
            assert!(template.body.contains("{guidance}"), "{} lacks guidance", template.name);
            assert!(template.body.contains("{continuity}"), "{} lacks continuity", template.name);
        }
    }

    #[test]
    fn test_system_preamble_is_prepended() {
        let template = PromptTemplate::new("t", "Scene {act}").with_system("You index {source}.");
        assert_eq!(template.render(&vars()), "You index scripts.\n\nScene 1");
    }

    #[test]
    fn test_merge_toml() {
        let mut registry = TemplateRegistry::with_builtins();
        registry
            .merge_toml(
                r#"
                [templates.shakespeare]
                system = "You are a dramaturg."
                body = "Advise on {required_events}"
                focus_areas = ["Wordplay"]

                [templates.books]
                body = "Theory for act {act}"

                [bindings]
                bard = "shakespeare"
                "#,
            )
            .unwrap();

        assert_eq!(registry.resolve("bard").unwrap().focus_areas, vec!["Wordplay"]);
        assert_eq!(registry.get("books").unwrap().body, "Theory for act {act}");
        assert_eq!(registry.templates().count(), 5);
    }

    #[test]
    fn test_merge_rejects_bad_templates() {
        let mut registry = TemplateRegistry::new();
        assert!(registry.merge_toml("[templates.x]\nbody = \"  \"").is_err());
        assert!(registry.merge_toml("[bindings]\na = \"nope\"").is_err());
        assert!(registry.merge_toml("not toml [").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.toml");
        std::fs::write(&path, "[templates.poems]\nbody = \"Verse for {scene}\"").unwrap();

        let registry = TemplateRegistry::from_file(&path).unwrap();
        assert_eq!(registry.resolve("poems").unwrap().body, "Verse for {scene}");
        assert!(TemplateRegistry::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
