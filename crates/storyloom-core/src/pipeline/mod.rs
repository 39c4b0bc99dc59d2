//! Pipeline - transparent scene generation
//!
//! For each scene: assemble context, compile one prompt per knowledge
//! source, fan the prompts out, synthesize the final scene and persist it.
//! Every stage is recorded as a step of the session.

mod compiler;
mod config;
mod context;
mod continuity;
mod core;
mod fanout;
mod synthesizer;
pub mod templates;

pub use compiler::{CompiledPrompt, PromptCompiler};
pub use config::{FanoutMode, PipelineConfig};
pub use context::{ContextAssembler, SceneContext};
pub use continuity::ContinuityResolver;
pub use core::Pipeline;
pub use fanout::KnowledgeFanout;
pub use synthesizer::Synthesizer;
pub use templates::{PromptTemplate, TemplateRegistry};
