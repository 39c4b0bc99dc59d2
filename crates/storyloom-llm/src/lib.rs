//! Storyloom LLM - External service clients
//!
//! This crate abstracts the two external services the generation pipeline
//! talks to:
//! - `CompletionProvider`: text completion (OpenAI-compatible chat API)
//! - `KnowledgeSource`: retrieval over named knowledge collections (LightRAG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod knowledge;
pub mod lightrag;
pub mod message;
pub mod openai;
pub mod provider;
pub mod util;

pub use completion::{CompletionRequest, CompletionResponse, TokenUsage};
pub use error::{Error, Result};
pub use knowledge::{KnowledgeSource, DEFAULT_QUERY_MODE};
pub use lightrag::{LightRagClient, LightRagConfig};
pub use message::{Message, MessageRole};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::CompletionProvider;
