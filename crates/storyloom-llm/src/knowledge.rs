//! Knowledge source trait

use crate::error::Result;

/// Retrieval mode used when none is configured
pub const DEFAULT_QUERY_MODE: &str = "hybrid";

/// Retrieval over named knowledge collections.
///
/// One implementation usually serves several sources (collections); the
/// `source` argument selects which one answers. `mode` is passed through to
/// the backend unchanged.
#[async_trait::async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Get the backend name (for logging)
    fn name(&self) -> &str;

    /// Ask `source` a question and return its answer text
    async fn query(&self, source: &str, prompt: &str, mode: &str) -> Result<String>;
}
