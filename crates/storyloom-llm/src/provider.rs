//! Completion provider trait

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// Text completion service
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Complete a conversation (text only)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
