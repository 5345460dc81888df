//! Model traits

use super::types::{ModelChunk, ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

/// Incremental model output.
pub type ModelStream = BoxStream<'static, Result<ModelChunk, ModelError>>;

/// Trait for model provider implementations
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a chat request to the model provider
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Stream a chat response. Providers without native streaming get the
    /// whole response as one text chunk followed by its tool calls.
    async fn chat_stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let response = self.chat(request).await?;
        Ok(futures::stream::iter(response.into_chunks().into_iter().map(Ok)).boxed())
    }
}
