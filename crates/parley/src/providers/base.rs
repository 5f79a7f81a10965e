use async_trait::async_trait;
use futures::stream::BoxStream;

use super::factory::ProviderKind;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::chunk::StreamChunk;
use crate::models::message::Message;

/// The lazy, finite sequence of chunks produced by one provider call
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Whether a request lets the model call tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolMode {
    /// No tools are offered
    #[default]
    Disabled,
    /// Tools are offered and the model may call them
    Auto,
    /// Tools are described (the history may reference them) but the model
    /// must answer without calling one
    Suppressed,
}

/// Everything a provider needs to issue one streaming call
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: ToolMode,
}

impl<'a> StreamRequest<'a> {
    pub fn new(model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages,
            tools: ToolMode::Disabled,
        }
    }

    pub fn with_tools(mut self, tools: ToolMode) -> Self {
        self.tools = tools;
        self
    }
}

/// Base trait for chat backends (OpenRouter, Gemini, Kimi)
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether the backend can ask for tool calls at all
    fn supports_tools(&self) -> bool {
        false
    }

    /// Send the conversation and return its incremental response.
    ///
    /// Fails before any network traffic when no credential is configured, and
    /// fails with the extracted error message when the backend answers with a
    /// non-success status.
    async fn stream(&self, request: StreamRequest<'_>) -> ProviderResult<ChunkStream>;
}
