use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::base::{ChunkStream, Provider, StreamRequest, ToolMode};
use super::factory::ProviderKind;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::chunk::StreamChunk;
use crate::models::message::Message;

/// What the mock answers to one `stream` call
pub enum MockReply {
    /// Yield these items, then end
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    /// Fail before streaming
    Fail(ProviderError),
    /// Yield these chunks, then never finish
    Hang(Vec<StreamChunk>),
}

/// A copy of what the orchestrator sent
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: ToolMode,
}

/// A mock provider that plays back pre-configured replies for testing
pub struct MockProvider {
    kind: ProviderKind,
    supports_tools: bool,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of replies
    pub fn new(kind: ProviderKind, replies: Vec<MockReply>) -> Self {
        Self {
            kind,
            supports_tools: true,
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A single successful reply streaming `deltas` as content
    pub fn with_text(kind: ProviderKind, deltas: &[&str]) -> Self {
        let chunks = deltas.iter().map(|delta| Ok(StreamChunk::content(*delta))).collect();
        Self::new(kind, vec![MockReply::Chunks(chunks)])
    }

    pub fn without_tools(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    async fn stream(&self, request: StreamRequest<'_>) -> ProviderResult<ChunkStream> {
        self.requests.lock().unwrap().push(RecordedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tools: request.tools,
        });

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(stream::empty().boxed()),
            Some(MockReply::Chunks(items)) => Ok(stream::iter(items).boxed()),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
        }
    }
}
