use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{ChunkStream, Provider, StreamRequest, ToolMode};
use super::configs::ProviderConfig;
use super::factory::ProviderKind;
use super::sse::{normalize, ChunkDecoder, DecodedFrame};
use super::utils::{messages_to_openai_spec, open_stream, status_error, tools_to_openai_spec};
use crate::credentials::CredentialProvider;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::chunk::StreamChunk;
use crate::models::tool::{Tool, ToolCallRequest};

pub const OPENROUTER_HOST: &str = "https://openrouter.ai";
const COMPLETIONS_PATH: &str = "api/v1/chat/completions";
const APP_TITLE: &str = "Parley";

pub struct OpenRouterProvider {
    client: Client,
    config: ProviderConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl OpenRouterProvider {
    pub fn new(
        config: ProviderConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    fn create_request_payload(request: &StreamRequest<'_>) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": messages_to_openai_spec(request.messages),
            "stream": true,
        });

        let tool_choice = match request.tools {
            ToolMode::Disabled => None,
            ToolMode::Auto => Some("auto"),
            ToolMode::Suppressed => Some("none"),
        };
        if let Some(tool_choice) = tool_choice {
            payload["tools"] = json!(tools_to_openai_spec(&[Tool::web_search()]));
            payload["tool_choice"] = json!(tool_choice);
        }

        payload
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn stream(&self, request: StreamRequest<'_>) -> ProviderResult<ChunkStream> {
        let kind = self.kind();
        let api_key = self
            .credentials
            .get(kind.credential_key())
            .ok_or_else(|| ProviderError::missing_credential(kind))?;

        let payload = Self::create_request_payload(&request);
        tracing::debug!(
            model = request.model,
            messages = request.messages.len(),
            tools = ?request.tools,
            "Opening OpenRouter stream"
        );

        let builder = self
            .client
            .post(self.config.endpoint(COMPLETIONS_PATH))
            .bearer_auth(api_key)
            .header("X-Title", APP_TITLE)
            .header("Accept", "text/event-stream")
            .json(&payload);
        let response = open_stream(kind, builder, self.config.request_timeout).await?;

        Ok(normalize(
            response.bytes_stream(),
            OpenRouterDecoder::default(),
            self.config.idle_timeout,
        ))
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Decodes OpenAI-style deltas, assembling tool calls that arrive in
/// fragments keyed by their `index`
#[derive(Debug, Default)]
pub struct OpenRouterDecoder {
    pending_calls: BTreeMap<u64, PartialToolCall>,
}

impl OpenRouterDecoder {
    fn accumulate(&mut self, fragments: &[Value]) {
        for (position, fragment) in fragments.iter().enumerate() {
            let index = fragment
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let call = self.pending_calls.entry(index).or_default();
            if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                call.id = id.to_string();
            }
            if let Some(name) = fragment.pointer("/function/name").and_then(Value::as_str) {
                call.name.push_str(name);
            }
            if let Some(arguments) = fragment
                .pointer("/function/arguments")
                .and_then(Value::as_str)
            {
                call.arguments.push_str(arguments);
            }
        }
    }

    fn take_calls(&mut self) -> Option<Vec<ToolCallRequest>> {
        let calls: Vec<ToolCallRequest> = std::mem::take(&mut self.pending_calls)
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                };
                ToolCallRequest::new(id, call.name, call.arguments)
            })
            .collect();
        (!calls.is_empty()).then_some(calls)
    }
}

impl ChunkDecoder for OpenRouterDecoder {
    fn decode(&mut self, payload: &str) -> Result<DecodedFrame, ProviderError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(error) = value.get("error") {
            let status = error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(500);
            return Ok(DecodedFrame::Fatal(status_error(
                ProviderKind::OpenRouter,
                status,
                &value.to_string(),
            )));
        }

        let Some(choice) = value.pointer("/choices/0") else {
            return Ok(DecodedFrame::Chunk(StreamChunk::default()));
        };
        let delta = &choice["delta"];
        let text = |key: &str| delta.get(key).and_then(Value::as_str).map(str::to_string);

        let mut chunk = StreamChunk {
            content_delta: text("content"),
            reasoning_delta: text("reasoning").or_else(|| text("reasoning_content")),
            ..Default::default()
        };

        if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
            self.accumulate(fragments);
        }
        if choice.get("finish_reason").and_then(Value::as_str) == Some("tool_calls") {
            chunk.tool_calls = self.take_calls();
        }

        Ok(DecodedFrame::Chunk(chunk))
    }

    fn finish(&mut self) -> Option<StreamChunk> {
        self.take_calls().map(StreamChunk::tool_calls)
    }
}
