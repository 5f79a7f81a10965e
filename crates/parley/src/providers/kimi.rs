use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{ChunkStream, Provider, StreamRequest};
use super::configs::ProviderConfig;
use super::factory::ProviderKind;
use super::sse::{normalize, ChunkDecoder, DecodedFrame};
use super::utils::{open_stream, status_error};
use crate::credentials::CredentialProvider;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::chunk::StreamChunk;
use crate::models::message::Message;
use crate::models::role::Role;

pub const KIMI_HOST: &str = "https://api.moonshot.cn";
const COMPLETIONS_PATH: &str = "v1/chat/completions";

pub struct KimiProvider {
    client: Client,
    config: ProviderConfig,
    credentials: Arc<dyn CredentialProvider>,
}

/// Text-only chat messages: attachments and tool calls are dropped and tool
/// results are handed back as user text
pub fn messages_to_kimi_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter(|message| !message.notice)
        .filter_map(|message| {
            let text = message.display_text();
            match message.role {
                Role::Assistant if text.is_empty() => None,
                Role::Tool => Some(json!({
                    "role": "user",
                    "content": format!("Web search results:\n{}", text),
                })),
                role => Some(json!({"role": role, "content": text})),
            }
        })
        .collect()
}

impl KimiProvider {
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
        json!({
            "model": request.model,
            "messages": messages_to_kimi_spec(request.messages),
            "stream": true,
        })
    }
}

#[async_trait]
impl Provider for KimiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kimi
    }

    async fn stream(&self, request: StreamRequest<'_>) -> ProviderResult<ChunkStream> {
        let kind = self.kind();
        let api_key = self
            .credentials
            .get(kind.credential_key())
            .ok_or_else(|| ProviderError::missing_credential(kind))?;

        tracing::debug!(
            model = request.model,
            messages = request.messages.len(),
            "Opening Kimi stream"
        );

        let builder = self
            .client
            .post(self.config.endpoint(COMPLETIONS_PATH))
            .bearer_auth(api_key)
            .json(&Self::create_request_payload(&request));
        let response = open_stream(kind, builder, self.config.request_timeout).await?;

        Ok(normalize(
            response.bytes_stream(),
            KimiDecoder,
            self.config.idle_timeout,
        ))
    }
}

#[derive(Debug, Default)]
pub struct KimiDecoder;

impl ChunkDecoder for KimiDecoder {
    fn decode(&mut self, payload: &str) -> Result<DecodedFrame, ProviderError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ProviderError::Decode(e.to_string()))?;

        if value.get("error").is_some() {
            return Ok(DecodedFrame::Fatal(status_error(
                ProviderKind::Kimi,
                500,
                &value.to_string(),
            )));
        }

        let content = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(DecodedFrame::Chunk(StreamChunk {
            content_delta: content,
            ..Default::default()
        }))
    }
}
