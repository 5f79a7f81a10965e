use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{ChunkStream, Provider, StreamRequest};
use super::configs::ProviderConfig;
use super::factory::ProviderKind;
use super::sse::{normalize, ChunkDecoder, DecodedFrame};
use super::utils::{open_stream, parse_data_uri, status_error};
use crate::credentials::CredentialProvider;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::chunk::StreamChunk;
use crate::models::content::ContentPart;
use crate::models::message::Message;
use crate::models::role::Role;

pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
const TOOL_RESULTS_PREFIX: &str = "Web search results:\n";

pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    credentials: Arc<dyn CredentialProvider>,
}

/// Models known to stream their thoughts when asked
pub fn supports_thinking(model: &str) -> bool {
    let model = model.trim_start_matches("models/").to_lowercase();
    model.contains("2.5") || model.contains("thinking") || model.starts_with("gemini-3")
}

fn part_to_gemini(part: &ContentPart) -> Option<Value> {
    match part {
        ContentPart::Text { text } if text.is_empty() => None,
        ContentPart::Text { text } => Some(json!({"text": text})),
        ContentPart::ImageRef { url } => Some(match parse_data_uri(url) {
            Some((mime_type, data)) => json!({
                "inline_data": {"mime_type": mime_type, "data": data}
            }),
            None => json!({"text": format!("[Image: {}]", url)}),
        }),
        ContentPart::AudioRef { mime_type, data } => Some(json!({
            "inline_data": {"mime_type": mime_type, "data": data}
        })),
    }
}

/// Convert the history to Gemini `contents` plus an optional system instruction
pub fn messages_to_gemini_spec(messages: &[Message]) -> (Vec<Value>, Option<Value>) {
    let mut system_texts = Vec::new();
    let mut contents = Vec::new();

    for message in messages.iter().filter(|message| !message.notice) {
        let (role, parts): (&str, Vec<Value>) = match message.role {
            Role::System => {
                let text = message.display_text();
                if !text.trim().is_empty() {
                    system_texts.push(text);
                }
                continue;
            }
            Role::Tool => (
                "user",
                vec![json!({"text": format!("{}{}", TOOL_RESULTS_PREFIX, message.display_text())})],
            ),
            Role::User => (
                "user",
                message.content.parts().iter().filter_map(part_to_gemini).collect(),
            ),
            Role::Assistant => (
                "model",
                message.content.parts().iter().filter_map(part_to_gemini).collect(),
            ),
        };

        if parts.is_empty() {
            continue;
        }
        contents.push(json!({"role": role, "parts": parts}));
    }

    let system_instruction = (!system_texts.is_empty())
        .then(|| json!({"parts": [{"text": system_texts.join("\n\n")}]}));
    (contents, system_instruction)
}

impl GeminiProvider {
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
        let (contents, system_instruction) = messages_to_gemini_spec(request.messages);
        let mut payload = json!({ "contents": contents });

        if let Some(system_instruction) = system_instruction {
            payload["systemInstruction"] = system_instruction;
        }
        if supports_thinking(request.model) {
            payload["generationConfig"] = json!({
                "thinkingConfig": {"includeThoughts": true}
            });
        }

        payload
    }

    fn stream_path(model: &str) -> String {
        format!(
            "v1beta/models/{}:streamGenerateContent?alt=sse",
            model.trim_start_matches("models/")
        )
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
            "Opening Gemini stream"
        );

        let builder = self
            .client
            .post(self.config.endpoint(&Self::stream_path(request.model)))
            .header("x-goog-api-key", api_key)
            .json(&payload);
        let response = open_stream(kind, builder, self.config.request_timeout).await?;

        Ok(normalize(
            response.bytes_stream(),
            GeminiDecoder,
            self.config.idle_timeout,
        ))
    }
}

/// Decodes `streamGenerateContent` frames
#[derive(Debug, Default)]
pub struct GeminiDecoder;

impl ChunkDecoder for GeminiDecoder {
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
                ProviderKind::Gemini,
                status,
                &value.to_string(),
            )));
        }

        let candidate = value.pointer("/candidates/0");
        let mut content = String::new();
        let mut thoughts = String::new();
        let parts = candidate
            .and_then(|candidate| candidate.pointer("/content/parts"))
            .and_then(Value::as_array);
        for part in parts.into_iter().flatten() {
            let Some(text) = part.get("text").and_then(Value::as_str) else {
                continue;
            };
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                thoughts.push_str(text);
            } else {
                content.push_str(text);
            }
        }

        let chunk = StreamChunk {
            content_delta: (!content.is_empty()).then_some(content),
            reasoning_delta: (!thoughts.is_empty()).then(|| thoughts.clone()),
            thinking_delta: (!thoughts.is_empty()).then_some(thoughts),
            tool_calls: None,
        };

        let finish_reason = candidate
            .and_then(|candidate| candidate.get("finishReason"))
            .and_then(Value::as_str);
        if finish_reason == Some("STOP") {
            return Ok(DecodedFrame::Terminal(Some(chunk)));
        }
        Ok(DecodedFrame::Chunk(chunk))
    }
}
