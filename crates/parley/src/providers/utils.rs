use std::collections::HashSet;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};

use super::factory::ProviderKind;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::content::{ContentPart, MessageContent};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::Tool;

lazy_static! {
    static ref INVALID_FUNCTION_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// Pull a readable message out of an error response body.
///
/// Looks at `error.message`, then `error` as a string, then `message`, and
/// falls back to the trimmed body.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error").filter(|error| error.is_string()),
            value.get("message"),
        ];
        if let Some(message) = candidates
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|message| !message.trim().is_empty())
        {
            return message.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Map a non-success status and its body onto the error a caller sees
pub fn status_error(kind: ProviderKind, status: u16, body: &str) -> ProviderError {
    let message = extract_error_message(body);
    match status {
        401 | 403 => ProviderError::Auth {
            provider: kind,
            message,
        },
        _ => ProviderError::Http { status, message },
    }
}

/// Send the request and wait (bounded) for a successful response head
pub async fn open_stream(
    kind: ProviderKind,
    request: RequestBuilder,
    header_timeout: Duration,
) -> ProviderResult<Response> {
    let response = match tokio::time::timeout(header_timeout, request.send()).await {
        Ok(response) => response?,
        Err(_) => {
            return Err(ProviderError::Network(format!(
                "{} did not respond within {:?}",
                kind, header_timeout
            )))
        }
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("{} returned {}", kind, status);
    Err(status_error(kind, status.as_u16(), &body))
}

/// Split a `data:<mime>;base64,<payload>` URI into its mime type and payload
pub fn parse_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    Some((mime_type, data))
}

/// The `input_audio.format` value for a mime type (`audio/mpeg` is `mp3`)
fn audio_format(mime_type: &str) -> &str {
    match mime_type.rsplit('/').next().unwrap_or(mime_type) {
        "mpeg" => "mp3",
        "x-wav" | "wave" => "wav",
        other => other,
    }
}

/// Convert message content into an OpenAI `content` value: a plain string
/// when there are no attachments, otherwise an array of typed parts
pub fn content_to_openai(content: &MessageContent) -> Value {
    if !content.has_attachments() {
        return json!(content.display_text());
    }

    let parts: Vec<Value> = content
        .parts()
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentPart::ImageRef { url } => Some(json!({
                "type": "image_url",
                "image_url": {"url": url}
            })),
            ContentPart::AudioRef { mime_type, data } => Some(json!({
                "type": "input_audio",
                "input_audio": {"data": data, "format": audio_format(mime_type)}
            })),
        })
        .collect();
    json!(parts)
}

/// Convert the history to OpenAI's chat message specification.
///
/// Notices are left out, and assistant tool calls are only kept when a tool
/// message answering them is part of the history.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .filter_map(|message| message.tool_call_id.as_deref())
        .collect();

    let mut messages_spec = Vec::new();
    for message in messages.iter().filter(|message| !message.notice) {
        let mut converted = json!({
            "role": message.role,
            "content": content_to_openai(&message.content),
        });

        if let Some(calls) = &message.tool_calls {
            let calls: Vec<Value> = calls
                .iter()
                .filter(|call| answered.contains(call.id.as_str()))
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&call.function_name),
                            "arguments": call.raw_arguments,
                        }
                    })
                })
                .collect();
            if !calls.is_empty() {
                converted["tool_calls"] = json!(calls);
            }
        }

        if let Some(tool_call_id) = &message.tool_call_id {
            converted["tool_call_id"] = json!(tool_call_id);
        }

        let is_empty_assistant = message.role == Role::Assistant
            && message.content.is_empty()
            && converted.get("tool_calls").is_none();
        if !is_empty_assistant {
            messages_spec.push(converted);
        }
    }

    messages_spec
}

/// Convert tool definitions to OpenAI's function specification, dropping
/// repeated names
pub fn tools_to_openai_spec(tools: &[Tool]) -> Vec<Value> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            tracing::warn!("Duplicate tool name: {}", tool.name);
            continue;
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    result
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_FUNCTION_CHARS.replace_all(name, "_").to_string()
}
