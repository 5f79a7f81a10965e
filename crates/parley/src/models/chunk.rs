use serde::{Deserialize, Serialize};

use super::tool::ToolCallRequest;

/// The normalized unit every provider produces while streaming.
///
/// Any combination of fields may be set; a chunk with none of them is valid
/// and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_delta: Option<String>,
    /// Secondary thinking channel (gemini "thought" parts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl StreamChunk {
    pub fn content<S: Into<String>>(text: S) -> Self {
        StreamChunk {
            content_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn reasoning<S: Into<String>>(text: S) -> Self {
        StreamChunk {
            reasoning_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        StreamChunk {
            tool_calls: Some(calls),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_delta.as_deref().map_or(true, str::is_empty)
            && self.reasoning_delta.as_deref().map_or(true, str::is_empty)
            && self.thinking_delta.as_deref().map_or(true, str::is_empty)
            && self.tool_calls.as_ref().map_or(true, Vec::is_empty)
    }

    /// Reasoning text to append for this chunk.
    ///
    /// Gemini reports thoughts on both channels; identical text is only
    /// counted once.
    pub fn reasoning_text(&self) -> Option<String> {
        match (self.reasoning_delta.as_deref(), self.thinking_delta.as_deref()) {
            (Some(reasoning), Some(thinking)) if reasoning == thinking => Some(reasoning.to_string()),
            (Some(reasoning), Some(thinking)) => Some(format!("{reasoning}{thinking}")),
            (Some(reasoning), None) => Some(reasoning.to_string()),
            (None, Some(thinking)) => Some(thinking.to_string()),
            (None, None) => None,
        }
        .filter(|text| !text.is_empty())
    }
}
