use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::{ContentPart, MessageContent};
use super::role::Role;
use super::tool::ToolCallRequest;

/// Opaque unique identifier of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A message to or from an LLM
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub created: i64,
    pub content: MessageContent,
    /// Accumulated thinking text, only ever set on assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Links a `tool` message back to the call it answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Synthetic error notes are shown to the user but never sent to a backend
    #[serde(default)]
    pub notice: bool,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Message {
            id: MessageId::new(),
            role,
            created: Utc::now().timestamp(),
            content: MessageContent::default(),
            reasoning: None,
            tool_calls: None,
            tool_call_id: None,
            notice: false,
        }
    }

    pub fn system() -> Self {
        Self::with_role(Role::System)
    }

    pub fn user() -> Self {
        Self::with_role(Role::User)
    }

    pub fn assistant() -> Self {
        Self::with_role(Role::Assistant)
    }

    /// A tool result answering the call with the given id
    pub fn tool<S: Into<String>>(tool_call_id: S) -> Self {
        let mut message = Self::with_role(Role::Tool);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// An assistant-visible note describing something that went wrong
    pub fn notice<S: Into<String>>(text: S) -> Self {
        let mut message = Self::assistant().with_text(text);
        message.notice = true;
        message
    }

    /// Replace the content with plain text
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = MessageContent::text(text);
        self
    }

    pub fn with_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.content = MessageContent::Parts(parts);
        self
    }

    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_reasoning<S: Into<String>>(mut self, reasoning: S) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    pub fn display_text(&self) -> String {
        self.content.display_text()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    pub fn append_reasoning(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.reasoning.get_or_insert_with(String::new).push_str(delta);
    }

    /// Nothing has been streamed into this message yet
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
            && self.reasoning.as_deref().map_or(true, str::is_empty)
            && !self.has_tool_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Message::user();
        let b = Message::user();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_tool_message_links_call() {
        let message = Message::tool("call_1").with_text("[]");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_blank_tracks_every_channel() {
        let mut message = Message::assistant();
        assert!(message.is_blank());
        message.append_reasoning("hmm");
        assert!(!message.is_blank());

        let calls = Message::assistant().with_tool_calls(vec![ToolCallRequest::new("1", "web_search", "{}")]);
        assert!(!calls.is_blank());
        assert!(calls.has_tool_calls());
    }

    #[test]
    fn test_notice_is_flagged_assistant_text() {
        let notice = Message::notice("Something broke");
        assert_eq!(notice.role, Role::Assistant);
        assert!(notice.notice);
        assert_eq!(notice.display_text(), "Something broke");
    }

    #[test]
    fn test_serialization_round_trip() -> anyhow::Result<()> {
        let message = Message::assistant()
            .with_text("Hi")
            .with_reasoning("greeting")
            .with_tool_calls(vec![ToolCallRequest::new("1", "web_search", "{\"query\":\"x\"}")]);
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["toolCalls"][0]["functionName"], "web_search");
        let back: Message = serde_json::from_value(value)?;
        assert_eq!(back, message);
        Ok(())
    }
}
