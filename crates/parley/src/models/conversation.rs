use serde::{Deserialize, Serialize};

use super::message::{Message, MessageId};
use crate::providers::factory::ProviderKind;

/// The model a conversation talks to, and the backend that serves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatModel {
    pub provider: ProviderKind,
    pub id: String,
}

impl ChatModel {
    pub fn new<S: Into<String>>(provider: ProviderKind, id: S) -> Self {
        Self {
            provider,
            id: id.into(),
        }
    }

    /// Pick the backend from the model id alone
    pub fn infer<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        let lowered = id.to_lowercase();
        let provider = if lowered.starts_with("gemini") {
            ProviderKind::Gemini
        } else if lowered.starts_with("kimi") || lowered.starts_with("moonshot") {
            ProviderKind::Kimi
        } else {
            ProviderKind::OpenRouter
        };
        Self { provider, id }
    }
}

/// An ordered list of messages with unique ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub model: ChatModel,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(model: ChatModel) -> Self {
        Self {
            model,
            messages: Vec::new(),
        }
    }

    pub fn with_messages(model: ChatModel, messages: Vec<Message>) -> Self {
        let mut conversation = Self::new(model);
        for message in messages {
            conversation.push(message);
        }
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    /// Append a message, replacing its id if it would collide
    pub fn push(&mut self, mut message: Message) -> MessageId {
        if self.get(message.id).is_some() {
            message.id = MessageId::new();
        }
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Remove the trailing message if it has the given id
    pub fn pop_if(&mut self, id: MessageId) -> Option<Message> {
        match self.messages.last() {
            Some(last) if last.id == id => self.messages.pop(),
            _ => None,
        }
    }
}
