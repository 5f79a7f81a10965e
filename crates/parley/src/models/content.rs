use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// One atomic piece of multimodal content
pub enum ContentPart {
    Text { text: String },
    /// A URL or a `data:` URI
    ImageRef { url: String },
    #[serde(rename_all = "camelCase")]
    AudioRef { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image<S: Into<String>>(url: S) -> Self {
        ContentPart::ImageRef { url: url.into() }
    }

    pub fn audio<S: Into<String>, T: Into<String>>(mime_type: S, data: T) -> Self {
        ContentPart::AudioRef {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Get the text content if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
/// The body of a message.
///
/// `PlainText(s)` and `Parts([Text(s)])` are the same display text and every
/// consumer treats them identically.
pub enum MessageContent {
    PlainText(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::PlainText(String::new())
    }
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::PlainText(text.into())
    }

    /// The text a reader sees, with non-text parts left out
    pub fn display_text(&self) -> String {
        match self {
            MessageContent::PlainText(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::PlainText(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts
                .iter()
                .all(|part| part.as_text().is_some_and(str::is_empty)),
        }
    }

    pub fn has_attachments(&self) -> bool {
        match self {
            MessageContent::PlainText(_) => false,
            MessageContent::Parts(parts) => parts.iter().any(|part| part.as_text().is_none()),
        }
    }

    /// Append streamed text.
    ///
    /// For `Parts`, the text is merged into the trailing text part when there is
    /// one, otherwise it becomes a new text part.
    pub fn push_str(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        match self {
            MessageContent::PlainText(text) => text.push_str(delta),
            MessageContent::Parts(parts) => match parts.last_mut() {
                Some(ContentPart::Text { text }) => text.push_str(delta),
                _ => parts.push(ContentPart::text(delta)),
            },
        }
    }

    pub fn parts(&self) -> Vec<ContentPart> {
        match self {
            MessageContent::PlainText(text) => vec![ContentPart::text(text.clone())],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }
}
