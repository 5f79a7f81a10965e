use thiserror::Error;

use crate::providers::factory::ProviderKind;

/// Failures of a single provider call
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Authentication failed for {provider}: {message}")]
    Auth {
        provider: ProviderKind,
        message: String,
    },

    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn missing_credential(provider: ProviderKind) -> Self {
        ProviderError::Auth {
            provider,
            message: format!("no API key found for {}", provider.credential_key()),
        }
    }

    /// Text shown to the user in place of the failed answer
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Auth { provider, message } => format!(
                "⚠️ {provider} rejected the request because no valid API key is configured ({message}). \
                 Add your {provider} API key in settings (or set {}) and try again.",
                provider.credential_key()
            ),
            ProviderError::Http { status, message } => {
                format!("⚠️ The model provider returned an error (HTTP {status}): {message}")
            }
            ProviderError::Decode(message) => {
                format!("⚠️ The model's response could not be read: {message}")
            }
            ProviderError::Network(message) => format!(
                "⚠️ Could not reach the model provider: {message}. Check your connection and try again."
            ),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Network("request timed out".to_string())
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Failures reported by a tool executor
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Tool unavailable: {0}")]
    Unavailable(String),
}

/// Why a single tool call in a batch did not produce a tool message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Execution(#[from] ToolError),
}

/// Why a submission was not accepted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Cannot send an empty message")]
    EmptyInput,

    #[error("A response is still streaming")]
    Busy,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_message_is_actionable() {
        let err = ProviderError::missing_credential(ProviderKind::Gemini);
        let text = err.user_message();
        assert!(text.contains("GEMINI_API_KEY"));
        assert!(text.contains("API key"));
    }

    #[test]
    fn test_http_message_carries_status_and_body() {
        let err = ProviderError::Http {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed with status 429: Rate limit exceeded");
        assert!(err.user_message().contains("HTTP 429"));
    }

    #[test]
    fn test_tool_call_error_wraps_executor_error() {
        let err: ToolCallError = ToolError::ExecutionError("boom".into()).into();
        assert_eq!(err.to_string(), "Tool execution failed: boom");
    }
}
