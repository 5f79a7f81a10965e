use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const WEB_SEARCH: &str = "web_search";

/// A tool that can be offered to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the parameters the tool accepts
    pub parameters: Value,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The only capability the orchestrator knows how to route
    pub fn web_search() -> Self {
        Tool::new(
            WEB_SEARCH,
            "Search the web for up-to-date information. Use it when the answer depends on recent events or facts you are unsure about.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }
}

/// A model-issued request to invoke a tool.
///
/// The arguments are kept exactly as the backend sent them: they are usually a
/// JSON object but nothing guarantees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub id: String,
    pub function_name: String,
    pub raw_arguments: String,
}

impl ToolCallRequest {
    pub fn new<I, N, A>(id: I, function_name: N, raw_arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

/// One hit returned by a search tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl ToolResult {
    pub fn new<T, U, S>(title: T, url: U, snippet: S) -> Self
    where
        T: Into<String>,
        U: Into<String>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}
