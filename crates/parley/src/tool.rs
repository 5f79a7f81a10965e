use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::errors::{ToolCallError, ToolError};
use crate::models::tool::ToolResult;

/// Argument keys that may carry a search query, most specific first
const QUERY_KEYS: [&str; 7] = [
    "query",
    "q",
    "search_query",
    "search",
    "keywords",
    "keyword",
    "text",
];

/// Runs the tools a model asks for
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: &str) -> Result<Vec<ToolResult>, ToolError>;
}

/// Extract the search query from a tool call's raw arguments.
///
/// A JSON object yields the first non-empty string under one of the known
/// query keys. Text that does not look like JSON is taken as the query
/// itself.
pub fn parse_tool_query(raw_arguments: &str) -> Result<String, ToolCallError> {
    let trimmed = raw_arguments.trim();

    if let Ok(Value::Object(arguments)) = serde_json::from_str::<Value>(trimmed) {
        return QUERY_KEYS
            .iter()
            .filter_map(|key| arguments.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|query| !query.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ToolCallError::InvalidArguments(format!(
                    "no search query in arguments {}",
                    trimmed
                ))
            });
    }

    if !trimmed.is_empty() && !trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    Err(ToolCallError::InvalidArguments(format!(
        "could not read arguments {:?}",
        raw_arguments
    )))
}

/// Serialize search hits as the body of a `tool` message
pub fn results_to_content(results: &[ToolResult]) -> String {
    serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string())
}
