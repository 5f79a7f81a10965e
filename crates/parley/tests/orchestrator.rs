use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indoc::indoc;
use parley::{
    credentials::StaticCredentials,
    errors::ToolError,
    models::{
        conversation::{ChatModel, Conversation},
        message::Message,
        role::Role,
        tool::ToolResult,
    },
    orchestrator::{ConversationEvent, Orchestrator, OrchestratorConfig, TurnState, UserInput},
    providers::{
        configs::ProviderConfig,
        factory::{ProviderKind, ProviderRegistry},
    },
    tool::ToolExecutor,
};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers every search with one fixed hit and remembers the queries
#[derive(Default)]
struct RecordingSearch {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolExecutor for RecordingSearch {
    async fn execute(&self, _name: &str, arguments: &str) -> Result<Vec<ToolResult>, ToolError> {
        self.queries.lock().unwrap().push(arguments.to_string());
        Ok(vec![ToolResult::new(
            "Tomorrow's forecast",
            "https://weather.example/tomorrow",
            "Sunny, high of 24°C",
        )])
    }
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream")
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        pacing_period: Duration::from_millis(1),
        scroll_coalesce: Duration::from_millis(1),
        ..Default::default()
    }
}

fn orchestrator(
    server: &MockServer,
    model: &str,
    tools: Option<Arc<dyn ToolExecutor>>,
    credentials: StaticCredentials,
) -> Result<Orchestrator> {
    let overrides: HashMap<ProviderKind, ProviderConfig> = [
        ProviderKind::OpenRouter,
        ProviderKind::Gemini,
        ProviderKind::Kimi,
    ]
    .into_iter()
    .map(|kind| (kind, ProviderConfig::new(server.uri())))
    .collect();
    let registry = ProviderRegistry::with_defaults(overrides, Arc::new(credentials))?;
    let conversation = Conversation::new(ChatModel::infer(model));
    Ok(Orchestrator::new(conversation, registry, tools, config()))
}

fn revealed_text(rx: &mut broadcast::Receiver<ConversationEvent>) -> String {
    let mut text = String::new();
    while let Ok(event) = rx.try_recv() {
        if let ConversationEvent::ContentRevealed { text: delta, .. } = event {
            text.push_str(&delta);
        }
    }
    text
}

#[tokio::test]
async fn test_plain_answer_streams_into_one_assistant_message() -> Result<()> {
    let server = MockServer::start().await;
    let body = indoc! {r#"
        data: {"choices":[{"delta":{"content":"Hel"}}]}

        data: {"choices":[{"delta":{"content":"lo"}}]}

        data: [DONE]
    "#};
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer or-key"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = StaticCredentials::new().with_key("OPENROUTER_API_KEY", "or-key");
    let mut orchestrator = orchestrator(&server, "openai/gpt-4o-mini", None, credentials)?;
    let mut events = orchestrator.subscribe();

    orchestrator.submit(UserInput::text("Hi")).await?;

    let messages = orchestrator.conversation().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].display_text(), "Hello");
    assert_eq!(orchestrator.state(), TurnState::Idle);
    assert_eq!(revealed_text(&mut events), "Hello");
    Ok(())
}

#[tokio::test]
async fn test_web_search_round_trip() -> Result<()> {
    let server = MockServer::start().await;
    let tool_call_body = indoc! {r#"
        data: {"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"web_search","arguments":""}}]}}]}

        data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":\"weather tomorrow\"}"}}]}}]}

        data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}

        data: [DONE]
    "#};
    let answer_body = indoc! {r#"
        data: {"choices":[{"delta":{"content":"Tomorrow will be sunny."}}]}

        data: [DONE]
    "#};
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(sse(tool_call_body))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "none"})))
        .respond_with(sse(answer_body))
        .expect(1)
        .mount(&server)
        .await;

    let search = Arc::new(RecordingSearch::default());
    let credentials = StaticCredentials::new().with_key("OPENROUTER_API_KEY", "or-key");
    let mut orchestrator = orchestrator(
        &server,
        "openai/gpt-4o-mini",
        Some(search.clone()),
        credentials,
    )?;

    orchestrator
        .submit(UserInput::text("What's the weather tomorrow?"))
        .await?;

    assert_eq!(*search.queries.lock().unwrap(), vec!["weather tomorrow"]);

    let messages = orchestrator.conversation().messages();
    let roles: Vec<Role> = messages.iter().map(|message| message.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
    let hits: serde_json::Value = serde_json::from_str(&messages[2].display_text())?;
    assert_eq!(hits[0]["url"], "https://weather.example/tomorrow");
    assert_eq!(messages[3].display_text(), "Tomorrow will be sunny.");
    assert!(messages.iter().all(|message| !message.notice));

    // The continuation carries the call and its answer
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
    let continuation: serde_json::Value = serde_json::from_slice(&requests[1].body)?;
    let wire_messages = continuation["messages"].as_array().cloned().unwrap_or_default();
    assert_eq!(wire_messages[1]["tool_calls"][0]["id"], "call_1");
    assert_eq!(wire_messages[2]["role"], "tool");
    assert_eq!(wire_messages[2]["tool_call_id"], "call_1");
    Ok(())
}

#[tokio::test]
async fn test_rejected_key_leaves_single_notice() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "User not found.", "code": 401}})),
        )
        .mount(&server)
        .await;

    let credentials = StaticCredentials::new().with_key("OPENROUTER_API_KEY", "revoked");
    let mut orchestrator = orchestrator(&server, "openai/gpt-4o-mini", None, credentials)?;
    let mut events = orchestrator.subscribe();

    orchestrator.submit(UserInput::text("Hello")).await?;

    let messages = orchestrator.conversation().messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].notice);
    assert!(messages[1].display_text().contains("API key"));
    assert_eq!(revealed_text(&mut events), "");
    assert_eq!(orchestrator.state(), TurnState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_missing_key_fails_without_network() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut orchestrator =
        orchestrator(&server, "gemini-2.5-flash", None, StaticCredentials::new())?;
    orchestrator.submit(UserInput::text("Hello")).await?;

    let notices: Vec<&Message> = orchestrator
        .conversation()
        .messages()
        .iter()
        .filter(|message| message.notice)
        .collect();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].display_text().contains("GEMINI_API_KEY"));
    Ok(())
}

#[tokio::test]
async fn test_gemini_thoughts_become_reasoning() -> Result<()> {
    let server = MockServer::start().await;
    let body = indoc! {r#"
        data: {"candidates":[{"content":{"parts":[{"text":"Checking units.","thought":true}],"role":"model"}}]}

        data: {"candidates":[{"content":{"parts":[{"text":"100 cm"}],"role":"model"},"finishReason":"STOP"}]}
    "#};
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
        .and(body_partial_json(json!({
            "generationConfig": {"thinkingConfig": {"includeThoughts": true}}
        })))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let credentials = StaticCredentials::new().with_key("GEMINI_API_KEY", "g-key");
    let mut orchestrator = orchestrator(&server, "gemini-2.5-flash", None, credentials)?;
    orchestrator.submit(UserInput::text("How long is a meter?")).await?;

    let answer = &orchestrator.conversation().messages()[1];
    assert_eq!(answer.reasoning.as_deref(), Some("Checking units."));
    assert_eq!(answer.display_text(), "100 cm");
    Ok(())
}
