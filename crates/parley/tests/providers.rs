use std::sync::Arc;

use anyhow::Result;
use futures::TryStreamExt;
use indoc::indoc;
use parley::{
    credentials::StaticCredentials,
    errors::ProviderError,
    models::{chunk::StreamChunk, message::Message},
    providers::{
        base::{Provider, StreamRequest},
        configs::ProviderConfig,
        factory::{get_provider, ProviderKind},
    },
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Generic test harness for any Provider implementation, backed by a local
/// server that plays the backend
struct ProviderTester {
    provider: Arc<dyn Provider>,
    _server: MockServer,
}

impl ProviderTester {
    async fn new(kind: ProviderKind, route: &str, response: ResponseTemplate) -> Result<Self> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(response)
            .mount(&server)
            .await;

        let credentials = StaticCredentials::new().with_key(kind.credential_key(), "test-key");
        let provider = get_provider(kind, ProviderConfig::new(server.uri()), Arc::new(credentials))?;
        Ok(Self {
            provider,
            _server: server,
        })
    }

    async fn collect(&self, model: &str) -> Result<Vec<StreamChunk>, ProviderError> {
        let messages = vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("Just say hello!"),
        ];
        self.provider
            .stream(StreamRequest::new(model, &messages))
            .await?
            .try_collect()
            .await
    }

    async fn test_basic_response(&self, model: &str, expected: &str) -> Result<()> {
        let chunks = self.collect(model).await?;
        let content: String = chunks
            .iter()
            .filter_map(|chunk| chunk.content_delta.as_deref())
            .collect();
        assert_eq!(content, expected, "Unexpected content from {}", model);
        Ok(())
    }

    async fn test_rejected_key(&self, model: &str) -> Result<()> {
        let err = self.collect(model).await.err().expect("request should fail");
        match err {
            ProviderError::Auth { provider, message } => {
                assert_eq!(provider, self.provider.kind());
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("Expected auth error, got {:?}", other),
        }
        Ok(())
    }
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream")
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(serde_json::json!({
        "error": {"message": "Invalid API key", "code": 401}
    }))
}

const OPENROUTER_ROUTE: &str = "/api/v1/chat/completions";
const GEMINI_ROUTE: &str = "/v1beta/models/gemini-2.5-flash:streamGenerateContent";
const KIMI_ROUTE: &str = "/v1/chat/completions";

#[tokio::test]
async fn test_openrouter_provider() -> Result<()> {
    let body = indoc! {r#"
        data: {"id":"gen-1","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"}}]}

        data: {"id":"gen-1","choices":[{"index":0,"delta":{"content":" there!"},"finish_reason":"stop"}]}

        data: [DONE]
    "#};
    ProviderTester::new(ProviderKind::OpenRouter, OPENROUTER_ROUTE, sse(body))
        .await?
        .test_basic_response("openai/gpt-4o-mini", "Hello there!")
        .await?;
    ProviderTester::new(ProviderKind::OpenRouter, OPENROUTER_ROUTE, unauthorized())
        .await?
        .test_rejected_key("openai/gpt-4o-mini")
        .await
}

#[tokio::test]
async fn test_gemini_provider() -> Result<()> {
    let body = indoc! {r#"
        data: {"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}

        data: {"candidates":[{"content":{"parts":[{"text":" there!"}],"role":"model"},"finishReason":"STOP"}]}
    "#};
    ProviderTester::new(ProviderKind::Gemini, GEMINI_ROUTE, sse(body))
        .await?
        .test_basic_response("gemini-2.5-flash", "Hello there!")
        .await?;
    ProviderTester::new(ProviderKind::Gemini, GEMINI_ROUTE, unauthorized())
        .await?
        .test_rejected_key("gemini-2.5-flash")
        .await
}

#[tokio::test]
async fn test_kimi_provider() -> Result<()> {
    let body = indoc! {r#"
        data: {"choices":[{"index":0,"delta":{"content":"Hello"}}]}

        data: {"choices":[{"index":0,"delta":{"content":" there!"},"finish_reason":"stop"}]}

        data: [DONE]
    "#};
    ProviderTester::new(ProviderKind::Kimi, KIMI_ROUTE, sse(body))
        .await?
        .test_basic_response("moonshot-v1-8k", "Hello there!")
        .await?;
    ProviderTester::new(ProviderKind::Kimi, KIMI_ROUTE, unauthorized())
        .await?
        .test_rejected_key("moonshot-v1-8k")
        .await
}

#[tokio::test]
async fn test_gemini_in_band_error_fails_stream() -> Result<()> {
    let body = indoc! {r#"
        data: {"candidates":[{"content":{"parts":[{"text":"Hel"}],"role":"model"}}]}

        data: {"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}
    "#};
    let tester = ProviderTester::new(ProviderKind::Gemini, GEMINI_ROUTE, sse(body)).await?;
    let err = tester.collect("gemini-2.5-flash").await.err().expect("stream should fail");
    assert_eq!(
        err,
        ProviderError::Http {
            status: 503,
            message: "The model is overloaded.".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_http_error_message_is_extracted() -> Result<()> {
    let response = ResponseTemplate::new(429)
        .set_body_json(serde_json::json!({"error": {"message": "Rate limit exceeded"}}));
    let tester = ProviderTester::new(ProviderKind::OpenRouter, OPENROUTER_ROUTE, response).await?;
    let err = tester.collect("openai/gpt-4o-mini").await.err().expect("request should fail");
    assert_eq!(
        err,
        ProviderError::Http {
            status: 429,
            message: "Rate limit exceeded".to_string()
        }
    );
    Ok(())
}
