//! LLM Backend Tests
//!
//! The OpenAI-compatible and local backends against a mock HTTP server:
//! request shape, schema attachment, error mapping, and the adapter's
//! retry behavior.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use hireflow::models::profile::RoleProfile;
use hireflow::services::llm::{
    generate_reply, ChatRequest, LlmError, LlmProvider, LocalProvider, OpenAiProvider, TurnPrompt,
};
use hireflow::services::scenario::fallback_scenario;
use hireflow::LlmConfig;

fn chat_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "model": "test-model"
    }))
}

fn config_for(server: &MockServer) -> LlmConfig {
    LlmConfig {
        base_url: format!("{}/v1", server.uri()),
        api_key: Some("test-key".to_string()),
        ..LlmConfig::default()
    }
}

fn request<'a>() -> ChatRequest<'a> {
    ChatRequest {
        system: "system prompt",
        user: "user prompt",
        schema: None,
    }
}

#[tokio::test]
async fn openai_backend_happy_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "qwen2.5-7b-instruct",
            "max_tokens": 96,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(chat_response("{\"reply\": \"ok\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(config_for(&server));
    let content = provider.complete(request()).await.unwrap();
    assert_eq!(content, "{\"reply\": \"ok\"}");
}

#[tokio::test]
async fn local_backend_attaches_schema_grammar() {
    let server = MockServer::start().await;
    let schema = serde_json::json!({"type": "object"});

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "response_format": {"type": "json_object", "schema": {"type": "object"}}
        })))
        .respond_with(chat_response("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LocalProvider::new(config_for(&server));
    let req = ChatRequest {
        system: "s",
        user: "u",
        schema: Some(&schema),
    };
    provider.complete(req).await.unwrap();
}

#[tokio::test]
async fn server_errors_map_to_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(config_for(&server));
    let err = provider.complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Server { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn auth_errors_are_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(config_for(&server));
    let err = provider.complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Auth(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn adapter_retries_5xx_then_succeeds() {
    let server = MockServer::start().await;
    let reply = serde_json::json!({
        "reply": "Продолжаем.",
        "next_node_id": "python_l3_advanced",
        "scoring_update": {"block": "python", "delta": 0.7, "score": 0.8},
        "red_flags": []
    })
    .to_string();

    // First call fails with 500, second succeeds
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(chat_response(&reply))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(config_for(&server));
    let scenario = fallback_scenario("python");
    let scores = HashMap::new();
    let profile = RoleProfile::fallback();

    let result = generate_reply(
        &provider,
        TurnPrompt {
            scenario: &scenario,
            node: scenario.start_node().unwrap(),
            transcript: "опыт с python есть",
            scores: &scores,
            profile: &profile,
            cv_context: None,
        },
        Instant::now() + Duration::from_secs(10),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.next_node_id.as_deref(), Some("python_l3_advanced"));

    let received: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn adapter_rejects_wrong_block_even_from_healthy_backend() {
    let server = MockServer::start().await;
    let reply = serde_json::json!({
        "reply": "ok",
        "next_node_id": null,
        "scoring_update": {"block": "golang", "delta": 0.7, "score": 0.8},
        "red_flags": []
    })
    .to_string();
    Mock::given(method("POST"))
        .respond_with(chat_response(&reply))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(config_for(&server));
    let scenario = fallback_scenario("python");
    let scores = HashMap::new();
    let profile = RoleProfile::fallback();

    let result = generate_reply(
        &provider,
        TurnPrompt {
            scenario: &scenario,
            node: scenario.start_node().unwrap(),
            transcript: "опыт с python есть",
            scores: &scores,
            profile: &profile,
            cv_context: None,
        },
        Instant::now() + Duration::from_secs(10),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(LlmError::Invalid(_))));
}
