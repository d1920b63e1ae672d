//! LLM Provider Trait
//!
//! Defines the common interface for the chat-completion backends and the
//! request/response plumbing they share. All backends speak an
//! OpenAI-style chat dialect; they differ in endpoint shape, headers,
//! and whether the output schema can be attached as a grammar.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{ChatRequest, LlmError, LlmResult};
use crate::config::LlmConfig;

/// A pluggable chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and health output.
    fn name(&self) -> &'static str;

    /// Model identifier sent to the backend.
    fn model(&self) -> &str;

    /// Whether the backend can enforce a JSON schema grammar natively.
    fn supports_schema(&self) -> bool;

    /// Run one completion and return the raw assistant content.
    ///
    /// Implementations do not enforce deadlines; the adapter wraps every
    /// call in the turn's remaining budget.
    async fn complete(&self, request: ChatRequest<'_>) -> LlmResult<String>;
}

/// Map an HTTP error status to an LlmError.
pub fn parse_http_error(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(body.to_string()),
        500..=599 => LlmError::Server {
            status,
            message: body.to_string(),
        },
        _ => LlmError::Server {
            status,
            message: body.to_string(),
        },
    }
}

/// Build the shared chat-completions body. `response_format` is the
/// backend-specific structured-output clause, if any.
pub fn build_chat_body(
    config: &LlmConfig,
    request: &ChatRequest<'_>,
    response_format: Option<Value>,
) -> Value {
    let mut body = serde_json::json!({
        "model": config.model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
        "stream": false,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
    });
    if let Some(format) = response_format {
        body["response_format"] = format;
    }
    body
}

/// Pull the assistant content out of a chat-completions response.
pub fn parse_chat_response(body: &Value) -> LlmResult<String> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(String::from)
        .ok_or_else(|| LlmError::Parse("no choices[0].message.content".to_string()))
}

/// POST the body and decode the assistant content. Shared by all
/// backends; callers supply the fully-built request.
pub async fn execute_chat(request: reqwest::RequestBuilder) -> LlmResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(parse_http_error(status.as_u16(), &body));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| LlmError::Network(format!("body read: {e}")))?;
    parse_chat_response(&body)
}

/// Extract the largest balanced JSON object from free-form model output.
/// Used when a backend ignores the JSON instruction and wraps the object
/// in prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            let len = i + 1 - s;
                            if best.map_or(true, |(bs, be)| len > be - bs) {
                                best = Some((s, i + 1));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| &text[s..e])
}

/// Parse model output into a JSON value: direct parse first, then the
/// largest embedded object.
pub fn parse_reply_json(content: &str) -> LlmResult<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        if value.is_object() {
            return Ok(value);
        }
    }
    extract_json_object(content)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .filter(Value::is_object)
        .ok_or_else(|| LlmError::Parse("no JSON object in model output".to_string()))
}
