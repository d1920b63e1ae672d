//! OpenAI-Compatible Provider
//!
//! Any endpoint speaking the OpenAI chat-completions dialect (vLLM,
//! Ollama's compatibility layer, the real thing). Supports
//! `json_object` response format but not arbitrary schema grammars, so
//! the schema travels inside the prompt instead.

use async_trait::async_trait;

use super::provider::{build_chat_body, execute_chat, LlmProvider};
use super::types::{ChatRequest, LlmResult};
use crate::config::LlmConfig;

/// OpenAI-compatible chat backend.
pub struct OpenAiProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_schema(&self) -> bool {
        false
    }

    async fn complete(&self, request: ChatRequest<'_>) -> LlmResult<String> {
        let response_format = self
            .config
            .json_schema_enforce
            .then(|| serde_json::json!({"type": "json_object"}));
        let body = build_chat_body(&self.config, &request, response_format);

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }
        execute_chat(http).await
    }
}
