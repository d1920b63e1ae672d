//! Local Provider
//!
//! llama.cpp-style local inference server. The only backend that can
//! attach the reply schema as a JSON grammar, which makes its output the
//! most reliably well-formed.

use async_trait::async_trait;

use super::provider::{build_chat_body, execute_chat, LlmProvider};
use super::types::{ChatRequest, LlmResult};
use crate::config::LlmConfig;

/// Local llama.cpp server speaking the OpenAI chat dialect.
pub struct LocalProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LocalProvider {
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
impl LlmProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_schema(&self) -> bool {
        self.config.json_schema_enforce
    }

    async fn complete(&self, request: ChatRequest<'_>) -> LlmResult<String> {
        // llama.cpp accepts the schema inline in response_format and
        // compiles it into a grammar
        let response_format = match (self.config.json_schema_enforce, request.schema) {
            (true, Some(schema)) => Some(serde_json::json!({
                "type": "json_object",
                "schema": schema,
            })),
            (true, None) => Some(serde_json::json!({"type": "json_object"})),
            (false, _) => None,
        };

        let body = build_chat_body(&self.config, &request, response_format);
        execute_chat(self.client.post(self.endpoint()).json(&body)).await
    }
}
