//! Gateway Provider
//!
//! Hosted multi-model gateway (OpenRouter-style). Same chat dialect as
//! the OpenAI backend plus the attribution headers the gateway expects.

use async_trait::async_trait;

use super::provider::{build_chat_body, execute_chat, LlmProvider};
use super::types::{ChatRequest, LlmError, LlmResult};
use crate::config::LlmConfig;

const REFERER_HEADER: &str = "HTTP-Referer";
const TITLE_HEADER: &str = "X-Title";

/// Hosted gateway backend.
pub struct GatewayProvider {
    config: LlmConfig,
    client: reqwest::Client,
    referer: String,
    title: String,
}

impl GatewayProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            referer: std::env::var("GATEWAY_HEADERS_REFERER")
                .unwrap_or_else(|_| "http://localhost".to_string()),
            title: std::env::var("GATEWAY_HEADERS_X_TITLE")
                .unwrap_or_else(|_| "hireflow".to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for GatewayProvider {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_schema(&self) -> bool {
        false
    }

    async fn complete(&self, request: ChatRequest<'_>) -> LlmResult<String> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::Auth("gateway requires LLM_API_KEY".to_string()))?;

        let body = build_chat_body(&self.config, &request, None);
        let http = self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .header(REFERER_HEADER, &self.referer)
            .header(TITLE_HEADER, &self.title)
            .json(&body);
        execute_chat(http).await
    }
}
