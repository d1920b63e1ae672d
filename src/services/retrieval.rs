//! Retrieval Adapter
//!
//! Vector search over resume chunks, served by an external embedder.
//! Strictly best-effort: any error or timeout yields an empty result so
//! the turn never blocks on resume context.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetrievalConfig;

/// One resume chunk returned by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvChunk {
    pub cv_id: String,
    pub chunk_text: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<CvChunk>,
}

/// Read-only client for the resume vector store.
pub struct RetrievalClient {
    base_url: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
    top_k: usize,
}

impl RetrievalClient {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(config.timeout_ms),
            top_k: config.top_k,
        }
    }

    /// Whether a backend is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Search resume chunks for the query. Returns an empty list on any
    /// failure; the caller simply proceeds without cv context.
    pub async fn search(&self, query: &str, threshold: f64) -> Vec<CvChunk> {
        let Some(base_url) = &self.base_url else {
            return Vec::new();
        };

        let request = SearchRequest {
            query,
            top_k: self.top_k,
            threshold,
        };

        let fetch = async {
            let response = self
                .client
                .post(format!("{base_url}/search"))
                .json(&request)
                .send()
                .await?;
            let response = response.error_for_status()?;
            response.json::<SearchResponse>().await
        };

        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(body)) => body.results,
            Ok(Err(e)) => {
                debug!(error = %e, "retrieval failed, omitting cv context");
                Vec::new()
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "retrieval timed out");
                Vec::new()
            }
        }
    }
}

/// Join chunks into the `cv_context` block injected into the user prompt.
pub fn format_context(chunks: &[CvChunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    Some(
        chunks
            .iter()
            .map(|c| c.chunk_text.trim())
            .collect::<Vec<_>>()
            .join("\n---\n"),
    )
}
