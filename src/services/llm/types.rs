//! LLM Types
//!
//! Shared request/response shapes and errors for the chat-completion
//! backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::scenario::{Node, Scenario};
use crate::models::session::ScoringUpdate;

/// One chat-completion request: prompts plus optional output schema.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// JSON schema for the reply; attached as a grammar when the
    /// backend supports it
    pub schema: Option<&'a Value>,
}

/// Errors from LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("reply failed validation: {0}")]
    Invalid(String),
}

impl LlmError {
    /// Whether a single retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Server { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            _ => false,
        }
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// The validated object an LLM turn must produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTurn {
    pub reply: String,
    #[serde(default)]
    pub next_node_id: Option<String>,
    pub scoring_update: ScoringUpdate,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

impl LlmTurn {
    /// Parse and validate a raw reply object against the current node:
    /// `next_node_id` must resolve in the scenario (or be null) and the
    /// scoring block must match the node's category.
    pub fn from_value(value: Value, scenario: &Scenario, node: &Node) -> LlmResult<Self> {
        let mut turn: LlmTurn = serde_json::from_value(value)
            .map_err(|e| LlmError::Parse(format!("reply shape: {e}")))?;

        if let Some(next) = &turn.next_node_id {
            if scenario.node(next).is_none() {
                return Err(LlmError::Invalid(format!("unknown next_node_id {next}")));
            }
            if next == &node.id {
                return Err(LlmError::Invalid("self-transition".to_string()));
            }
        }
        if turn.scoring_update.block != node.category {
            return Err(LlmError::Invalid(format!(
                "scoring block {} does not match node category {}",
                turn.scoring_update.block, node.category
            )));
        }

        turn.scoring_update.score = turn.scoring_update.score.clamp(0.0, 1.0);
        Ok(turn)
    }
}
