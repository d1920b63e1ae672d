//! LLM Adapter
//!
//! Uniform interface over the chat-completion backends, plus the turn
//! adapter that enforces deadlines, retries once on transient failures,
//! and post-processes model output into a validated reply object.

pub mod gateway;
pub mod local;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{LlmConfig, ProviderKind};
use crate::models::profile::RoleProfile;
use crate::models::scenario::{Node, Scenario};

pub use gateway::GatewayProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use provider::{parse_reply_json, LlmProvider};
pub use types::{ChatRequest, LlmError, LlmResult, LlmTurn};

/// Minimum budget left for a retry to be worth it.
const RETRY_MIN_BUDGET: Duration = Duration::from_secs(1);

/// Instantiate the backend selected at startup.
pub fn build_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    match config.provider {
        ProviderKind::Local => Arc::new(LocalProvider::new(config.clone())),
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiProvider::new(config.clone())),
        ProviderKind::Gateway => Arc::new(GatewayProvider::new(config.clone())),
    }
}

/// Everything the adapter needs to run one substantive LLM turn.
pub struct TurnPrompt<'a> {
    pub scenario: &'a Scenario,
    pub node: &'a Node,
    pub transcript: &'a str,
    pub scores: &'a HashMap<String, f64>,
    pub profile: &'a RoleProfile,
    pub cv_context: Option<&'a str>,
}

/// Run one completion against the turn deadline and return a validated
/// reply object. The caller falls back to the heuristic path on error.
pub async fn generate_reply(
    provider: &dyn LlmProvider,
    turn: TurnPrompt<'_>,
    deadline: Instant,
    cancel: &CancellationToken,
) -> LlmResult<LlmTurn> {
    let system = prompt::build_system_prompt(&turn.profile.id);
    let user = prompt::build_user_prompt(
        turn.node,
        turn.transcript,
        turn.scores,
        turn.profile,
        turn.cv_context,
    );
    let schema = prompt::reply_schema();

    let request = ChatRequest {
        system: &system,
        user: &user,
        schema: provider.supports_schema().then_some(&schema),
    };

    let content = match complete_with_deadline(provider, &request, deadline, cancel).await {
        Ok(content) => content,
        Err(e) if e.is_retryable() && remaining(deadline) >= RETRY_MIN_BUDGET => {
            warn!(provider = provider.name(), error = %e, "retrying LLM call once");
            complete_with_deadline(provider, &request, deadline, cancel).await?
        }
        Err(e) => return Err(e),
    };

    let value = parse_reply_json(&content)?;
    let turn_result = LlmTurn::from_value(value, turn.scenario, turn.node)?;
    debug!(provider = provider.name(), "LLM reply accepted");
    Ok(turn_result)
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// One completion attempt bounded by the deadline and the turn token.
async fn complete_with_deadline(
    provider: &dyn LlmProvider,
    request: &ChatRequest<'_>,
    deadline: Instant,
    cancel: &CancellationToken,
) -> LlmResult<String> {
    let budget = remaining(deadline);
    if budget.is_zero() {
        return Err(LlmError::Timeout);
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        result = tokio::time::timeout(budget, provider.complete(request.clone())) => {
            match result {
                Ok(inner) => inner,
                Err(_) => Err(LlmError::Timeout),
            }
        }
    }
}
