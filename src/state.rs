//! Application State
//!
//! Wires the stores, the session manager, the metrics recorder, and the
//! orchestrator together. Handed to every HTTP handler.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::backchannel::BackchannelEngine;
use crate::services::llm::{build_provider, LlmProvider};
use crate::services::metrics::MetricsRecorder;
use crate::services::orchestrator::TurnOrchestrator;
use crate::services::profiles::RoleProfileStore;
use crate::services::retrieval::RetrievalClient;
use crate::services::scenario::ScenarioStore;
use crate::services::session::SessionManager;
use crate::utils::error::AppResult;

/// Shared service state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub scenarios: Arc<ScenarioStore>,
    pub profiles: Arc<RoleProfileStore>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<MetricsRecorder>,
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    /// Build the full service graph with the configured LLM backend.
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let provider = build_provider(&config.llm);
        Self::with_provider(config, provider)
    }

    /// Build the service graph around a caller-supplied LLM backend.
    /// The integration tests inject scripted providers through this.
    pub fn with_provider(config: AppConfig, provider: Arc<dyn LlmProvider>) -> AppResult<Self> {
        let scenarios = Arc::new(ScenarioStore::open(&config.scenario_dir)?);
        let profiles = Arc::new(RoleProfileStore::open(&config.profile_path)?);
        let backchannel = Arc::new(BackchannelEngine::open(
            &config.backchannel_path,
            config.backchannel_min_interval(),
        )?);
        let retrieval = Arc::new(RetrievalClient::new(&config.retrieval));
        let metrics = Arc::new(MetricsRecorder::new(config.sla));
        let sessions = Arc::new(SessionManager::new(config.session_idle_timeout()));

        let orchestrator = Arc::new(TurnOrchestrator::new(
            scenarios.clone(),
            profiles.clone(),
            backchannel,
            retrieval,
            provider,
            metrics.clone(),
            config.sla,
        ));

        Ok(Self {
            config: Arc::new(config),
            scenarios,
            profiles,
            sessions,
            metrics,
            orchestrator,
        })
    }
}
