//! Configuration
//!
//! All runtime knobs come from the environment with sensible defaults,
//! are validated once at startup, and are read-only afterwards. An
//! invalid configuration terminates the process with exit code 2.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Which LLM backend the adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// llama.cpp-style local server with JSON grammar support
    Local,
    /// Any endpoint speaking the OpenAI chat-completions dialect
    OpenAiCompatible,
    /// Hosted gateway (OpenRouter-style, needs referer/title headers)
    Gateway,
}

impl std::str::FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" | "llama.cpp" => Ok(ProviderKind::Local),
            "openai" | "openai_compatible" => Ok(ProviderKind::OpenAiCompatible),
            "gateway" | "openrouter" => Ok(ProviderKind::Gateway),
            other => Err(AppError::config(format!("unknown LLM provider: {other}"))),
        }
    }
}

/// Per-turn latency budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Hard deadline for the backchannel fork, from turn start
    pub backchannel_ms: u64,
    /// Total turn budget
    pub turn_ms: u64,
    /// Margin reserved for commit and publish inside the turn budget
    pub safety_ms: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            backchannel_ms: 500,
            turn_ms: 5000,
            safety_ms: 300,
        }
    }
}

impl SlaConfig {
    /// Deadline for the substantive (LLM) fork.
    pub fn llm_budget(&self) -> Duration {
        Duration::from_millis(self.turn_ms.saturating_sub(self.safety_ms))
    }
}

/// LLM adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Attach the reply JSON schema when the backend supports grammars
    pub json_schema_enforce: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            base_url: "http://localhost:8080/v1".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            api_key: None,
            max_tokens: 96,
            temperature: 0.7,
            json_schema_enforce: true,
        }
    }
}

/// Retrieval adapter settings. `base_url = None` disables retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 800,
            top_k: 3,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub scenario_dir: PathBuf,
    pub profile_path: PathBuf,
    pub backchannel_path: PathBuf,
    pub sla: SlaConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub backchannel_min_interval_ms: u64,
    pub session_idle_timeout_s: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8007".to_string(),
            scenario_dir: PathBuf::from("./data/scenarios"),
            profile_path: PathBuf::from("./config/role_profiles.yaml"),
            backchannel_path: PathBuf::from("./config/backchannel.yaml"),
            sla: SlaConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            backchannel_min_interval_ms: 2000,
            session_idle_timeout_s: 1800,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> AppResult<Option<T>> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::config(format!("cannot parse {name}={raw}"))),
    }
}

impl AppConfig {
    /// Build the configuration from the process environment and validate it.
    pub fn from_env() -> AppResult<Self> {
        let mut config = AppConfig::default();

        if let Some(addr) = env_var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = env_var("SCENARIO_DIR") {
            config.scenario_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_var("PROFILE_PATH") {
            config.profile_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("BACKCHANNEL_PATH") {
            config.backchannel_path = PathBuf::from(path);
        }

        if let Some(v) = parse_env::<u64>("SLA_BACKCHANNEL_MS")? {
            config.sla.backchannel_ms = v;
        }
        if let Some(v) = parse_env::<u64>("SLA_TURN_MS")? {
            config.sla.turn_ms = v;
        }
        if let Some(v) = parse_env::<u64>("SLA_SAFETY_MS")? {
            config.sla.safety_ms = v;
        }

        if let Some(v) = parse_env::<ProviderKind>("LLM_PROVIDER")? {
            config.llm.provider = v;
        }
        if let Some(url) = env_var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = env_var("LLM_MODEL") {
            config.llm.model = model;
        }
        config.llm.api_key = env_var("LLM_API_KEY");
        if let Some(v) = parse_env::<u32>("LLM_MAX_TOKENS")? {
            config.llm.max_tokens = v;
        }
        if let Some(v) = parse_env::<f32>("LLM_TEMPERATURE")? {
            config.llm.temperature = v;
        }
        if let Some(v) = parse_env::<bool>("LLM_JSON_SCHEMA_ENFORCE")? {
            config.llm.json_schema_enforce = v;
        }

        config.retrieval.base_url = env_var("RETRIEVAL_BASE_URL");
        if let Some(v) = parse_env::<u64>("RETRIEVAL_TIMEOUT_MS")? {
            config.retrieval.timeout_ms = v;
        }
        if let Some(v) = parse_env::<usize>("RETRIEVAL_TOP_K")? {
            config.retrieval.top_k = v;
        }

        if let Some(v) = parse_env::<u64>("BACKCHANNEL_MIN_INTERVAL_MS")? {
            config.backchannel_min_interval_ms = v;
        }
        if let Some(v) = parse_env::<u64>("SESSION_IDLE_TIMEOUT_S")? {
            config.session_idle_timeout_s = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> AppResult<()> {
        if self.sla.turn_ms == 0 {
            return Err(AppError::config("SLA_TURN_MS must be positive"));
        }
        if self.sla.safety_ms >= self.sla.turn_ms {
            return Err(AppError::config(
                "SLA_SAFETY_MS must be smaller than SLA_TURN_MS",
            ));
        }
        if self.sla.backchannel_ms > self.sla.turn_ms {
            return Err(AppError::config(
                "SLA_BACKCHANNEL_MS cannot exceed SLA_TURN_MS",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AppError::config("LLM_TEMPERATURE must be in [0, 2]"));
        }
        if self.llm.max_tokens == 0 {
            return Err(AppError::config("LLM_MAX_TOKENS must be positive"));
        }
        if self.session_idle_timeout_s == 0 {
            return Err(AppError::config("SESSION_IDLE_TIMEOUT_S must be positive"));
        }
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| AppError::config(format!("invalid BIND_ADDR: {}", self.bind_addr)))?;
        Ok(())
    }

    pub fn backchannel_min_interval(&self) -> Duration {
        Duration::from_millis(self.backchannel_min_interval_ms)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_s)
    }
}
