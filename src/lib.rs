//! hireflow - Interview Turn Orchestrator
//!
//! A stateful engine that, for each candidate utterance, drives a
//! branching interview scenario, emits an immediate backchannel and a
//! substantive reply under hard latency budgets, and maintains a
//! BARS-based competence score per session. It includes:
//! - scenario and role-profile stores with atomic snapshot semantics
//! - the BARS scorer and node selector
//! - a pluggable LLM adapter with heuristic fallback
//! - the cancellable per-turn orchestrator and session manager
//! - an axum HTTP surface with per-session SSE event streams

pub mod config;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

pub use config::{AppConfig, LlmConfig, ProviderKind, RetrievalConfig, SlaConfig};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
