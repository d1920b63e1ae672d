//! Business Logic Services
//!
//! The interview core: stores, scoring, selection, the LLM adapter,
//! and the per-turn orchestrator that composes them.

pub mod backchannel;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod profiles;
pub mod retrieval;
pub mod scenario;
pub mod scoring;
pub mod selector;
pub mod session;
