//! Data Models
//!
//! Typed records for everything that crosses the service boundary.
//! Anything entering from the network is parsed once into these shapes
//! and rejected on violation.

pub mod profile;
pub mod scenario;
pub mod scoring;
pub mod session;

pub use profile::{RoleProfile, Thresholds};
pub use scenario::{Node, Scenario, ScenarioPolicy};
pub use scoring::{AnswerScore, BarsLevel, PerformanceAnalysis, QAnswer};
pub use session::{
    HistoryEntry, ReplySource, ScoringUpdate, SessionEvent, SessionState, TurnOutcome, TurnRecord,
    TurnTimings,
};
