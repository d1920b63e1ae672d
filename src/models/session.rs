//! Session Model
//!
//! Per-candidate interview state and the per-turn records the
//! orchestrator commits and publishes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed answer in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub node_id: String,
    pub transcript: String,
    pub score: f64,
    pub block: String,
    pub timestamp: DateTime<Utc>,
}

/// The score change a turn applies to one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringUpdate {
    pub block: String,
    /// Change of the block score relative to before the turn
    pub delta: f64,
    /// The answer's BARS score
    pub score: f64,
}

/// Per-stage latency breakdown for a turn, in milliseconds.
///
/// ASR and TTS run outside this service; their fields are carried for
/// SLA accounting when the caller reports them, and default to zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TurnTimings {
    #[serde(default)]
    pub asr_ms: u64,
    pub dm_ms: u64,
    pub llm_ms: u64,
    #[serde(default)]
    pub tts_ms: u64,
    pub total_ms: u64,
}

/// Which path produced the substantive reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Llm,
    Heuristic,
}

/// Mutable per-session interview state.
///
/// Owned exclusively by the session manager; every mutation happens
/// under the session lock inside the turn commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub candidate_id: String,
    pub scenario_id: String,
    pub role_profile_id: String,
    /// `None` once the interview has ended
    pub current_node_id: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub block_scores: HashMap<String, f64>,
    pub overall_score: f64,
    pub red_flags: Vec<String>,
    /// Strictly increasing, gap-free turn counter
    pub turn_seq: u64,
    /// Set once a critical block scored at or below the critical-fail
    /// threshold; the interview is terminal from then on
    pub critical_fail: bool,
    /// Set when a critical block scored below pass (but above the
    /// critical-fail floor); biases the selector toward equivalence
    #[serde(default)]
    pub critical_block_failed: bool,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        candidate_id: impl Into<String>,
        scenario_id: impl Into<String>,
        role_profile_id: impl Into<String>,
        start_node_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            candidate_id: candidate_id.into(),
            scenario_id: scenario_id.into(),
            role_profile_id: role_profile_id.into(),
            current_node_id: Some(start_node_id.into()),
            history: Vec::new(),
            block_scores: HashMap::new(),
            overall_score: 0.0,
            red_flags: Vec::new(),
            turn_seq: 0,
            critical_fail: false,
            critical_block_failed: false,
        }
    }

    /// Whether the interview has reached a terminal state.
    pub fn is_ended(&self) -> bool {
        self.current_node_id.is_none() || self.critical_fail
    }
}

/// The completed result of one turn, published as the `turn_complete`
/// event and returned from `POST /turn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_seq: u64,
    pub reply: String,
    pub next_node_id: Option<String>,
    pub scoring_update: ScoringUpdate,
    pub red_flags: Vec<String>,
    pub source: ReplySource,
    pub timings: TurnTimings,
}

/// Append-only record of a completed turn, kept by the metrics recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_seq: u64,
    pub session_id: String,
    pub node_id: String,
    pub transcript: String,
    pub backchannel_text: Option<String>,
    pub reply_text: String,
    pub next_node_id: Option<String>,
    pub scoring_update: ScoringUpdate,
    pub red_flags: Vec<String>,
    pub source: ReplySource,
    pub timings: TurnTimings,
    pub timestamp: DateTime<Utc>,
}

/// Events published on a session's bus and relayed over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Short filler utterance emitted early in a turn
    Backchannel { turn_seq: u64, text: String },
    /// The substantive reply with the committed score update
    TurnComplete(TurnOutcome),
    /// The session was closed, either explicitly or by idle eviction
    SessionEnded { session_id: String },
}

impl SessionEvent {
    /// SSE event name for this variant.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::Backchannel { .. } => "backchannel",
            SessionEvent::TurnComplete(_) => "turn_complete",
            SessionEvent::SessionEnded { .. } => "session_ended",
        }
    }
}
