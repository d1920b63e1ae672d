//! Turn Orchestrator
//!
//! The per-turn pipeline: acquire the session's turn slot, fork the
//! backchannel and retrieval lookups, race the LLM against its deadline
//! with the heuristic floor always computed, resolve through the
//! selector, and commit under the session lock. A turn superseded by a
//! newer one aborts without touching session state.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SlaConfig;
use crate::models::profile::RoleProfile;
use crate::models::scenario::{Node, Scenario};
use crate::models::scoring::{AnswerScore, QAnswer};
use crate::models::session::{
    HistoryEntry, ReplySource, ScoringUpdate, SessionEvent, TurnOutcome, TurnRecord, TurnTimings,
};
use crate::services::backchannel::{BackchannelEngine, BackchannelSignal};
use crate::services::llm::{generate_reply, LlmProvider, LlmTurn, TurnPrompt};
use crate::services::metrics::{MetricsRecorder, Stage};
use crate::services::profiles::RoleProfileStore;
use crate::services::retrieval::{format_context, RetrievalClient};
use crate::services::scenario::ScenarioStore;
use crate::services::scoring;
use crate::services::selector;
use crate::services::session::SessionHandle;
use crate::utils::error::{AppError, AppResult};

const FLAG_EMPTY_ANSWER: &str = "empty_answer";
const FLAG_LOW_CONFIDENCE: &str = "low_confidence";
const FLAG_VERY_SHORT: &str = "very_short_response";
const FLAG_CRITICAL_FAIL: &str = "critical_fail";

/// Composes the per-turn collaborators into one cancellable pipeline.
pub struct TurnOrchestrator {
    scenarios: Arc<ScenarioStore>,
    profiles: Arc<RoleProfileStore>,
    backchannel: Arc<BackchannelEngine>,
    retrieval: Arc<RetrievalClient>,
    llm: Arc<dyn LlmProvider>,
    metrics: Arc<MetricsRecorder>,
    sla: SlaConfig,
}

/// Snapshot taken under the session lock when the turn slot is
/// acquired. Nothing is mutated until commit, so a cancelled turn
/// leaves the session exactly as it found it.
struct TurnSlot {
    seq: u64,
    node_id: String,
    scores: std::collections::HashMap<String, f64>,
    critical_block_failed: bool,
    role_profile_id: String,
    scenario_id: String,
}

struct Resolution {
    reply: String,
    score: f64,
    next_node_id: Option<String>,
    red_flags: Vec<String>,
    source: ReplySource,
}

impl TurnOrchestrator {
    pub fn new(
        scenarios: Arc<ScenarioStore>,
        profiles: Arc<RoleProfileStore>,
        backchannel: Arc<BackchannelEngine>,
        retrieval: Arc<RetrievalClient>,
        llm: Arc<dyn LlmProvider>,
        metrics: Arc<MetricsRecorder>,
        sla: SlaConfig,
    ) -> Self {
        Self {
            scenarios,
            profiles,
            backchannel,
            retrieval,
            llm,
            metrics,
            sla,
        }
    }

    /// Run one turn end to end. Returns the committed outcome, or
    /// `Cancelled` when a newer turn superseded this one.
    pub async fn run_turn(
        &self,
        session: Arc<SessionHandle>,
        transcript: String,
        partial_len: Option<usize>,
    ) -> AppResult<TurnOutcome> {
        // Newest-wins: cancel whatever is in flight, then wait for the
        // slot. The superseded turn observes its token and releases.
        let token = session.supersede();
        let _guard = tokio::select! {
            _ = token.cancelled() => return Err(AppError::Cancelled),
            guard = session.turn_lock.lock() => guard,
        };
        let t0 = Instant::now();
        session.touch();

        let slot = self.acquire_slot(&session).await?;
        let scenario = self.scenarios.get_or_fallback(&slot.scenario_id);
        let node = scenario
            .node(&slot.node_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("node {}", slot.node_id)))?;
        let profile = self.profiles.get(&slot.role_profile_id);

        // Backchannel fork: silent on failure, hard deadline from t0.
        let backchannel_task = self.fork_backchannel(
            session.clone(),
            slot.seq,
            slot.role_profile_id.clone(),
            partial_len.unwrap_or_else(|| transcript.chars().count()),
            token.clone(),
        );

        // Context fetch fork; the client enforces its own timeout.
        let retrieval_task = self.fork_retrieval(&node, token.clone());

        // Heuristic floor: pure CPU, always computed.
        let heuristic = scoring::score_answer(&transcript, &node.success_criteria);

        let cv_context = retrieval_task.await.ok().flatten();
        let llm_deadline = t0 + self.sla.llm_budget();
        let llm_started = Instant::now();
        let llm_result = if transcript.trim().is_empty() {
            // An empty answer is scored deterministically; no model call.
            None
        } else {
            match generate_reply(
                self.llm.as_ref(),
                TurnPrompt {
                    scenario: &scenario,
                    node: &node,
                    transcript: &transcript,
                    scores: &slot.scores,
                    profile: &profile,
                    cv_context: cv_context.as_deref(),
                },
                llm_deadline,
                &token,
            )
            .await
            {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "LLM path failed, using heuristic floor");
                    self.metrics.record_latency(
                        Stage::Llm,
                        llm_started.elapsed().as_millis() as u64,
                        false,
                    );
                    None
                }
            }
        };
        let llm_ms = llm_started.elapsed().as_millis() as u64;

        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let resolution =
            self.resolve(&scenario, &node, &profile, &slot, &transcript, &heuristic, llm_result, &session);

        let backchannel_text = backchannel_task.await.ok().flatten();

        let total_ms = t0.elapsed().as_millis() as u64;
        let timings = TurnTimings {
            asr_ms: 0,
            dm_ms: total_ms.saturating_sub(llm_ms),
            llm_ms,
            tts_ms: 0,
            total_ms,
        };

        let outcome = self
            .commit(
                &session,
                &slot,
                &scenario,
                &node,
                &profile,
                &transcript,
                backchannel_text,
                resolution,
                timings,
                &token,
            )
            .await?;

        // E2 goes out while the turn slot is still held, so turn N+1
        // cannot emit anything before it.
        session.emit(SessionEvent::TurnComplete(outcome.clone()));
        Ok(outcome)
    }

    /// Snapshot the session under its lock.
    async fn acquire_slot(&self, session: &SessionHandle) -> AppResult<TurnSlot> {
        let state = session.state.lock().await;
        if state.is_ended() {
            return Err(AppError::conflict(format!(
                "interview {} already ended",
                state.session_id
            )));
        }
        Ok(TurnSlot {
            seq: state.turn_seq + 1,
            node_id: state.current_node_id.clone().expect("checked by is_ended"),
            scores: state.block_scores.clone(),
            critical_block_failed: state.critical_block_failed,
            role_profile_id: state.role_profile_id.clone(),
            scenario_id: state.scenario_id.clone(),
        })
    }

    /// Spawn the backchannel pick with its own deadline. Emits E1 and
    /// returns the text for the turn record.
    fn fork_backchannel(
        &self,
        session: Arc<SessionHandle>,
        seq: u64,
        role_id: String,
        partial_len: usize,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<Option<String>> {
        let engine = self.backchannel.clone();
        let metrics = self.metrics.clone();
        let deadline = std::time::Duration::from_millis(self.sla.backchannel_ms);

        tokio::spawn(async move {
            let work = async {
                let started = Instant::now();
                let counter = session.backchannel_counter.load(Ordering::Relaxed);
                let picked = engine.pick(
                    Some(role_id.as_str()),
                    BackchannelSignal::PartialLen(partial_len),
                    counter,
                    session.last_backchannel(),
                    std::time::Instant::now(),
                );

                if let Some(text) = &picked {
                    session.note_backchannel(std::time::Instant::now());
                    session.emit(SessionEvent::Backchannel {
                        turn_seq: seq,
                        text: text.clone(),
                    });
                    metrics.record_latency(
                        Stage::Backchannel,
                        started.elapsed().as_millis() as u64,
                        true,
                    );
                }
                picked
            };

            tokio::select! {
                _ = token.cancelled() => None,
                result = tokio::time::timeout(deadline, work) => result.unwrap_or(None),
            }
        })
    }

    /// Spawn the resume-context lookup; errors and timeouts become `None`.
    fn fork_retrieval(
        &self,
        node: &Node,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<Option<String>> {
        let retrieval = self.retrieval.clone();
        let query = format!("{} {}", node.question, node.success_criteria.join(" "));

        tokio::spawn(async move {
            if !retrieval.is_enabled() {
                return None;
            }
            tokio::select! {
                _ = token.cancelled() => None,
                chunks = retrieval.search(&query, 0.5) => format_context(&chunks),
            }
        })
    }

    /// Resolution order: a validated LLM result wins; anything else is
    /// built from the heuristic score, the selector, and the role's
    /// reply templates. The committed transition always comes from the
    /// selector, applied to whichever score won.
    #[allow(clippy::too_many_arguments)]
    fn resolve(
        &self,
        scenario: &Scenario,
        node: &Node,
        profile: &RoleProfile,
        slot: &TurnSlot,
        transcript: &str,
        heuristic: &AnswerScore,
        llm_result: Option<LlmTurn>,
        session: &SessionHandle,
    ) -> Resolution {
        match llm_result {
            Some(llm) => {
                let score = llm.scoring_update.score;
                let transition = selector::next_node(
                    node,
                    score,
                    profile,
                    &scenario.policy,
                    slot.critical_block_failed,
                );
                if llm.next_node_id != transition.next_node_id {
                    debug!(
                        llm_next = ?llm.next_node_id,
                        selector_next = ?transition.next_node_id,
                        "selector overrides LLM transition"
                    );
                }
                Resolution {
                    reply: llm.reply,
                    score,
                    next_node_id: transition.next_node_id,
                    red_flags: llm.red_flags,
                    source: ReplySource::Llm,
                }
            }
            None => {
                let score = heuristic.score;
                let transition = selector::next_node(
                    node,
                    score,
                    profile,
                    &scenario.policy,
                    slot.critical_block_failed,
                );
                let counter = session.backchannel_counter.load(Ordering::Relaxed);
                let reply = self.backchannel.utterance(
                    Some(profile.id.as_str()),
                    BackchannelSignal::Score(score),
                    counter,
                );
                Resolution {
                    reply,
                    score,
                    next_node_id: transition.next_node_id,
                    red_flags: heuristic_red_flags(transcript, heuristic.confidence),
                    source: ReplySource::Heuristic,
                }
            }
        }
    }

    /// Apply the scoring update and transition atomically, then build
    /// the outcome. Nothing is written once the token has fired.
    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        session: &SessionHandle,
        slot: &TurnSlot,
        scenario: &Scenario,
        node: &Node,
        profile: &RoleProfile,
        transcript: &str,
        backchannel_text: Option<String>,
        resolution: Resolution,
        timings: TurnTimings,
        token: &CancellationToken,
    ) -> AppResult<TurnOutcome> {
        let mut state = session.state.lock().await;
        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let old_block_score = state
            .block_scores
            .get(&node.category)
            .copied()
            .unwrap_or(0.0);

        state.turn_seq = slot.seq;
        state.history.push(HistoryEntry {
            node_id: node.id.clone(),
            transcript: transcript.to_string(),
            score: resolution.score,
            block: node.category.clone(),
            timestamp: Utc::now(),
        });

        // Recompute the block aggregate from the full history so the
        // weighted mean stays order-invariant.
        let answers: Vec<QAnswer> = state
            .history
            .iter()
            .map(|h| QAnswer {
                question_id: h.node_id.clone(),
                block: h.block.clone(),
                score: h.score,
                weight: scenario.node(&h.node_id).map(|n| n.weight).unwrap_or(1.0),
            })
            .collect();
        let new_block_score = scoring::score_block(&answers, &node.category);
        state
            .block_scores
            .insert(node.category.clone(), new_block_score);
        state.overall_score = scoring::score_overall(&state.block_scores, &profile.block_weights);

        let mut red_flags = resolution.red_flags;
        if profile.is_critical(&node.category) {
            if resolution.score <= profile.thresholds.critical_fail {
                state.critical_fail = true;
                red_flags.push(FLAG_CRITICAL_FAIL.to_string());
                info!(session_id = %session.id, block = %node.category, "critical block failed hard, ending interview");
            } else if resolution.score < profile.thresholds.pass {
                state.critical_block_failed = true;
            }
        }
        for flag in &red_flags {
            if !state.red_flags.contains(flag) {
                state.red_flags.push(flag.clone());
            }
        }

        state.current_node_id = resolution.next_node_id.clone();

        let scoring_update = ScoringUpdate {
            block: node.category.clone(),
            delta: new_block_score - old_block_score,
            score: resolution.score,
        };

        let outcome = TurnOutcome {
            turn_seq: slot.seq,
            reply: resolution.reply,
            next_node_id: resolution.next_node_id,
            scoring_update: scoring_update.clone(),
            red_flags: red_flags.clone(),
            source: resolution.source,
            timings,
        };

        self.metrics.record_turn(TurnRecord {
            turn_seq: slot.seq,
            session_id: session.id.clone(),
            node_id: node.id.clone(),
            transcript: transcript.to_string(),
            backchannel_text,
            reply_text: outcome.reply.clone(),
            next_node_id: outcome.next_node_id.clone(),
            scoring_update,
            red_flags,
            source: resolution.source,
            timings,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }
}

/// Red flags for the heuristic path.
fn heuristic_red_flags(transcript: &str, confidence: f64) -> Vec<String> {
    let trimmed = transcript.trim();
    let mut flags = Vec::new();

    if trimmed.is_empty() {
        flags.push(FLAG_EMPTY_ANSWER.to_string());
    } else if trimmed.chars().count() < 10 {
        flags.push(FLAG_VERY_SHORT.to_string());
    }
    if confidence < 0.4 || trimmed.to_lowercase().contains("не уверен") {
        flags.push(FLAG_LOW_CONFIDENCE.to_string());
    }
    flags
}
