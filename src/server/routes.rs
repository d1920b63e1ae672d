//! HTTP route handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::models::scenario::Scenario;
use crate::models::scoring::QAnswer;
use crate::models::session::TurnOutcome;
use crate::services::scoring;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

use super::sse;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/turn", post(submit_turn))
        .route("/session/start", post(start_session))
        .route("/session/end", post(end_session))
        .route("/session/{id}/events", get(sse::events_handler))
        .route("/scenario", post(load_scenario))
        .route("/scenario/{id}", get(get_scenario))
        .route("/scenarios", get(list_scenarios))
        .route("/score/aggregate", post(score_aggregate))
        .route("/health", get(health))
        .route("/metrics/summary", get(metrics_summary))
}

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    candidate_id: String,
    role_profile_id: String,
    #[serde(default)]
    scenario_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartSessionResponse {
    session_id: String,
    start_node_id: String,
}

/// POST /session/start - create a session at the scenario's start node.
async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> AppResult<Json<StartSessionResponse>> {
    if request.candidate_id.is_empty() || request.role_profile_id.is_empty() {
        return Err(AppError::invalid_input(
            "candidate_id and role_profile_id are required",
        ));
    }

    let profile = state.profiles.get(&request.role_profile_id);
    let scenario_id = request
        .scenario_id
        .or_else(|| profile.scenario_id.clone())
        .unwrap_or_else(|| request.role_profile_id.clone());
    let scenario = state.scenarios.get_or_fallback(&scenario_id);

    let handle = state
        .sessions
        .begin(&request.candidate_id, &request.role_profile_id, &scenario)?;

    Ok(Json(StartSessionResponse {
        session_id: handle.id.clone(),
        start_node_id: scenario.start_id.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct TurnRequest {
    session_id: String,
    transcript: String,
    /// Length of the last ASR partial, when the edge reported one
    #[serde(default)]
    partial_len: Option<usize>,
}

/// POST /turn - run one turn synchronously; the SSE stream sees the
/// same events as they happen.
async fn submit_turn(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> AppResult<Json<TurnOutcome>> {
    let session = state.sessions.get(&request.session_id)?;
    let outcome = state
        .orchestrator
        .run_turn(session, request.transcript, request.partial_len)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct EndSessionRequest {
    session_id: String,
}

/// POST /session/end - close a session explicitly.
async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<EndSessionRequest>,
) -> AppResult<Json<Value>> {
    state.sessions.end(&request.session_id)?;
    Ok(Json(json!({"ok": true})))
}

/// POST /scenario - validate and persist a scenario.
async fn load_scenario(
    State(state): State<AppState>,
    Json(scenario): Json<Scenario>,
) -> AppResult<Json<Value>> {
    let id = scenario.id.clone();
    let node_count = scenario.nodes.len();
    state.scenarios.load(scenario)?;
    info!(id = %id, node_count, "scenario stored");
    Ok(Json(json!({"ok": true, "id": id, "nodes_count": node_count})))
}

/// GET /scenario/{id} - fetch a stored scenario.
async fn get_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Scenario>> {
    state
        .scenarios
        .get(&id)
        .map(|s| Json(s.as_ref().clone()))
        .ok_or_else(|| AppError::not_found(format!("scenario {id}")))
}

/// GET /scenarios - list stored scenario ids with metadata.
async fn list_scenarios(State(state): State<AppState>) -> Json<Value> {
    let scenarios = state.scenarios.list();
    Json(json!({
        "total": scenarios.len(),
        "scenarios": scenarios,
    }))
}

#[derive(Debug, Deserialize)]
struct AggregateRequest {
    answers: Vec<QAnswer>,
    block_weights: HashMap<String, f64>,
}

/// POST /score/aggregate - BARS aggregation over a set of answers.
async fn score_aggregate(
    Json(request): Json<AggregateRequest>,
) -> AppResult<Json<Value>> {
    for answer in &request.answers {
        if !(0.0..=1.0).contains(&answer.score) || !(0.0..=1.0).contains(&answer.weight) {
            return Err(AppError::invalid_input(format!(
                "answer {} has score or weight outside [0, 1]",
                answer.question_id
            )));
        }
    }

    let analysis = scoring::analyze_performance(&request.answers, &request.block_weights);
    Ok(Json(json!({
        "block_scores": analysis.block_scores,
        "overall": analysis.overall_score,
        "overall_percentage": (analysis.overall_score * 1000.0).round() / 10.0,
        "analysis": {
            "overall_level": analysis.overall_level,
            "strengths": analysis.strengths,
            "weaknesses": analysis.weaknesses,
            "block_analysis": analysis.block_analysis,
        },
    })))
}

/// GET /health - liveness plus a few load indicators.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "scenario_count": state.scenarios.count(),
        "active_sessions": state.sessions.active_count(),
    }))
}

/// GET /metrics/summary - percentile and SLA compliance snapshot.
async fn metrics_summary(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.metrics.summary()).unwrap_or_else(|_| json!({})))
}
