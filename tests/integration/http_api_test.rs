//! HTTP API Tests
//!
//! The axum surface end to end: session lifecycle, turn submission,
//! scenario CRUD with validation errors, score aggregation, and health.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use hireflow::server;

use crate::common::{harness, valid_llm_reply, ScriptedProvider, Step};

async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(json_body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_counts() {
    let provider = ScriptedProvider::new(vec![]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let (status, body) = request(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scenario_count"], 2);
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let provider = ScriptedProvider::new(vec![Step::Reply(valid_llm_reply(0.8))]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let (status, started) = request(
        app.clone(),
        "POST",
        "/session/start",
        Some(json!({"candidate_id": "cand-http", "role_profile_id": "python_backend"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["start_node_id"], "python_l1_intro");
    let session_id = started["session_id"].as_str().unwrap().to_string();

    // Duplicate start conflicts
    let (status, body) = request(
        app.clone(),
        "POST",
        "/session/start",
        Some(json!({"candidate_id": "cand-http", "role_profile_id": "python_backend"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, outcome) = request(
        app.clone(),
        "POST",
        "/turn",
        Some(json!({
            "session_id": session_id,
            "transcript": "Работал с Python 5 лет, опыт больших проектов, микросервисы."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["turn_seq"], 1);
    assert_eq!(outcome["source"], "llm");
    assert_eq!(outcome["next_node_id"], "python_l3_advanced");

    let (status, body) = request(
        app.clone(),
        "POST",
        "/session/end",
        Some(json!({"session_id": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    // The session is gone afterwards
    let (status, _) = request(
        app,
        "POST",
        "/turn",
        Some(json!({"session_id": session_id, "transcript": "ещё"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn turn_for_unknown_session_is_404() {
    let provider = ScriptedProvider::new(vec![]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let (status, body) = request(
        app,
        "POST",
        "/turn",
        Some(json!({"session_id": "ghost", "transcript": "привет"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn scenario_endpoints_validate_and_round_trip() {
    let provider = ScriptedProvider::new(vec![]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let scenario = json!({
        "id": "golang_backend",
        "schema_version": "0.1",
        "policy": {"drill_threshold": 0.7},
        "start_id": "go_l1",
        "nodes": [
            {
                "id": "go_l1",
                "category": "golang_backend",
                "order": 1,
                "question": "Расскажите про опыт с Go",
                "weight": 1.0,
                "success_criteria": ["go", "опыт"],
                "next_if_pass": null,
                "next_if_fail": null
            }
        ]
    });

    let (status, body) = request(app.clone(), "POST", "/scenario", Some(scenario.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, fetched) = request(app.clone(), "GET", "/scenario/golang_backend", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["start_id"], "go_l1");
    assert_eq!(fetched["nodes"][0]["category"], "golang_backend");

    let (status, listing) = request(app.clone(), "GET", "/scenarios", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 3);

    // Unresolvable edge is rejected with a reason
    let mut broken = scenario;
    broken["id"] = json!("broken");
    broken["nodes"][0]["next_if_pass"] = json!("ghost");
    let (status, body) = request(app.clone(), "POST", "/scenario", Some(broken)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("ghost"));

    let (status, _) = request(app, "GET", "/scenario/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn score_aggregate_matches_bars_math() {
    let provider = ScriptedProvider::new(vec![]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let body = json!({
        "answers": [
            {"question_id": "q1", "block": "python", "score": 1.0, "weight": 0.5},
            {"question_id": "q2", "block": "python", "score": 0.3, "weight": 0.5},
            {"question_id": "q3", "block": "devops", "score": 0.7, "weight": 1.0}
        ],
        "block_weights": {"python": 0.6, "devops": 0.4}
    });

    let (status, result) = request(app.clone(), "POST", "/score/aggregate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!((result["block_scores"]["python"].as_f64().unwrap() - 0.65).abs() < 1e-9);
    assert!((result["block_scores"]["devops"].as_f64().unwrap() - 0.7).abs() < 1e-9);
    let overall = result["overall"].as_f64().unwrap();
    assert!((overall - 0.67).abs() < 1e-9);
    assert_eq!(result["overall_percentage"].as_f64().unwrap(), 67.0);
    assert_eq!(result["analysis"]["strengths"][0], "devops");

    // Out-of-range weight is a 400
    let bad = json!({
        "answers": [{"question_id": "q1", "block": "python", "score": 2.0, "weight": 0.5}],
        "block_weights": {"python": 1.0}
    });
    let (status, body) = request(app, "POST", "/score/aggregate", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn metrics_summary_endpoint_works() {
    let provider = ScriptedProvider::new(vec![]);
    let h = harness(provider);
    let app = server::router(h.state.clone());

    let (status, body) = request(app, "GET", "/metrics/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["turns"], 0);
}
