//! Turn Pipeline Tests
//!
//! End-to-end turns through the orchestrator with a scripted LLM:
//! pass/fail/equivalence branching, heuristic fallback under failures
//! and deadlines, newest-wins cancellation, and E1/E2 event ordering.

use std::time::Duration;

use hireflow::models::session::{ReplySource, SessionEvent};
use hireflow::services::llm::LlmError;
use hireflow::SlaConfig;

use crate::common::{harness, harness_with, valid_llm_reply, ScriptedProvider, Step};

const S1_TRANSCRIPT: &str =
    "Работал с Python 5 лет, опыт больших проектов, микросервисы и асинхронность.";

#[tokio::test]
async fn happy_pass_with_llm_reply() {
    let provider = ScriptedProvider::new(vec![Step::Reply(valid_llm_reply(0.8))]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-1", "python_backend", &scenario)
        .unwrap();

    let outcome = h
        .state
        .orchestrator
        .run_turn(session.clone(), S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    assert_eq!(outcome.turn_seq, 1);
    assert_eq!(outcome.source, ReplySource::Llm);
    assert!(outcome.scoring_update.score >= 0.7);
    assert_eq!(outcome.scoring_update.block, "python_backend");
    assert_eq!(outcome.next_node_id.as_deref(), Some("python_l3_advanced"));

    let state = session.state.lock().await;
    assert_eq!(state.current_node_id.as_deref(), Some("python_l3_advanced"));
    assert!(state.block_scores["python_backend"] >= 0.7);
    assert_eq!(state.turn_seq, 1);
}

#[tokio::test]
async fn happy_pass_via_heuristic_after_llm_garbage() {
    // A 502 consumes the single retry; the retry returns garbage, so
    // the heuristic floor resolves the turn.
    let provider = ScriptedProvider::new(vec![
        Step::Fail(LlmError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        }),
        Step::Reply("sorry, no json today".to_string()),
    ]);
    let h = harness(provider.clone());

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-1", "python_backend", &scenario)
        .unwrap();

    let outcome = h
        .state
        .orchestrator
        .run_turn(session.clone(), S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 2);
    assert_eq!(outcome.source, ReplySource::Heuristic);
    assert!(outcome.scoring_update.score >= 0.7);
    assert_eq!(outcome.next_node_id.as_deref(), Some("python_l3_advanced"));

    let state = session.state.lock().await;
    assert!(state.block_scores["python_backend"] >= 0.7);
}

#[tokio::test]
async fn fail_path_takes_fail_edge_with_flags() {
    let provider = ScriptedProvider::new(vec![Step::Fail(LlmError::Parse("nope".to_string()))]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-2", "python_backend", &scenario)
        .unwrap();

    let outcome = h
        .state
        .orchestrator
        .run_turn(session.clone(), "не помню".to_string(), None)
        .await
        .unwrap();

    assert!(outcome.scoring_update.score <= 0.3);
    assert_eq!(outcome.next_node_id.as_deref(), Some("python_l2_basics"));
    assert!(outcome
        .red_flags
        .iter()
        .any(|f| f == "very_short_response" || f == "low_confidence"));
}

#[tokio::test]
async fn empty_transcript_scores_zero_without_llm_call() {
    let provider = ScriptedProvider::new(vec![Step::Reply(valid_llm_reply(0.9))]);
    let h = harness(provider.clone());

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-3", "python_backend", &scenario)
        .unwrap();

    let outcome = h
        .state
        .orchestrator
        .run_turn(session.clone(), "".to_string(), None)
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 0);
    assert_eq!(outcome.scoring_update.score, 0.0);
    assert_eq!(outcome.source, ReplySource::Heuristic);
    assert_eq!(outcome.next_node_id.as_deref(), Some("python_l2_basics"));
    assert!(outcome.red_flags.iter().any(|f| f == "empty_answer"));
}

#[tokio::test]
async fn equivalence_branch_compensates_weak_hardware() {
    // Two heuristic turns: pass the intro node, then answer the RAID
    // question with sysadmin experience only. The score lands between
    // the equivalent (0.6) and drill (0.75) thresholds, so the
    // equivalence edge fires.
    let provider = ScriptedProvider::new(vec![
        Step::Fail(LlmError::Parse("x".to_string())),
        Step::Fail(LlmError::Parse("x".to_string())),
    ]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("it_dc_ops").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-4", "it_dc_ops", &scenario)
        .unwrap();

    let first = h
        .state
        .orchestrator
        .run_turn(
            session.clone(),
            "Большой опыт: обслуживал серверы двух ЦОД, замена дисков и блоков питания, \
             диагностика и восстановление RAID, плановые работы по регламенту."
                .to_string(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(first.next_node_id.as_deref(), Some("hw_l2_raid_bmc"));

    let second = h
        .state
        .orchestrator
        .run_turn(
            session.clone(),
            "Я администрировал AD и GPO, разворачивал WDS для массовой установки рабочих станций."
                .to_string(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(second.next_node_id.as_deref(), Some("sys_l1_os_imaging"));
    let state = session.state.lock().await;
    assert_eq!(state.current_node_id.as_deref(), Some("sys_l1_os_imaging"));
}

#[tokio::test(start_paused = true)]
async fn llm_timeout_falls_back_to_heuristic_within_sla() {
    // Backend stalls for 6 s against a 5 s turn budget.
    let provider = ScriptedProvider::new(vec![Step::DelayedReply(
        Duration::from_secs(6),
        valid_llm_reply(0.9),
    )]);
    let h = harness_with(provider, SlaConfig::default(), 2000);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-5", "python_backend", &scenario)
        .unwrap();

    let outcome = h
        .state
        .orchestrator
        .run_turn(session, S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    assert_eq!(outcome.source, ReplySource::Heuristic);
    assert!(outcome.timings.total_ms <= 5000);
    // The heuristic still resolved the branch
    assert_eq!(outcome.next_node_id.as_deref(), Some("python_l3_advanced"));
}

#[tokio::test(start_paused = true)]
async fn newest_wins_cancels_in_flight_turn() {
    let provider = ScriptedProvider::new(vec![
        Step::DelayedReply(Duration::from_secs(30), valid_llm_reply(0.9)),
        Step::Reply(valid_llm_reply(0.8)),
    ]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-6", "python_backend", &scenario)
        .unwrap();

    let before = session.state.lock().await.clone();

    let orchestrator = h.state.orchestrator.clone();
    let slow_session = session.clone();
    let slow = tokio::spawn(async move {
        orchestrator
            .run_turn(slow_session, "первый вариант ответа".to_string(), None)
            .await
    });
    // Let the slow turn reach its LLM await
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast = h
        .state
        .orchestrator
        .run_turn(session.clone(), S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    let slow_result = slow.await.unwrap();
    assert!(matches!(
        slow_result,
        Err(hireflow::AppError::Cancelled)
    ));

    // Only the superseding turn committed
    assert_eq!(fast.turn_seq, before.turn_seq + 1);
    let state = session.state.lock().await;
    assert_eq!(state.turn_seq, before.turn_seq + 1);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].transcript, S1_TRANSCRIPT);
}

#[tokio::test(start_paused = true)]
async fn cancelled_turn_leaves_state_untouched() {
    let provider = ScriptedProvider::new(vec![Step::DelayedReply(
        Duration::from_secs(30),
        valid_llm_reply(0.9),
    )]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-7", "python_backend", &scenario)
        .unwrap();

    let before = serde_json::to_string(&*session.state.lock().await).unwrap();

    let orchestrator = h.state.orchestrator.clone();
    let turn_session = session.clone();
    let task = tokio::spawn(async move {
        orchestrator
            .run_turn(turn_session, "ответ".to_string(), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Supersede without running a replacement to completion
    session.supersede();
    let result = task.await.unwrap();
    assert!(matches!(result, Err(hireflow::AppError::Cancelled)));

    let after = serde_json::to_string(&*session.state.lock().await).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn backchannel_rate_limit_and_event_ordering() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(valid_llm_reply(0.8)),
        Step::Reply(serde_json::json!({
            "reply": "Понял.",
            "next_node_id": null,
            "scoring_update": {"block": "python_backend", "delta": 0.0, "score": 0.8},
            "red_flags": []
        })
        .to_string()),
    ]);
    let h = harness_with(provider, SlaConfig::default(), 2000);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-8", "python_backend", &scenario)
        .unwrap();
    let mut events = session.subscribe();

    let first = h
        .state
        .orchestrator
        .run_turn(session.clone(), S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    // Second turn lands well inside min_interval_ms
    let second = h
        .state
        .orchestrator
        .run_turn(session.clone(), "Профилирование через asyncio и оптимизация под нагрузкой".to_string(), None)
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    // Turn 1: E1 then E2; turn 2: E2 only (backchannel rate-limited)
    assert_eq!(received.len(), 3);
    match &received[0] {
        SessionEvent::Backchannel { turn_seq, text } => {
            assert_eq!(*turn_seq, first.turn_seq);
            assert!(!text.is_empty());
        }
        other => panic!("expected backchannel first, got {other:?}"),
    }
    match &received[1] {
        SessionEvent::TurnComplete(outcome) => assert_eq!(outcome.turn_seq, first.turn_seq),
        other => panic!("expected turn_complete, got {other:?}"),
    }
    match &received[2] {
        SessionEvent::TurnComplete(outcome) => assert_eq!(outcome.turn_seq, second.turn_seq),
        other => panic!("expected turn_complete, got {other:?}"),
    }
}

#[tokio::test]
async fn turn_seq_is_strictly_increasing_and_gap_free() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(valid_llm_reply(0.3)),
        Step::Fail(LlmError::Parse("x".to_string())),
        Step::Fail(LlmError::Parse("x".to_string())),
    ]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-9", "python_backend", &scenario)
        .unwrap();

    let mut seqs = Vec::new();
    for transcript in ["коротко", "gil генераторы контекст подробно", "asyncio"] {
        let outcome = h
            .state
            .orchestrator
            .run_turn(session.clone(), transcript.to_string(), None)
            .await
            .unwrap();
        seqs.push(outcome.turn_seq);
    }
    assert_eq!(seqs, vec![1, 2, 3]);

    let state = session.state.lock().await;
    assert!(state.current_node_id.is_none(), "chain should have ended");
    assert!(state.is_ended());
}

#[tokio::test]
async fn turn_against_ended_session_conflicts() {
    let provider = ScriptedProvider::new(vec![Step::Fail(LlmError::Parse("x".to_string()))]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-10", "python_backend", &scenario)
        .unwrap();
    session.state.lock().await.current_node_id = None;

    let result = h
        .state
        .orchestrator
        .run_turn(session, "ответ".to_string(), None)
        .await;
    assert!(matches!(result, Err(hireflow::AppError::Conflict(_))));
}

#[tokio::test]
async fn metrics_capture_turn_records() {
    let provider = ScriptedProvider::new(vec![Step::Reply(valid_llm_reply(0.8))]);
    let h = harness(provider);

    let scenario = h.state.scenarios.get("python_backend").unwrap();
    let session = h
        .state
        .sessions
        .begin("cand-11", "python_backend", &scenario)
        .unwrap();
    h.state
        .orchestrator
        .run_turn(session, S1_TRANSCRIPT.to_string(), None)
        .await
        .unwrap();

    let summary = h.state.metrics.summary();
    assert_eq!(summary.turns, 1);
    assert!(summary.sla_compliance["turn"] >= 1.0);
    assert!(summary.stages.contains_key("total"));
}
