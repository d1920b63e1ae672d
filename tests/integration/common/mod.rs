//! Shared test fixtures: a scripted LLM provider and a service harness
//! backed by temp directories.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use hireflow::services::llm::{ChatRequest, LlmError, LlmProvider, LlmResult};
use hireflow::{AppConfig, AppState, SlaConfig};

/// One scripted provider step.
pub enum Step {
    Reply(String),
    DelayedReply(Duration, String),
    Fail(LlmError),
}

/// LLM provider that plays back a queue of steps. When the queue runs
/// dry it keeps returning the last step's clone-equivalent.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::from(steps)),
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    fn supports_schema(&self) -> bool {
        true
    }

    async fn complete(&self, _request: ChatRequest<'_>) -> LlmResult<String> {
        *self.calls.lock().unwrap() += 1;
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(text),
            Some(Step::DelayedReply(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(Step::Fail(e)) => Err(e),
            None => Err(LlmError::Network("script exhausted".to_string())),
        }
    }
}

/// A valid LLM reply for the python scenario's intro node.
pub fn valid_llm_reply(score: f64) -> String {
    serde_json::json!({
        "reply": "Хорошо, расскажите про асинхронность.",
        "next_node_id": if score >= 0.7 { "python_l3_advanced" } else { "python_l2_basics" },
        "scoring_update": {"block": "python_backend", "delta": score, "score": score},
        "red_flags": []
    })
    .to_string()
}

const PROFILES_YAML: &str = r#"
profiles:
  python_backend:
    block_weights:
      python_backend: 1.0
    drill_threshold: 0.7
    scenario_id: python_backend
  it_dc_ops:
    block_weights:
      hardware: 0.35
      sysadmin: 0.35
      network: 0.3
    drill_threshold: 0.75
    equivalent_threshold: 0.6
    scenario_id: it_dc_ops
"#;

const BACKCHANNEL_YAML: &str = r#"
common:
  generic_positive:
    - "Понимаю."
    - "Отлично, продолжайте."
  generic_neutral:
    - "Уточните, пожалуйста."
    - "Так, слушаю."
  generic_negative:
    - "Понял, но нужны детали."
selection:
  positive_threshold: 0.7
  negative_threshold: 0.3
"#;

const PYTHON_SCENARIO: &str = include_str!("../../../data/scenarios/python_backend.json");
const IT_DC_OPS_SCENARIO: &str = include_str!("../../../data/scenarios/it_dc_ops.json");

/// Full service state over temp storage, with seeded scenarios.
pub struct Harness {
    pub state: AppState,
    _tmp: TempDir,
}

pub fn harness(provider: Arc<dyn LlmProvider>) -> Harness {
    harness_with(provider, SlaConfig::default(), 2000)
}

pub fn harness_with(
    provider: Arc<dyn LlmProvider>,
    sla: SlaConfig,
    backchannel_min_interval_ms: u64,
) -> Harness {
    let tmp = TempDir::new().unwrap();
    let profile_path = tmp.path().join("role_profiles.yaml");
    let backchannel_path = tmp.path().join("backchannel.yaml");
    std::fs::write(&profile_path, PROFILES_YAML).unwrap();
    std::fs::write(&backchannel_path, BACKCHANNEL_YAML).unwrap();

    let config = AppConfig {
        scenario_dir: tmp.path().join("scenarios"),
        profile_path,
        backchannel_path,
        sla,
        backchannel_min_interval_ms,
        ..AppConfig::default()
    };

    let state = AppState::with_provider(config, provider).unwrap();
    state
        .scenarios
        .load(serde_json::from_str(PYTHON_SCENARIO).unwrap())
        .unwrap();
    state
        .scenarios
        .load(serde_json::from_str(IT_DC_OPS_SCENARIO).unwrap())
        .unwrap();

    Harness { state, _tmp: tmp }
}
