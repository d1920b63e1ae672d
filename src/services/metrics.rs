//! Metrics Recorder
//!
//! Latency counters per stage and per turn, kept in bounded in-memory
//! ring buffers. The summary endpoint reports counts, percentiles, and
//! SLA compliance against the configured budgets.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SlaConfig;
use crate::models::session::TurnRecord;

/// Pipeline stages with tracked latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Asr,
    Dm,
    Llm,
    Tts,
    Backchannel,
    Total,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Asr,
        Stage::Dm,
        Stage::Llm,
        Stage::Tts,
        Stage::Backchannel,
        Stage::Total,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Asr => "asr",
            Stage::Dm => "dm",
            Stage::Llm => "llm",
            Stage::Tts => "tts",
            Stage::Backchannel => "backchannel",
            Stage::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LatencySample {
    stage: Stage,
    ms: u64,
    ok: bool,
}

/// Percentile snapshot for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub count: usize,
    pub errors: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Snapshot returned from `GET /metrics/summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub turns: usize,
    pub stages: HashMap<String, StageSummary>,
    /// Fraction of turns meeting each budget, in [0, 1]
    pub sla_compliance: HashMap<String, f64>,
    pub window_start: Option<DateTime<Utc>>,
}

struct MetricsInner {
    samples: VecDeque<LatencySample>,
    turns: VecDeque<TurnRecord>,
}

/// Bounded, append-only recorder.
pub struct MetricsRecorder {
    inner: Mutex<MetricsInner>,
    targets: SlaConfig,
    capacity: usize,
}

impl MetricsRecorder {
    const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(targets: SlaConfig) -> Self {
        Self::with_capacity(targets, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(targets: SlaConfig, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MetricsInner {
                samples: VecDeque::with_capacity(capacity.min(1024)),
                turns: VecDeque::with_capacity(capacity.min(1024)),
            }),
            targets,
            capacity,
        }
    }

    /// Record one stage latency observation.
    pub fn record_latency(&self, stage: Stage, ms: u64, ok: bool) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        if inner.samples.len() == self.capacity {
            inner.samples.pop_front();
        }
        inner.samples.push_back(LatencySample { stage, ms, ok });
    }

    /// Record one completed turn.
    pub fn record_turn(&self, record: TurnRecord) {
        self.record_latency(Stage::Dm, record.timings.dm_ms, true);
        self.record_latency(Stage::Llm, record.timings.llm_ms, true);
        self.record_latency(Stage::Total, record.timings.total_ms, true);

        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        if inner.turns.len() == self.capacity {
            inner.turns.pop_front();
        }
        inner.turns.push_back(record);
    }

    /// Aggregate the current window.
    pub fn summary(&self) -> MetricsSummary {
        let inner = self.inner.lock().expect("metrics lock poisoned");

        let mut stages = HashMap::new();
        for stage in Stage::ALL {
            let mut values: Vec<u64> = inner
                .samples
                .iter()
                .filter(|s| s.stage == stage)
                .map(|s| s.ms)
                .collect();
            if values.is_empty() {
                continue;
            }
            values.sort_unstable();
            let errors = inner
                .samples
                .iter()
                .filter(|s| s.stage == stage && !s.ok)
                .count();
            stages.insert(
                stage.name().to_string(),
                StageSummary {
                    count: values.len(),
                    errors,
                    p50_ms: percentile(&values, 0.50),
                    p95_ms: percentile(&values, 0.95),
                    p99_ms: percentile(&values, 0.99),
                },
            );
        }

        let total_turns = inner.turns.len();
        let mut sla_compliance = HashMap::new();
        if total_turns > 0 {
            let turn_ok = inner
                .turns
                .iter()
                .filter(|t| t.timings.total_ms <= self.targets.turn_ms)
                .count();
            sla_compliance.insert(
                "turn".to_string(),
                turn_ok as f64 / total_turns as f64,
            );

        }

        let backchannel_samples: Vec<&LatencySample> = inner
            .samples
            .iter()
            .filter(|s| s.stage == Stage::Backchannel)
            .collect();
        if !backchannel_samples.is_empty() {
            let ok = backchannel_samples
                .iter()
                .filter(|s| s.ok && s.ms <= self.targets.backchannel_ms)
                .count();
            sla_compliance.insert(
                "backchannel".to_string(),
                ok as f64 / backchannel_samples.len() as f64,
            );
        }

        MetricsSummary {
            turns: total_turns,
            stages,
            sla_compliance,
            window_start: inner.turns.front().map(|t| t.timestamp),
        }
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
