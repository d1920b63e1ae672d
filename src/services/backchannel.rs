//! Backchannel Engine
//!
//! Picks short filler utterances ("I see", "go on") from per-role tone
//! tables so the candidate hears something while the substantive reply
//! is being prepared. Selection is deterministic round-robin keyed by
//! the session's backchannel counter, and rate-limited per session.
//!
//! The same tables supply the role-specific reply templates used when
//! the heuristic path produces the substantive reply.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{info, warn};

use crate::utils::error::{AppError, AppResult};

/// What the engine knows about the answer when picking a tone.
#[derive(Debug, Clone, Copy)]
pub enum BackchannelSignal {
    /// A score is already available (heuristic floor or prior block score)
    Score(f64),
    /// Only a partial transcript length; tone stays neutral
    PartialLen(usize),
}

/// Utterances for one role, partitioned by tone. The shared table uses
/// the `generic_*` spellings; per-role tables use the short ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToneSet {
    #[serde(default, alias = "generic_positive")]
    pub positive: Vec<String>,
    #[serde(default, alias = "generic_neutral")]
    pub neutral: Vec<String>,
    #[serde(default, alias = "generic_negative")]
    pub negative: Vec<String>,
}

impl ToneSet {
    fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.neutral.is_empty() && self.negative.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SelectionDoc {
    #[serde(default = "default_positive_threshold")]
    positive_threshold: f64,
    #[serde(default = "default_negative_threshold")]
    negative_threshold: f64,
}

fn default_positive_threshold() -> f64 {
    0.7
}

fn default_negative_threshold() -> f64 {
    0.3
}

impl Default for SelectionDoc {
    fn default() -> Self {
        Self {
            positive_threshold: default_positive_threshold(),
            negative_threshold: default_negative_threshold(),
        }
    }
}

/// On-disk shape: `common` tone set, per-role overrides, selection knobs.
#[derive(Debug, Deserialize)]
struct BackchannelFile {
    #[serde(default)]
    common: ToneSet,
    #[serde(default)]
    roles: HashMap<String, ToneSet>,
    #[serde(default)]
    selection: SelectionDoc,
}

/// Deterministic backchannel picker over configured tone tables.
pub struct BackchannelEngine {
    common: ToneSet,
    roles: HashMap<String, ToneSet>,
    positive_threshold: f64,
    negative_threshold: f64,
    min_interval: Duration,
}

impl BackchannelEngine {
    /// Load tables from a YAML file, falling back to built-in defaults
    /// when the file is absent.
    pub fn open(path: impl AsRef<Path>, min_interval: Duration) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "backchannel table missing, using built-in defaults");
            return Ok(Self::with_defaults(min_interval));
        }
        let contents = std::fs::read_to_string(path)?;
        let engine = Self::from_yaml(&contents, min_interval)?;
        info!(roles = engine.roles.len(), path = %path.display(), "backchannel tables loaded");
        Ok(engine)
    }

    /// Parse tables from a YAML document.
    pub fn from_yaml(contents: &str, min_interval: Duration) -> AppResult<Self> {
        let file: BackchannelFile = serde_yaml::from_str(contents)
            .map_err(|e| AppError::config(format!("backchannel table: {e}")))?;

        let mut engine = Self {
            common: file.common,
            roles: file.roles,
            positive_threshold: file.selection.positive_threshold,
            negative_threshold: file.selection.negative_threshold,
            min_interval,
        };
        if engine.common.is_empty() {
            engine.common = Self::default_common();
        }
        Ok(engine)
    }

    /// Engine with only the built-in generic table.
    pub fn with_defaults(min_interval: Duration) -> Self {
        Self {
            common: Self::default_common(),
            roles: HashMap::new(),
            positive_threshold: default_positive_threshold(),
            negative_threshold: default_negative_threshold(),
            min_interval,
        }
    }

    fn default_common() -> ToneSet {
        ToneSet {
            positive: vec![
                "Понимаю.".to_string(),
                "Отлично, продолжайте.".to_string(),
                "Хорошо.".to_string(),
            ],
            neutral: vec![
                "Уточните, пожалуйста.".to_string(),
                "Так, слушаю.".to_string(),
                "Продолжайте.".to_string(),
            ],
            negative: vec![
                "Понял, но нужны детали.".to_string(),
                "Расскажите подробнее.".to_string(),
            ],
        }
    }

    /// Pick an utterance, or `None` when rate-limited.
    ///
    /// `counter` is the session's backchannel counter; the same counter
    /// always yields the same utterance (round-robin within the tone).
    pub fn pick(
        &self,
        role: Option<&str>,
        signal: BackchannelSignal,
        counter: u64,
        last_emit: Option<Instant>,
        now: Instant,
    ) -> Option<String> {
        if let Some(last) = last_emit {
            if now.duration_since(last) < self.min_interval {
                return None;
            }
        }
        Some(self.utterance(role, signal, counter))
    }

    /// The utterance for a tone, ignoring the rate limit. Also serves as
    /// the heuristic path's reply template library.
    pub fn utterance(&self, role: Option<&str>, signal: BackchannelSignal, counter: u64) -> String {
        let score = match signal {
            BackchannelSignal::Score(s) => s,
            // Partial length alone is not evidence either way
            BackchannelSignal::PartialLen(_) => {
                (self.positive_threshold + self.negative_threshold) / 2.0
            }
        };

        let table = role.and_then(|r| self.roles.get(r)).unwrap_or(&self.common);
        let list = self.tone_list(table, score);
        let list = if list.is_empty() {
            self.tone_list(&self.common, score)
        } else {
            list
        };

        if list.is_empty() {
            return "Понимаю.".to_string();
        }
        list[(counter as usize) % list.len()].clone()
    }

    fn tone_list<'a>(&self, table: &'a ToneSet, score: f64) -> &'a [String] {
        if score >= self.positive_threshold {
            &table.positive
        } else if score <= self.negative_threshold {
            &table.negative
        } else {
            &table.neutral
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
