//! Role Profile Model
//!
//! A role profile maps competence blocks to weights and carries the
//! scoring thresholds for a vacancy. Profiles are read-only after startup.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Scoring thresholds for a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum block score considered passing
    #[serde(default = "default_pass")]
    pub pass: f64,
    /// Score at or above which the interviewer drills deeper.
    /// When absent, the scenario's `policy.drill_threshold` applies.
    #[serde(default)]
    pub drill: Option<f64>,
    /// Minimum score for taking an equivalence edge
    #[serde(default = "default_equivalent")]
    pub equivalent: f64,
    /// Score at or below which a critical block ends the interview
    #[serde(default = "default_critical_fail")]
    pub critical_fail: f64,
}

fn default_pass() -> f64 {
    0.7
}

fn default_equivalent() -> f64 {
    0.6
}

fn default_critical_fail() -> f64 {
    0.3
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pass: default_pass(),
            drill: None,
            equivalent: default_equivalent(),
            critical_fail: default_critical_fail(),
        }
    }
}

/// A vacancy's scoring profile: block weights plus thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub id: String,
    /// Block name -> importance weight; normalized to sum 1.0 on load
    #[serde(default)]
    pub block_weights: HashMap<String, f64>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Preferred scenario for this role, if any
    #[serde(default)]
    pub scenario_id: Option<String>,
    /// Blocks whose failure cannot be compensated by equivalence
    #[serde(default)]
    pub critical_blocks: HashSet<String>,
}

impl RoleProfile {
    /// The catch-all profile used when a role id is unknown.
    pub fn fallback() -> Self {
        Self {
            id: "default".to_string(),
            block_weights: HashMap::new(),
            thresholds: Thresholds::default(),
            scenario_id: None,
            critical_blocks: HashSet::new(),
        }
    }

    /// Scale `block_weights` so they sum to 1.0. A profile with no
    /// weights is left untouched.
    pub fn normalize_weights(&mut self) {
        let total: f64 = self.block_weights.values().sum();
        if total > 0.0 {
            for w in self.block_weights.values_mut() {
                *w /= total;
            }
        }
    }

    /// Whether `block` is critical for this role.
    pub fn is_critical(&self, block: &str) -> bool {
        self.critical_blocks.contains(block)
    }

    /// Drill threshold with the scenario policy default applied.
    pub fn drill_threshold(&self, policy_default: f64) -> f64 {
        self.thresholds.drill.unwrap_or(policy_default)
    }
}
