//! Scenario Model
//!
//! An interview scenario is a graph of question nodes connected by
//! pass/fail/equivalence edges. Scenarios are immutable once loaded;
//! reloading replaces the stored snapshot atomically.

use serde::{Deserialize, Serialize};

/// Schema version accepted by the store.
pub const SCHEMA_VERSION: &str = "0.1";

/// Scenario-level policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPolicy {
    /// Score at or above which the interviewer advances to a deeper
    /// question instead of a remedial one. Role profiles may override.
    #[serde(default = "default_drill_threshold")]
    pub drill_threshold: f64,
}

fn default_drill_threshold() -> f64 {
    0.7
}

impl Default for ScenarioPolicy {
    fn default() -> Self {
        Self {
            drill_threshold: default_drill_threshold(),
        }
    }
}

/// A single question node with its criteria, weight, and outgoing edges.
///
/// Edges are node ids, resolved through the scenario; `None` ends the
/// interview. A node never transitions directly to itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Competence block this question scores into
    pub category: String,
    /// Display ordering within the scenario
    pub order: i32,
    pub question: String,
    /// Question importance within its block, in [0, 1]
    pub weight: f64,
    /// Keywords a good answer is expected to cover
    #[serde(default)]
    pub success_criteria: Vec<String>,
    /// Optional clarifying follow-up prompts
    #[serde(default)]
    pub followups: Vec<String>,
    #[serde(default)]
    pub next_if_pass: Option<String>,
    #[serde(default)]
    pub next_if_fail: Option<String>,
    /// Alternative edge taken when a weak area is compensated by a
    /// related strong one
    #[serde(default)]
    pub next_if_equivalent: Option<String>,
}

impl Node {
    /// All outgoing edges that are set.
    pub fn edges(&self) -> impl Iterator<Item = &str> {
        self.next_if_pass
            .iter()
            .chain(self.next_if_fail.iter())
            .chain(self.next_if_equivalent.iter())
            .map(|s| s.as_str())
    }

    /// A node with no outgoing edges ends the interview on any outcome.
    pub fn is_terminal(&self) -> bool {
        self.next_if_pass.is_none()
            && self.next_if_fail.is_none()
            && self.next_if_equivalent.is_none()
    }
}

/// A validated interview scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub policy: ScenarioPolicy,
    pub start_id: String,
    pub nodes: Vec<Node>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Scenario {
    /// Look up a node by id.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The node the interview starts at.
    pub fn start_node(&self) -> Option<&Node> {
        self.node(&self.start_id)
    }
}
