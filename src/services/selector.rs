//! Node Selector
//!
//! Decides the next scenario node from the current node, the answer
//! score, and the role profile. This is the only place a node
//! transition can originate; the orchestrator never invents one.

use serde::{Deserialize, Serialize};

use crate::models::profile::RoleProfile;
use crate::models::scenario::{Node, ScenarioPolicy};

/// Which edge the selector followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Pass,
    Fail,
    Equivalent,
}

/// A selector decision: the chosen edge and its target.
/// A `None` target ends the interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub edge: EdgeKind,
    pub next_node_id: Option<String>,
}

/// Pick the next node.
///
/// Precedence:
/// 1. the equivalence edge, when present, the block is non-critical, and
///    the score clears the profile's `equivalent` threshold;
/// 2. the pass edge at or above the drill threshold (role profile wins
///    over the scenario policy default);
/// 3. the fail edge otherwise.
///
/// When both pass and equivalence qualify, pass wins unless a
/// critical-block fail was previously recorded.
pub fn next_node(
    node: &Node,
    score: f64,
    profile: &RoleProfile,
    policy: &ScenarioPolicy,
    critical_fail_recorded: bool,
) -> Transition {
    let drill = profile.drill_threshold(policy.drill_threshold);

    let equivalent_ok = node.next_if_equivalent.is_some()
        && !profile.is_critical(&node.category)
        && score >= profile.thresholds.equivalent;
    let pass_ok = score >= drill;

    let (edge, target) = if equivalent_ok && pass_ok {
        if critical_fail_recorded {
            (EdgeKind::Equivalent, node.next_if_equivalent.clone())
        } else {
            (EdgeKind::Pass, node.next_if_pass.clone())
        }
    } else if equivalent_ok {
        (EdgeKind::Equivalent, node.next_if_equivalent.clone())
    } else if pass_ok {
        (EdgeKind::Pass, node.next_if_pass.clone())
    } else {
        (EdgeKind::Fail, node.next_if_fail.clone())
    };

    Transition {
        edge,
        next_node_id: target,
    }
}
