//! Scenario Store
//!
//! Loads, validates, and persists interview scenarios. Readers take an
//! atomic snapshot of the whole map; writers validate, persist to disk
//! (temp file + rename), and swap the snapshot under a single mutex.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::scenario::{Node, Scenario, ScenarioPolicy, SCHEMA_VERSION};
use crate::utils::error::{AppError, AppResult};

type Snapshot = Arc<HashMap<String, Arc<Scenario>>>;

/// Listing entry for `GET /scenarios`.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub id: String,
    pub schema_version: String,
    pub node_count: usize,
    pub start_id: String,
}

/// Keyed store of validated scenarios with file-backed persistence.
pub struct ScenarioStore {
    dir: PathBuf,
    snapshot: RwLock<Snapshot>,
    /// Serializes persist-and-swap sequences; readers never take this
    write_lock: Mutex<()>,
}

impl ScenarioStore {
    /// Open the store, loading every `*.json` scenario under `dir`.
    /// Files that fail validation are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::storage(format!("cannot create {}: {e}", dir.display())))?;

        let mut map = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_scenario_file(&path) {
                Ok(scenario) => {
                    debug!(id = %scenario.id, "loaded scenario");
                    map.insert(scenario.id.clone(), Arc::new(scenario));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping invalid scenario file");
                }
            }
        }

        info!(count = map.len(), dir = %dir.display(), "scenario store ready");
        Ok(Self {
            dir,
            snapshot: RwLock::new(Arc::new(map)),
            write_lock: Mutex::new(()),
        })
    }

    fn read_scenario_file(path: &Path) -> AppResult<Scenario> {
        let contents = fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&contents)?;
        let reasons = validate(&scenario);
        if !reasons.is_empty() {
            return Err(AppError::invalid_input(reasons.join("; ")));
        }
        Ok(scenario)
    }

    /// Validate and persist a scenario, then swap it into the snapshot.
    pub fn load(&self, scenario: Scenario) -> AppResult<()> {
        let reasons = validate(&scenario);
        if !reasons.is_empty() {
            return Err(AppError::invalid_input(reasons.join("; ")));
        }

        let _guard = self.write_lock.lock().expect("scenario write lock poisoned");

        // Atomic on-disk replace: write a sibling temp file, then rename.
        let final_path = self.dir.join(format!("{}.json", scenario.id));
        let tmp_path = self.dir.join(format!(".{}.json.tmp", scenario.id));
        let body = serde_json::to_string_pretty(&scenario)?;
        fs::write(&tmp_path, body)
            .map_err(|e| AppError::storage(format!("write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &final_path)
            .map_err(|e| AppError::storage(format!("rename {}: {e}", final_path.display())))?;

        let mut next: HashMap<String, Arc<Scenario>> =
            self.snapshot.read().expect("snapshot lock poisoned").as_ref().clone();
        next.insert(scenario.id.clone(), Arc::new(scenario));
        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::new(next);

        Ok(())
    }

    /// Fetch a scenario by id without any fallback.
    pub fn get(&self, id: &str) -> Option<Arc<Scenario>> {
        self.snapshot
            .read()
            .expect("snapshot lock poisoned")
            .get(id)
            .cloned()
    }

    /// Fetch a scenario, synthesizing a three-node chain when the id is
    /// unknown so a demo never hard-fails on a missing file.
    pub fn get_or_fallback(&self, id: &str) -> Arc<Scenario> {
        if let Some(found) = self.get(id) {
            return found;
        }
        warn!(id, "scenario missing, using generated fallback chain");
        Arc::new(fallback_scenario(id))
    }

    /// Look up a node inside a stored scenario.
    pub fn node(&self, id: &str, node_id: &str) -> AppResult<Node> {
        let scenario = self
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("scenario {id}")))?;
        scenario
            .node(node_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("node {node_id} in scenario {id}")))
    }

    /// Listing for the HTTP surface.
    pub fn list(&self) -> Vec<ScenarioSummary> {
        let snapshot = self.snapshot.read().expect("snapshot lock poisoned").clone();
        let mut summaries: Vec<ScenarioSummary> = snapshot
            .values()
            .map(|s| ScenarioSummary {
                id: s.id.clone(),
                schema_version: s.schema_version.clone(),
                node_count: s.nodes.len(),
                start_id: s.start_id.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Number of stored scenarios.
    pub fn count(&self) -> usize {
        self.snapshot.read().expect("snapshot lock poisoned").len()
    }
}

/// Validate a scenario. Returns human-readable reasons; empty means valid.
pub fn validate(scenario: &Scenario) -> Vec<String> {
    let mut reasons = Vec::new();

    if scenario.id.is_empty() {
        reasons.push("scenario id is empty".to_string());
    }
    if scenario.schema_version != SCHEMA_VERSION {
        reasons.push(format!(
            "unsupported schema_version {} (expected {})",
            scenario.schema_version, SCHEMA_VERSION
        ));
    }
    if scenario.nodes.is_empty() {
        reasons.push("scenario has no nodes".to_string());
        return reasons;
    }

    let mut ids = HashSet::new();
    for node in &scenario.nodes {
        if !ids.insert(node.id.as_str()) {
            reasons.push(format!("duplicate node id {}", node.id));
        }
        if !(0.0..=1.0).contains(&node.weight) {
            reasons.push(format!("node {} weight out of [0, 1]", node.id));
        }
        if node.success_criteria.is_empty() {
            reasons.push(format!("node {} has no success criteria", node.id));
        }
        for edge in node.edges() {
            if edge == node.id {
                reasons.push(format!("node {} transitions to itself", node.id));
            }
        }
    }

    for node in &scenario.nodes {
        for edge in node.edges() {
            if !ids.contains(edge) {
                reasons.push(format!("node {} references unknown id {edge}", node.id));
            }
        }
    }
    if !ids.contains(scenario.start_id.as_str()) {
        reasons.push(format!("start_id {} does not resolve", scenario.start_id));
    }

    // Some path from start must be able to end the interview.
    if reasons.is_empty() && !terminal_reachable(scenario) {
        reasons.push(format!(
            "no terminal reachable from start_id {}",
            scenario.start_id
        ));
    }

    reasons
}

/// Breadth-first search from the start node for any node with a null edge.
fn terminal_reachable(scenario: &Scenario) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([scenario.start_id.as_str()]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = scenario.node(id) else {
            continue;
        };
        // The interview ends when the selector's chosen edge is null;
        // only the pass and fail edges are always eligible for selection.
        if node.next_if_pass.is_none() || node.next_if_fail.is_none() {
            return true;
        }
        queue.extend(node.edges());
    }

    false
}

/// Synthesize the `L1 intro -> L2 basics -> L3 advanced` chain used when
/// a scenario id has no stored definition.
pub fn fallback_scenario(category: &str) -> Scenario {
    let l1 = format!("{category}_l1_intro");
    let l2 = format!("{category}_l2_basics");
    let l3 = format!("{category}_l3_advanced");

    Scenario {
        id: category.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        policy: ScenarioPolicy::default(),
        start_id: l1.clone(),
        nodes: vec![
            Node {
                id: l1,
                category: category.to_string(),
                order: 1,
                question: format!("Расскажите о вашем опыте работы с {category}"),
                weight: 1.0,
                success_criteria: vec![
                    "опыт".to_string(),
                    "проекты".to_string(),
                    "навыки".to_string(),
                ],
                followups: vec!["Какие проекты вы делали?".to_string()],
                next_if_pass: Some(l3.clone()),
                next_if_fail: Some(l2.clone()),
                next_if_equivalent: None,
            },
            Node {
                id: l2,
                category: category.to_string(),
                order: 2,
                question: format!("Объясните основные концепции {category}"),
                weight: 0.8,
                success_criteria: vec![
                    "основы".to_string(),
                    "концепции".to_string(),
                    "принципы".to_string(),
                ],
                followups: vec!["Что самое важное?".to_string()],
                next_if_pass: Some(l3.clone()),
                next_if_fail: Some(l3.clone()),
                next_if_equivalent: None,
            },
            Node {
                id: l3,
                category: category.to_string(),
                order: 3,
                question: format!("Как вы решали сложные задачи в {category}?"),
                weight: 0.9,
                success_criteria: vec![
                    "сложные задачи".to_string(),
                    "решения".to_string(),
                    "оптимизация".to_string(),
                ],
                followups: vec!["Приведите примеры".to_string()],
                next_if_pass: None,
                next_if_fail: None,
                next_if_equivalent: None,
            },
        ],
    }
}
