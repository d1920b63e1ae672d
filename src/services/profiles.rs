//! Role Profile Store
//!
//! Loads role profiles from a YAML document at startup and holds them
//! read-only. Unknown roles resolve to a permissive default profile so
//! scoring never hard-fails on a missing vacancy definition.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::models::profile::{RoleProfile, Thresholds};
use crate::utils::error::{AppError, AppResult};

/// On-disk shape of one profile entry.
#[derive(Debug, Deserialize)]
struct ProfileDoc {
    #[serde(default)]
    block_weights: HashMap<String, f64>,
    #[serde(default)]
    pass_threshold: Option<f64>,
    #[serde(default)]
    drill_threshold: Option<f64>,
    #[serde(default)]
    equivalent_threshold: Option<f64>,
    #[serde(default)]
    critical_fail_threshold: Option<f64>,
    #[serde(default)]
    scenario_id: Option<String>,
    #[serde(default)]
    critical_blocks: Vec<String>,
}

/// Top-level document: `profiles: { <id>: {...} }`.
#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: HashMap<String, ProfileDoc>,
}

/// Read-only registry of role profiles.
#[derive(Debug)]
pub struct RoleProfileStore {
    profiles: HashMap<String, Arc<RoleProfile>>,
    default: Arc<RoleProfile>,
}

impl RoleProfileStore {
    /// Load profiles from a YAML file. A missing file yields an empty
    /// store (every role falls back to the default profile).
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "role profile file missing, using defaults only");
            return Ok(Self::empty());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents).map(|store| {
            info!(count = store.profiles.len(), path = %path.display(), "role profiles loaded");
            store
        })
    }

    /// Parse a YAML document into a store.
    pub fn from_yaml(contents: &str) -> AppResult<Self> {
        let file: ProfilesFile = serde_yaml::from_str(contents)
            .map_err(|e| AppError::config(format!("role profiles: {e}")))?;

        let mut profiles = HashMap::new();
        for (id, doc) in file.profiles {
            let defaults = Thresholds::default();
            let mut profile = RoleProfile {
                id: id.clone(),
                block_weights: doc.block_weights,
                thresholds: Thresholds {
                    pass: doc.pass_threshold.unwrap_or(defaults.pass),
                    drill: doc.drill_threshold,
                    equivalent: doc.equivalent_threshold.unwrap_or(defaults.equivalent),
                    critical_fail: doc
                        .critical_fail_threshold
                        .unwrap_or(defaults.critical_fail),
                },
                scenario_id: doc.scenario_id,
                critical_blocks: HashSet::from_iter(doc.critical_blocks),
            };
            profile.normalize_weights();
            profiles.insert(id, Arc::new(profile));
        }

        Ok(Self {
            profiles,
            default: Arc::new(RoleProfile::fallback()),
        })
    }

    /// A store with no configured profiles.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            default: Arc::new(RoleProfile::fallback()),
        }
    }

    /// Fetch a profile, falling back to the default for unknown ids.
    pub fn get(&self, role_id: &str) -> Arc<RoleProfile> {
        self.profiles
            .get(role_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Fetch a profile only if it is configured.
    pub fn get_opt(&self, role_id: &str) -> Option<Arc<RoleProfile>> {
        self.profiles.get(role_id).cloned()
    }

    /// The default profile.
    pub fn default_profile(&self) -> Arc<RoleProfile> {
        self.default.clone()
    }

    /// Configured role ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.keys().cloned().collect();
        ids.sort();
        ids
    }
}
