//! Scoring Model
//!
//! Records for BARS-based scoring: individual answers, block aggregates,
//! and the report-facing performance analysis.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The discrete BARS anchors scores snap to.
pub const BARS_ANCHORS: [f64; 4] = [0.0, 0.3, 0.7, 1.0];

/// One scored answer to a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAnswer {
    pub question_id: String,
    /// Competence block this answer counts toward
    pub block: String,
    /// BARS score in [0, 1]
    pub score: f64,
    /// Question importance within the block, in [0, 1]
    pub weight: f64,
}

/// Result of scoring a single transcript against a node's criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerScore {
    pub score: f64,
    pub confidence: f64,
    pub matched_criteria: Vec<String>,
}

/// Overall level buckets derived from an aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarsLevel {
    Below,
    Approaching,
    Meets,
    Exceeds,
}

impl BarsLevel {
    /// Bucket an aggregate score.
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            BarsLevel::Below
        } else if score < 0.7 {
            BarsLevel::Approaching
        } else if score < 0.85 {
            BarsLevel::Meets
        } else {
            BarsLevel::Exceeds
        }
    }
}

impl std::fmt::Display for BarsLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarsLevel::Below => write!(f, "below"),
            BarsLevel::Approaching => write!(f, "approaching"),
            BarsLevel::Meets => write!(f, "meets"),
            BarsLevel::Exceeds => write!(f, "exceeds"),
        }
    }
}

/// Per-block breakdown inside a performance analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAnalysis {
    pub score: f64,
    pub level: BarsLevel,
    pub weight: f64,
}

/// Report-facing aggregate over a set of answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub block_scores: HashMap<String, f64>,
    pub overall_score: f64,
    pub overall_level: BarsLevel,
    pub block_analysis: HashMap<String, BlockAnalysis>,
    /// Blocks scoring at or above 0.7
    pub strengths: Vec<String>,
    /// Blocks scoring below 0.7
    pub weaknesses: Vec<String>,
}
