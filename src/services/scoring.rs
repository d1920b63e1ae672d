//! BARS Scoring
//!
//! Heuristic answer scoring against node criteria, plus the weighted
//! aggregation used for block and overall scores. Anchors follow the
//! Behaviorally-Anchored Rating Scales convention: 0.0 / 0.3 / 0.7 / 1.0
//! tied to observable coverage and answer length.

use std::collections::HashMap;

use crate::models::scoring::{
    AnswerScore, BarsLevel, BlockAnalysis, PerformanceAnalysis, QAnswer, BARS_ANCHORS,
};

/// Suffixes stripped before stem comparison, longer candidates first.
/// The remaining stem must keep at least three characters.
const SUFFIXES: &[&str] = &[
    // Cyrillic inflections
    "иями", "ями", "ами", "ого", "его", "ыми", "ими", "ировать", "овать", "ение", "ании", "ость",
    "ов", "ев", "ах", "ях", "ам", "ям", "ой", "ей", "ом", "ем", "ть", "а", "я", "ы", "и", "е",
    "у", "ю", "о",
    // Latin inflections
    "ing", "ed", "es", "s", "ly",
];

/// Lowercased word tokens; splits on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Crude suffix-stripping stem for Latin and Cyrillic tokens.
pub fn stem(word: &str) -> String {
    for suffix in SUFFIXES {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.chars().count() >= 3 {
                return base.to_string();
            }
        }
    }
    word.to_string()
}

/// Whether the transcript covers one criterion: exact substring,
/// whole-word, or stemmed whole-word.
fn criterion_matches(transcript_lc: &str, tokens: &[String], criterion: &str) -> bool {
    let criterion_lc = criterion.to_lowercase();
    if transcript_lc.contains(&criterion_lc) {
        return true;
    }
    if tokens.iter().any(|t| *t == criterion_lc) {
        return true;
    }
    let criterion_stem = stem(&criterion_lc);
    tokens.iter().any(|t| stem(t) == criterion_stem)
}

/// Score a transcript against a node's success criteria.
///
/// Anchor ladder, first match wins:
///   0.0  no matches and under 20 chars;
///   0.3  coverage below 1/3 or under 60 chars;
///   0.7  coverage below 3/4 (or a long-enough answer short of 120 chars);
///   1.0  coverage at or above 3/4 and at least 120 chars.
pub fn score_answer(transcript: &str, criteria: &[String]) -> AnswerScore {
    let transcript = transcript.trim();
    let transcript_lc = transcript.to_lowercase();
    let tokens = tokenize(transcript);
    let chars = transcript.chars().count();

    let matched: Vec<String> = criteria
        .iter()
        .filter(|c| criterion_matches(&transcript_lc, &tokens, c))
        .cloned()
        .collect();

    let coverage = if criteria.is_empty() {
        0.0
    } else {
        matched.len() as f64 / criteria.len() as f64
    };

    let score = if matched.is_empty() && chars < 20 {
        0.0
    } else if coverage < 0.33 || chars < 60 {
        0.3
    } else if coverage < 0.75 {
        0.7
    } else if chars >= 120 {
        1.0
    } else {
        0.7
    };

    let length_factor = (tokens.len() as f64 / 40.0).min(1.0) * 0.3;
    let confidence = (coverage + length_factor).min(1.0);

    AnswerScore {
        score,
        confidence,
        matched_criteria: matched,
    }
}

/// Snap a score to the nearest BARS anchor.
pub fn snap_to_anchor(score: f64) -> f64 {
    BARS_ANCHORS
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - score)
                .abs()
                .partial_cmp(&(b - score).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0.0)
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 1.0)
}

/// Weighted mean of a block's answers, weights normalized per block.
/// A block with no answers scores 0.
pub fn score_block(answers: &[QAnswer], block: &str) -> f64 {
    let subset: Vec<&QAnswer> = answers.iter().filter(|a| a.block == block).collect();
    if subset.is_empty() {
        return 0.0;
    }

    let total_weight: f64 = subset.iter().map(|a| a.weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }

    let weighted_sum: f64 = subset.iter().map(|a| a.score * a.weight).sum();
    clamp_score(weighted_sum / total_weight)
}

/// Weighted overall score across blocks. Blocks absent from the weight
/// map are ignored; a weighted block without a score counts as 0.
pub fn score_overall(block_scores: &HashMap<String, f64>, block_weights: &HashMap<String, f64>) -> f64 {
    let total_weight: f64 = block_weights.values().sum();
    if total_weight == 0.0 {
        return 0.0;
    }

    let weighted_sum: f64 = block_weights
        .iter()
        .map(|(block, weight)| block_scores.get(block).copied().unwrap_or(0.0) * weight)
        .sum();

    clamp_score(weighted_sum / total_weight)
}

/// Full performance analysis over a set of answers: block scores,
/// overall score, level bucket, strengths and weaknesses.
pub fn analyze_performance(
    answers: &[QAnswer],
    block_weights: &HashMap<String, f64>,
) -> PerformanceAnalysis {
    let mut blocks: Vec<&str> = answers.iter().map(|a| a.block.as_str()).collect();
    blocks.sort_unstable();
    blocks.dedup();

    let block_scores: HashMap<String, f64> = blocks
        .iter()
        .map(|b| (b.to_string(), score_block(answers, b)))
        .collect();

    let overall_score = score_overall(&block_scores, block_weights);

    let block_analysis = block_scores
        .iter()
        .map(|(block, score)| {
            (
                block.clone(),
                BlockAnalysis {
                    score: *score,
                    level: BarsLevel::from_score(*score),
                    weight: block_weights.get(block).copied().unwrap_or(0.0),
                },
            )
        })
        .collect();

    let mut strengths: Vec<String> = block_scores
        .iter()
        .filter(|(_, s)| **s >= 0.7)
        .map(|(b, _)| b.clone())
        .collect();
    let mut weaknesses: Vec<String> = block_scores
        .iter()
        .filter(|(_, s)| **s < 0.7)
        .map(|(b, _)| b.clone())
        .collect();
    strengths.sort();
    weaknesses.sort();

    PerformanceAnalysis {
        overall_level: BarsLevel::from_score(overall_score),
        block_scores,
        overall_score,
        block_analysis,
        strengths,
        weaknesses,
    }
}

/// Match between a candidate's block scores and a job's required minimums:
/// `clamp(Σ min(candidate, required) × w / Σ required × w, 0, 1)`.
pub fn match_score(
    candidate: &HashMap<String, f64>,
    required: &HashMap<String, f64>,
    weights: &HashMap<String, f64>,
) -> f64 {
    let denominator: f64 = required
        .iter()
        .map(|(block, req)| req * weights.get(block).copied().unwrap_or(0.0))
        .sum();
    if denominator == 0.0 {
        return 0.0;
    }

    let numerator: f64 = required
        .iter()
        .map(|(block, req)| {
            let cand = candidate.get(block).copied().unwrap_or(0.0);
            cand.min(*req) * weights.get(block).copied().unwrap_or(0.0)
        })
        .sum();

    clamp_score(numerator / denominator)
}
