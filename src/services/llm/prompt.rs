//! Prompt Builder
//!
//! Assembles the system and user prompts for a turn and the JSON schema
//! the reply must satisfy.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::models::profile::RoleProfile;
use crate::models::scenario::Node;

/// JSON schema for the object the model must return.
pub fn reply_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reply": {"type": "string"},
            "next_node_id": {"type": ["string", "null"]},
            "scoring_update": {
                "type": "object",
                "properties": {
                    "block": {"type": "string"},
                    "delta": {"type": "number"},
                    "score": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                },
                "required": ["block", "delta", "score"]
            },
            "red_flags": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["reply", "scoring_update"]
    })
}

/// System prompt: role, brevity, and the output contract.
pub fn build_system_prompt(role_id: &str) -> String {
    format!(
        "Ты интервьюер для роли {role_id}. Оцени ответ кандидата строго по \
         заданным критериям успеха, не выдумывай свои. Отвечай кратко, одним-двумя \
         предложениями. Верни строго JSON с полями `reply`, `next_node_id`, \
         `scoring_update` (объект с `block`, `delta`, `score`) и `red_flags`. \
         `next_node_id` выбирай только из переходов текущего узла или null, \
         `scoring_update.block` всегда равен категории узла."
    )
}

/// User prompt: the node, the transcript, current scores, thresholds,
/// and optional resume context.
pub fn build_user_prompt(
    node: &Node,
    transcript: &str,
    scores: &HashMap<String, f64>,
    profile: &RoleProfile,
    cv_context: Option<&str>,
) -> String {
    let mut scores_line = scores
        .iter()
        .map(|(block, score)| format!("{block}={score:.2}"))
        .collect::<Vec<_>>();
    scores_line.sort();

    let mut prompt = format!(
        "Текущий узел: {id} (категория {category})\n\
         Вопрос: {question}\n\
         Критерии успеха: {criteria}\n\
         Переходы: pass={pass}, fail={fail}, equivalent={equivalent}\n\
         Текущие оценки: {scores}\n\
         Порог прохождения: {pass_threshold:.2}\n\
         Ответ кандидата: \"{transcript}\"",
        id = node.id,
        category = node.category,
        question = node.question,
        criteria = node.success_criteria.join(", "),
        pass = node.next_if_pass.as_deref().unwrap_or("null"),
        fail = node.next_if_fail.as_deref().unwrap_or("null"),
        equivalent = node.next_if_equivalent.as_deref().unwrap_or("null"),
        scores = if scores_line.is_empty() {
            "нет".to_string()
        } else {
            scores_line.join(", ")
        },
        pass_threshold = profile.thresholds.pass,
    );

    if let Some(context) = cv_context {
        prompt.push_str("\nКонтекст из резюме:\n");
        prompt.push_str(context);
    }

    prompt
}
