//! services/api/src/web/analyze.rs
//!
//! Sentence analysis: corrections, tracked mistakes and example sentences.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use english_coach_core::domain::{MistakeStats, SentenceHistory};
use english_coach_core::recovery::{mistake_entries, str_field, Shape};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::mistakes::mistake_stats;
use crate::web::state::AppState;

const MAX_SENTENCE_CHARS: usize = 500;

const STRICT_INSTRUCTION: &str = " STRICTLY check for: 1. Capitalization (start of sentence, 'I', proper nouns). 2. Punctuation (must end with . ? !). 3. Extra whitespace (double spaces, trailing spaces). Flag EVERY single one of these issues as a separate mistake.";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub sentence: String,
    #[serde(default)]
    pub strict_mode: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ExamplesRequest {
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub mistake: String,
}

fn analysis_prompt(sentence: &str, strict: bool) -> String {
    let mut instruction =
        "Correct the following English sentence(s) and highlight mistakes.".to_string();
    if strict {
        instruction.push_str(STRICT_INSTRUCTION);
    }
    format!(
        r#"{instruction} Return JSON ONLY.
Sentence: "{sentence}"
Required JSON Format:
{{
  "original": "{sentence}",
  "corrected": "Corrected sentence here.",
  "polished_alternatives": ["Professional version 1...", "Professional version 2...", "Professional version 3..."],
  "mistakes": [
    {{
      "wrong": "wrong phrase",
      "correct": "correct phrase",
      "category": "grammar/spelling/preposition/punctuation/capitalization",
      "rule": "Explanation of the rule",
      "explanation": "Why it is wrong"
    }}
  ]
}}
If there are no mistakes, "mistakes" should be an empty array. Always provide polished alternatives even if the sentence is correct."#
    )
}

/// POST /api/analyze - Check a sentence and record its mistakes
#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Correction with mistakes and polished alternatives"),
        (status = 400, description = "Missing or overlong sentence"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<Json<Value>> {
    let sentence = req.sentence.trim();
    if sentence.is_empty() {
        return Err(ApiError::validation("Please provide a sentence"));
    }
    if sentence.chars().count() > MAX_SENTENCE_CHARS {
        return Err(ApiError::validation("Sentence too long (max 500 characters)"));
    }

    let result = state
        .generate_json(&analysis_prompt(sentence, req.strict_mode), Shape::Object)
        .await?;
    record_usage(&state, user_id).await;

    let mut mistake_ids = Vec::new();
    for entry in mistake_entries(&result, "correct") {
        let mistake = state.db.upsert_mistake(user_id, &entry).await?;
        mistake_ids.push(mistake.id);
    }
    debug!(%user_id, mistakes = mistake_ids.len(), "Sentence analyzed");

    let history = SentenceHistory {
        id: Uuid::new_v4(),
        user_id,
        original: str_field(&result, "original").unwrap_or(sentence).to_string(),
        corrected: str_field(&result, "corrected").unwrap_or(sentence).to_string(),
        mistakes: mistake_ids,
        created_at: Utc::now(),
    };
    state.db.save_sentence_history(&history).await?;

    Ok(Json(result))
}

/// POST /api/analyze/examples - Example sentences for a grammar rule
#[utoipa::path(
    post,
    path = "/api/analyze/examples",
    request_body = ExamplesRequest,
    responses(
        (status = 200, description = "Three example sentences", body = Vec<String>),
        (status = 400, description = "Missing rule")
    ),
    security(("bearer" = []))
)]
pub async fn examples_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ExamplesRequest>,
) -> ApiResult<Json<Value>> {
    let rule = req.rule.trim();
    if rule.is_empty() {
        return Err(ApiError::validation("Please provide a rule"));
    }

    let prompt = format!(
        r#"Provide 3 clear, simple sentences demonstrating the correct usage of the following English grammar rule.
Rule: "{}"
Context of mistake: "{}"

Return ONLY a JSON array of strings: e.g. ["Example 1", "Example 2", "Example 3"]"#,
        rule,
        req.mistake.trim()
    );
    let examples = state.generate_json(&prompt, Shape::Array).await?;
    record_usage(&state, user_id).await;
    Ok(Json(examples))
}

/// GET /api/analyze/stats - Mistake and sentence counts with the top mistakes
#[utoipa::path(
    get,
    path = "/api/analyze/stats",
    responses((status = 200, description = "Progress statistics")),
    security(("bearer" = []))
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<MistakeStats>> {
    Ok(Json(mistake_stats(&state, user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_adds_mechanical_checks() {
        let relaxed = analysis_prompt("i go home", false);
        let strict = analysis_prompt("i go home", true);
        assert!(!relaxed.contains("STRICTLY"));
        assert!(strict.contains("Capitalization"));
        assert!(strict.contains(r#"Sentence: "i go home""#));
    }
}
