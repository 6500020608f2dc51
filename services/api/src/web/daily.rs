//! services/api/src/web/daily.rs
//!
//! Word of the day. Words are generated a week at a time and cached by date.

use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use english_coach_core::domain::{week_dates, week_start, DailyWord, WORDS_PER_WEEK};
use english_coach_core::recovery::{str_field, Shape};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::web::state::AppState;

const WEEK_PROMPT: &str = r#"Generate 7 unique, interesting English "Word of the Day" entries for an English learner (one for each day of the week).
Words should be INTERMEDIATE level (B1-B2), NOT advanced or difficult words.
Choose words that are:
- Commonly used in daily conversation and workplace
- Easy to understand and remember
- Practical and useful for learners
- Mix of adjectives, verbs, and nouns

AVOID: Rare, academic, or overly complex words.
PREFER: Common, practical words like "efficient", "organize", "confident", "improve", etc.

Return STRICT JSON ONLY (array of 7 objects):
[
    {
        "word": "Confident",
        "pronunciation": "/ˈkɒn.fɪ.dənt/ • adjective",
        "definition": "Feeling or showing certainty about something; self-assured.",
        "hindiMeaning": "आत्मविश्वासी (Aatmavishwasi) - अपने आप पर यकीन रखने वाला",
        "examples": ["She felt confident before the interview.", "He is a confident speaker."]
    }
]"#;

/// Builds one word per date from the generated entries, requiring exactly
/// one complete entry per day.
fn words_for_week(entries: &Value, dates: &[NaiveDate]) -> ApiResult<Vec<DailyWord>> {
    let entries = entries.as_array().map(Vec::as_slice).unwrap_or_default();
    if entries.len() != WORDS_PER_WEEK {
        return Err(ApiError::Internal(format!(
            "expected {} daily words, model returned {}",
            WORDS_PER_WEEK,
            entries.len()
        )));
    }

    entries
        .iter()
        .zip(dates)
        .map(|(entry, date)| {
            let field = |key: &str| {
                str_field(entry, key)
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::Internal(format!("daily word is missing '{}'", key)))
            };
            let examples = entry
                .get("examples")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Ok(DailyWord {
                date: *date,
                word: field("word")?,
                pronunciation: field("pronunciation")?,
                definition: field("definition")?,
                hindi_meaning: field("hindiMeaning")?,
                examples,
            })
        })
        .collect()
}

/// GET /api/daily/word - Today's word
#[utoipa::path(
    get,
    path = "/api/daily/word",
    responses(
        (status = 200, description = "Word, pronunciation, definition, Hindi meaning and examples"),
        (status = 500, description = "The week's words could not be generated")
    ),
    security(("bearer" = []))
)]
pub async fn daily_word_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<DailyWord>> {
    let today = Utc::now().date_naive();
    if let Some(word) = state.db.get_daily_word(today).await? {
        return Ok(Json(word));
    }

    let monday = week_start(today);
    let existing = state.db.daily_words_since(monday).await?;
    if existing.len() >= WORDS_PER_WEEK {
        if let Some(word) = existing.into_iter().find(|w| w.date == today) {
            return Ok(Json(word));
        }
    }

    info!(week_start = %monday, "Generating daily words for the week");
    let entries = state.generate_json(WEEK_PROMPT, Shape::Array).await?;
    let words = words_for_week(&entries, &week_dates(today))?;
    state.db.insert_daily_words(&words).await?;

    // Another request may have stored this week first; the stored word wins.
    if let Some(word) = state.db.get_daily_word(today).await? {
        return Ok(Json(word));
    }
    debug!("Today's word missing after insert; falling back to the week's first");
    words
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::Internal("no daily words generated".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(word: &str) -> Value {
        json!({
            "word": word,
            "pronunciation": "/x/",
            "definition": "d",
            "hindiMeaning": "h",
            "examples": ["one", "two"]
        })
    }

    #[test]
    fn a_full_week_maps_onto_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let entries = Value::Array((0..7).map(|i| entry(&format!("w{}", i))).collect());
        let words = words_for_week(&entries, &week_dates(today)).unwrap();
        assert_eq!(words.len(), 7);
        assert_eq!(words[0].date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(words[3].word, "w3");
        assert_eq!(words[3].examples, vec!["one", "two"]);
    }

    #[test]
    fn short_or_incomplete_weeks_are_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let six = Value::Array((0..6).map(|_| entry("w")).collect());
        assert!(words_for_week(&six, &week_dates(today)).is_err());

        let mut seven: Vec<Value> = (0..7).map(|_| entry("w")).collect();
        seven[4] = json!({"word": "w"});
        assert!(words_for_week(&Value::Array(seven), &week_dates(today)).is_err());
    }
}
