//! crates/english_coach_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! These structs are independent of any database; they serialize with the
//! camelCase field names the web client expects.

use crate::interview::{InterviewProgress, InterviewType};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// Users
//=========================================================================================

/// The daily AI usage counter stored on each user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub count: u32,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register a user, either with a password or an external identity.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
}

//=========================================================================================
// Conversation turns
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
    System,
}

/// One message within a session. User turns may carry an evaluation or analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            evaluation: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Ai, content)
    }

    pub fn with_evaluation(mut self, evaluation: Value) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub resume_context: String,
    pub manual_context: String,
    pub interview_type: InterviewType,
    pub difficulty: Difficulty,
    #[serde(flatten)]
    pub progress: InterviewProgress,
    pub messages: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_report: Option<Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl InterviewSession {
    pub fn new(
        user_id: Uuid,
        interview_type: InterviewType,
        difficulty: Difficulty,
        resume_context: String,
        manual_context: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: "New Interview Session".to_string(),
            resume_context,
            manual_context,
            interview_type,
            difficulty,
            progress: InterviewProgress::default(),
            messages: Vec::new(),
            final_report: None,
            version: 0,
            created_at: now,
            last_updated: now,
            ended_at: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// The listing view of an interview session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub difficulty: Difficulty,
    pub turns: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_feedback: Option<Value>,
    pub version: i64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl DebateSession {
    pub fn new(user_id: Uuid, topic: String, difficulty: Difficulty, opening: Turn) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            topic,
            difficulty,
            turns: vec![opening],
            final_feedback: None,
            version: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleplaySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scenario: String,
    pub messages: Vec<Turn>,
    pub feedback: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub messages: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

//=========================================================================================
// Mistakes and sentence history
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mistake {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wrong_phrase: String,
    pub correct_phrase: String,
    pub rule: Option<String>,
    pub category: Option<String>,
    pub explanation: Option<String>,
    pub count: u32,
    pub last_seen: DateTime<Utc>,
}

/// A validated mistake surfaced by the model, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct MistakeInput {
    pub wrong_phrase: String,
    pub correct_phrase: String,
    pub rule: Option<String>,
    pub category: Option<String>,
    pub explanation: Option<String>,
}

/// Collapses runs of whitespace and trims, so "he  go " and "he go" are one mistake.
/// Case is preserved: capitalization errors are mistakes in their own right.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MistakeInput {
    pub fn new(
        wrong_phrase: &str,
        correct_phrase: &str,
        rule: Option<String>,
        category: Option<String>,
        explanation: Option<String>,
    ) -> Self {
        Self {
            wrong_phrase: normalize_phrase(wrong_phrase),
            correct_phrase: correct_phrase.trim().to_string(),
            rule,
            category,
            explanation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original: String,
    pub corrected: String,
    pub mistakes: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts shown on the progress dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeStats {
    pub total_mistakes: u64,
    pub total_sentences: u64,
    pub top_mistakes: Vec<Mistake>,
}

//=========================================================================================
// Vocabulary
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWord {
    pub date: NaiveDate,
    pub word: String,
    pub pronunciation: String,
    pub definition: String,
    pub hindi_meaning: String,
    pub examples: Vec<String>,
}

/// Daily words are generated in batches covering Monday through Sunday.
pub const WORDS_PER_WEEK: usize = 7;

/// The Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday();
    date - chrono::Duration::days(offset as i64)
}

/// The seven dates of the week containing `date`.
pub fn week_dates(date: NaiveDate) -> Vec<NaiveDate> {
    let monday = week_start(date);
    (0..WORDS_PER_WEEK as i64)
        .map(|i| monday + chrono::Duration::days(i))
        .collect()
}

/// Flashcard mastery runs from 0 (new) to 3 (mastered).
pub const MAX_MASTERY: u8 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub word: String,
    pub definition: String,
    pub example: Option<String>,
    pub pronunciation: Option<String>,
    pub mastery: u8,
    pub next_review: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::Phase;

    #[test]
    fn phrases_are_normalized_without_changing_case() {
        assert_eq!(normalize_phrase("  He  go\tto school "), "He go to school");
        let input = MistakeInput::new(" i am ", " I am ", None, None, None);
        assert_eq!(input.wrong_phrase, "i am");
        assert_eq!(input.correct_phrase, "I am");
    }

    #[test]
    fn interview_session_flattens_progress() {
        let session = InterviewSession::new(
            Uuid::new_v4(),
            InterviewType::Hr,
            Difficulty::Easy,
            String::new(),
            String::new(),
        );
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["interviewPhase"], Phase::Intro.as_str());
        assert_eq!(value["interviewType"], "hr");
        assert_eq!(value["questionCount"], 0);
        assert!(value.get("finalReport").is_none());
    }

    #[test]
    fn weeks_start_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(week_start(sunday), monday);
        assert_eq!(week_start(monday), monday);

        let dates = week_dates(sunday);
        assert_eq!(dates.len(), WORDS_PER_WEEK);
        assert_eq!(dates[0], monday);
        assert_eq!(dates[6], sunday);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            google_id: None,
            avatar: None,
            usage: Usage { count: 0, date: Utc::now() },
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("passwordHash"));
    }
}
