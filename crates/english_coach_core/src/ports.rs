//! crates/english_coach_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific implementations like the database or the LLM API.

use crate::domain::{
    DailyWord, DebateSession, Flashcard, InterviewSession, InterviewSummary, Mistake,
    MistakeInput, NewUser, RoleplaySession, SentenceHistory, TutorSession, Turn, Usage, User,
};
use crate::interview::InterviewProgress;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all persistence port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Duplicate key: {0}")]
    Duplicate(String),
    /// An optimistic-concurrency check failed; the record changed underneath us.
    #[error("Concurrent update: {0}")]
    Conflict(String),
    /// The backing store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Content generation
//=========================================================================================

/// Failure classes of a content generation call.
///
/// Every variant carries the technical detail; `user_message` gives the text
/// safe to show to end users.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// No API credential is configured. The detail never names the credential.
    #[error("content generation is not configured: {0}")]
    NotConfigured(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model API rejected our credentials: {0}")]
    Unauthorized(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected model API error: {0}")]
    Unknown(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Rate limits and network failures are transient; everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::RateLimited(_) | GenerationError::Network(_))
    }

    /// The underlying failure, looking through retry exhaustion.
    pub fn root(&self) -> &GenerationError {
        match self {
            GenerationError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::NotConfigured(_) => "AI service is not configured.",
            GenerationError::EmptyResponse => "The AI returned an empty response. Please try again.",
            GenerationError::InsufficientCredits(_) => {
                "The AI service is temporarily unavailable. Please try again later."
            }
            GenerationError::RateLimited(_) => {
                "The AI service is busy right now. Please try again in a minute."
            }
            GenerationError::Network(_) => {
                "Could not reach the AI service. Please try again shortly."
            }
            GenerationError::Unauthorized(_) | GenerationError::Unknown(_) => {
                "The AI service failed to respond. Please try again."
            }
            GenerationError::RetriesExhausted { last, .. } => last.user_message(),
        }
    }
}

/// Classifies a failure from its rendered message, in priority order:
/// credits, rate limit, authentication, network, anything else.
pub fn classify_failure(message: &str) -> GenerationError {
    let lower = message.to_lowercase();
    let detail = message.to_string();
    if lower.contains("insufficient credits")
        || lower.contains("insufficient_quota")
        || lower.contains("402")
    {
        GenerationError::InsufficientCredits(detail)
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit")
    {
        GenerationError::RateLimited(detail)
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("forbidden")
    {
        GenerationError::Unauthorized(detail)
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("econnreset")
        || lower.contains("dns")
    {
        GenerationError::Network(detail)
    } else {
        GenerationError::Unknown(detail)
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;

#[async_trait]
pub trait ContentGenerationService: Send + Sync {
    /// Sends `prompt` as a single user message and returns the complete text.
    /// With `json_mode` the model is asked for a JSON object response.
    async fn generate(&self, prompt: &str, json_mode: bool) -> GenerationResult<String>;
}

//=========================================================================================
// External identity
//=========================================================================================

/// The profile an external identity provider returns after sign-in.
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub subject: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

#[async_trait]
pub trait ExternalIdentityService: Send + Sync {
    /// The provider URL to send the browser to.
    fn authorization_url(&self, state: &str) -> String;
    /// Exchanges an authorization code for the signed-in user's profile.
    async fn exchange_code(&self, code: &str) -> PortResult<ExternalProfile>;
}

//=========================================================================================
// Persistence
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    /// Fails with `PortError::Duplicate` when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;
    async fn get_user_by_email(&self, email: &str) -> PortResult<User>;
    async fn find_user_by_google_id(&self, google_id: &str) -> PortResult<Option<User>>;
    async fn link_google_id(
        &self,
        user_id: Uuid,
        google_id: &str,
        avatar: Option<&str>,
    ) -> PortResult<User>;
    async fn update_user_name(&self, user_id: Uuid, name: &str) -> PortResult<User>;
    /// Replaces the password hash and clears any pending reset token.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()>;
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;
    /// Finds the user holding `token` if it has not expired at `now`.
    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<User>>;

    // --- Quota ---
    async fn reset_usage(&self, user_id: Uuid, usage: Usage) -> PortResult<()>;
    /// Atomically adds one to today's usage counter.
    async fn increment_usage(&self, user_id: Uuid) -> PortResult<()>;

    // --- Mistakes and sentence history ---
    /// Inserts with `count = 1`, or increments `count` and refreshes `last_seen`
    /// for an existing (user, wrong phrase) pair.
    async fn upsert_mistake(&self, user_id: Uuid, mistake: &MistakeInput) -> PortResult<Mistake>;
    /// All of a user's mistakes, most recently seen first.
    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<Mistake>>;
    /// A user's most frequent mistakes.
    async fn top_mistakes(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<Mistake>>;
    async fn count_mistakes(&self, user_id: Uuid) -> PortResult<u64>;
    async fn get_mistake(&self, mistake_id: Uuid) -> PortResult<Mistake>;
    async fn delete_mistake(&self, mistake_id: Uuid) -> PortResult<()>;
    async fn save_sentence_history(&self, history: &SentenceHistory) -> PortResult<()>;
    async fn count_sentence_history(&self, user_id: Uuid) -> PortResult<u64>;
    async fn recent_sentence_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<SentenceHistory>>;

    // --- Interview sessions ---
    async fn create_interview(&self, session: &InterviewSession) -> PortResult<()>;
    async fn get_interview(&self, session_id: Uuid) -> PortResult<InterviewSession>;
    /// Sessions of a user, most recently updated first.
    async fn list_interviews(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<InterviewSession>>;
    async fn list_interview_summaries(&self, user_id: Uuid) -> PortResult<Vec<InterviewSummary>>;
    async fn delete_interview(&self, session_id: Uuid) -> PortResult<()>;
    /// Appends turns without touching progress (e.g. a newly asked question).
    async fn append_interview_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()>;
    /// Appends turns and stores `progress` if the session is still at
    /// `expected_version`; otherwise fails with `PortError::Conflict`.
    async fn record_interview_turn(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
        progress: InterviewProgress,
    ) -> PortResult<()>;
    /// Writes (or overwrites) the final report and marks the session ended.
    async fn save_interview_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()>;

    // --- Debate sessions ---
    async fn create_debate(&self, session: &DebateSession) -> PortResult<()>;
    async fn get_debate(&self, session_id: Uuid) -> PortResult<DebateSession>;
    async fn list_debates(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<DebateSession>>;
    /// Appends turns if the debate is still at `expected_version`.
    async fn append_debate_turns(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
    ) -> PortResult<()>;
    async fn save_debate_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()>;

    // --- Roleplay and tutor sessions ---
    async fn save_roleplay(&self, session: &RoleplaySession) -> PortResult<()>;
    async fn list_roleplays(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<RoleplaySession>>;
    /// The user's most recently updated tutor session, if updated after `since`.
    async fn find_active_tutor_session(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Option<TutorSession>>;
    async fn create_tutor_session(&self, session: &TutorSession) -> PortResult<()>;
    async fn append_tutor_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()>;
    async fn list_tutor_sessions(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<TutorSession>>;

    // --- Daily words ---
    async fn get_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>>;
    /// Words dated on or after `from`, in date order.
    async fn daily_words_since(&self, from: NaiveDate) -> PortResult<Vec<DailyWord>>;
    /// Inserts words, leaving any already stored for the same date untouched.
    async fn insert_daily_words(&self, words: &[DailyWord]) -> PortResult<()>;
    async fn delete_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>>;

    // --- Flashcards ---
    async fn list_flashcards(&self, user_id: Uuid) -> PortResult<Vec<Flashcard>>;
    async fn create_flashcard(&self, card: &Flashcard) -> PortResult<()>;
    async fn get_flashcard(&self, card_id: Uuid) -> PortResult<Flashcard>;
    async fn update_flashcard_mastery(
        &self,
        card_id: Uuid,
        mastery: u8,
        next_review: DateTime<Utc>,
    ) -> PortResult<Flashcard>;
    async fn delete_flashcard(&self, card_id: Uuid) -> PortResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_priority_order() {
        assert!(matches!(
            classify_failure("402: Insufficient credits, also 429"),
            GenerationError::InsufficientCredits(_)
        ));
        assert!(matches!(
            classify_failure("HTTP 429 Too Many Requests"),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure("401 Unauthorized"),
            GenerationError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_failure("error sending request: operation timed out"),
            GenerationError::Network(_)
        ));
        assert!(matches!(
            classify_failure("model produced invalid tokens"),
            GenerationError::Unknown(_)
        ));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(GenerationError::RateLimited(String::new()).is_retryable());
        assert!(GenerationError::Network(String::new()).is_retryable());
        assert!(!GenerationError::InsufficientCredits(String::new()).is_retryable());
        assert!(!GenerationError::Unauthorized(String::new()).is_retryable());
        assert!(!GenerationError::EmptyResponse.is_retryable());
    }

    #[test]
    fn exhausted_retries_report_the_last_failure() {
        let err = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::RateLimited("429".to_string())),
        };
        assert!(!err.is_retryable());
        assert!(matches!(err.root(), GenerationError::RateLimited(_)));
        assert_eq!(err.user_message(), GenerationError::RateLimited(String::new()).user_message());
    }
}
