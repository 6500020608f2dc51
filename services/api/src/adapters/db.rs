//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Conversation turns live in JSONB arrays and are only ever appended with
//! `||`, so concurrent writers never overwrite each other's turns. Interview and
//! debate progress is guarded by a `version` column.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use english_coach_core::domain::{
    DailyWord, DebateSession, Flashcard, InterviewSession, InterviewSummary, Mistake,
    MistakeInput, NewUser, RoleplaySession, SentenceHistory, TutorSession, Turn, Usage, User,
};
use english_coach_core::interview::InterviewProgress;
use english_coach_core::ports::{DatabaseService, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects eagerly, failing if the server cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Builds a pool that only connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Distinguishes a missing row from a stale version after a guarded update
    /// touched nothing.
    async fn version_miss(&self, table: &str, session_id: Uuid, what: &str) -> PortError {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table);
        match sqlx::query_scalar::<_, bool>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
        {
            Ok(true) => PortError::Conflict(format!("{} {}", what, session_id)),
            Ok(false) => PortError::NotFound(what.to_string()),
            Err(e) => db_error(e),
        }
    }
}

//=========================================================================================
// Error mapping
//=========================================================================================

fn db_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound("Record".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Duplicate(db.constraint().unwrap_or("value").to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn lookup_error(e: sqlx::Error, what: &str) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.to_string()),
        other => db_error(other),
    }
}

fn expect_one(rows_affected: u64, what: &str) -> PortResult<()> {
    if rows_affected == 0 {
        Err(PortError::NotFound(what.to_string()))
    } else {
        Ok(())
    }
}

/// Enumerations are stored as their lowercase serde names.
fn parse_text<T: DeserializeOwned>(column: &str, raw: String) -> PortResult<T> {
    serde_json::from_value(Value::String(raw))
        .map_err(|e| PortError::Unexpected(format!("invalid {} value: {}", column, e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, name, email, password_hash, google_id, avatar, usage_count, usage_date, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    google_id: Option<String>,
    avatar: Option<String>,
    usage_count: i32,
    usage_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            google_id: self.google_id,
            avatar: self.avatar,
            usage: Usage {
                count: self.usage_count.max(0) as u32,
                date: self.usage_date,
            },
            created_at: self.created_at,
        }
    }
}

const MISTAKE_COLUMNS: &str =
    "id, user_id, wrong_phrase, correct_phrase, rule, category, explanation, count, last_seen";

#[derive(FromRow)]
struct MistakeRecord {
    id: Uuid,
    user_id: Uuid,
    wrong_phrase: String,
    correct_phrase: String,
    rule: Option<String>,
    category: Option<String>,
    explanation: Option<String>,
    count: i32,
    last_seen: DateTime<Utc>,
}
impl MistakeRecord {
    fn to_domain(self) -> Mistake {
        Mistake {
            id: self.id,
            user_id: self.user_id,
            wrong_phrase: self.wrong_phrase,
            correct_phrase: self.correct_phrase,
            rule: self.rule,
            category: self.category,
            explanation: self.explanation,
            count: self.count.max(0) as u32,
            last_seen: self.last_seen,
        }
    }
}

#[derive(FromRow)]
struct SentenceHistoryRecord {
    id: Uuid,
    user_id: Uuid,
    original: String,
    corrected: String,
    mistakes: Vec<Uuid>,
    created_at: DateTime<Utc>,
}
impl SentenceHistoryRecord {
    fn to_domain(self) -> SentenceHistory {
        SentenceHistory {
            id: self.id,
            user_id: self.user_id,
            original: self.original,
            corrected: self.corrected,
            mistakes: self.mistakes,
            created_at: self.created_at,
        }
    }
}

const INTERVIEW_COLUMNS: &str = "id, user_id, title, resume_context, manual_context, \
     interview_type, difficulty, interview_phase, interviewer_mood, question_count, messages, \
     final_report, version, created_at, last_updated, ended_at";

#[derive(FromRow)]
struct InterviewRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    resume_context: String,
    manual_context: String,
    interview_type: String,
    difficulty: String,
    interview_phase: String,
    interviewer_mood: String,
    question_count: i32,
    messages: Json<Vec<Turn>>,
    final_report: Option<Value>,
    version: i64,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}
impl InterviewRecord {
    fn to_domain(self) -> PortResult<InterviewSession> {
        Ok(InterviewSession {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            resume_context: self.resume_context,
            manual_context: self.manual_context,
            interview_type: parse_text("interview_type", self.interview_type)?,
            difficulty: parse_text("difficulty", self.difficulty)?,
            progress: InterviewProgress {
                phase: parse_text("interview_phase", self.interview_phase)?,
                mood: parse_text("interviewer_mood", self.interviewer_mood)?,
                question_count: self.question_count.max(0) as u32,
            },
            messages: self.messages.0,
            final_report: self.final_report,
            version: self.version,
            created_at: self.created_at,
            last_updated: self.last_updated,
            ended_at: self.ended_at,
        })
    }
}

#[derive(FromRow)]
struct InterviewSummaryRecord {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}
impl InterviewSummaryRecord {
    fn to_domain(self) -> InterviewSummary {
        InterviewSummary {
            id: self.id,
            title: self.title,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

const DEBATE_COLUMNS: &str =
    "id, user_id, topic, difficulty, turns, final_feedback, version, started_at, ended_at";

#[derive(FromRow)]
struct DebateRecord {
    id: Uuid,
    user_id: Uuid,
    topic: String,
    difficulty: String,
    turns: Json<Vec<Turn>>,
    final_feedback: Option<Value>,
    version: i64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}
impl DebateRecord {
    fn to_domain(self) -> PortResult<DebateSession> {
        Ok(DebateSession {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            difficulty: parse_text("difficulty", self.difficulty)?,
            turns: self.turns.0,
            final_feedback: self.final_feedback,
            version: self.version,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }
}

#[derive(FromRow)]
struct RoleplayRecord {
    id: Uuid,
    user_id: Uuid,
    scenario: String,
    messages: Json<Vec<Turn>>,
    feedback: Value,
    created_at: DateTime<Utc>,
}
impl RoleplayRecord {
    fn to_domain(self) -> RoleplaySession {
        RoleplaySession {
            id: self.id,
            user_id: self.user_id,
            scenario: self.scenario,
            messages: self.messages.0,
            feedback: self.feedback,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct TutorRecord {
    id: Uuid,
    user_id: Uuid,
    messages: Json<Vec<Turn>>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}
impl TutorRecord {
    fn to_domain(self) -> TutorSession {
        TutorSession {
            id: self.id,
            user_id: self.user_id,
            messages: self.messages.0,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

const DAILY_WORD_COLUMNS: &str = "date, word, pronunciation, definition, hindi_meaning, examples";

#[derive(FromRow)]
struct DailyWordRecord {
    date: NaiveDate,
    word: String,
    pronunciation: String,
    definition: String,
    hindi_meaning: String,
    examples: Vec<String>,
}
impl DailyWordRecord {
    fn to_domain(self) -> DailyWord {
        DailyWord {
            date: self.date,
            word: self.word,
            pronunciation: self.pronunciation,
            definition: self.definition,
            hindi_meaning: self.hindi_meaning,
            examples: self.examples,
        }
    }
}

const FLASHCARD_COLUMNS: &str =
    "id, user_id, word, definition, example, pronunciation, mastery, next_review, created_at";

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    user_id: Uuid,
    word: String,
    definition: String,
    example: Option<String>,
    pronunciation: Option<String>,
    mastery: i16,
    next_review: DateTime<Utc>,
    created_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            user_id: self.user_id,
            word: self.word,
            definition: self.definition,
            example: self.example,
            pronunciation: self.pronunciation,
            mastery: self.mastery.clamp(0, u8::MAX as i16) as u8,
            next_review: self.next_review,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, google_id, avatar) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.google_id)
            .bind(&new_user.avatar)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match db_error(e) {
                PortError::Duplicate(_) => PortError::Duplicate("email".to_string()),
                other => other,
            })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "User"))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "User"))?;
        Ok(record.to_domain())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> PortResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE google_id = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn link_google_id(
        &self,
        user_id: Uuid,
        google_id: &str,
        avatar: Option<&str>,
    ) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET google_id = $2, avatar = COALESCE(avatar, $3) \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(google_id)
            .bind(avatar)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "User"))?;
        Ok(record.to_domain())
    }

    async fn update_user_name(&self, user_id: Uuid, name: &str) -> PortResult<User> {
        let sql = format!("UPDATE users SET name = $2 WHERE id = $1 RETURNING {}", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "User"))?;
        Ok(record.to_domain())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, reset_token = NULL, reset_token_expires = NULL \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "User")
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET reset_token = $2, reset_token_expires = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "User")
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE reset_token = $1 AND reset_token_expires > $2",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    // --- Quota ---

    async fn reset_usage(&self, user_id: Uuid, usage: Usage) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET usage_count = $2, usage_date = $3 WHERE id = $1")
            .bind(user_id)
            .bind(usage.count as i32)
            .bind(usage.date)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        expect_one(result.rows_affected(), "User")
    }

    async fn increment_usage(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        expect_one(result.rows_affected(), "User")
    }

    // --- Mistakes and sentence history ---

    async fn upsert_mistake(&self, user_id: Uuid, mistake: &MistakeInput) -> PortResult<Mistake> {
        let sql = format!(
            "INSERT INTO mistakes \
                 (id, user_id, wrong_phrase, correct_phrase, rule, category, explanation, count, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, now()) \
             ON CONFLICT (user_id, wrong_phrase) DO UPDATE SET \
                 count = mistakes.count + 1, \
                 last_seen = now(), \
                 correct_phrase = EXCLUDED.correct_phrase, \
                 rule = COALESCE(EXCLUDED.rule, mistakes.rule), \
                 category = COALESCE(EXCLUDED.category, mistakes.category), \
                 explanation = COALESCE(EXCLUDED.explanation, mistakes.explanation) \
             RETURNING {}",
            MISTAKE_COLUMNS
        );
        let record = sqlx::query_as::<_, MistakeRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&mistake.wrong_phrase)
            .bind(&mistake.correct_phrase)
            .bind(&mistake.rule)
            .bind(&mistake.category)
            .bind(&mistake.explanation)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<Mistake>> {
        let sql = format!(
            "SELECT {} FROM mistakes WHERE user_id = $1 ORDER BY last_seen DESC",
            MISTAKE_COLUMNS
        );
        let records = sqlx::query_as::<_, MistakeRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(MistakeRecord::to_domain).collect())
    }

    async fn top_mistakes(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<Mistake>> {
        let sql = format!(
            "SELECT {} FROM mistakes WHERE user_id = $1 \
             ORDER BY count DESC, last_seen DESC LIMIT $2",
            MISTAKE_COLUMNS
        );
        let records = sqlx::query_as::<_, MistakeRecord>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(MistakeRecord::to_domain).collect())
    }

    async fn count_mistakes(&self, user_id: Uuid) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mistakes WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn get_mistake(&self, mistake_id: Uuid) -> PortResult<Mistake> {
        let sql = format!("SELECT {} FROM mistakes WHERE id = $1", MISTAKE_COLUMNS);
        let record = sqlx::query_as::<_, MistakeRecord>(&sql)
            .bind(mistake_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "Mistake"))?;
        Ok(record.to_domain())
    }

    async fn delete_mistake(&self, mistake_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM mistakes WHERE id = $1")
            .bind(mistake_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        expect_one(result.rows_affected(), "Mistake")
    }

    async fn save_sentence_history(&self, history: &SentenceHistory) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO sentence_history (id, user_id, original, corrected, mistakes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(history.id)
        .bind(history.user_id)
        .bind(&history.original)
        .bind(&history.corrected)
        .bind(&history.mistakes)
        .bind(history.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn count_sentence_history(&self, user_id: Uuid) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sentence_history WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn recent_sentence_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<SentenceHistory>> {
        let records = sqlx::query_as::<_, SentenceHistoryRecord>(
            "SELECT id, user_id, original, corrected, mistakes, created_at FROM sentence_history \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(records.into_iter().map(SentenceHistoryRecord::to_domain).collect())
    }

    // --- Interview sessions ---

    async fn create_interview(&self, session: &InterviewSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO interview_sessions \
                 (id, user_id, title, resume_context, manual_context, interview_type, difficulty, \
                  interview_phase, interviewer_mood, question_count, messages, version, \
                  created_at, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.title)
        .bind(&session.resume_context)
        .bind(&session.manual_context)
        .bind(session.interview_type.as_str())
        .bind(session.difficulty.as_str())
        .bind(session.progress.phase.as_str())
        .bind(session.progress.mood.as_str())
        .bind(session.progress.question_count as i32)
        .bind(Json(&session.messages))
        .bind(session.version)
        .bind(session.created_at)
        .bind(session.last_updated)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_interview(&self, session_id: Uuid) -> PortResult<InterviewSession> {
        let sql = format!("SELECT {} FROM interview_sessions WHERE id = $1", INTERVIEW_COLUMNS);
        let record = sqlx::query_as::<_, InterviewRecord>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "Session"))?;
        record.to_domain()
    }

    async fn list_interviews(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<InterviewSession>> {
        let sql = format!(
            "SELECT {} FROM interview_sessions WHERE user_id = $1 \
             ORDER BY last_updated DESC LIMIT $2",
            INTERVIEW_COLUMNS
        );
        let records = sqlx::query_as::<_, InterviewRecord>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records.into_iter().map(InterviewRecord::to_domain).collect()
    }

    async fn list_interview_summaries(&self, user_id: Uuid) -> PortResult<Vec<InterviewSummary>> {
        let records = sqlx::query_as::<_, InterviewSummaryRecord>(
            "SELECT id, title, created_at, last_updated FROM interview_sessions \
             WHERE user_id = $1 ORDER BY last_updated DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(records.into_iter().map(InterviewSummaryRecord::to_domain).collect())
    }

    async fn delete_interview(&self, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM interview_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        expect_one(result.rows_affected(), "Session")
    }

    async fn append_interview_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE interview_sessions SET messages = messages || $2::jsonb, last_updated = now() \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(Json(turns))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "Session")
    }

    async fn record_interview_turn(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
        progress: InterviewProgress,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE interview_sessions SET \
                 messages = messages || $3::jsonb, \
                 interview_phase = $4, \
                 interviewer_mood = $5, \
                 question_count = $6, \
                 version = version + 1, \
                 last_updated = now() \
             WHERE id = $1 AND version = $2",
        )
        .bind(session_id)
        .bind(expected_version)
        .bind(Json(turns))
        .bind(progress.phase.as_str())
        .bind(progress.mood.as_str())
        .bind(progress.question_count as i32)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(self
                .version_miss("interview_sessions", session_id, "Session")
                .await);
        }
        Ok(())
    }

    async fn save_interview_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE interview_sessions SET final_report = $2, ended_at = $3, \
                 version = version + 1, last_updated = now() \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(report)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "Session")
    }

    // --- Debate sessions ---

    async fn create_debate(&self, session: &DebateSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO debate_sessions (id, user_id, topic, difficulty, turns, version, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.topic)
        .bind(session.difficulty.as_str())
        .bind(Json(&session.turns))
        .bind(session.version)
        .bind(session.started_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_debate(&self, session_id: Uuid) -> PortResult<DebateSession> {
        let sql = format!("SELECT {} FROM debate_sessions WHERE id = $1", DEBATE_COLUMNS);
        let record = sqlx::query_as::<_, DebateRecord>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "Debate"))?;
        record.to_domain()
    }

    async fn list_debates(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<DebateSession>> {
        let sql = format!(
            "SELECT {} FROM debate_sessions WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
            DEBATE_COLUMNS
        );
        let records = sqlx::query_as::<_, DebateRecord>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records.into_iter().map(DebateRecord::to_domain).collect()
    }

    async fn append_debate_turns(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE debate_sessions SET turns = turns || $3::jsonb, version = version + 1 \
             WHERE id = $1 AND version = $2",
        )
        .bind(session_id)
        .bind(expected_version)
        .bind(Json(turns))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(self.version_miss("debate_sessions", session_id, "Debate").await);
        }
        Ok(())
    }

    async fn save_debate_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE debate_sessions SET final_feedback = $2, ended_at = $3, version = version + 1 \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(report)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "Debate")
    }

    // --- Roleplay and tutor sessions ---

    async fn save_roleplay(&self, session: &RoleplaySession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO roleplay_sessions (id, user_id, scenario, messages, feedback, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.scenario)
        .bind(Json(&session.messages))
        .bind(&session.feedback)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_roleplays(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<RoleplaySession>> {
        let records = sqlx::query_as::<_, RoleplayRecord>(
            "SELECT id, user_id, scenario, messages, feedback, created_at FROM roleplay_sessions \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(records.into_iter().map(RoleplayRecord::to_domain).collect())
    }

    async fn find_active_tutor_session(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Option<TutorSession>> {
        let record = sqlx::query_as::<_, TutorRecord>(
            "SELECT id, user_id, messages, created_at, last_updated FROM tutor_sessions \
             WHERE user_id = $1 AND last_updated > $2 ORDER BY last_updated DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(record.map(TutorRecord::to_domain))
    }

    async fn create_tutor_session(&self, session: &TutorSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO tutor_sessions (id, user_id, messages, created_at, last_updated) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(Json(&session.messages))
        .bind(session.created_at)
        .bind(session.last_updated)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn append_tutor_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE tutor_sessions SET messages = messages || $2::jsonb, last_updated = now() \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(Json(turns))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        expect_one(result.rows_affected(), "Tutor session")
    }

    async fn list_tutor_sessions(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<TutorSession>> {
        let records = sqlx::query_as::<_, TutorRecord>(
            "SELECT id, user_id, messages, created_at, last_updated FROM tutor_sessions \
             WHERE user_id = $1 ORDER BY last_updated DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(records.into_iter().map(TutorRecord::to_domain).collect())
    }

    // --- Daily words ---

    async fn get_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>> {
        let sql = format!("SELECT {} FROM daily_words WHERE date = $1", DAILY_WORD_COLUMNS);
        let record = sqlx::query_as::<_, DailyWordRecord>(&sql)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(DailyWordRecord::to_domain))
    }

    async fn daily_words_since(&self, from: NaiveDate) -> PortResult<Vec<DailyWord>> {
        let sql = format!(
            "SELECT {} FROM daily_words WHERE date >= $1 ORDER BY date",
            DAILY_WORD_COLUMNS
        );
        let records = sqlx::query_as::<_, DailyWordRecord>(&sql)
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(DailyWordRecord::to_domain).collect())
    }

    async fn insert_daily_words(&self, words: &[DailyWord]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for word in words {
            sqlx::query(
                "INSERT INTO daily_words (date, word, pronunciation, definition, hindi_meaning, examples) \
                 VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (date) DO NOTHING",
            )
            .bind(word.date)
            .bind(&word.word)
            .bind(&word.pronunciation)
            .bind(&word.definition)
            .bind(&word.hindi_meaning)
            .bind(&word.examples)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn delete_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>> {
        let sql = format!("DELETE FROM daily_words WHERE date = $1 RETURNING {}", DAILY_WORD_COLUMNS);
        let record = sqlx::query_as::<_, DailyWordRecord>(&sql)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(DailyWordRecord::to_domain))
    }

    // --- Flashcards ---

    async fn list_flashcards(&self, user_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let sql = format!(
            "SELECT {} FROM flashcards WHERE user_id = $1 ORDER BY created_at DESC",
            FLASHCARD_COLUMNS
        );
        let records = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(FlashcardRecord::to_domain).collect())
    }

    async fn create_flashcard(&self, card: &Flashcard) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO flashcards \
                 (id, user_id, word, definition, example, pronunciation, mastery, next_review, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(card.id)
        .bind(card.user_id)
        .bind(&card.word)
        .bind(&card.definition)
        .bind(&card.example)
        .bind(&card.pronunciation)
        .bind(card.mastery as i16)
        .bind(card.next_review)
        .bind(card.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_flashcard(&self, card_id: Uuid) -> PortResult<Flashcard> {
        let sql = format!("SELECT {} FROM flashcards WHERE id = $1", FLASHCARD_COLUMNS);
        let record = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(card_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "Flashcard"))?;
        Ok(record.to_domain())
    }

    async fn update_flashcard_mastery(
        &self,
        card_id: Uuid,
        mastery: u8,
        next_review: DateTime<Utc>,
    ) -> PortResult<Flashcard> {
        let sql = format!(
            "UPDATE flashcards SET mastery = $2, next_review = $3 WHERE id = $1 RETURNING {}",
            FLASHCARD_COLUMNS
        );
        let record = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(card_id)
            .bind(mastery as i16)
            .bind(next_review)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| lookup_error(e, "Flashcard"))?;
        Ok(record.to_domain())
    }

    async fn delete_flashcard(&self, card_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM flashcards WHERE id = $1")
            .bind(card_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        expect_one(result.rows_affected(), "Flashcard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use english_coach_core::interview::{InterviewType, Mood, Phase};
    use english_coach_core::Difficulty;

    #[test]
    fn stored_enum_text_parses_back() {
        let itype: InterviewType = parse_text("interview_type", "hybrid".to_string()).unwrap();
        assert_eq!(itype, InterviewType::Hybrid);
        let phase: Phase = parse_text("interview_phase", Phase::Closing.as_str().to_string()).unwrap();
        assert_eq!(phase, Phase::Closing);
        let mood: Mood = parse_text("interviewer_mood", "strict".to_string()).unwrap();
        assert_eq!(mood, Mood::Strict);
        let difficulty: Difficulty = parse_text("difficulty", "hard".to_string()).unwrap();
        assert_eq!(difficulty, Difficulty::Hard);
        assert!(parse_text::<Phase>("interview_phase", "lunch".to_string()).is_err());
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        assert!(matches!(
            lookup_error(sqlx::Error::RowNotFound, "User"),
            PortError::NotFound(ref what) if what == "User"
        ));
        assert!(matches!(db_error(sqlx::Error::PoolTimedOut), PortError::Unavailable(_)));
        assert!(expect_one(0, "Mistake").is_err());
        assert!(expect_one(1, "Mistake").is_ok());
    }
}
