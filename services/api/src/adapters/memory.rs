//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of `DatabaseService`. Used when development
//! runs without `DATABASE_URL`, and by the integration tests.
//! State lives behind a single async mutex, so every operation is atomic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use english_coach_core::domain::{
    DailyWord, DebateSession, Flashcard, InterviewSession, InterviewSummary, Mistake,
    MistakeInput, NewUser, RoleplaySession, SentenceHistory, TutorSession, Turn, Usage, User,
};
use english_coach_core::interview::InterviewProgress;
use english_coach_core::ports::{DatabaseService, PortError, PortResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

struct StoredUser {
    user: User,
    reset_token: Option<(String, DateTime<Utc>)>,
}

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, StoredUser>,
    mistakes: HashMap<Uuid, Mistake>,
    history: Vec<SentenceHistory>,
    interviews: HashMap<Uuid, InterviewSession>,
    debates: HashMap<Uuid, DebateSession>,
    roleplays: Vec<RoleplaySession>,
    tutors: HashMap<Uuid, TutorSession>,
    daily_words: BTreeMap<NaiveDate, DailyWord>,
    flashcards: HashMap<Uuid, Flashcard>,
}

impl Store {
    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut StoredUser> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound("User".to_string()))
    }

    fn interview_mut(&mut self, session_id: Uuid) -> PortResult<&mut InterviewSession> {
        self.interviews
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound("Session".to_string()))
    }

    fn debate_mut(&mut self, session_id: Uuid) -> PortResult<&mut DebateSession> {
        self.debates
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound("Debate".to_string()))
    }
}

#[derive(Default)]
pub struct MemoryAdapter {
    store: Mutex<Store>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F: Fn(&T) -> DateTime<Utc>>(items: &mut [T], key: F) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl DatabaseService for MemoryAdapter {
    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut store = self.store.lock().await;
        if store.users.values().any(|u| u.user.email == new_user.email) {
            return Err(PortError::Duplicate("email".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            google_id: new_user.google_id,
            avatar: new_user.avatar,
            usage: Usage { count: 0, date: now },
            created_at: now,
        };
        store.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                reset_token: None,
            },
        );
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let store = self.store.lock().await;
        store
            .users
            .get(&user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| PortError::NotFound("User".to_string()))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let store = self.store.lock().await;
        store
            .users
            .values()
            .find(|u| u.user.email == email)
            .map(|u| u.user.clone())
            .ok_or_else(|| PortError::NotFound("User".to_string()))
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> PortResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .values()
            .find(|u| u.user.google_id.as_deref() == Some(google_id))
            .map(|u| u.user.clone()))
    }

    async fn link_google_id(
        &self,
        user_id: Uuid,
        google_id: &str,
        avatar: Option<&str>,
    ) -> PortResult<User> {
        let mut store = self.store.lock().await;
        let stored = store.user_mut(user_id)?;
        stored.user.google_id = Some(google_id.to_string());
        if stored.user.avatar.is_none() {
            stored.user.avatar = avatar.map(str::to_string);
        }
        Ok(stored.user.clone())
    }

    async fn update_user_name(&self, user_id: Uuid, name: &str) -> PortResult<User> {
        let mut store = self.store.lock().await;
        let stored = store.user_mut(user_id)?;
        stored.user.name = name.to_string();
        Ok(stored.user.clone())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let stored = store.user_mut(user_id)?;
        stored.user.password_hash = Some(password_hash.to_string());
        stored.reset_token = None;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.user_mut(user_id)?.reset_token = Some((token.to_string(), expires_at));
        Ok(())
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .values()
            .find(|u| {
                u.reset_token
                    .as_ref()
                    .is_some_and(|(t, expires)| t == token && *expires > now)
            })
            .map(|u| u.user.clone()))
    }

    // --- Quota ---

    async fn reset_usage(&self, user_id: Uuid, usage: Usage) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.user_mut(user_id)?.user.usage = usage;
        Ok(())
    }

    async fn increment_usage(&self, user_id: Uuid) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.user_mut(user_id)?.user.usage.count += 1;
        Ok(())
    }

    // --- Mistakes and sentence history ---

    async fn upsert_mistake(&self, user_id: Uuid, mistake: &MistakeInput) -> PortResult<Mistake> {
        let mut store = self.store.lock().await;
        let now = Utc::now();
        let existing = store
            .mistakes
            .values_mut()
            .find(|m| m.user_id == user_id && m.wrong_phrase == mistake.wrong_phrase);

        if let Some(found) = existing {
            found.count += 1;
            found.last_seen = now;
            found.correct_phrase = mistake.correct_phrase.clone();
            if mistake.rule.is_some() {
                found.rule = mistake.rule.clone();
            }
            if mistake.category.is_some() {
                found.category = mistake.category.clone();
            }
            if mistake.explanation.is_some() {
                found.explanation = mistake.explanation.clone();
            }
            return Ok(found.clone());
        }

        let created = Mistake {
            id: Uuid::new_v4(),
            user_id,
            wrong_phrase: mistake.wrong_phrase.clone(),
            correct_phrase: mistake.correct_phrase.clone(),
            rule: mistake.rule.clone(),
            category: mistake.category.clone(),
            explanation: mistake.explanation.clone(),
            count: 1,
            last_seen: now,
        };
        store.mistakes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<Mistake>> {
        let store = self.store.lock().await;
        let mut mistakes: Vec<Mistake> = store
            .mistakes
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut mistakes, |m| m.last_seen);
        Ok(mistakes)
    }

    async fn top_mistakes(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<Mistake>> {
        let mut mistakes = self.list_mistakes(user_id).await?;
        // Stable sort keeps the recency order among equal counts.
        mistakes.sort_by(|a, b| b.count.cmp(&a.count));
        mistakes.truncate(limit);
        Ok(mistakes)
    }

    async fn count_mistakes(&self, user_id: Uuid) -> PortResult<u64> {
        let store = self.store.lock().await;
        Ok(store.mistakes.values().filter(|m| m.user_id == user_id).count() as u64)
    }

    async fn get_mistake(&self, mistake_id: Uuid) -> PortResult<Mistake> {
        let store = self.store.lock().await;
        store
            .mistakes
            .get(&mistake_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Mistake".to_string()))
    }

    async fn delete_mistake(&self, mistake_id: Uuid) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store
            .mistakes
            .remove(&mistake_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound("Mistake".to_string()))
    }

    async fn save_sentence_history(&self, history: &SentenceHistory) -> PortResult<()> {
        self.store.lock().await.history.push(history.clone());
        Ok(())
    }

    async fn count_sentence_history(&self, user_id: Uuid) -> PortResult<u64> {
        let store = self.store.lock().await;
        Ok(store.history.iter().filter(|h| h.user_id == user_id).count() as u64)
    }

    async fn recent_sentence_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<SentenceHistory>> {
        let store = self.store.lock().await;
        let mut entries: Vec<SentenceHistory> = store
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut entries, |h| h.created_at);
        entries.truncate(limit);
        Ok(entries)
    }

    // --- Interview sessions ---

    async fn create_interview(&self, session: &InterviewSession) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.interviews.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_interview(&self, session_id: Uuid) -> PortResult<InterviewSession> {
        let store = self.store.lock().await;
        store
            .interviews
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Session".to_string()))
    }

    async fn list_interviews(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<InterviewSession>> {
        let store = self.store.lock().await;
        let mut sessions: Vec<InterviewSession> = store
            .interviews
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut sessions, |s| s.last_updated);
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn list_interview_summaries(&self, user_id: Uuid) -> PortResult<Vec<InterviewSummary>> {
        Ok(self
            .list_interviews(user_id, usize::MAX)
            .await?
            .into_iter()
            .map(|s| InterviewSummary {
                id: s.id,
                title: s.title,
                created_at: s.created_at,
                last_updated: s.last_updated,
            })
            .collect())
    }

    async fn delete_interview(&self, session_id: Uuid) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store
            .interviews
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound("Session".to_string()))
    }

    async fn append_interview_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let session = store.interview_mut(session_id)?;
        session.messages.extend_from_slice(turns);
        session.last_updated = Utc::now();
        Ok(())
    }

    async fn record_interview_turn(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
        progress: InterviewProgress,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let session = store.interview_mut(session_id)?;
        if session.version != expected_version {
            return Err(PortError::Conflict(format!("Session {}", session_id)));
        }
        session.messages.extend_from_slice(turns);
        session.progress = progress;
        session.version += 1;
        session.last_updated = Utc::now();
        Ok(())
    }

    async fn save_interview_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let session = store.interview_mut(session_id)?;
        session.final_report = Some(report.clone());
        session.ended_at = Some(ended_at);
        session.version += 1;
        session.last_updated = Utc::now();
        Ok(())
    }

    // --- Debate sessions ---

    async fn create_debate(&self, session: &DebateSession) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.debates.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_debate(&self, session_id: Uuid) -> PortResult<DebateSession> {
        let store = self.store.lock().await;
        store
            .debates
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Debate".to_string()))
    }

    async fn list_debates(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<DebateSession>> {
        let store = self.store.lock().await;
        let mut debates: Vec<DebateSession> = store
            .debates
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut debates, |d| d.started_at);
        debates.truncate(limit);
        Ok(debates)
    }

    async fn append_debate_turns(
        &self,
        session_id: Uuid,
        expected_version: i64,
        turns: &[Turn],
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let debate = store.debate_mut(session_id)?;
        if debate.version != expected_version {
            return Err(PortError::Conflict(format!("Debate {}", session_id)));
        }
        debate.turns.extend_from_slice(turns);
        debate.version += 1;
        Ok(())
    }

    async fn save_debate_report(
        &self,
        session_id: Uuid,
        report: &Value,
        ended_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let debate = store.debate_mut(session_id)?;
        debate.final_feedback = Some(report.clone());
        debate.ended_at = Some(ended_at);
        debate.version += 1;
        Ok(())
    }

    // --- Roleplay and tutor sessions ---

    async fn save_roleplay(&self, session: &RoleplaySession) -> PortResult<()> {
        self.store.lock().await.roleplays.push(session.clone());
        Ok(())
    }

    async fn list_roleplays(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<RoleplaySession>> {
        let store = self.store.lock().await;
        let mut sessions: Vec<RoleplaySession> = store
            .roleplays
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut sessions, |r| r.created_at);
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn find_active_tutor_session(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Option<TutorSession>> {
        let store = self.store.lock().await;
        Ok(store
            .tutors
            .values()
            .filter(|t| t.user_id == user_id && t.last_updated > since)
            .max_by_key(|t| t.last_updated)
            .cloned())
    }

    async fn create_tutor_session(&self, session: &TutorSession) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.tutors.insert(session.id, session.clone());
        Ok(())
    }

    async fn append_tutor_turns(&self, session_id: Uuid, turns: &[Turn]) -> PortResult<()> {
        let mut store = self.store.lock().await;
        let session = store
            .tutors
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound("Tutor session".to_string()))?;
        session.messages.extend_from_slice(turns);
        session.last_updated = Utc::now();
        Ok(())
    }

    async fn list_tutor_sessions(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<TutorSession>> {
        let store = self.store.lock().await;
        let mut sessions: Vec<TutorSession> = store
            .tutors
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut sessions, |t| t.last_updated);
        sessions.truncate(limit);
        Ok(sessions)
    }

    // --- Daily words ---

    async fn get_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>> {
        Ok(self.store.lock().await.daily_words.get(&date).cloned())
    }

    async fn daily_words_since(&self, from: NaiveDate) -> PortResult<Vec<DailyWord>> {
        let store = self.store.lock().await;
        Ok(store.daily_words.range(from..).map(|(_, w)| w.clone()).collect())
    }

    async fn insert_daily_words(&self, words: &[DailyWord]) -> PortResult<()> {
        let mut store = self.store.lock().await;
        for word in words {
            store
                .daily_words
                .entry(word.date)
                .or_insert_with(|| word.clone());
        }
        Ok(())
    }

    async fn delete_daily_word(&self, date: NaiveDate) -> PortResult<Option<DailyWord>> {
        Ok(self.store.lock().await.daily_words.remove(&date))
    }

    // --- Flashcards ---

    async fn list_flashcards(&self, user_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let store = self.store.lock().await;
        let mut cards: Vec<Flashcard> = store
            .flashcards
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut cards, |c| c.created_at);
        Ok(cards)
    }

    async fn create_flashcard(&self, card: &Flashcard) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.flashcards.insert(card.id, card.clone());
        Ok(())
    }

    async fn get_flashcard(&self, card_id: Uuid) -> PortResult<Flashcard> {
        let store = self.store.lock().await;
        store
            .flashcards
            .get(&card_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Flashcard".to_string()))
    }

    async fn update_flashcard_mastery(
        &self,
        card_id: Uuid,
        mastery: u8,
        next_review: DateTime<Utc>,
    ) -> PortResult<Flashcard> {
        let mut store = self.store.lock().await;
        let card = store
            .flashcards
            .get_mut(&card_id)
            .ok_or_else(|| PortError::NotFound("Flashcard".to_string()))?;
        card.mastery = mastery;
        card.next_review = next_review;
        Ok(card.clone())
    }

    async fn delete_flashcard(&self, card_id: Uuid) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store
            .flashcards
            .remove(&card_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound("Flashcard".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use english_coach_core::interview::InterviewType;
    use english_coach_core::Difficulty;

    async fn user(db: &MemoryAdapter) -> User {
        db.create_user(NewUser {
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            password_hash: None,
            google_id: None,
            avatar: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let db = MemoryAdapter::new();
        let first = user(&db).await;
        let err = db
            .create_user(NewUser {
                name: "Other".to_string(),
                email: first.email.clone(),
                password_hash: None,
                google_id: None,
                avatar: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(ref f) if f == "email"));
    }

    #[tokio::test]
    async fn repeated_mistakes_accumulate_on_one_record() {
        let db = MemoryAdapter::new();
        let owner = user(&db).await;
        let input = MistakeInput::new("He go", "He goes", None, None, None);
        for _ in 0..4 {
            db.upsert_mistake(owner.id, &input).await.unwrap();
        }
        let mistakes = db.list_mistakes(owner.id).await.unwrap();
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0].count, 4);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let db = MemoryAdapter::new();
        let owner = user(&db).await;
        let session = InterviewSession::new(
            owner.id,
            InterviewType::General,
            Difficulty::Medium,
            String::new(),
            String::new(),
        );
        db.create_interview(&session).await.unwrap();

        let next = session.progress.advance(session.interview_type, 6.0);
        db.record_interview_turn(session.id, 0, &[Turn::user("hello")], next)
            .await
            .unwrap();
        let err = db
            .record_interview_turn(session.id, 0, &[Turn::user("again")], next)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        let stored = db.get_interview(session.id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn existing_daily_words_are_kept() {
        let db = MemoryAdapter::new();
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let word = |w: &str| DailyWord {
            date,
            word: w.to_string(),
            pronunciation: String::new(),
            definition: String::new(),
            hindi_meaning: String::new(),
            examples: vec![],
        };
        db.insert_daily_words(&[word("serene")]).await.unwrap();
        db.insert_daily_words(&[word("replaced")]).await.unwrap();
        assert_eq!(db.get_daily_word(date).await.unwrap().unwrap().word, "serene");
    }
}
