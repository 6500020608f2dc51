//! services/api/src/web/history.rs
//!
//! One activity feed merged from every kind of practice the user has done.

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use english_coach_core::domain::Turn;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::AuthUser;
use crate::web::state::AppState;

const PRACTICE_LIMIT: usize = 20;
const SESSION_LIMIT: usize = 10;
const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Practice,
    Interview,
    Roleplay,
    Tutor,
    Debate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub date: DateTime<Utc>,
    pub title: String,
    pub preview: String,
    #[schema(value_type = Object)]
    pub details: Value,
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head)
}

fn first_turn_preview(turns: &[Turn], empty: &str) -> String {
    turns
        .first()
        .map(|t| preview(&t.content))
        .unwrap_or_else(|| empty.to_string())
}

fn entry(
    id: Uuid,
    kind: ActivityKind,
    date: DateTime<Utc>,
    title: String,
    preview: String,
    details: &impl Serialize,
) -> ApiResult<HistoryEntry> {
    Ok(HistoryEntry {
        id,
        kind,
        date,
        title,
        preview,
        details: serde_json::to_value(details).map_err(|e| ApiError::Internal(e.to_string()))?,
    })
}

/// Newest first across all kinds.
fn sort_feed(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date));
}

/// GET /api/history - Merged activity feed
#[utoipa::path(
    get,
    path = "/api/history",
    responses((status = 200, description = "Recent activity, newest first", body = Vec<HistoryEntry>)),
    security(("bearer" = []))
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let db = &state.db;
    let (practice, interviews, roleplays, tutors, debates) = tokio::try_join!(
        db.recent_sentence_history(user_id, PRACTICE_LIMIT),
        db.list_interviews(user_id, SESSION_LIMIT),
        db.list_roleplays(user_id, SESSION_LIMIT),
        db.list_tutor_sessions(user_id, SESSION_LIMIT),
        db.list_debates(user_id, SESSION_LIMIT),
    )?;

    let mut feed = Vec::new();
    for p in &practice {
        feed.push(entry(
            p.id,
            ActivityKind::Practice,
            p.created_at,
            "Grammar Check".to_string(),
            preview(&p.original),
            p,
        )?);
    }
    for i in &interviews {
        feed.push(entry(
            i.id,
            ActivityKind::Interview,
            i.created_at,
            "Interview Session".to_string(),
            first_turn_preview(&i.messages, "Empty session"),
            i,
        )?);
    }
    for r in &roleplays {
        feed.push(entry(
            r.id,
            ActivityKind::Roleplay,
            r.created_at,
            format!("Roleplay: {}", r.scenario),
            first_turn_preview(&r.messages, "Empty session"),
            r,
        )?);
    }
    for t in &tutors {
        feed.push(entry(
            t.id,
            ActivityKind::Tutor,
            t.created_at,
            "AI Tutor Chat".to_string(),
            first_turn_preview(&t.messages, "Empty session"),
            t,
        )?);
    }
    for d in &debates {
        feed.push(entry(
            d.id,
            ActivityKind::Debate,
            d.started_at,
            format!("Debate: {}", d.topic),
            first_turn_preview(&d.turns, "Empty debate"),
            d,
        )?);
    }

    sort_feed(&mut feed);
    Ok(Json(feed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn previews_cut_at_fifty_characters() {
        let long = "a".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "a".repeat(50)));
        assert_eq!(first_turn_preview(&[], "Empty debate"), "Empty debate");
    }

    #[test]
    fn feed_is_newest_first() {
        let now = Utc::now();
        let make = |kind, date| HistoryEntry {
            id: Uuid::new_v4(),
            kind,
            date,
            title: String::new(),
            preview: String::new(),
            details: Value::Null,
        };
        let mut feed = vec![
            make(ActivityKind::Practice, now - Duration::hours(2)),
            make(ActivityKind::Debate, now),
            make(ActivityKind::Tutor, now - Duration::hours(1)),
        ];
        sort_feed(&mut feed);
        let kinds: Vec<_> = feed.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Debate, ActivityKind::Tutor, ActivityKind::Practice]
        );
    }
}
