//! services/api/src/web/tutor.rs
//!
//! Free-form tutor chat. Consecutive messages within an hour share one session.

use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use english_coach_core::domain::{TutorSession, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::rest::{format_history, ChatLine};
use crate::web::state::AppState;

const CONTEXT_MESSAGES: usize = 6;
const SESSION_IDLE_MINUTES: i64 = 60;

#[derive(Deserialize, ToSchema)]
pub struct TutorChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatLine>,
}

#[derive(Serialize, ToSchema)]
pub struct TutorChatResponse {
    pub reply: String,
}

fn tutor_prompt(message: &str, history: &[ChatLine]) -> String {
    let recent = &history[history.len().saturating_sub(CONTEXT_MESSAGES)..];
    let context = if recent.is_empty() {
        String::new()
    } else {
        format!(
            "Previous conversation for context:\n{}",
            format_history(recent, "User", "AI")
        )
    };
    format!(
        r#"You are a helpful, friendly, and knowledgeable AI English Tutor.
{context}
User: "{message}"

Respond to the user naturally. Correct any grammar mistakes if they are significant, but prioritize keeping the conversation flowing.
If you correct a mistake, do it gently at the end of your response.
Keep your response concise and engaging."#
    )
}

/// POST /api/tutor/chat - Talk to the tutor
#[utoipa::path(
    post,
    path = "/api/tutor/chat",
    request_body = TutorChatRequest,
    responses(
        (status = 200, description = "Tutor reply", body = TutorChatResponse),
        (status = 400, description = "Missing message"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn tutor_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<TutorChatRequest>,
) -> ApiResult<Json<TutorChatResponse>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::validation("Please provide a message"));
    }

    let reply = state.generate_text(&tutor_prompt(message, &req.history)).await?;
    record_usage(&state, user_id).await;

    let turns = [Turn::user(message), Turn::ai(reply.clone())];
    let since = Utc::now() - Duration::minutes(SESSION_IDLE_MINUTES);
    match state.db.find_active_tutor_session(user_id, since).await? {
        Some(session) => {
            debug!(session_id = %session.id, "Continuing tutor session");
            state.db.append_tutor_turns(session.id, &turns).await?;
        }
        None => {
            let now = Utc::now();
            let session = TutorSession {
                id: Uuid::new_v4(),
                user_id,
                messages: turns.to_vec(),
                created_at: now,
                last_updated: now,
            };
            debug!(session_id = %session.id, "Starting tutor session");
            state.db.create_tutor_session(&session).await?;
        }
    }

    Ok(Json(TutorChatResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(role: &str, content: &str) -> ChatLine {
        ChatLine {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn only_the_last_six_messages_are_sent() {
        let history: Vec<ChatLine> = (0..8).map(|i| line("user", &format!("msg{}", i))).collect();
        let prompt = tutor_prompt("hello", &history);
        assert!(!prompt.contains("msg1\n"));
        assert!(prompt.contains("User: msg2\n"));
        assert!(prompt.contains("User: msg7\n"));
    }

    #[test]
    fn empty_history_has_no_context_block() {
        let prompt = tutor_prompt("hello", &[]);
        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.contains(r#"User: "hello""#));
    }
}
