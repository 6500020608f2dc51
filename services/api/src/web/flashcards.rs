//! services/api/src/web/flashcards.rs

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use english_coach_core::domain::{Flashcard, MAX_MASTERY};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::AuthUser;
use crate::web::rest::{ensure_owner, MessageResponse};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateFlashcardRequest {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub definition: String,
    pub example: Option<String>,
    pub pronunciation: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateMasteryRequest {
    pub mastery: i64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_mastery(mastery: i64) -> ApiResult<u8> {
    u8::try_from(mastery)
        .ok()
        .filter(|m| *m <= MAX_MASTERY)
        .ok_or_else(|| ApiError::validation("Mastery must be between 0 and 3"))
}

async fn owned_card(state: &AppState, card_id: Uuid, user_id: Uuid) -> ApiResult<Flashcard> {
    let card = state.db.get_flashcard(card_id).await?;
    ensure_owner(card.user_id, user_id)?;
    Ok(card)
}

/// GET /api/flashcards - The user's flashcards, newest first
#[utoipa::path(
    get,
    path = "/api/flashcards",
    responses((status = 200, description = "Flashcards")),
    security(("bearer" = []))
)]
pub async fn list_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Flashcard>>> {
    Ok(Json(state.db.list_flashcards(user_id).await?))
}

/// POST /api/flashcards - Save a word as a flashcard
#[utoipa::path(
    post,
    path = "/api/flashcards",
    request_body = CreateFlashcardRequest,
    responses(
        (status = 200, description = "The new flashcard"),
        (status = 400, description = "Missing word or definition")
    ),
    security(("bearer" = []))
)]
pub async fn create_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CreateFlashcardRequest>,
) -> ApiResult<Json<Flashcard>> {
    let word = req.word.trim();
    let definition = req.definition.trim();
    if word.is_empty() || definition.is_empty() {
        return Err(ApiError::validation("Please provide a word and its definition"));
    }

    let now = Utc::now();
    let card = Flashcard {
        id: Uuid::new_v4(),
        user_id,
        word: word.to_string(),
        definition: definition.to_string(),
        example: non_empty(req.example),
        pronunciation: non_empty(req.pronunciation),
        mastery: 0,
        next_review: now,
        created_at: now,
    };
    state.db.create_flashcard(&card).await?;
    Ok(Json(card))
}

/// PUT /api/flashcards/{id} - Record how well the word is known
#[utoipa::path(
    put,
    path = "/api/flashcards/{id}",
    params(("id" = Uuid, Path, description = "Flashcard id")),
    request_body = UpdateMasteryRequest,
    responses(
        (status = 200, description = "The updated flashcard"),
        (status = 400, description = "Mastery out of range"),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Flashcard not found")
    ),
    security(("bearer" = []))
)]
pub async fn update_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(card_id): Path<Uuid>,
    Json(req): Json<UpdateMasteryRequest>,
) -> ApiResult<Json<Flashcard>> {
    let mastery = validate_mastery(req.mastery)?;
    owned_card(&state, card_id, user_id).await?;
    let card = state
        .db
        .update_flashcard_mastery(card_id, mastery, Utc::now())
        .await?;
    Ok(Json(card))
}

/// DELETE /api/flashcards/{id} - Delete a flashcard
#[utoipa::path(
    delete,
    path = "/api/flashcards/{id}",
    params(("id" = Uuid, Path, description = "Flashcard id")),
    responses(
        (status = 200, description = "Flashcard removed", body = MessageResponse),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Flashcard not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(card_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    owned_card(&state, card_id, user_id).await?;
    state.db.delete_flashcard(card_id).await?;
    Ok(Json(MessageResponse::new("Flashcard removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mastery_is_bounded() {
        assert_eq!(validate_mastery(0).unwrap(), 0);
        assert_eq!(validate_mastery(3).unwrap(), 3);
        assert!(validate_mastery(4).is_err());
        assert!(validate_mastery(-1).is_err());
    }
}
