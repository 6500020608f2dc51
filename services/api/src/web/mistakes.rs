//! services/api/src/web/mistakes.rs
//!
//! The user's tracked mistakes.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use english_coach_core::domain::{Mistake, MistakeStats};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::middleware::AuthUser;
use crate::web::rest::{ensure_owner, MessageResponse};
use crate::web::state::AppState;

const TOP_MISTAKES: usize = 5;

pub async fn mistake_stats(state: &AppState, user_id: Uuid) -> ApiResult<MistakeStats> {
    Ok(MistakeStats {
        total_mistakes: state.db.count_mistakes(user_id).await?,
        total_sentences: state.db.count_sentence_history(user_id).await?,
        top_mistakes: state.db.top_mistakes(user_id, TOP_MISTAKES).await?,
    })
}

/// GET /api/mistakes - All tracked mistakes, most recently seen first
#[utoipa::path(
    get,
    path = "/api/mistakes",
    responses((status = 200, description = "Tracked mistakes")),
    security(("bearer" = []))
)]
pub async fn list_mistakes_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Mistake>>> {
    Ok(Json(state.db.list_mistakes(user_id).await?))
}

/// GET /api/mistakes/stats - Mistake and sentence counts
#[utoipa::path(
    get,
    path = "/api/mistakes/stats",
    responses((status = 200, description = "Progress statistics")),
    security(("bearer" = []))
)]
pub async fn mistake_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<MistakeStats>> {
    Ok(Json(mistake_stats(&state, user_id).await?))
}

/// DELETE /api/mistakes/{id} - Stop tracking a mistake
#[utoipa::path(
    delete,
    path = "/api/mistakes/{id}",
    params(("id" = Uuid, Path, description = "Mistake id")),
    responses(
        (status = 200, description = "Mistake removed", body = MessageResponse),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Mistake not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_mistake_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(mistake_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let mistake = state.db.get_mistake(mistake_id).await?;
    ensure_owner(mistake.user_id, user_id)?;
    state.db.delete_mistake(mistake_id).await?;
    Ok(Json(MessageResponse::new("Mistake removed")))
}
