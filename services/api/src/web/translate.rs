//! services/api/src/web/translate.rs

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: String,
    /// `"hi"` for Hindi; anything else translates to English.
    #[serde(default)]
    pub target_lang: String,
}

#[derive(Serialize, ToSchema)]
pub struct TranslateResponse {
    pub translation: String,
}

fn target_language(code: &str) -> &'static str {
    if code == "hi" {
        "Hindi"
    } else {
        "English"
    }
}

/// POST /api/translate - Translate between English and Hindi
#[utoipa::path(
    post,
    path = "/api/translate",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "Translated text", body = TranslateResponse),
        (status = 400, description = "Missing text")
    ),
    security(("bearer" = []))
)]
pub async fn translate_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<TranslateRequest>,
) -> ApiResult<Json<TranslateResponse>> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::validation("Please provide text to translate"));
    }

    let prompt = format!(
        r#"Translate the following text to {}.
If the target is English, ensure it is natural and grammatically correct.
If the target is Hindi, use natural spoken Hindi script (Devanagari).
Return ONLY the translated text, no other commentary.

Text: "{}""#,
        target_language(&req.target_lang),
        text
    );
    let translation = state.generate_text(&prompt).await?;
    record_usage(&state, user_id).await;
    Ok(Json(TranslateResponse { translation }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hi_selects_hindi() {
        assert_eq!(target_language("hi"), "Hindi");
        assert_eq!(target_language("en"), "English");
        assert_eq!(target_language(""), "English");
    }
}
