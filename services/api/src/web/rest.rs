//! services/api/src/web/rest.rs
//!
//! Shared REST plumbing: the master definition for the OpenAPI specification,
//! the service-level handlers, and payload types several features use.

use axum::{
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use english_coach_core::domain::{Role, Turn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::{
    analyze, auth, daily, debate, flashcards, history, interview, mistakes, roleplay, translate,
    tutor,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::usage_handler,
        auth::me_handler,
        auth::update_profile_handler,
        auth::change_password_handler,
        auth::forgot_password_handler,
        auth::reset_password_handler,
        auth::google_login_handler,
        auth::google_callback_handler,
        analyze::analyze_handler,
        analyze::examples_handler,
        analyze::stats_handler,
        mistakes::list_mistakes_handler,
        mistakes::mistake_stats_handler,
        mistakes::delete_mistake_handler,
        translate::translate_handler,
        interview::start_interview_handler,
        interview::interview_history_handler,
        interview::get_interview_handler,
        interview::delete_interview_handler,
        interview::question_handler,
        interview::evaluate_handler,
        interview::end_interview_handler,
        roleplay::start_roleplay_handler,
        roleplay::roleplay_chat_handler,
        roleplay::roleplay_feedback_handler,
        history::history_handler,
        daily::daily_word_handler,
        tutor::tutor_chat_handler,
        flashcards::list_flashcards_handler,
        flashcards::create_flashcard_handler,
        flashcards::update_flashcard_handler,
        flashcards::delete_flashcard_handler,
        debate::init_debate_handler,
        debate::start_debate_handler,
        debate::debate_turn_handler,
        debate::end_debate_handler,
    ),
    components(
        schemas(
            MessageResponse,
            ChatLine,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::UserView,
            auth::UpdateProfileRequest,
            auth::ChangePasswordRequest,
            auth::ForgotPasswordRequest,
            auth::ForgotPasswordResponse,
            auth::ResetPasswordRequest,
            analyze::AnalyzeRequest,
            analyze::ExamplesRequest,
            translate::TranslateRequest,
            translate::TranslateResponse,
            interview::QuestionRequest,
            interview::QuestionResponse,
            interview::EvaluateRequest,
            interview::EndInterviewRequest,
            roleplay::StartRoleplayRequest,
            roleplay::RoleplayChatRequest,
            roleplay::RoleplayFeedbackRequest,
            history::HistoryEntry,
            history::ActivityKind,
            tutor::TutorChatRequest,
            tutor::TutorChatResponse,
            flashcards::CreateFlashcardRequest,
            flashcards::UpdateMasteryRequest,
            debate::InitDebateRequest,
            debate::InitDebateResponse,
            debate::StartDebateRequest,
            debate::StartDebateResponse,
            debate::Strategy,
            debate::DebateTurnRequest,
            debate::DebateTurnResponse,
            debate::EndDebateRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "English Coach API", description = "API endpoints for the English learning assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Payloads
//=========================================================================================

/// A bare confirmation, e.g. `{"msg": "Mistake removed"}`.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// A chat message as the client keeps it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatLine {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatLine {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn to_turn(&self) -> Turn {
        let role = match self.role.as_str() {
            "user" => Role::User,
            "system" => Role::System,
            _ => Role::Ai,
        };
        Turn::new(role, self.content.clone())
    }
}

/// Renders chat lines as `Label: content` lines, one per message.
pub fn format_history(lines: &[ChatLine], user_label: &str, other_label: &str) -> String {
    lines
        .iter()
        .map(|line| {
            let label = if line.is_user() { user_label } else { other_label };
            format!("{}: {}\n", label, line.content)
        })
        .collect()
}

//=========================================================================================
// Shared Checks
//=========================================================================================

pub fn ensure_owner(owner: Uuid, caller: Uuid) -> ApiResult<()> {
    if owner == caller {
        Ok(())
    } else {
        Err(ApiError::NotOwner)
    }
}

/// Parses a lowercase enum choice such as a difficulty. Blank selects the default.
pub fn parse_choice<T: DeserializeOwned + Default>(raw: &str, what: &str) -> ApiResult<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|_| ApiError::validation(format!("Invalid {}", what)))
}

//=========================================================================================
// Service Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> &'static str {
    "OK"
}

pub async fn root_handler() -> &'static str {
    "API is running..."
}

#[derive(Serialize)]
struct NotFoundBody {
    success: bool,
    msg: String,
}

pub async fn not_found_handler(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundBody {
            success: false,
            msg: format!("Route not found: {} {}", method, uri.path()),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use english_coach_core::domain::Difficulty;

    #[test]
    fn choices_parse_case_insensitively_with_default() {
        assert_eq!(parse_choice::<Difficulty>("Hard", "difficulty").unwrap(), Difficulty::Hard);
        assert_eq!(parse_choice::<Difficulty>("  ", "difficulty").unwrap(), Difficulty::Medium);
        let err = parse_choice::<Difficulty>("extreme", "difficulty").unwrap_err();
        assert_eq!(err.status_and_message().1, "Invalid difficulty");
    }

    #[test]
    fn ownership_is_exact() {
        let me = Uuid::new_v4();
        assert!(ensure_owner(me, me).is_ok());
        assert!(matches!(ensure_owner(me, Uuid::new_v4()), Err(ApiError::NotOwner)));
    }

    #[test]
    fn history_lines_use_role_labels() {
        let lines = vec![
            ChatLine { role: "user".into(), content: "Hi".into() },
            ChatLine { role: "ai".into(), content: "Hello!".into() },
        ];
        assert_eq!(format_history(&lines, "User", "AI"), "User: Hi\nAI: Hello!\n");
        assert_eq!(lines[1].to_turn().role, Role::Ai);
    }

    #[test]
    fn openapi_document_lists_the_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/interview/evaluate"));
        assert!(doc.paths.paths.contains_key("/api/flashcards/{id}"));
    }
}
