//! services/api/src/web/roleplay.rs
//!
//! Scripted real-life scenarios played against the model.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use english_coach_core::domain::{Difficulty, RoleplaySession};
use english_coach_core::recovery::{recover, Shape};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::rest::{format_history, ChatLine};
use crate::web::state::AppState;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub title: &'static str,
    pub base_prompt: &'static str,
    pub goal: &'static str,
    pub initial_message: &'static str,
}

const SCENARIOS: &[(&str, Scenario)] = &[
    (
        "cafe",
        Scenario {
            title: "Coffee Shop",
            base_prompt: "You are a friendly barista at 'Star Beans'.",
            goal: "Order a drink and confirm payment.",
            initial_message: "Hi there! Welcome to Star Beans. What can I get started for you today?",
        },
    ),
    (
        "doctor",
        Scenario {
            title: "Doctor's Appointment",
            base_prompt: "You are a helpful doctor. The user is a patient.",
            goal: "Describe symptoms and get a diagnosis.",
            initial_message: "Good morning. I see you have an appointment. What seems to be the trouble today?",
        },
    ),
    (
        "job_negotiation",
        Scenario {
            title: "Salary Negotiation",
            base_prompt: "You are a tough but fair hiring manager.",
            goal: "Negotiate a higher salary after a job offer.",
            initial_message: "We're really excited to offer you the position. The starting salary is $60,000. What are your thoughts?",
        },
    ),
    (
        "airport",
        Scenario {
            title: "Airport Check-in",
            base_prompt: "You are an airline check-in agent.",
            goal: "Check in for a flight and handle luggage.",
            initial_message: "Next please! Hello, where are you flying to today?",
        },
    ),
];

pub fn scenario(key: &str) -> Option<&'static Scenario> {
    SCENARIOS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, scenario)| scenario)
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct StartRoleplayRequest {
    #[serde(default)]
    pub scenario: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoleplayResponse {
    pub message: &'static str,
    pub scenario_config: Scenario,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleplayChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatLine>,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub difficulty: Difficulty,
    /// `"off"` disables grammar corrections.
    #[serde(default)]
    pub correction_mode: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RoleplayFeedbackRequest {
    #[serde(default)]
    pub history: Vec<ChatLine>,
    #[serde(default)]
    pub scenario: String,
}

//=========================================================================================
// Prompts
//=========================================================================================

fn difficulty_instruction(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "Speak in short, simple sentences. Speak slowly. Be very helpful/patient.",
        Difficulty::Medium => "Speak naturally like a native speaker. Normal speed.",
        Difficulty::Hard => {
            "Speak fast, use idioms/slang suitable for the context. Be less patient or stricter \
             if the role implies it (e.g., busy waiter). Apply real-life pressure."
        }
    }
}

fn chat_prompt(config: &Scenario, req: &RoleplayChatRequest) -> String {
    let corrections = match req.correction_mode.as_deref() {
        None | Some("off") => "Ignore the correction field (return null).",
        Some(_) => "Provide soft corrections in the \"correction\" field.",
    };
    format!(
        r#"Role: {role}
User's Goal: {goal}
Your Task: Roleplay with the user.
- {difficulty}
- Push the conversation forward towards the goal.
- If the user fails or gets stuck, guide them.

OUTPUT FORMAT: Return a JSON object ONLY.
{{
    "response": "Your spoken reply to the user...",
    "suggestion": "A better/more native phrase the user COULD have said instead of their last message (null if perfect)",
    "correction": "Soft grammar correction if needed (null if perfect). Be gentle."
}}

{corrections}

Conversation History:
{history}User: {message}
Roleplayer: (JSON)"#,
        role = config.base_prompt,
        goal = config.goal,
        difficulty = difficulty_instruction(req.difficulty),
        history = format_history(&req.history, "User", "Roleplayer"),
        message = req.message.trim(),
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/roleplay/start - Opening line for a scenario
#[utoipa::path(
    post,
    path = "/api/roleplay/start",
    request_body = StartRoleplayRequest,
    responses(
        (status = 200, description = "Opening line and scenario configuration"),
        (status = 400, description = "Invalid scenario")
    ),
    security(("bearer" = []))
)]
pub async fn start_roleplay_handler(
    Json(req): Json<StartRoleplayRequest>,
) -> ApiResult<Json<StartRoleplayResponse>> {
    let config = scenario(&req.scenario).ok_or_else(|| ApiError::validation("Invalid scenario"))?;
    Ok(Json(StartRoleplayResponse {
        message: config.initial_message,
        scenario_config: *config,
    }))
}

/// POST /api/roleplay/chat - Continue the roleplay
#[utoipa::path(
    post,
    path = "/api/roleplay/chat",
    request_body = RoleplayChatRequest,
    responses(
        (status = 200, description = "Reply with optional suggestion and correction"),
        (status = 400, description = "Invalid request"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn roleplay_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<RoleplayChatRequest>,
) -> ApiResult<Json<Value>> {
    let config = scenario(&req.scenario)
        .filter(|_| !req.message.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Invalid request"))?;

    let raw = state
        .generator
        .generate(&chat_prompt(config, &req), true)
        .await?;
    let result = match recover(&raw, Shape::Object) {
        Ok(value) => value,
        // An unstructured reply is still a usable line of dialogue.
        Err(e) => {
            warn!(%user_id, error = %e, "Roleplay reply was not JSON; using it verbatim");
            json!({ "response": raw.trim(), "suggestion": null, "correction": null })
        }
    };
    record_usage(&state, user_id).await;
    Ok(Json(result))
}

/// POST /api/roleplay/feedback - Analyse a finished roleplay and save it
#[utoipa::path(
    post,
    path = "/api/roleplay/feedback",
    request_body = RoleplayFeedbackRequest,
    responses(
        (status = 200, description = "Score, feedback and improvements"),
        (status = 400, description = "Invalid scenario"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn roleplay_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<RoleplayFeedbackRequest>,
) -> ApiResult<Json<Value>> {
    if scenario(&req.scenario).is_none() {
        return Err(ApiError::validation("Invalid scenario"));
    }

    let transcript = serde_json::to_string(&req.history)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let prompt = format!(
        r#"You are an English communication coach. The user just finished a roleplay scenario: "{}".
Here is the transcript:
{}

Please analyze their performance. Return a JSON object with:
1. "score" (0-10)
2. "feedback" (General paragraph)
3. "improvements" (Array of objects: {{ "original": "...", "improved": "...", "reason": "..." }}) focusing on politeness, vocabulary, and grammar."#,
        req.scenario, transcript
    );
    let feedback = state.generate_json(&prompt, Shape::Object).await?;
    record_usage(&state, user_id).await;

    let session = RoleplaySession {
        id: Uuid::new_v4(),
        user_id,
        scenario: req.scenario.clone(),
        messages: req.history.iter().map(ChatLine::to_turn).collect(),
        feedback: feedback.clone(),
        created_at: Utc::now(),
    };
    state.db.save_roleplay(&session).await?;
    info!(session_id = %session.id, scenario = %session.scenario, "Roleplay saved");
    Ok(Json(feedback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_scenarios_resolve() {
        assert_eq!(scenario("cafe").map(|s| s.title), Some("Coffee Shop"));
        assert!(scenario("job_negotiation").is_some());
        assert!(scenario("moon_base").is_none());
    }

    #[test]
    fn chat_prompt_carries_history_and_correction_mode() {
        let req = RoleplayChatRequest {
            message: "A latte please".to_string(),
            history: vec![ChatLine {
                role: "ai".to_string(),
                content: "What can I get you?".to_string(),
            }],
            scenario: "cafe".to_string(),
            difficulty: Difficulty::Hard,
            correction_mode: Some("gentle".to_string()),
        };
        let prompt = chat_prompt(scenario("cafe").unwrap(), &req);
        assert!(prompt.contains("Roleplayer: What can I get you?\nUser: A latte please"));
        assert!(prompt.contains("idioms/slang"));
        assert!(prompt.contains("Provide soft corrections"));
    }
}
