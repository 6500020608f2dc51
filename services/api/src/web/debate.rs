//! services/api/src/web/debate.rs
//!
//! Debate practice: topic selection, an opening statement, per-turn argument
//! analysis with a rebuttal, and a closing report.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use english_coach_core::domain::{DebateSession, Difficulty, Role, Turn};
use english_coach_core::recovery::{recover, str_field, Shape};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::rest::ensure_owner;
use crate::web::state::AppState;

const DEFAULT_SIDES: [&str; 2] = ["Agree", "Disagree"];

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct InitDebateRequest {
    pub topic: Option<String>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub difficulty: Difficulty,
}

#[derive(Serialize, ToSchema)]
pub struct InitDebateResponse {
    pub topic: String,
    pub sides: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartDebateRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub user_stance: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartDebateResponse {
    pub session_id: Uuid,
    pub topic: String,
    pub opening_statement: String,
}

/// How the opponent argues back.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Strategy {
    /// `defend`, `attack` or `balanced`.
    pub mode: String,
    /// 0.0 to 1.0.
    #[serde(default)]
    pub aggression: f64,
    #[serde(default)]
    pub depth: u32,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebateTurnRequest {
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub message: String,
    pub strategy: Option<Strategy>,
}

#[derive(Serialize, ToSchema)]
pub struct DebateTurnResponse {
    pub reply: String,
    #[schema(value_type = Object)]
    pub feedback: Value,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndDebateRequest {
    pub session_id: Option<Uuid>,
}

//=========================================================================================
// Prompts
//=========================================================================================

fn topic_prompt(difficulty: Difficulty) -> String {
    match difficulty {
        Difficulty::Easy => format!(
            r#"You are a topic generator for beginner English learners.
Generate a completely new, random, simple debate topic.
Random Seed: {} (Use this to ensure variety).
Constraints:
- Max 4-7 words.
- Use only simple vocabulary (A1 Level).
- NEVER generate topics about "Cats" or "Dogs".
- VARY the subject.
Return ONLY the topic sentence."#,
            rand::random::<f64>()
        ),
        other => format!(
            "Generate a controversial but safe topic for an English debate practice session. \
             Difficulty: {}. Return ONLY the topic sentence.",
            other.as_str()
        ),
    }
}

/// Two non-empty strings, or the default sides.
fn parse_sides(value: Option<Value>) -> Vec<String> {
    let sides: Vec<String> = value
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if sides.len() == 2 {
        sides
    } else {
        DEFAULT_SIDES.iter().map(|s| s.to_string()).collect()
    }
}

fn vocabulary_instruction(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "- Vocabulary: A2 (Elementary). Simple sentences.",
        Difficulty::Medium => "- Vocabulary: B1/B2 (Intermediate). Professional tone.",
        Difficulty::Hard => "- Vocabulary: C1/C2 (Advanced). Sophisticated and precise.",
    }
}

fn strategy_instruction(strategy: Option<&Strategy>, difficulty: Difficulty) -> String {
    match strategy {
        Some(strategy) => format!(
            r#"STRATEGY MODE: {}
AGGRESSION LEVEL: {}%
ANALYSIS DEPTH: Level {}

BEHAVIOR GUIDELINES:
- If Mode is 'defend': Be polite, focus on finding common ground, correct gently.
- If Mode is 'attack': Be sharp, relentlessly find flaws, ask trapping questions.
- If Mode is 'balanced': Mix agreement with constructive counter-points."#,
            strategy.mode.to_uppercase(),
            (strategy.aggression.clamp(0.0, 1.0) * 100.0).round(),
            strategy.depth
        ),
        None => format!("Maintain a {} vocabulary level.", difficulty.as_str()),
    }
}

/// The rebuttal prompt for `turns`, whose last entry is the opponent's new argument.
fn rebuttal_prompt(session: &DebateSession, turns: &[Turn], strategy: Option<&Strategy>) -> String {
    let memory = turns
        .iter()
        .filter(|t| t.role == Role::User)
        .enumerate()
        .map(|(i, t)| format!("User Turn {}: \"{}\"", i + 1, t.content))
        .collect::<Vec<_>>()
        .join("\n");
    let dialogue = turns
        .iter()
        .map(|t| {
            let speaker = if t.role == Role::User { "Opponent" } else { "You" };
            format!("{}: {}", speaker, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mode = strategy.map(|s| s.mode.as_str()).unwrap_or("standard");

    format!(
        r#"You are debating about "{topic}".

PAST ARGUMENTS (Check for contradictions):
{memory}

Current Dialogue:
{dialogue}

Your Goal: DIRECTLY respond to the opponent's last point.

{strategy}
{vocabulary}

CRITICAL CONSTRAINT:
- MAXIMUM LENGTH: 200-400 characters (strictly enforced)
- Keep it concise and punchy - short debate turns, not long paragraphs

INSTRUCTIONS:
1. MEMORY CHECK: If USER contradicted previous statements, point it out briefly.
2. ACKNOWLEDGE: One sentence on their point.
3. COUNTER: Apply strategy mode ({mode}) - 1-2 sentences max.

IMPORTANT: Listen and Respond. No monologues. Be concise!
Return ONLY your text response (200-400 characters max)."#,
        topic = session.topic,
        strategy = strategy_instruction(strategy, session.difficulty),
        vocabulary = vocabulary_instruction(session.difficulty),
    )
}

async fn owned_debate(state: &AppState, session_id: Option<Uuid>, user_id: Uuid) -> ApiResult<DebateSession> {
    let session_id = session_id.ok_or_else(|| ApiError::validation("Please provide a sessionId"))?;
    let session = state.db.get_debate(session_id).await?;
    ensure_owner(session.user_id, user_id)?;
    Ok(session)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/debate/init - Pick a topic and its two sides
#[utoipa::path(
    post,
    path = "/api/debate/init",
    request_body = InitDebateRequest,
    responses(
        (status = 200, description = "Topic and sides", body = InitDebateResponse),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn init_debate_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<InitDebateRequest>,
) -> ApiResult<Json<InitDebateResponse>> {
    let topic = match req.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(topic) => topic.to_string(),
        None => state.generate_text(&topic_prompt(req.difficulty)).await?,
    };

    let sides_prompt = format!(
        r#"Topic: "{}"
Identify the two opposing sides of this debate.
Return JSON ONLY: ["Side A", "Side B"]
Example for "Cats vs Dogs": ["Cats", "Dogs"]
Example for "Homework is bad": ["Agree", "Disagree"]"#,
        topic
    );
    let raw = state.generator.generate(&sides_prompt, false).await?;
    record_usage(&state, user_id).await;

    let recovered = match recover(&raw, Shape::Array) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Debate sides were not a JSON array; using defaults");
            None
        }
    };
    Ok(Json(InitDebateResponse {
        topic,
        sides: parse_sides(recovered),
    }))
}

/// POST /api/debate/start - Opening statement against the user's stance
#[utoipa::path(
    post,
    path = "/api/debate/start",
    request_body = StartDebateRequest,
    responses(
        (status = 200, description = "The new debate", body = StartDebateResponse),
        (status = 400, description = "Missing topic or stance"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn start_debate_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<StartDebateRequest>,
) -> ApiResult<Json<StartDebateResponse>> {
    let topic = req.topic.trim();
    let stance = req.user_stance.trim();
    if topic.is_empty() || stance.is_empty() {
        return Err(ApiError::validation("Please provide a topic and your stance"));
    }

    let prompt = format!(
        r#"You are debating about "{topic}".
Difficulty Level: {difficulty}.
User's Stance: "{stance}".

Your Goal: You must argue AGAINST the user's stance.

CRITICAL CONSTRAINTS:
- MAXIMUM LENGTH: 200-400 characters (strictly enforced)
- Keep it punchy and concise - debate responses, not essays
- If difficulty is 'easy', use A2 (Elementary) level English
- Use simple, natural everyday words. Avoid complex academic terms
- WRITE 2-4 CLEAR, SHORT SENTENCES
- Example: "I disagree. [Opposite] is better because [1-2 reasons]."

Return ONLY your opening statement (200-400 characters max)."#,
        difficulty = req.difficulty.as_str(),
    );
    let opening = state.generate_text(&prompt).await?;
    record_usage(&state, user_id).await;

    let session = DebateSession::new(
        user_id,
        topic.to_string(),
        req.difficulty,
        Turn::ai(opening.clone()),
    );
    state.db.create_debate(&session).await?;
    info!(session_id = %session.id, "Debate started");

    Ok(Json(StartDebateResponse {
        session_id: session.id,
        topic: session.topic,
        opening_statement: opening,
    }))
}

/// POST /api/debate/turn - Analyse the user's argument and rebut it
#[utoipa::path(
    post,
    path = "/api/debate/turn",
    request_body = DebateTurnRequest,
    responses(
        (status = 200, description = "Rebuttal and argument analysis", body = DebateTurnResponse),
        (status = 400, description = "Missing message or debate already ended"),
        (status = 401, description = "Owned by another user"),
        (status = 409, description = "The debate changed concurrently"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn debate_turn_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<DebateTurnRequest>,
) -> ApiResult<Json<DebateTurnResponse>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::validation("Please provide your argument"));
    }
    let session = owned_debate(&state, req.session_id, user_id).await?;
    if session.ended_at.is_some() {
        return Err(ApiError::validation("This debate has already ended"));
    }

    let analysis_prompt = format!(
        r#"Analyze this user argument in a debate about "{}".
User Argument: "{}"

Return JSON ONLY:
{{
    "coherenceScore": 70,
    "strengthScore": 60,
    "fallacies": ["If a logical error is found, explain it in very simple English (A2 level). Example: 'You attacked the person instead of the idea.' instead of 'Ad Hominem'. Return empty array if good."],
    "feedback": "1 sentence quick tip to improve."
}}
coherenceScore (how logical) and strengthScore (how strong the point is) are integers from 1 to 100."#,
        session.topic, message
    );
    let analysis = state.generate_json(&analysis_prompt, Shape::Object).await?;

    let user_turn = Turn::user(message).with_evaluation(analysis.clone());
    let mut dialogue = session.turns.clone();
    dialogue.push(user_turn.clone());
    let reply = state
        .generate_text(&rebuttal_prompt(&session, &dialogue, req.strategy.as_ref()))
        .await?;

    state
        .db
        .append_debate_turns(session.id, session.version, &[user_turn, Turn::ai(reply.clone())])
        .await?;
    record_usage(&state, user_id).await;

    Ok(Json(DebateTurnResponse {
        reply,
        feedback: analysis,
    }))
}

/// POST /api/debate/end - Score the user's performance and close the debate
#[utoipa::path(
    post,
    path = "/api/debate/end",
    request_body = EndDebateRequest,
    responses(
        (status = 200, description = "Logic, vocabulary and fluency scores with a summary"),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Debate not found"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn end_debate_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<EndDebateRequest>,
) -> ApiResult<Json<Value>> {
    let session = owned_debate(&state, req.session_id, user_id).await?;

    let arguments = session
        .turns
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = format!(
        r#"Assess the user's debate performance based on these arguments:
"{}"

Return JSON ONLY:
{{
    "logicScore": 70,
    "vocabularyScore": 70,
    "fluencyScore": 70,
    "summary": "2-3 sentences summing up their strengths and weaknesses."
}}
Each score is an integer from 1 to 100."#,
        arguments
    );
    let report = state.generate_json(&prompt, Shape::Object).await?;
    record_usage(&state, user_id).await;

    state
        .db
        .save_debate_report(session.id, &report, Utc::now())
        .await?;
    info!(
        session_id = %session.id,
        summary = str_field(&report, "summary").unwrap_or_default(),
        "Debate ended"
    );
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sides_fall_back_unless_exactly_two() {
        assert_eq!(parse_sides(Some(json!(["Cats", "Dogs"]))), vec!["Cats", "Dogs"]);
        assert_eq!(parse_sides(Some(json!(["Only one"]))), vec!["Agree", "Disagree"]);
        assert_eq!(parse_sides(Some(json!(["A", "B", "C"]))), vec!["Agree", "Disagree"]);
        assert_eq!(parse_sides(None), vec!["Agree", "Disagree"]);
    }

    #[test]
    fn rebuttal_prompt_remembers_user_turns() {
        let session = DebateSession::new(
            Uuid::new_v4(),
            "Homework should be banned".to_string(),
            Difficulty::Easy,
            Turn::ai("Homework builds discipline."),
        );
        let mut turns = session.turns.clone();
        turns.push(Turn::user("Kids need rest."));
        let strategy = Strategy {
            mode: "attack".to_string(),
            aggression: 0.8,
            depth: 2,
        };
        let prompt = rebuttal_prompt(&session, &turns, Some(&strategy));
        assert!(prompt.contains("User Turn 1: \"Kids need rest.\""));
        assert!(prompt.contains("You: Homework builds discipline.\nOpponent: Kids need rest."));
        assert!(prompt.contains("STRATEGY MODE: ATTACK"));
        assert!(prompt.contains("AGGRESSION LEVEL: 80%"));
        assert!(prompt.contains("A2 (Elementary)"));
    }

    #[test]
    fn easy_topics_use_the_beginner_prompt() {
        assert!(topic_prompt(Difficulty::Easy).contains("A1 Level"));
        assert!(topic_prompt(Difficulty::Hard).contains("Difficulty: hard"));
    }
}
