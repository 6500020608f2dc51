//! services/api/src/web/interview.rs
//!
//! Mock interviews. Each answered turn is triaged, evaluated when needed, and
//! persisted together with the advanced progress in one versioned write.

use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use chrono::Utc;
use english_coach_core::domain::{
    Difficulty, InterviewSession, InterviewSummary, MistakeInput, Role, Turn,
};
use english_coach_core::interview::{
    allows_resume_questions, canned_evaluation, next_question_constraint, question_bank,
    question_categories, triage_answer, InterviewProgress, InterviewType, Mood, Phase,
};
use english_coach_core::recovery::{mistake_entries, number_field, str_field, Shape};
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{record_usage, AuthUser};
use crate::web::rest::{ensure_owner, parse_choice, MessageResponse};
use crate::web::state::AppState;

const RESUME_PROMPT_CHARS: usize = 1000;
const FILLER_PATTERN: &str = r"(?i)\b(um|uh|maybe|i think|probably)\b";
const FILLER_THRESHOLD: usize = 2;
const DEFAULT_MISTAKE_RULE: &str = "General Grammar Rule";
const PDF_MAGIC: &[u8] = b"%PDF";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub session_id: Option<Uuid>,
    /// `"short"` asks for a concise question.
    #[serde(default)]
    pub length: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub question: String,
    #[schema(value_type = String)]
    pub interview_phase: Phase,
    #[schema(value_type = String)]
    pub interviewer_mood: Mood,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub length: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndInterviewRequest {
    pub session_id: Option<Uuid>,
}

//=========================================================================================
// Helpers
//=========================================================================================

async fn owned_session(state: &AppState, session_id: Uuid, user_id: Uuid) -> ApiResult<InterviewSession> {
    let session = state.db.get_interview(session_id).await?;
    ensure_owner(session.user_id, user_id)?;
    Ok(session)
}

fn require_session_id(session_id: Option<Uuid>) -> ApiResult<Uuid> {
    session_id.ok_or_else(|| ApiError::validation("Please provide a sessionId"))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn is_pdf(content_type: Option<&str>, data: &[u8]) -> bool {
    content_type == Some("application/pdf") || data.starts_with(PDF_MAGIC)
}

/// Extracts the text of an uploaded PDF resume.
///
/// An unreadable document is logged and treated as no resume at all.
async fn pdf_resume_text(data: Vec<u8>) -> String {
    let extracted =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data)).await;
    match extracted {
        Ok(Ok(text)) => text.trim().to_string(),
        Ok(Err(e)) => {
            warn!(error = ?e, "Could not extract resume text; continuing without a resume");
            String::new()
        }
        Err(e) => {
            warn!(error = %e, "Resume extraction aborted; continuing without a resume");
            String::new()
        }
    }
}

fn filler_count(answer: &str) -> usize {
    match Regex::new(FILLER_PATTERN) {
        Ok(re) => re.find_iter(answer).count(),
        Err(e) => {
            warn!("Filler pattern failed to compile: {}", e);
            0
        }
    }
}

/// Picks a category and a base question for the next turn.
fn pick_base_question(interview_type: InterviewType, phase: Phase) -> &'static str {
    let mut rng = rand::thread_rng();
    let category = question_categories(interview_type, phase)
        .choose(&mut rng)
        .copied()
        .unwrap_or(phase);
    question_bank(category)
        .choose(&mut rng)
        .copied()
        .unwrap_or("Tell me about yourself.")
}

fn question_prompt(
    interview_type: InterviewType,
    difficulty: Difficulty,
    phase: Phase,
    resume: Option<&str>,
    short: bool,
) -> String {
    let length_note = if short { "Keep it concise." } else { "" };
    match resume.filter(|_| allows_resume_questions(interview_type, phase)) {
        Some(resume) => format!(
            r#"You are a professional Technical Interviewer.
Candidate Level: {difficulty}
Interview Phase: {phase}
Interview Type: {kind}

RESUME CONTEXT:
Candidate Resume Context: "{resume}..."

Task: Generate a UNIQUE, SPECIFIC question based on the candidate's resume above.
- If Intro: Ask about a specific project or role summary.
- If Technical: Pick a specific skill or tool mentioned in the resume and ask a conceptual question about it.
- Do NOT ask generic questions like "Tell me about yourself". Be specific.
- Use SIMPLE, BASIC vocabulary. Keep the language clear and easy to understand.

{length_note}
Return ONLY the question string."#,
            difficulty = difficulty.as_str(),
            phase = phase.as_str(),
            kind = interview_type.as_str(),
            resume = truncate(resume, RESUME_PROMPT_CHARS),
        ),
        None => format!(
            r#"You are a professional Interviewer.
Candidate Level: {difficulty}
Interview Phase: {phase}
Interview Type: {kind}

Base Question: "{base}"

Task: Rephrase this question naturally to sound like a human interviewer.
- Keep the core meaning relevant to the question category.
- Use SIMPLE, BASIC vocabulary. Keep it clear and easy to understand.
- {length_note}

Return ONLY the rephrased question string."#,
            difficulty = difficulty.as_str(),
            phase = phase.as_str(),
            kind = interview_type.as_str(),
            base = pick_base_question(interview_type, phase),
        ),
    }
}

fn evaluation_prompt(session: &InterviewSession, question: &str, answer: &str, short: bool) -> String {
    let phase = session.progress.upcoming_phase(session.interview_type);
    let length_note = if short {
        "Keep your feedback and better answer concise."
    } else {
        ""
    };
    let fillers = filler_count(answer);
    let confidence_note = if fillers > FILLER_THRESHOLD {
        format!(
            "OBSERVATION: The candidate used filler words {} times (um, uh, maybe). You MUST point this out and tell them to sound more confident.",
            fillers
        )
    } else {
        String::new()
    };

    format!(
        r#"You are an expert interviewer.
Interview Phase: {phase}
Interview Type: {kind}
Candidate Level: {difficulty}
Interviewer Mood: {mood}

Question: "{question}"
Candidate Answer: "{answer}"
{length_note}
{confidence_note}

TONE RULES:
- friendly: Encouraging, conversational, uses "Great point!" or "I see."
- neutral: Professional, balanced, objective.
- strict: Short, direct, challenging. "Why did you do that?", "That lacks detail."

{constraint}

Evaluate the answer. Provide:
1. A score out of 10.
2. Feedback on grammar and tone.
3. A "Better Answer" example.
4. A "nextQuestion".

DYNAMIC NEXT QUESTION LOGIC (Must Follow):
- Score < 5 (Weak): ask the SAME question again but rephrased simply.
- Score 5-7 (Average): ask a standard question for the current phase.
- Score > 8 (Strong): ask a deeper, more challenging follow-up WITHIN THE SAME PHASE TYPE.

Return STRICT JSON format (no markdown code blocks, no newlines in strings):
{{
    "score": 8,
    "feedback": "...",
    "betterAnswer": "...",
    "nextQuestion": "...",
    "mistakes": [
        {{ "wrong": "...", "right": "...", "rule": "..." }}
    ]
}}"#,
        phase = phase.as_str(),
        kind = session.interview_type.as_str(),
        difficulty = session.difficulty.as_str(),
        mood = session.progress.mood.as_str(),
        constraint = next_question_constraint(session.interview_type, phase),
    )
}

fn transcript(messages: &[Turn]) -> String {
    messages
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::Ai => "Interviewer",
                _ => "Candidate",
            };
            format!("{}: \"{}\"", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn with_progress(mut evaluation: Value, progress: InterviewProgress) -> Value {
    if let Value::Object(map) = &mut evaluation {
        map.insert("interviewPhase".to_string(), json!(progress.phase));
        map.insert("interviewerMood".to_string(), json!(progress.mood));
    }
    evaluation
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/interview/start - Create an interview session
///
/// Accepts multipart/form-data with optional `interviewType`, `difficulty`,
/// `manualContext` fields and an optional `resume` file (PDF or plain text).
#[utoipa::path(
    post,
    path = "/api/interview/start",
    request_body(content_type = "multipart/form-data", description = "Interview settings and an optional resume."),
    responses(
        (status = 200, description = "The new session"),
        (status = 400, description = "Invalid settings or unreadable resume")
    ),
    security(("bearer" = []))
)]
pub async fn start_interview_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<Json<InterviewSession>> {
    let mut interview_type = InterviewType::default();
    let mut difficulty = Difficulty::default();
    let mut manual_context = String::new();
    let mut resume = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read form field: {}", e)))?
            .to_vec();

        if name == "resume" && is_pdf(content_type.as_deref(), &data) {
            resume = pdf_resume_text(data).await;
            continue;
        }
        let text = String::from_utf8(data).map_err(|_| match name.as_str() {
            "resume" => ApiError::validation("Resume must be a PDF or plain-text file"),
            other => ApiError::validation(format!("Field '{}' must be UTF-8 text", other)),
        })?;

        match name.as_str() {
            "interviewType" => interview_type = parse_choice(&text, "interview type")?,
            "difficulty" => difficulty = parse_choice(&text, "difficulty")?,
            "manualContext" => manual_context = text.trim().to_string(),
            "resume" => resume = text.trim().to_string(),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let session = InterviewSession::new(user_id, interview_type, difficulty, resume, manual_context);
    state.db.create_interview(&session).await?;
    info!(session_id = %session.id, kind = interview_type.as_str(), "Interview started");
    Ok(Json(session))
}

/// GET /api/interview/history - The user's interview sessions
#[utoipa::path(
    get,
    path = "/api/interview/history",
    responses((status = 200, description = "Session summaries, most recent first")),
    security(("bearer" = []))
)]
pub async fn interview_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<InterviewSummary>>> {
    Ok(Json(state.db.list_interview_summaries(user_id).await?))
}

/// GET /api/interview/session/{id} - One interview session with its transcript
#[utoipa::path(
    get,
    path = "/api/interview/session/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session"),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_interview_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<InterviewSession>> {
    Ok(Json(owned_session(&state, session_id, user_id).await?))
}

/// DELETE /api/interview/session/{id} - Delete an interview session
#[utoipa::path(
    delete,
    path = "/api/interview/session/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session removed", body = MessageResponse),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_interview_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    owned_session(&state, session_id, user_id).await?;
    state.db.delete_interview(session_id).await?;
    Ok(Json(MessageResponse::new("Session removed")))
}

/// POST /api/interview/question - Ask the next question
#[utoipa::path(
    post,
    path = "/api/interview/question",
    request_body = QuestionRequest,
    responses(
        (status = 200, description = "The next question", body = QuestionResponse),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn question_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<QuestionRequest>,
) -> ApiResult<Json<QuestionResponse>> {
    let session = match req.session_id {
        Some(id) => Some(owned_session(&state, id, user_id).await?),
        None => None,
    };
    let (interview_type, difficulty, progress) = session
        .as_ref()
        .map(|s| (s.interview_type, s.difficulty, s.progress))
        .unwrap_or_default();
    let resume = session
        .as_ref()
        .map(|s| s.resume_context.as_str())
        .filter(|r| !r.is_empty());

    let prompt = question_prompt(
        interview_type,
        difficulty,
        progress.phase,
        resume,
        req.length == "short",
    );
    let question = state.generate_text(&prompt).await?;
    record_usage(&state, user_id).await;

    if let Some(session) = &session {
        state
            .db
            .append_interview_turns(session.id, &[Turn::ai(question.clone())])
            .await?;
    }

    Ok(Json(QuestionResponse {
        question,
        interview_phase: progress.phase,
        interviewer_mood: progress.mood,
    }))
}

/// POST /api/interview/evaluate - Evaluate an answer and advance the interview
#[utoipa::path(
    post,
    path = "/api/interview/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Score, feedback, better answer and next question"),
        (status = 400, description = "Missing answer or interview already ended"),
        (status = 409, description = "The session changed concurrently"),
        (status = 429, description = "Daily AI limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<EvaluateRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = require_session_id(req.session_id)?;
    let answer = req.answer.trim();
    if answer.is_empty() {
        return Err(ApiError::validation("Please provide an answer"));
    }

    let session = owned_session(&state, session_id, user_id).await?;
    if session.is_ended() {
        return Err(ApiError::validation("This interview has already ended"));
    }

    let triage = triage_answer(answer);
    if let Some(canned) = canned_evaluation(triage, session.interview_type, session.progress.phase) {
        let next_question = canned
            .next_questions
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default();
        let progress = session.progress.advance(session.interview_type, canned.score);
        let turns = [
            Turn::user(answer).with_evaluation(json!({ "score": canned.score })),
            Turn::ai(next_question),
        ];
        state
            .db
            .record_interview_turn(session.id, session.version, &turns, progress)
            .await?;
        debug!(session_id = %session.id, ?triage, "Answer triaged without evaluation");

        return Ok(Json(with_progress(
            json!({
                "score": canned.score,
                "feedback": canned.feedback,
                "betterAnswer": "",
                "nextQuestion": next_question,
                "mistakes": [],
            }),
            progress,
        )));
    }

    let prompt = evaluation_prompt(&session, req.question.trim(), answer, req.length == "short");
    let evaluation = state.generate_json(&prompt, Shape::Object).await?;

    let score = number_field(&evaluation, "score").unwrap_or(0.0).clamp(0.0, 10.0);
    let progress = session.progress.advance(session.interview_type, score);
    let mut turns = vec![Turn::user(answer).with_evaluation(evaluation.clone())];
    if let Some(next) = str_field(&evaluation, "nextQuestion") {
        turns.push(Turn::ai(next));
    }
    // Usage and mistakes are recorded only once the turn is accepted.
    state
        .db
        .record_interview_turn(session.id, session.version, &turns, progress)
        .await?;
    record_usage(&state, user_id).await;

    for entry in mistake_entries(&evaluation, "right") {
        let entry = MistakeInput {
            rule: entry.rule.clone().or_else(|| Some(DEFAULT_MISTAKE_RULE.to_string())),
            ..entry
        };
        state.db.upsert_mistake(user_id, &entry).await?;
    }
    info!(
        session_id = %session.id,
        score,
        phase = progress.phase.as_str(),
        questions = progress.question_count,
        "Interview answer evaluated"
    );

    Ok(Json(with_progress(evaluation, progress)))
}

/// POST /api/interview/end - Produce the final hiring report
#[utoipa::path(
    post,
    path = "/api/interview/end",
    request_body = EndInterviewRequest,
    responses(
        (status = 200, description = "Hiring decision, strengths, weak areas and score"),
        (status = 401, description = "Owned by another user"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
pub async fn end_interview_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<EndInterviewRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = require_session_id(req.session_id)?;
    let session = owned_session(&state, session_id, user_id).await?;

    let prompt = format!(
        r#"You are a Senior Hiring Manager.
Review this entire interview transcript for a "{}" level role.

TRANSCRIPT:
{}

Task: Provide a final hiring assessment as if you are a real human manager talking to a colleague.

Return STRICT JSON format:
{{
    "hiringDecision": "Yes" | "Maybe" | "No",
    "decisionReason": "Honest, human-like explanation. Start with 'If this were a real interview...'",
    "strengths": ["List 3 key strengths."],
    "weakAreas": ["List 3 specific weak areas."],
    "improvementPlan": "Specific, actionable advice.",
    "overallScore": 75
}}
overallScore is an integer from 1 to 100."#,
        session.difficulty.as_str(),
        transcript(&session.messages)
    );
    let report = state.generate_json(&prompt, Shape::Object).await?;
    record_usage(&state, user_id).await;

    state
        .db
        .save_interview_report(session.id, &report, Utc::now())
        .await?;
    info!(session_id = %session.id, "Interview ended");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_resumes_are_recognised_by_type_or_signature() {
        assert!(is_pdf(Some("application/pdf"), b""));
        assert!(is_pdf(Some("application/octet-stream"), b"%PDF-1.7\n"));
        assert!(!is_pdf(Some("text/plain"), b"Rust engineer, 5 years"));
        assert!(!is_pdf(None, b""));
    }

    #[tokio::test]
    async fn unreadable_pdf_becomes_an_empty_resume() {
        assert_eq!(pdf_resume_text(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec()).await, "");
    }

    #[test]
    fn filler_words_are_counted_case_insensitively() {
        assert_eq!(filler_count("Um, I think maybe it was probably fine"), 4);
        assert_eq!(filler_count("I led the migration to Postgres"), 0);
        assert_eq!(filler_count("The summary document listed a number of umbrella issues"), 0);
    }

    #[test]
    fn hr_interviews_never_get_resume_prompts() {
        let prompt = question_prompt(
            InterviewType::Hr,
            Difficulty::Medium,
            Phase::Intro,
            Some("Built a Rust compiler at Acme"),
            false,
        );
        assert!(!prompt.contains("RESUME CONTEXT"));
        assert!(prompt.contains("Base Question"));

        let technical = question_prompt(
            InterviewType::Technical,
            Difficulty::Hard,
            Phase::Technical,
            Some("Built a Rust compiler at Acme"),
            true,
        );
        assert!(technical.contains("Built a Rust compiler at Acme"));
        assert!(technical.contains("Keep it concise."));
    }

    #[test]
    fn evaluation_prompt_uses_the_upcoming_phase() {
        let mut session = InterviewSession::new(
            Uuid::new_v4(),
            InterviewType::Hr,
            Difficulty::Easy,
            String::new(),
            String::new(),
        );
        session.progress.question_count = 1;
        let prompt = evaluation_prompt(&session, "Why us?", "Because I like the team a lot", false);
        assert!(prompt.contains("Interview Phase: hr"));
        assert!(prompt.contains("THIS IS AN HR INTERVIEW"));
    }

    #[test]
    fn progress_is_merged_into_the_evaluation() {
        let progress = InterviewProgress {
            phase: Phase::Closing,
            mood: Mood::Strict,
            question_count: 9,
        };
        let merged = with_progress(json!({"score": 2}), progress);
        assert_eq!(merged["interviewPhase"], "closing");
        assert_eq!(merged["interviewerMood"], "strict");
        assert_eq!(merged["score"], 2);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
