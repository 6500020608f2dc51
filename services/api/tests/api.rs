//! End-to-end tests of the HTTP surface against the in-memory store and a
//! scripted content generator.

use api_lib::{
    adapters::MemoryAdapter,
    config::{Config, Environment},
    web::build_router,
    web::state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use english_coach_core::{
    ContentGenerationService, DatabaseService, GenerationError, GenerationResult, NewUser, Turn,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

/// Replays canned model output in order and counts calls.
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    /// An interview that another request answers while the next reply is generated.
    interrupt: Mutex<Option<(Arc<dyn DatabaseService>, Uuid)>>,
}

impl ScriptedGenerator {
    fn with_replies(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        })
    }

    fn interrupt(&self, db: Arc<dyn DatabaseService>, session_id: Uuid) {
        *self.interrupt.lock().unwrap() = Some((db, session_id));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerationService for ScriptedGenerator {
    async fn generate(&self, _prompt: &str, _json_mode: bool) -> GenerationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let interrupt = self.interrupt.lock().unwrap().take();
        if let Some((db, session_id)) = interrupt {
            let session = db.get_interview(session_id).await.unwrap();
            db.record_interview_turn(
                session_id,
                session.version,
                &[Turn::user("An answer from another tab")],
                session.progress,
            )
            .await
            .unwrap();
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(GenerationError::EmptyResponse)
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    generator: Arc<ScriptedGenerator>,
}

impl TestApp {
    fn new(generator: Arc<ScriptedGenerator>) -> Self {
        Self::with_config(generator, Config::for_tests())
    }

    fn with_config(generator: Arc<ScriptedGenerator>, config: Config) -> Self {
        let state = Arc::new(AppState::new(
            Arc::new(MemoryAdapter::new()),
            Arc::new(config),
            generator.clone(),
            None,
        ));
        Self {
            router: build_router(state.clone()),
            state,
            generator,
        }
    }

    async fn user(&self, email: &str) -> (Uuid, String) {
        let user = self
            .state
            .db
            .create_user(NewUser {
                name: "Asha".to_string(),
                email: email.to_string(),
                password_hash: None,
                google_id: None,
                avatar: None,
            })
            .await
            .unwrap();
        let token = self.state.tokens.issue(user.id).unwrap();
        (user.id, token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    async fn post(&self, token: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, token: &str, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::get(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Posts a multipart form of `(name, content type, bytes)` parts.
    async fn post_form(
        &self,
        token: &str,
        uri: &str,
        parts: &[(&str, Option<&str>, &[u8])],
    ) -> (StatusCode, Value) {
        let boundary = "coach-boundary";
        let mut body = Vec::new();
        for (name, content_type, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            match content_type {
                Some(content_type) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}.bin\"\r\nContent-Type: {}\r\n\r\n",
                        name, name, content_type
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        self.send(
            Request::post(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn start_interview(&self, token: &str, interview_type: &str) -> Uuid {
        let (status, session) = self
            .post_form(
                token,
                "/api/interview/start",
                &[("interviewType", None, interview_type.as_bytes())],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", session);
        assert_eq!(session["interviewType"], interview_type);
        session["id"].as_str().unwrap().parse().unwrap()
    }
}

const ANALYSIS: &str = r#"```json
{"original": "he go to school", "corrected": "He goes to school.",
 "polished_alternatives": ["He attends school."],
 "mistakes": [{"wrong": "he go", "correct": "He goes", "category": "grammar", "rule": "Subject-verb agreement"}]}
```"#;

#[tokio::test]
async fn health_and_unknown_routes() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, body) = app
        .send(Request::get("/api/nowhere").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["msg"], "Route not found: GET /api/nowhere");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (status, body) = app
        .send(Request::get("/api/mistakes").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "No token, authorization denied");

    let (status, _) = app.get("not-a-token", "/api/mistakes").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_then_login_issue_working_tokens() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let signup = json!({"name": "Ravi", "email": "Ravi@Example.com", "password": "s3cret"});
    let (status, body) = app
        .send(
            Request::post("/api/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(signup.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["email"], "ravi@example.com");

    let login = json!({"email": "ravi@example.com", "password": "wrong"});
    let (status, body) = app
        .send(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(login.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Invalid credentials");

    let login = json!({"email": "ravi@example.com", "password": "s3cret"});
    let (status, body) = app
        .send(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(login.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    let (status, me) = app.get(&token, "/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Ravi");
}

#[tokio::test]
async fn quota_rejects_once_the_daily_limit_is_spent() {
    let mut config = Config::for_tests();
    config.daily_quota = 1;
    let app = TestApp::with_config(ScriptedGenerator::with_replies(&[ANALYSIS, ANALYSIS]), config);
    let (_, token) = app.user("quota@example.com").await;

    let (status, _) = app
        .post(&token, "/api/analyze", json!({"sentence": "he go to school"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(&token, "/api/analyze", json!({"sentence": "he go to school"}))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["msg"], "Daily AI limit reached. Please try again tomorrow.");
    assert_eq!(app.generator.calls(), 1);

    // Routes that never call the model stay open.
    let (status, _) = app.get(&token, "/api/mistakes").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_generation_is_not_charged() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, token) = app.user("free@example.com").await;

    let (status, _) = app
        .post(&token, "/api/translate", json!({"text": "hello", "targetLang": "hi"}))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, usage) = app.get(&token, "/api/auth/usage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["count"], 0);
}

#[tokio::test]
async fn repeated_mistakes_are_counted_not_duplicated() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[ANALYSIS, ANALYSIS]));
    let (_, token) = app.user("mistakes@example.com").await;

    for _ in 0..2 {
        let (status, body) = app
            .post(&token, "/api/analyze", json!({"sentence": "he go to school"}))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["corrected"], "He goes to school.");
    }

    let (_, mistakes) = app.get(&token, "/api/mistakes").await;
    let mistakes = mistakes.as_array().unwrap();
    assert_eq!(mistakes.len(), 1);
    assert_eq!(mistakes[0]["count"], 2);

    let (_, stats) = app.get(&token, "/api/mistakes/stats").await;
    assert_eq!(stats["totalSentences"], 2);
    assert_eq!(stats["totalMistakes"], 1);
}

#[tokio::test]
async fn skipped_answer_is_scored_without_the_model() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, token) = app.user("skip@example.com").await;
    let session_id = app.start_interview(&token, "hr").await;

    let (status, body) = app
        .post(
            &token,
            "/api/interview/evaluate",
            json!({"sessionId": session_id, "question": "Why us?", "answer": "I don't know"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["score"], 5.0);
    assert_eq!(body["interviewerMood"], "neutral");
    assert_eq!(app.generator.calls(), 0);

    let (_, session) = app
        .get(&token, &format!("/api/interview/session/{}", session_id))
        .await;
    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "ai");
}

#[tokio::test]
async fn hr_interview_walks_its_phases() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, token) = app.user("hr@example.com").await;
    let session_id = app.start_interview(&token, "hr").await;

    let mut phases = Vec::new();
    for _ in 0..9 {
        let (status, body) = app
            .post(
                &token,
                "/api/interview/evaluate",
                json!({"sessionId": session_id, "answer": "skip"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        phases.push(body["interviewPhase"].as_str().unwrap().to_string());
    }
    assert_eq!(
        phases,
        vec!["intro", "hr", "hr", "hr", "hr", "hr", "hr", "hr", "closing"]
    );
}

#[tokio::test]
async fn evaluated_answers_record_interview_mistakes() {
    let evaluation = r#"{"score": "9", "feedback": "Clear.", "betterAnswer": "...",
        "nextQuestion": "How do you prioritise work?",
        "mistakes": [{"wrong": "I has", "right": "I have", "explanation": "agreement"}]}"#;
    let app = TestApp::new(ScriptedGenerator::with_replies(&[evaluation]));
    let (_, token) = app.user("eval@example.com").await;
    let session_id = app.start_interview(&token, "technical").await;

    let answer = "I has led a team of five engineers building a payments service in Rust over two years at my last company";
    let (status, body) = app
        .post(
            &token,
            "/api/interview/evaluate",
            json!({"sessionId": session_id, "question": "Tell me about yourself", "answer": answer}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["interviewerMood"], "friendly");
    assert_eq!(body["nextQuestion"], "How do you prioritise work?");

    let (_, mistakes) = app.get(&token, "/api/mistakes").await;
    assert_eq!(mistakes[0]["wrongPhrase"], "I has");
    assert_eq!(mistakes[0]["rule"], "General Grammar Rule");
}

#[tokio::test]
async fn records_are_only_visible_to_their_owner() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, owner) = app.user("owner@example.com").await;
    let (_, intruder) = app.user("intruder@example.com").await;

    let (status, card) = app
        .post(&owner, "/api/flashcards", json!({"word": "diligent", "definition": "hard-working"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/flashcards/{}", card["id"].as_str().unwrap());

    let (status, body) = app
        .send(
            Request::delete(uri.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {}", intruder))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "Not authorized");

    let (status, body) = app
        .send(
            Request::delete(uri.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {}", owner))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Flashcard removed");
}

#[tokio::test]
async fn pdf_resume_upload_starts_a_session() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, token) = app.user("pdf@example.com").await;

    let pdf: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";
    let (status, session) = app
        .post_form(
            &token,
            "/api/interview/start",
            &[
                ("interviewType", None, b"technical"),
                ("resume", Some("application/pdf"), pdf),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", session);
    assert_eq!(session["interviewType"], "technical");
    assert_eq!(session["resumeContext"], "");
}

#[tokio::test]
async fn binary_form_fields_are_named_in_the_error() {
    let app = TestApp::new(ScriptedGenerator::with_replies(&[]));
    let (_, token) = app.user("binary@example.com").await;

    let (status, body) = app
        .post_form(
            &token,
            "/api/interview/start",
            &[("difficulty", None, b"\xff\xfe")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Field 'difficulty' must be UTF-8 text");

    let (status, body) = app
        .post_form(
            &token,
            "/api/interview/start",
            &[("resume", Some("application/octet-stream"), b"\xff\xfe")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Resume must be a PDF or plain-text file");
}

#[tokio::test]
async fn conflicting_evaluation_leaves_mistakes_and_usage_untouched() {
    let evaluation = r#"{"score": 6, "feedback": "Fine.", "betterAnswer": "...",
        "nextQuestion": "What did you learn?",
        "mistakes": [{"wrong": "I has", "right": "I have"}]}"#;
    let app = TestApp::new(ScriptedGenerator::with_replies(&[evaluation, evaluation]));
    let (_, token) = app.user("race@example.com").await;
    let session_id = app.start_interview(&token, "technical").await;
    app.generator.interrupt(app.state.db.clone(), session_id);

    let answer = "I has worked on a billing platform for three years and I mostly owned the invoicing and reconciliation jobs";
    let request = json!({"sessionId": session_id, "question": "Tell me about your work", "answer": answer});
    let (status, _) = app.post(&token, "/api/interview/evaluate", request.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, mistakes) = app.get(&token, "/api/mistakes").await;
    assert_eq!(mistakes, json!([]));
    let (_, usage) = app.get(&token, "/api/auth/usage").await;
    assert_eq!(usage["count"], 0);

    let (status, body) = app.post(&token, "/api/interview/evaluate", request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (_, mistakes) = app.get(&token, "/api/mistakes").await;
    assert_eq!(mistakes[0]["wrongPhrase"], "I has");
    assert_eq!(mistakes[0]["count"], 1);
    let (_, usage) = app.get(&token, "/api/auth/usage").await;
    assert_eq!(usage["count"], 1);
}

#[tokio::test]
async fn malformed_model_output_is_detailed_only_in_development() {
    let raw = format!("Sorry, I cannot format that as JSON. {}", "x".repeat(150));

    let app = TestApp::new(ScriptedGenerator::with_replies(&[raw.as_str()]));
    let (_, token) = app.user("dev@example.com").await;
    let (status, body) = app
        .post(&token, "/api/analyze", json!({"sentence": "he go to school"}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["msg"], "AI response parsing failed");
    let detail = body["error"].as_str().unwrap();
    let head: String = raw.chars().take(100).collect();
    assert!(detail.contains(&format!("{}...", head)), "{}", detail);
    assert!(!detail.contains(&raw));

    let mut config = Config::for_tests();
    config.environment = Environment::Production;
    let app = TestApp::with_config(ScriptedGenerator::with_replies(&[raw.as_str()]), config);
    let (_, token) = app.user("prod@example.com").await;
    let (status, body) = app
        .post(&token, "/api/analyze", json!({"sentence": "he go to school"}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["msg"], "AI response parsing failed");
    assert!(body.get("error").is_none(), "{}", body);
}
