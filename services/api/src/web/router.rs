//! services/api/src/web/router.rs
//!
//! Assembles the full HTTP surface: public routes, authenticated routes,
//! quota-gated generation routes, and the shared layers around them.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::{
    analyze, auth, daily, debate, flashcards, history, interview,
    middleware::{error_details, require_auth, require_quota},
    mistakes,
    rest::{self, ApiDoc},
    roleplay,
    state::AppState,
    translate, tutor,
};

const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}

/// Routes that call the content generator. Each counts against the daily quota.
fn generation_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analyze", post(analyze::analyze_handler))
        .route("/api/analyze/examples", post(analyze::examples_handler))
        .route("/api/translate", post(translate::translate_handler))
        .route("/api/interview/question", post(interview::question_handler))
        .route("/api/interview/evaluate", post(interview::evaluate_handler))
        .route("/api/interview/end", post(interview::end_interview_handler))
        .route("/api/roleplay/chat", post(roleplay::roleplay_chat_handler))
        .route("/api/roleplay/feedback", post(roleplay::roleplay_feedback_handler))
        .route("/api/tutor/chat", post(tutor::tutor_chat_handler))
        .route("/api/debate/init", post(debate::init_debate_handler))
        .route("/api/debate/start", post(debate::start_debate_handler))
        .route("/api/debate/turn", post(debate::debate_turn_handler))
        .route("/api/debate/end", post(debate::end_debate_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_quota,
        ))
}

/// Builds the application router around the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", get(rest::root_handler))
        .route("/health", get(rest::health_handler))
        .route("/api/auth/signup", post(auth::signup_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/forgot-password", post(auth::forgot_password_handler))
        .route("/api/auth/reset-password", post(auth::reset_password_handler))
        .route("/api/auth/google", get(auth::google_login_handler))
        .route("/api/auth/google/callback", get(auth::google_callback_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/usage", get(auth::usage_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/auth/update", put(auth::update_profile_handler))
        .route("/api/auth/password", put(auth::change_password_handler))
        .route("/api/analyze/stats", get(analyze::stats_handler))
        .route("/api/mistakes", get(mistakes::list_mistakes_handler))
        .route("/api/mistakes/stats", get(mistakes::mistake_stats_handler))
        .route("/api/mistakes/{id}", delete(mistakes::delete_mistake_handler))
        .route("/api/interview/start", post(interview::start_interview_handler))
        .route("/api/interview/history", get(interview::interview_history_handler))
        .route(
            "/api/interview/session/{id}",
            get(interview::get_interview_handler).delete(interview::delete_interview_handler),
        )
        .route("/api/roleplay/start", post(roleplay::start_roleplay_handler))
        .route("/api/history", get(history::history_handler))
        .route("/api/daily/word", get(daily::daily_word_handler))
        .route(
            "/api/flashcards",
            get(flashcards::list_flashcards_handler).post(flashcards::create_flashcard_handler),
        )
        .route(
            "/api/flashcards/{id}",
            put(flashcards::update_flashcard_handler).delete(flashcards::delete_flashcard_handler),
        )
        .merge(generation_routes(&state))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let production = !state.config.environment.is_development();
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(rest::not_found_handler)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            error_details,
        ))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // In production a panicking handler becomes a 500 instead of killing the task.
    let api_router = if production {
        api_router.layer(CatchPanicLayer::new())
    } else {
        api_router
    };

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
