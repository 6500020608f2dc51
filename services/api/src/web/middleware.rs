//! services/api/src/web/middleware.rs
//!
//! Request middleware: bearer authentication, the daily quota gate and
//! development error detail.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use english_coach_core::quota::{check_quota, QuotaDecision};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ErrorReport};
use crate::web::state::AppState;

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

/// Middleware that validates the bearer token and extracts the user id.
///
/// If valid, inserts an `AuthUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

    let user_id = state.tokens.verify(token)?;
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}

/// Rejects the request with 429 once the caller has used up today's allowance.
///
/// Runs after `require_auth`. A stale counter is reset and persisted here;
/// the charge itself happens in `record_usage` once the handler succeeded.
pub async fn require_quota(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    let AuthUser(user_id) = req
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

    let user = state.db.get_user_by_id(user_id).await?;
    match check_quota(user.usage, Utc::now(), state.config.daily_quota) {
        QuotaDecision::Allow { usage, reset } => {
            if reset {
                debug!(%user_id, "Resetting daily usage counter");
                state.db.reset_usage(user_id, usage).await?;
            }
            Ok(next.run(req).await)
        }
        QuotaDecision::Reject { usage, limit } => {
            warn!(%user_id, count = usage.count, limit, "Daily quota exhausted");
            Err(ApiError::QuotaExceeded(limit))
        }
    }
}

/// Charges one request against the caller's daily allowance.
///
/// The response has already been produced, so a failed write is only logged.
pub async fn record_usage(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.db.increment_usage(user_id).await {
        warn!(%user_id, error = %e, "Failed to record AI usage");
    }
}

/// Moves the technical detail of an error response into its body.
///
/// Only in development; elsewhere clients see the status and `msg` alone.
pub async fn error_details(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    if !state.config.environment.is_development() {
        return response;
    }
    let report = response.extensions_mut().remove::<ErrorReport>();
    match report {
        Some(report) => report.detailed_response(response.status()),
        None => response,
    }
}
