//! services/api/src/web/auth.rs
//!
//! Account endpoints: signup, login, profile, password management and Google sign-in.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use english_coach_core::domain::{NewUser, Usage, User};
use english_coach_core::ports::{ExternalProfile, PortError};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::AuthUser;
use crate::web::rest::MessageResponse;
use crate::web::state::AppState;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const RESET_TOKEN_BYTES: usize = 20;
const RESET_TOKEN_LIFETIME_HOURS: i64 = 1;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    pub msg: String,
    /// Only returned in development, where no email is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn password_matches(password: &str, stored: Option<&str>) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Failed to parse password hash: {:?}", e);
            false
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn auth_response(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let token = state.tokens.issue(user.id)?;
    Ok(AuthResponse {
        token,
        user: UserView {
            id: user.id,
            name: user.name,
            email: user.email,
        },
    })
}

fn invalid_credentials() -> ApiError {
    ApiError::validation("Invalid credentials")
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Missing fields or email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let name = req.name.trim();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Please provide name, email and password"));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .db
        .create_user(NewUser {
            name: name.to_string(),
            email,
            password_hash: Some(password_hash),
            google_id: None,
            avatar: None,
        })
        .await?;

    info!(user_id = %user.id, "User signed up");
    Ok(Json(auth_response(&state, user)?))
}

/// POST /api/auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = match state.db.get_user_by_email(&normalize_email(&req.email)).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => return Err(invalid_credentials()),
        Err(e) => return Err(e.into()),
    };

    if !password_matches(&req.password, user.password_hash.as_deref()) {
        return Err(invalid_credentials());
    }
    Ok(Json(auth_response(&state, user)?))
}

/// GET /api/auth/usage - Today's AI usage counter
#[utoipa::path(
    get,
    path = "/api/auth/usage",
    responses((status = 200, description = "Usage counter")),
    security(("bearer" = []))
)]
pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Usage>> {
    let user = state.db.get_user_by_id(user_id).await?;
    Ok(Json(user.usage))
}

/// GET /api/auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Current user")),
    security(("bearer" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.db.get_user_by_id(user_id).await?))
}

/// PUT /api/auth/update - Change the display name
#[utoipa::path(
    put,
    path = "/api/auth/update",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated user")),
    security(("bearer" = []))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Please provide a name"));
    }
    Ok(Json(state.db.update_user_name(user_id, name).await?))
}

/// PUT /api/auth/password - Change password
#[utoipa::path(
    put,
    path = "/api/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Incorrect current password")
    ),
    security(("bearer" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if req.new_password.is_empty() {
        return Err(ApiError::validation("Please provide a new password"));
    }
    let user = state.db.get_user_by_id(user_id).await?;
    if !password_matches(&req.old_password, user.password_hash.as_deref()) {
        return Err(ApiError::validation("Incorrect current password"));
    }

    let hash = hash_password(&req.new_password)?;
    state.db.update_password(user_id, &hash).await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// POST /api/auth/forgot-password - Issue a password reset token
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ForgotPasswordResponse>> {
    let user = match state.db.get_user_by_email(&normalize_email(&req.email)).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => return Err(ApiError::not_found("User")),
        Err(e) => return Err(e.into()),
    };

    let token = random_hex(RESET_TOKEN_BYTES);
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_LIFETIME_HOURS);
    state.db.set_reset_token(user.id, &token, expires_at).await?;
    info!(user_id = %user.id, "Password reset requested");

    Ok(Json(ForgotPasswordResponse {
        msg: "Email sent".to_string(),
        token: state.config.environment.is_development().then_some(token),
    }))
}

/// POST /api/auth/reset-password - Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Token is invalid or has expired")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if req.new_password.is_empty() {
        return Err(ApiError::validation("Please provide a new password"));
    }
    let user = state
        .db
        .find_user_by_reset_token(req.token.trim(), Utc::now())
        .await?
        .ok_or_else(|| ApiError::validation("Token is invalid or has expired"))?;

    let hash = hash_password(&req.new_password)?;
    state.db.update_password(user.id, &hash).await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

//=========================================================================================
// Google sign-in
//=========================================================================================

fn state_cookie(value: &str, max_age: i64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/api/auth/google; Max-Age={}",
        OAUTH_STATE_COOKIE, value, max_age
    )
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix(name)?.strip_prefix('='))
}

/// GET /api/auth/google - Redirect to Google sign-in
#[utoipa::path(
    get,
    path = "/api/auth/google",
    responses(
        (status = 303, description = "Redirect to the identity provider"),
        (status = 404, description = "Google sign-in is not configured")
    )
)]
pub async fn google_login_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let identity = state
        .identity
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Google sign-in"))?;

    let csrf = random_hex(16);
    let url = identity.authorization_url(&csrf);
    Ok((
        [(header::SET_COOKIE, state_cookie(&csrf, 600))],
        Redirect::to(&url),
    )
        .into_response())
}

async fn find_or_create_google_user(state: &AppState, profile: ExternalProfile) -> ApiResult<User> {
    if let Some(user) = state.db.find_user_by_google_id(&profile.subject).await? {
        return Ok(user);
    }

    let email = normalize_email(&profile.email);
    match state.db.get_user_by_email(&email).await {
        Ok(existing) => {
            info!(user_id = %existing.id, "Linking Google account to existing user");
            Ok(state
                .db
                .link_google_id(existing.id, &profile.subject, profile.avatar.as_deref())
                .await?)
        }
        Err(PortError::NotFound(_)) => {
            let user = state
                .db
                .create_user(NewUser {
                    name: profile.name,
                    email,
                    password_hash: None,
                    google_id: Some(profile.subject),
                    avatar: profile.avatar,
                })
                .await?;
            info!(user_id = %user.id, "User signed up with Google");
            Ok(user)
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/auth/google/callback - Finish Google sign-in
#[utoipa::path(
    get,
    path = "/api/auth/google/callback",
    responses(
        (status = 303, description = "Redirect to the client with a token"),
        (status = 401, description = "Sign-in was cancelled or the state did not match")
    )
)]
pub async fn google_callback_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<GoogleCallbackQuery>,
) -> ApiResult<Response> {
    let identity = state
        .identity
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Google sign-in"))?;

    if let Some(reason) = query.error {
        return Err(ApiError::Unauthorized(format!("Google sign-in failed: {}", reason)));
    }
    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != query.state.as_deref() {
        return Err(ApiError::Unauthorized("Google sign-in state mismatch".to_string()));
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::validation("Missing authorization code"))?;

    let profile = identity.exchange_code(&code).await?;
    let user = find_or_create_google_user(&state, profile).await?;
    let token = state.tokens.issue(user.id)?;

    let target = format!("{}/login?token={}", state.config.client_url, token);
    Ok((
        [(header::SET_COOKIE, state_cookie("", 0))],
        Redirect::to(&target),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_round_trip_through_argon2() {
        let hash = hash_password("hunter22").unwrap();
        assert!(password_matches("hunter22", Some(&hash)));
        assert!(!password_matches("hunter23", Some(&hash)));
        assert!(!password_matches("hunter22", None));
    }

    #[test]
    fn state_cookie_is_read_back() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; oauth_state=abc123".parse().unwrap(),
        );
        assert_eq!(cookie_value(&headers, OAUTH_STATE_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn reset_tokens_are_hex() {
        let token = random_hex(RESET_TOKEN_BYTES);
        assert_eq!(token.len(), RESET_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
