//! services/api/src/adapters/google.rs
//!
//! Google sign-in via the OAuth 2.0 authorization code flow, implementing
//! the `ExternalIdentityService` port over plain HTTPS calls.

use crate::config::GoogleOAuthConfig;
use async_trait::async_trait;
use english_coach_core::ports::{ExternalIdentityService, ExternalProfile, PortError, PortResult};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

pub struct GoogleIdentityAdapter {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleIdentityAdapter {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

fn http_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() || e.is_connect() {
        PortError::Unavailable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

#[async_trait]
impl ExternalIdentityService for GoogleIdentityAdapter {
    fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid profile email"),
            ("state", state),
        ];
        Url::parse_with_params(AUTH_ENDPOINT, &params)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| AUTH_ENDPOINT.to_string())
    }

    async fn exchange_code(&self, code: &str) -> PortResult<ExternalProfile> {
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Google rejected the authorization code");
            return Err(PortError::Unexpected(format!(
                "token exchange returned HTTP {}",
                status
            )));
        }
        let token: TokenResponse = response.json().await.map_err(http_error)?;

        let info: UserInfo = self
            .client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?
            .json()
            .await
            .map_err(http_error)?;

        let email = info
            .email
            .ok_or_else(|| PortError::Unexpected("Google profile has no email".to_string()))?;
        Ok(ExternalProfile {
            subject: info.sub,
            name: info.name.unwrap_or_else(|| email.clone()),
            email,
            avatar: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_carries_client_and_state() {
        let adapter = GoogleIdentityAdapter::new(GoogleOAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "http://localhost:5000/api/auth/google/callback".to_string(),
        });
        let url = adapter.authorization_url("abc");
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000"));
        assert!(!url.contains("secret"));
    }
}
