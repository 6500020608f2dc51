//! services/api/src/web/token.rs
//!
//! Stateless bearer tokens: `<user id>.<expiry unix seconds>.<hex HMAC-SHA256>`.

use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_LIFETIME_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("signing key rejected: {0}")]
    InvalidKey(String),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => {
                ApiError::Unauthorized("Your session has expired. Please log in again.".to_string())
            }
            TokenError::InvalidKey(detail) => ApiError::Internal(detail),
            TokenError::Malformed | TokenError::BadSignature => ApiError::Unauthorized(
                "Invalid authentication token. Please log in again.".to_string(),
            ),
        }
    }
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String, TokenError> {
        let expires = (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp();
        let payload = format!("{}.{}", user_id, expires);
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        let mut parts = token.trim().split('.');
        let (Some(user), Some(expires), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
        self.mac(&format!("{}.{}", user, expires))?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        if expires <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Uuid::parse_str(user).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_until_expiry() {
        let signer = TokenSigner::new("secret");
        let user = Uuid::new_v4();
        let now = Utc::now();
        let token = signer.issue_at(user, now).unwrap();

        assert_eq!(signer.verify_at(&token, now).unwrap(), user);
        assert_eq!(
            signer.verify_at(&token, now + Duration::days(TOKEN_LIFETIME_DAYS) + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let signer = TokenSigner::new("secret");
        let token = signer.issue(Uuid::new_v4()).unwrap();
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", Uuid::new_v4(), rest);
        assert_eq!(signer.verify(&forged), Err(TokenError::BadSignature));

        let other = TokenSigner::new("another secret");
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = TokenSigner::new("secret");
        assert_eq!(signer.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.b.zz"), Err(TokenError::Malformed));
    }
}
