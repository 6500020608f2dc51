//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the generation helpers every
//! feature handler goes through.

use crate::config::Config;
use crate::error::ApiResult;
use crate::web::token::TokenSigner;
use english_coach_core::ports::{ContentGenerationService, DatabaseService, ExternalIdentityService};
use english_coach_core::recovery::{recover, Shape};
use serde_json::Value;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub generator: Arc<dyn ContentGenerationService>,
    /// Present only when Google sign-in is configured.
    pub identity: Option<Arc<dyn ExternalIdentityService>>,
    pub tokens: TokenSigner,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        config: Arc<Config>,
        generator: Arc<dyn ContentGenerationService>,
        identity: Option<Arc<dyn ExternalIdentityService>>,
    ) -> Self {
        let tokens = TokenSigner::new(&config.token_secret);
        Self {
            db,
            config,
            generator,
            identity,
            tokens,
        }
    }

    /// Plain-text generation, trimmed.
    pub async fn generate_text(&self, prompt: &str) -> ApiResult<String> {
        let text = self.generator.generate(prompt, false).await?;
        Ok(text.trim().to_string())
    }

    /// JSON generation recovered into the expected shape.
    pub async fn generate_json(&self, prompt: &str, shape: Shape) -> ApiResult<Value> {
        let raw = self.generator.generate(prompt, shape == Shape::Object).await?;
        Ok(recover(&raw, shape)?)
    }
}
