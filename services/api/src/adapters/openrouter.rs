//! services/api/src/adapters/openrouter.rs
//!
//! This module contains the adapter for the hosted LLM, reached through
//! OpenRouter's OpenAI-compatible chat completion API.
//! It implements the `ContentGenerationService` port with a single attempt;
//! retries are layered on top by `RetryingGenerator`.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use english_coach_core::ports::{
    classify_failure, ContentGenerationService, GenerationError, GenerationResult,
};
use futures::StreamExt;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContentGenerationService` by streaming one
/// chat completion and concatenating its text deltas.
#[derive(Clone)]
pub struct OpenRouterAdapter {
    /// `None` when no credential is configured; every call then fails with
    /// `GenerationError::NotConfigured`.
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenRouterAdapter {
    /// Creates a new `OpenRouterAdapter`.
    pub fn new(api_key: Option<&str>, api_base: &str, model: String) -> Self {
        let client = api_key.map(|key| {
            Client::with_config(OpenAIConfig::new().with_api_base(api_base).with_api_key(key))
        });
        Self { client, model }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

/// Maps a client error onto the generation failure taxonomy.
fn classify(error: &OpenAIError) -> GenerationError {
    if let OpenAIError::Reqwest(inner) = error {
        if inner.is_timeout() || inner.is_connect() {
            return GenerationError::Network(inner.to_string());
        }
    }
    // The debug form carries status codes and raw bodies the display form may drop.
    let classified = classify_failure(&format!("{} {:?}", error, error));
    match classified {
        GenerationError::Unknown(_) => GenerationError::Unknown(error.to_string()),
        other => other,
    }
}

//=========================================================================================
// `ContentGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentGenerationService for OpenRouterAdapter {
    async fn generate(&self, prompt: &str, json_mode: bool) -> GenerationResult<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| GenerationError::NotConfigured("no API credential".to_string()))?;

        let message = ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| GenerationError::Unknown(e.to_string()))?,
        );

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(vec![message]).stream(true);
        if json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }
        let request = args
            .build()
            .map_err(|e| GenerationError::Unknown(e.to_string()))?;

        let mut stream = client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| classify(&e))?;

        let mut full_text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(&e))?;
            for choice in chunk.choices {
                if let Some(delta) = choice.delta.content {
                    full_text.push_str(&delta);
                }
            }
        }

        debug!(model = %self.model, chars = full_text.len(), "Generation stream completed");

        if full_text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let adapter = OpenRouterAdapter::new(None, "https://openrouter.ai/api/v1", "m".into());
        assert!(!adapter.is_configured());
        let err = adapter.generate("hello", false).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
        assert!(!err.to_string().contains("OPENROUTER"));
    }

    #[test]
    fn api_errors_are_classified_by_content() {
        let err = OpenAIError::InvalidArgument("429 rate limit exceeded".to_string());
        assert!(matches!(classify(&err), GenerationError::RateLimited(_)));

        let err = OpenAIError::InvalidArgument("something odd".to_string());
        assert!(matches!(classify(&err), GenerationError::Unknown(_)));
    }
}
