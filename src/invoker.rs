//! Generation service invocation

use std::sync::Arc;
use std::time::Instant;

use crate::clients::{ChatMessage, CompletionClient, CompletionRequest};
use crate::config::GenerationConfig;
use crate::error::Result;

/// Model identifier and sampling parameters for one kind of request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(cfg: &GenerationConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Sends rendered prompts to the generation service.
///
/// Failures are reported once as [`crate::error::QuizError::Generation`] (or `Timeout`)
/// and never retried here.
#[derive(Clone)]
pub struct GenerationInvoker {
    client: Arc<dyn CompletionClient>,
}

impl GenerationInvoker {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn invoke(
        &self,
        system_instructions: &str,
        user_content: &str,
        settings: &GenerationSettings,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system_instructions.is_empty() {
            messages.push(ChatMessage::system(system_instructions));
        }
        messages.push(ChatMessage::user(user_content));

        let request = CompletionRequest {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        let started = Instant::now();
        let result = self.client.complete(&request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                tracing::debug!(
                    model = %settings.model,
                    elapsed_ms,
                    reply_bytes = text.len(),
                    "generation call completed"
                );
                Ok(text)
            }
            Err(e) => {
                tracing::debug!(model = %settings.model, elapsed_ms, "generation call failed: {}", e);
                Err(e.into())
            }
        }
    }
}
