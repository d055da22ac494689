use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::clients::traits::{AgentError, CompletionClient, CompletionRequest};
use crate::config::{GenerationConfig, RuntimeConfig};
use crate::utils::truncate_chars;

const BODY_SNIPPET_CHARS: usize = 500;

/// Client for any OpenAI-compatible chat-completions endpoint
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    endpoint: String,
    api_key: Option<String>,
    timeout_ms: u64,
    client: Client,
}

impl OpenAiClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: normalize_endpoint(endpoint),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout_ms,
            client,
        })
    }

    pub fn from_config(
        generation: &GenerationConfig,
        runtime: &RuntimeConfig,
    ) -> Result<Self, AgentError> {
        Self::new(
            &generation.endpoint,
            runtime.openai_api_key.clone(),
            generation.timeout_ms,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_err(&self, err: reqwest::Error) -> AgentError {
        if err.is_timeout() {
            AgentError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder.send().await.map_err(|e| self.map_send_err(e))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(AgentError::Service {
                status,
                body: truncate_chars(text.trim(), BODY_SNIPPET_CHARS),
            });
        }

        let response_json: Value = res
            .json()
            .await
            .map_err(|e| AgentError::ParseError(format!("invalid completion body: {e}")))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AgentError::ParseError("completion body has no choices[0].message.content".into())
            })?
            .trim()
            .to_string();

        tracing::debug!(
            "Completion from {} returned {} bytes",
            self.endpoint,
            content.len()
        );

        Ok(content)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{trimmed}/chat/completions")
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalization() {
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:8111"),
            "http://127.0.0.1:8111/v1/chat/completions"
        );
        assert_eq!(
            normalize_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            normalize_endpoint("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn blank_api_key_is_dropped() {
        let client = OpenAiClient::new("http://localhost:1", Some("  ".into()), 1000).unwrap();
        assert!(client.api_key.is_none());
    }
}
