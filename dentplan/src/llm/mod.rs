//! Narrative generation client
//!
//! A thin seam over a chat-completions API. Drafting never depends on this
//! succeeding; any error here is absorbed by the deterministic fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

mod openai;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited by API")]
    RateLimited,

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited | LlmError::Network(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// "Turn a system prompt and a user prompt into prose"
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Build a client from config, or `None` when LLM drafting is disabled.
pub fn from_config(config: &LlmConfig) -> Option<OpenAiClient> {
    if !config.enabled {
        debug!("from_config: llm disabled, drafting will use the fallback template");
        return None;
    }
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => match OpenAiClient::new(config, key) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "from_config: client build failed, drafting will use the fallback template");
                None
            }
        },
        _ => {
            warn!(
                env = %config.api_key_env,
                "from_config: llm enabled but api key env is unset, drafting will use the fallback template"
            );
            None
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Scripted generation client for drafting tests
    pub struct MockGenerationClient {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        delay: Option<Duration>,
    }

    impl MockGenerationClient {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                delay: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl GenerationClient for MockGenerationClient {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("no scripted response".to_string()));
            }
            responses.remove(0)
        }
    }
}
