//! Language-model client used for the four model-assisted fields.
//!
//! The pipeline only needs `complete(prompt, max_tokens) -> text`; the Mistral
//! chat-completions client below is the production implementation.

use crate::error::ModelCallError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const MISTRAL_API_URL: &str = "https://api.mistral.ai/v1/chat/completions";

/// Request/response contract of the model collaborator.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound for one `complete` call.
    fn timeout(&self) -> Duration;

    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String, ModelCallError>;
}

/// Mistral client for chat completions.
#[derive(Clone)]
pub struct MistralClient {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl MistralClient {
    /// Build a client from the configured API key.
    ///
    /// Callers skip the model path on error rather than failing requests.
    pub fn from_settings(
        api_key: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ModelCallError> {
        let api_key = api_key.ok_or(ModelCallError::MissingCredentials)?;
        let client = Client::builder().timeout(timeout).build()?;

        info!("Mistral client initialized (model={}, timeout={:?})", model, timeout);
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl CompletionClient for MistralClient {
    fn name(&self) -> &str {
        "mistral"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String, ModelCallError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            max_tokens: Some(max_output_tokens),
        };

        debug!("Sending request to Mistral: model={}", request.model);

        let response = self
            .client
            .post(MISTRAL_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelCallError::Timeout(self.timeout)
                } else {
                    ModelCallError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelCallError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatCompletionResponse = response.json().await?;

        if let Some(usage) = &response.usage {
            info!(
                "Mistral response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ModelCallError::EmptyResponse)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: Role,
    content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

impl Message {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
