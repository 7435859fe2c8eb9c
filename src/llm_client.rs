use crate::config::Config;
use crate::errors::AppError;
use crate::prompt::PromptPair;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One chat completion call: a system and a user instruction for a model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompts: PromptPair) -> Self {
        Self {
            model: model.into(),
            system: prompts.system,
            user: prompts.user,
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

/// LLM completion provider.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the text of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError>;
}

/// Calls the provider and swallows transport failures.
///
/// An empty string comes back on failure; the normalizer turns it into the
/// sentinel fallback report.
pub async fn complete_or_empty(
    service: &dyn CompletionService,
    request: &CompletionRequest,
) -> String {
    match service.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Completion with model {} failed: {}", request.model, e);
            String::new()
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for Groq's OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GroqClient {
    /// Creates a new `GroqClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.groq.com/openai/v1`.
    /// * `api_key` - Bearer token for the provider.
    /// * `timeout` - Whole-request timeout for each completion.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Groq client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.groq_base_url.clone(),
            config.groq_api_key.clone(),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionService for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::info!("Requesting completion from {} (model {})", url, request.model);

        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Groq request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Groq returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Groq response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::ExternalApiError("Groq response contained no completion".to_string())
            })?;

        tracing::debug!("Received completion of {} bytes", content.len());
        Ok(content)
    }
}
