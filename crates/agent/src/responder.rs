//! Fallback responder: free-form negotiation-flavored text for turns the
//! deterministic rules do not cover.
//!
//! The provider is strictly a phrasing aid. The system context pins the
//! price facts, and nothing the provider returns is ever parsed back into
//! negotiation state.

use std::time::Duration;

use async_trait::async_trait;
use haggle_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("provider response could not be decoded: {0}")]
    Decode(String),
    #[error("provider call timed out after {0}s")]
    Timeout(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    Customer,
    Shopkeeper,
}

impl Speaker {
    fn wire_role(self) -> &'static str {
        match self {
            Self::Customer => "user",
            Self::Shopkeeper => "assistant",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HistoryTurn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct CustomerProfile {
    pub gender: Option<String>,
    pub age_group: Option<String>,
}

/// Frozen fact sheet handed to the provider. Deliberately excludes the
/// floor price: the customer-facing text must never reveal it.
#[derive(Clone, Debug)]
pub struct FallbackContext {
    pub product_name: String,
    pub ask_price: i64,
    pub profile: CustomerProfile,
}

impl FallbackContext {
    fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are a seasoned Bangalore electronics shopkeeper haggling with a customer.\n\
             The item under discussion is the {}. Your current quoted price is {} rupees.\n\
             Stay in character: warm, witty, a little theatrical.\n\
             HARD RULES: never state a different price than {} rupees, never invent \
             discounts, never accept or reject an offer yourself. Price decisions are \
             made elsewhere. Keep replies under three sentences.",
            self.product_name, self.ask_price, self.ask_price
        );

        if self.profile.gender.is_some() || self.profile.age_group.is_some() {
            prompt.push_str("\nCustomer profile:");
            if let Some(gender) = &self.profile.gender {
                prompt.push_str(&format!(" gender={gender}"));
            }
            if let Some(age_group) = &self.profile.age_group {
                prompt.push_str(&format!(" age_group={age_group}"));
            }
        }

        prompt
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        ctx: &FallbackContext,
        history: &[HistoryTurn],
        user_message: &str,
    ) -> Result<String, ProviderError>;
}

/// OpenAI-compatible `chat/completions` client. Ollama serves the same
/// shape under `/v1`, so one client covers both configured providers.
pub struct OpenAiResponder {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiResponder {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, LlmProvider::Ollama) => "http://localhost:11434/v1".to_string(),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{base_url}/chat/completions"),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn attempt(&self, body: &ChatRequest) -> Result<String, ProviderError> {
        let mut request = self.http.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else {
                ProviderError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail: detail.chars().take(200).collect(),
            });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|err| ProviderError::Decode(err.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Decode("completion had no choices".to_string()))
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(
        &self,
        ctx: &FallbackContext,
        history: &[HistoryTurn],
        user_message: &str,
    ) -> Result<String, ProviderError> {
        let mut messages =
            vec![ChatMessage { role: "system".to_string(), content: ctx.system_prompt() }];
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: turn.speaker.wire_role().to_string(),
            content: turn.text.clone(),
        }));
        messages.push(ChatMessage { role: "user".to_string(), content: user_message.to_string() });

        let body = ChatRequest { model: self.model.clone(), messages };

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.attempt(&body).await {
                Ok(reply) => return Ok(reply),
                // Client-side rejections will not heal on retry.
                Err(err @ ProviderError::Status { status, .. }) if status < 500 => return Err(err),
                Err(err @ ProviderError::Decode(_)) => return Err(err),
                Err(err) => {
                    debug!(
                        event_name = "agent.responder.retry",
                        attempt,
                        error = %err,
                        "fallback provider attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Transport("no attempt was made".to_string())))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}
