use alpha_shared::ChatRequest;
use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{API_KEY_VAR, DEFAULT_UPSTREAM_URL};
use crate::error::{RelayError, UpstreamError};

pub const MODEL: &str = "deepseek/deepseek-chat";
pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 512;
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps the user's message in the fixed question/answer template.
pub fn prompt_for(message: &str) -> String {
    format!("Question: {}\nAnswer:", message)
}

pub fn completion_request(prompt: String) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let user_message = ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?,
    );

    CreateChatCompletionRequestArgs::default()
        .model(MODEL)
        .messages(vec![user_message])
        .temperature(TEMPERATURE)
        .max_tokens(MAX_TOKENS)
        .build()
}

/// The completion provider the relay forwards to.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends one prompt and returns the provider's JSON payload untouched.
    async fn complete(&self, prompt: String) -> Result<Value, UpstreamError>;
}

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Result<Self, UpstreamError> {
        Self::with_timeout(api_key, UPSTREAM_TIMEOUT)
    }

    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_UPSTREAM_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Upstream for OpenRouterClient {
    async fn complete(&self, prompt: String) -> Result<Value, UpstreamError> {
        let request = completion_request(prompt)?;
        debug!("Posting completion request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Stateless relay: validates one request, makes one upstream call.
pub struct RelayService {
    upstream: Option<Arc<dyn Upstream>>,
}

impl RelayService {
    pub fn new(upstream: Option<Arc<dyn Upstream>>) -> Self {
        Self { upstream }
    }

    pub fn ensure_configured(&self) -> Result<&Arc<dyn Upstream>, RelayError> {
        self.upstream
            .as_ref()
            .ok_or(RelayError::MissingCredential(API_KEY_VAR))
    }

    pub async fn relay(&self, request: ChatRequest) -> Result<Value, RelayError> {
        let upstream = self.ensure_configured()?;

        if request.message.trim().is_empty() {
            return Err(RelayError::MissingMessage);
        }

        // profile is accepted but does not change the prompt
        debug!(
            "Relaying message ({} chars, profile {:?})",
            request.message.chars().count(),
            request.profile
        );

        let payload = upstream.complete(prompt_for(&request.message)).await?;
        info!("Upstream completion relayed");
        Ok(payload)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    pub enum StubOutcome {
        Reply(Value),
        Status(u16),
    }

    pub struct StubUpstream {
        outcome: StubOutcome,
        prompts: Mutex<Vec<String>>,
    }

    impl StubUpstream {
        pub fn replying(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                outcome: StubOutcome::Reply(payload),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                outcome: StubOutcome::Status(status),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn complete(&self, prompt: String) -> Result<Value, UpstreamError> {
            self.prompts.lock().unwrap().push(prompt);
            match &self.outcome {
                StubOutcome::Reply(payload) => Ok(payload.clone()),
                StubOutcome::Status(code) => Err(UpstreamError::Status {
                    status: reqwest::StatusCode::from_u16(*code).unwrap(),
                    body: "stubbed failure".to_string(),
                }),
            }
        }
    }
}
