use alpha_shared::{ChatRequest, ChatResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

/// One round trip to the relay endpoint.
#[async_trait]
pub trait Relay: Send + Sync {
    /// `Err` means no usable reply arrived (transport failure or a body that
    /// is not JSON). Relay-side errors come back as `ChatResponse::Failure`.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

pub struct HttpRelay {
    client: Client,
    endpoint: Url,
}

impl HttpRelay {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL {:?}", base_url))?;
        let endpoint = base.join("/api/chat")?;

        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        info!(
            "Sending chat request ({} chars, profile {})",
            request.message.chars().count(),
            request.profile
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("Relay reply was not valid JSON")?;
        debug!("Relay replied with {}", status);

        Ok(ChatResponse::from_reply(status.is_success(), &body))
    }
}
