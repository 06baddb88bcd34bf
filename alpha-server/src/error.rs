use alpha_shared::ErrorBody;
use async_openai::error::OpenAIError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

/// Failure of the single outbound completion call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request failed with status code {}", .status.as_u16())]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to build completion request: {0}")]
    Build(#[from] OpenAIError),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Server missing {0}")]
    MissingCredential(&'static str),
    #[error("Message is required")]
    MissingMessage,
    #[error("{0}")]
    InvalidBody(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingCredential(_)
            | RelayError::MissingMessage
            | RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            RelayError::Upstream(UpstreamError::Status { status, body }) => {
                error!("Upstream returned {}: {}", status, body);
            }
            RelayError::Upstream(e) => error!("API Error: {}", e),
            RelayError::MissingCredential(var) => {
                error!("Rejecting chat request: {} is not configured", var);
            }
            other => warn!("Rejecting chat request: {}", other),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
