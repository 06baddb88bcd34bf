use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profiles offered by the client. The relay forwards whatever it receives.
pub const PROFILES: &[&str] = &["general", "student", "developer", "business"];

pub const DEFAULT_PROFILE: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Request from client to relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub profile: String,
}

/// Body of every non-2xx relay response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResponse {
    Success { answer_text: String },
    Failure { error_message: String },
}

impl ChatResponse {
    /// Interprets a relay reply. Successful replies carry the upstream
    /// completion payload; anything with an `error` field is a failure.
    pub fn from_reply(status_ok: bool, body: &Value) -> Self {
        if let Some(error) = body.get("error") {
            let error_message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return ChatResponse::Failure { error_message };
        }

        if !status_ok {
            return ChatResponse::Failure {
                error_message: "An unknown API error occurred.".to_string(),
            };
        }

        let answer_text = completion_content(body)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        ChatResponse::Success { answer_text }
    }
}

/// `choices[0].message.content` of an OpenAI-style completion payload.
pub fn completion_content(payload: &Value) -> Option<&str> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}
