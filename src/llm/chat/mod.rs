pub mod openai;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::api::ModelInfo;
use crate::models::chat::ChatTurn;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-success HTTP status; `message` is the provider's own message when
    /// one could be extracted.
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
    },
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
    #[error("The provider returned no completion")]
    EmptyResponse,
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pulls `error.message` (or a plain string `error`) out of a provider's
/// error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let root: JsonValue = serde_json::from_str(body).ok()?;
    match root.get("error")? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Object(obj) => obj.get("message").and_then(|m| m.as_str()).map(str::to_string),
        _ => None,
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the full message history and returns the assistant's reply.
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String, UpstreamError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, UpstreamError>;
}

/// Builds a client per request, since the key and endpoint come from the
/// caller.
pub type ClientFactory = Arc<
    dyn (Fn(&LlmConfig) -> Result<Arc<dyn ChatClient>, UpstreamError>) + Send + Sync
>;

pub fn default_factory() -> ClientFactory {
    Arc::new(new_client)
}

/// Both providers speak the OpenAI-compatible REST API.
pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, UpstreamError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
