//! Key resolution and model rules shared by the proxy handlers.

use crate::llm::chat::UpstreamError;
use crate::models::api::ModelInfo;

pub const GENERIC_CHAT_ERROR: &str = "An error occurred while processing your request";
pub const OPENROUTER_MODELS_KEY_REQUIRED: &str = "API key required for OpenRouter. Please provide an API key.";
pub const OPENROUTER_INVALID_KEY: &str = "Invalid OpenRouter API key. Please check your API key and try again.";
pub const OPENAI_INVALID_KEY: &str = "Invalid OpenAI API key. Please check your API key and try again.";
pub const NO_KEY_DEFAULT_MODELS: &str = "No API key provided. Using default models list.";
pub const RESTRICTED_MODEL: &str = "GPT-4.5 models are restricted when using the environment API key";

const RESTRICTED_FAMILY: &str = "gpt-4.5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    /// The server's own key is in use rather than one sent by the caller.
    pub from_env: bool,
}

/// OpenRouter only ever uses the caller's key; OpenAI falls back to the
/// server's key.
pub fn resolve_api_key(provided: Option<&str>, is_open_router: bool, env_key: Option<&str>) -> Option<ResolvedKey> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Some(ResolvedKey { key: key.to_string(), from_env: false });
    }
    if is_open_router {
        return None;
    }
    env_key
        .filter(|k| !k.is_empty())
        .map(|key| ResolvedKey { key: key.to_string(), from_env: true })
}

pub fn missing_key_message(is_open_router: bool) -> &'static str {
    if is_open_router { "OpenRouter API key is required" } else { "OpenAI API key is required" }
}

pub fn is_restricted(model: &str, key: &ResolvedKey, is_open_router: bool) -> bool {
    key.from_env && !is_open_router && model.contains(RESTRICTED_FAMILY)
}

/// Offered when no OpenAI key is available at all.
pub fn default_models() -> Vec<ModelInfo> {
    ["gpt-3.5-turbo", "gpt-3.5-turbo-16k", "gpt-4", "gpt-4-turbo", "gpt-4-32k"]
        .into_iter()
        .map(ModelInfo::new)
        .collect()
}

pub fn is_auth_failure(err: &UpstreamError) -> bool {
    if err.status() == Some(401) {
        return true;
    }
    let message = err.to_string();
    message.contains("auth") || message.contains("key")
}
