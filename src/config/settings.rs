//! User-facing chat settings, loaded from and saved to a JSON file.

use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::llm::{ OPENAI_BASE_URL, OPENROUTER_BASE_URL };
use crate::models::api::{ ChatRequest, ModelInfo, ModelsRequest };
use crate::models::chat::ChatTurn;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Placeholder model shown when an OpenAI key cannot list any models.
pub const INVALID_API_KEY_MODEL: &str = "invalid-api-key";
/// Pseudo-model that switches to a free-form OpenRouter model identifier.
pub const CUSTOM_MODEL: &str = "custom";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Please enter a valid API key or select a different model.")]
    InvalidModel,
    #[error("OpenRouter requires an API key. Please enter your API key or switch to OpenAI.")]
    OpenRouterKeyRequired,
    #[error("Please enter an other model identifier or select a pre-defined model.")]
    CustomModelRequired,
    #[error(
        "GPT-4.5 models are restricted and cannot be used with the environment API key. Please select a different model in Settings."
    )]
    RestrictedModel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub system_prompt: String,
    pub api_key: String,
    pub selected_model: String,
    pub api_endpoint: String,
    pub is_custom_endpoint: bool,
    pub is_open_router: bool,
    pub custom_open_router_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            api_key: String::new(),
            selected_model: DEFAULT_MODEL.to_string(),
            api_endpoint: OPENAI_BASE_URL.to_string(),
            is_custom_endpoint: false,
            is_open_router: false,
            custom_open_router_model: String::new(),
        }
    }
}

/// `custom` or `other`, ignoring case and surrounding whitespace.
pub fn is_custom_model(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    model == "custom" || model == "other"
}

impl Settings {
    /// Never fails: unreadable settings fall back to defaults with a warning.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Failed to read settings from {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str::<Settings>(&text) {
            Ok(mut settings) => {
                if settings.selected_model == INVALID_API_KEY_MODEL || settings.selected_model.is_empty() {
                    settings.selected_model = DEFAULT_MODEL.to_string();
                }
                settings
            }
            Err(e) => {
                warn!("Error loading saved settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate_for_save()?;
        self.write_to(path)
    }

    /// Writes without validation.
    pub fn write_to(&self, path: &Path) -> Result<(), SettingsError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate_for_save(&self) -> Result<(), SettingsError> {
        if self.selected_model == INVALID_API_KEY_MODEL {
            return Err(SettingsError::InvalidModel);
        }
        if self.is_open_router && self.api_key.trim().is_empty() {
            return Err(SettingsError::OpenRouterKeyRequired);
        }
        if self.is_open_router && is_custom_model(&self.selected_model) && self.custom_open_router_model.trim().is_empty() {
            return Err(SettingsError::CustomModelRequired);
        }
        Ok(())
    }

    /// Save checks plus the restriction on GPT-4.5 with the server's key.
    pub fn validate_for_send(&self) -> Result<(), SettingsError> {
        self.validate_for_save()?;
        if !self.is_open_router && self.api_key.is_empty() && self.selected_model.contains("gpt-4.5") {
            return Err(SettingsError::RestrictedModel);
        }
        Ok(())
    }

    /// Toggling the provider resets the endpoint to that provider's base URL.
    pub fn set_open_router(&mut self, enabled: bool) {
        self.is_open_router = enabled;
        if enabled {
            self.api_endpoint = OPENROUTER_BASE_URL.to_string();
            self.is_custom_endpoint = false;
        } else {
            self.api_endpoint = OPENAI_BASE_URL.to_string();
        }
    }

    pub fn resolved_model(&self) -> String {
        if self.is_open_router && is_custom_model(&self.selected_model) {
            self.custom_open_router_model.trim().to_string()
        } else {
            self.selected_model.clone()
        }
    }

    /// Only forwarded when the user overrides the endpoint or uses OpenRouter.
    pub fn request_endpoint(&self) -> Option<String> {
        (self.is_custom_endpoint || self.is_open_router).then(|| self.api_endpoint.clone())
    }

    pub fn models_endpoint(&self) -> String {
        if self.is_open_router {
            OPENROUTER_BASE_URL.to_string()
        } else if self.is_custom_endpoint {
            self.api_endpoint.clone()
        } else {
            OPENAI_BASE_URL.to_string()
        }
    }

    fn non_empty(value: &str) -> Option<String> {
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn chat_request(&self, messages: Vec<ChatTurn>) -> ChatRequest {
        ChatRequest {
            messages,
            system_prompt: Self::non_empty(&self.system_prompt),
            api_key: Self::non_empty(&self.api_key),
            model: Some(self.resolved_model()),
            api_endpoint: self.request_endpoint(),
            is_open_router: self.is_open_router,
        }
    }

    pub fn models_request(&self) -> ModelsRequest {
        ModelsRequest {
            api_key: Self::non_empty(&self.api_key),
            api_endpoint: Some(self.models_endpoint()),
            is_open_router: self.is_open_router,
        }
    }

    /// Single-entry list offered when no usable model list is available.
    pub fn fallback_models(&self) -> Vec<ModelInfo> {
        if self.is_open_router {
            vec![ModelInfo::new(CUSTOM_MODEL)]
        } else {
            vec![ModelInfo::new(INVALID_API_KEY_MODEL)]
        }
    }

    /// Narrows a provider's model list to what can be selected with the
    /// current settings.
    pub fn filter_models(&self, models: Vec<ModelInfo>) -> Vec<ModelInfo> {
        let filtered: Vec<ModelInfo> = if self.is_open_router {
            let mut models = models;
            if !models.iter().any(|m| m.id == CUSTOM_MODEL) {
                models.push(ModelInfo::new(CUSTOM_MODEL));
            }
            models
        } else if !self.api_key.is_empty() {
            models.into_iter().filter(|m| m.id.starts_with("gpt-")).collect()
        } else {
            models
                .into_iter()
                .filter(|m| {
                    let id = m.id.to_lowercase();
                    m.id.starts_with("gpt-") &&
                        !m.id.contains("gpt-4.5") &&
                        !id.contains("realtime") &&
                        !id.contains("search") &&
                        !id.contains("audio")
                })
                .collect()
        };
        if filtered.is_empty() { self.fallback_models() } else { filtered }
    }
}
