use axum::{
    extract::{ Request, State },
    http::StatusCode,
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use log::{ error, info, warn };
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };

use super::policy;
use crate::config::prompt::load_prompt;
use crate::config::settings::{ CUSTOM_MODEL, DEFAULT_MODEL };
use crate::llm::chat::{ default_factory, ChatClient, ClientFactory, UpstreamError };
use crate::llm::{ LlmConfig, Provider };
use crate::models::api::{
    ChatRequest,
    ChatResponse,
    ErrorResponse,
    ModelInfo,
    ModelsRequest,
    ModelsResponse,
    PromptResponse,
    SheetsRequest,
    SheetsResponse,
};
use crate::models::chat::{ ChatTurn, Role };
use crate::sheets::{ append_submission, SheetStore, SheetsError };

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_RATE_LIMIT: u32 = 10;

fn limiter(per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingKey(&'static str),
    #[error("{0}")]
    Restricted(&'static str),
    #[error("{0}")]
    Upstream(String),
    #[error("Error writing to Google Sheets: {0}")]
    Sheets(#[from] SheetsError),
    #[error("Error writing to Google Sheets: spreadsheet access is not configured")]
    SheetsDisabled,
    #[error("Too many requests")]
    RateLimited,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingKey(_) => StatusCode::BAD_REQUEST,
            ApiError::Restricted(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) | ApiError::Sheets(_) | ApiError::SheetsDisabled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    env_api_key: Option<String>,
    prompt_path: PathBuf,
    app_url: String,
    sheets: Option<Arc<dyn SheetStore>>,
    clients: ClientFactory,
    limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(env_api_key: Option<String>, prompt_path: impl Into<PathBuf>, app_url: impl Into<String>) -> Self {
        Self {
            env_api_key: env_api_key.filter(|k| !k.is_empty()),
            prompt_path: prompt_path.into(),
            app_url: app_url.into(),
            sheets: None,
            clients: default_factory(),
            limiter: limiter(DEFAULT_RATE_LIMIT),
        }
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SheetStore>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn with_clients(mut self, clients: ClientFactory) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = limiter(per_second);
        self
    }

    fn client(&self, provider: Provider, key: &str, base_url: Option<String>) -> Result<Arc<dyn ChatClient>, UpstreamError> {
        let config = LlmConfig::new(provider, key).with_base_url(base_url).with_referer(self.app_url.clone());
        (self.clients)(&config)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/models", post(models_handler))
        .route("/prompt", get(prompt_handler))
        .route("/sheets", post(sheets_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new().nest("/api", api).layer(cors).with_state(state)
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    if state.limiter.check().is_err() {
        warn!("Rate limit exceeded for {}", req.uri().path());
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatResponse>, ApiError> {
    let key = policy
        ::resolve_api_key(req.api_key.as_deref(), req.is_open_router, state.env_api_key.as_deref())
        .ok_or(ApiError::MissingKey(policy::missing_key_message(req.is_open_router)))?;

    // OpenRouter gets the model exactly as sent; only OpenAI has a default.
    let model = match req.model.filter(|m| !m.is_empty()) {
        Some(model) => model,
        None if req.is_open_router => String::new(),
        None => DEFAULT_MODEL.to_string(),
    };
    if policy::is_restricted(&model, &key, req.is_open_router) {
        warn!("Refusing restricted model {} on the server key", model);
        return Err(ApiError::Restricted(policy::RESTRICTED_MODEL));
    }

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(prompt) = req.system_prompt.filter(|p| !p.is_empty()) {
        messages.push(ChatTurn::new(Role::System, prompt));
    }
    messages.extend(req.messages);

    let provider = Provider::from_flag(req.is_open_router);
    let upstream = |e: UpstreamError| {
        error!("Error in {} API call: {}", provider, e);
        let message = e.to_string();
        ApiError::Upstream(if message.is_empty() { policy::GENERIC_CHAT_ERROR.to_string() } else { message })
    };
    let client = state.client(provider, &key.key, req.api_endpoint).map_err(upstream)?;
    let message = client.complete(&model, &messages).await.map_err(upstream)?;

    info!("{} completion with {} ({} message(s))", provider, model, messages.len());
    Ok(Json(ChatResponse { message }))
}

fn models_response(status: StatusCode, models: Option<Vec<ModelInfo>>, error: Option<String>) -> Response {
    (status, Json(ModelsResponse { models, error })).into_response()
}

fn upstream_status(err: &UpstreamError) -> StatusCode {
    err.status()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn models_handler(State(state): State<AppState>, Json(req): Json<ModelsRequest>) -> Response {
    let key = policy::resolve_api_key(req.api_key.as_deref(), req.is_open_router, state.env_api_key.as_deref());
    if req.is_open_router {
        open_router_models(&state, key).await
    } else {
        openai_models(&state, key, req.api_endpoint).await
    }
}

async fn open_router_models(state: &AppState, key: Option<policy::ResolvedKey>) -> Response {
    let Some(key) = key else {
        return models_response(
            StatusCode::BAD_REQUEST,
            Some(Vec::new()),
            Some(policy::OPENROUTER_MODELS_KEY_REQUIRED.to_string())
        );
    };

    let listed = match state.client(Provider::OpenRouter, &key.key, None) {
        Ok(client) => client.list_models().await,
        Err(e) => Err(e),
    };
    match listed {
        Ok(mut models) => {
            models.push(ModelInfo::new(CUSTOM_MODEL));
            models_response(StatusCode::OK, Some(models), None)
        }
        Err(e) if e.status() == Some(401) => {
            models_response(StatusCode::UNAUTHORIZED, None, Some(policy::OPENROUTER_INVALID_KEY.to_string()))
        }
        Err(e @ UpstreamError::Status { .. }) => {
            models_response(upstream_status(&e), None, Some(e.to_string()))
        }
        Err(e) => {
            error!("Error fetching OpenRouter models: {}", e);
            models_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(vec![ModelInfo::new(CUSTOM_MODEL)]),
                Some(format!("Error fetching models: {}", e))
            )
        }
    }
}

async fn openai_models(state: &AppState, key: Option<policy::ResolvedKey>, endpoint: Option<String>) -> Response {
    let Some(key) = key else {
        return models_response(
            StatusCode::BAD_REQUEST,
            Some(policy::default_models()),
            Some(policy::NO_KEY_DEFAULT_MODELS.to_string())
        );
    };

    let listed = match state.client(Provider::OpenAI, &key.key, endpoint) {
        Ok(client) => client.list_models().await,
        Err(e) => Err(e),
    };
    match listed {
        Ok(models) => models_response(StatusCode::OK, Some(models), None),
        Err(e) => {
            error!("Error fetching OpenAI models: {}", e);
            if policy::is_auth_failure(&e) {
                return models_response(StatusCode::UNAUTHORIZED, None, Some(policy::OPENAI_INVALID_KEY.to_string()));
            }
            models_response(upstream_status(&e), None, Some(e.to_string()))
        }
    }
}

async fn prompt_handler(State(state): State<AppState>) -> Json<PromptResponse> {
    Json(PromptResponse { prompt: load_prompt(&state.prompt_path) })
}

async fn sheets_handler(
    State(state): State<AppState>,
    Json(req): Json<SheetsRequest>
) -> Result<Json<SheetsResponse>, ApiError> {
    let store = state.sheets.as_ref().ok_or(ApiError::SheetsDisabled)?;
    let updated_rows = append_submission(store.as_ref(), &req).await.map_err(|e| {
        error!("Error writing to Google Sheets: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(SheetsResponse { success: true, updated_rows }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(ApiError::MissingKey("k").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Restricted("r").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::Sheets(SheetsError::SheetNotFound("7".into())).to_string(),
            "Error writing to Google Sheets: Sheet with GID 7 not found"
        );
    }

    #[test]
    fn test_upstream_status_passthrough() {
        let err = UpstreamError::Status { status: 429, message: "slow".into() };
        assert_eq!(upstream_status(&err), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream_status(&UpstreamError::EmptyResponse), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
