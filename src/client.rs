//! HTTP client for the proxy endpoints, used by the command line.

use log::debug;
use reqwest::{ Client as HttpClient, Response };
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::api::{
    ChatRequest,
    ChatResponse,
    ErrorResponse,
    ModelsRequest,
    ModelsResponse,
    PromptResponse,
    SheetsRequest,
    SheetsResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to proxy failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Error {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },
}

pub struct ProxyClient {
    http: HttpClient,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url, route)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json
            ::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| if body.is_empty() { status.to_string() } else { body });
        Err(ClientError::Api { status: status.as_u16(), message })
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        debug!("POST {} with {} message(s)", self.url("chat"), request.messages.len());
        let resp = self.http.post(self.url("chat")).json(request).send().await?;
        Ok(Self::decode::<ChatResponse>(resp).await?.message)
    }

    /// Non-2xx answers are still decoded when they carry a model list, since
    /// the server attaches fallback lists to some failures.
    pub async fn models(&self, request: &ModelsRequest) -> Result<ModelsResponse, ClientError> {
        let resp = self.http.post(self.url("models")).json(request).send().await?;
        let status = resp.status();
        let body: ModelsResponse = resp.json().await?;
        if !status.is_success() && body.models.is_none() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| "Failed to fetch models".to_string()),
            });
        }
        Ok(body)
    }

    pub async fn prompt(&self) -> Result<String, ClientError> {
        let resp = self.http.get(self.url("prompt")).send().await?;
        Ok(Self::decode::<PromptResponse>(resp).await?.prompt)
    }

    pub async fn push_sheets(&self, request: &SheetsRequest) -> Result<SheetsResponse, ClientError> {
        let resp = self.http.post(self.url("sheets")).json(request).send().await?;
        Self::decode(resp).await
    }
}
