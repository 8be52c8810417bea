use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ extract_error_message, ChatClient, UpstreamError };
use crate::llm::{ LlmConfig, Provider };
use crate::models::api::ModelInfo;
use crate::models::chat::ChatTurn;

pub struct OpenAIChatClient {
    http: HttpClient,
    provider: Provider,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    /// Left out when empty so the provider applies its own default.
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

fn header_value(value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidHeader(e.to_string()))
}

impl OpenAIChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", config.api_key))?);
        if config.provider == Provider::OpenRouter {
            headers.insert(HeaderName::from_static("http-referer"), header_value(&config.referer)?);
            headers.insert(HeaderName::from_static("x-title"), header_value(&config.title)?);
        }

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url: config.resolved_base_url().trim_end_matches('/').to_string(),
        })
    }

    /// Turns a non-success response into `UpstreamError::Status`.
    async fn check(&self, resp: Response) -> Result<Response, UpstreamError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!("{} API returned {}: {}", self.provider, status, body);
        let message = extract_error_message(&body).unwrap_or_else(|| {
            let mut message = format!("{} API returned {}", self.provider, status.as_u16());
            if !body.is_empty() {
                message.push_str(&format!(": {}", body));
            }
            message
        });
        Err(UpstreamError::Status { status: status.as_u16(), message })
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} with model {}", url, model);

        let req = OpenAIChatRequest { model, messages };
        let resp = self.http.post(&url).json(&req).send().await?;
        let resp = self.check(resp).await?.json::<OpenAIResponse>().await?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(UpstreamError::EmptyResponse)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, UpstreamError> {
        let url = format!("{}/models", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let list = self.check(resp).await?.json::<OpenAIModelList>().await?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn test_empty_model_is_omitted() {
        let messages = vec![ChatTurn::new(Role::User, "hi")];
        let body = serde_json::to_value(OpenAIChatRequest { model: "", messages: &messages }).unwrap();
        assert!(body.get("model").is_none());
        let body = serde_json::to_value(OpenAIChatRequest { model: "openai/gpt-4", messages: &messages }).unwrap();
        assert_eq!(body["model"], "openai/gpt-4");
    }
}
