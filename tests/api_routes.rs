use async_trait::async_trait;
use axum::body::{ to_bytes, Body };
use axum::http::{ Method, Request, StatusCode };
use axum::Router;
use serde_json::{ json, Value };
use std::sync::{ Arc, Mutex };
use tower::ServiceExt;

use trainset::llm::chat::{ ChatClient, ClientFactory, UpstreamError };
use trainset::llm::{ LlmConfig, Provider };
use trainset::models::api::ModelInfo;
use trainset::models::chat::{ ChatTurn, Role };
use trainset::server::{ router, AppState };
use trainset::sheets::{ SheetStore, SheetsError };

#[derive(Default)]
struct Calls {
    configs: Vec<(Provider, String, Option<String>)>,
    completions: Vec<(String, Vec<ChatTurn>)>,
}

struct FakeClient {
    key: String,
    calls: Arc<Mutex<Calls>>,
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String, UpstreamError> {
        if self.key == "bad" {
            return Err(UpstreamError::Status { status: 401, message: "Incorrect API key provided".into() });
        }
        self.calls.lock().unwrap().completions.push((model.to_string(), messages.to_vec()));
        Ok("pong".to_string())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, UpstreamError> {
        if self.key == "bad" {
            return Err(UpstreamError::Status { status: 401, message: "Unauthorized".into() });
        }
        Ok(vec![ModelInfo::new("gpt-4o"), ModelInfo::new("gpt-3.5-turbo")])
    }
}

fn fake_factory(calls: Arc<Mutex<Calls>>) -> ClientFactory {
    Arc::new(move |config: &LlmConfig| {
        calls.lock().unwrap().configs.push((config.provider, config.api_key.clone(), config.base_url.clone()));
        let client: Arc<dyn ChatClient> = Arc::new(FakeClient { key: config.api_key.clone(), calls: calls.clone() });
        Ok(client)
    })
}

#[derive(Default)]
struct MemorySheet {
    rows: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl SheetStore for MemorySheet {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<u64, SheetsError> {
        let count = rows.len() as u64;
        self.rows.lock().unwrap().extend(rows);
        Ok(count)
    }
}

fn app(env_key: Option<&str>, calls: Arc<Mutex<Calls>>) -> Router {
    let state = AppState::new(env_key.map(str::to_string), "missing-prompt.txt", "http://localhost:3000")
        .with_clients(fake_factory(calls));
    router(state)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

#[tokio::test]
async fn test_chat_requires_a_key() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(
        app(None, calls.clone()),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}]})
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "OpenAI API key is required");

    // The server key never covers OpenRouter.
    let (status, body) = post(
        app(Some("env-key"), calls.clone()),
        "/api/chat",
        json!({"messages":[],"isOpenRouter":true})
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "OpenRouter API key is required");
    assert!(calls.lock().unwrap().configs.is_empty());
}

#[tokio::test]
async fn test_chat_restricts_gpt45_on_env_key() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(
        app(Some("env-key"), calls.clone()),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}],"model":"gpt-4.5-preview"})
    ).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "GPT-4.5 models are restricted when using the environment API key");

    let (status, _) = post(
        app(Some("env-key"), calls.clone()),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}],"model":"gpt-4.5-preview","apiKey":"mine"})
    ).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_prepends_system_prompt() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(
        app(Some("env-key"), calls.clone()),
        "/api/chat",
        json!({
            "messages":[{"role":"user","content":"ping"}],
            "systemPrompt":"be brief",
            "apiEndpoint":"https://proxy.example/v1"
        })
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "pong");

    let calls = calls.lock().unwrap();
    assert_eq!(
        calls.configs,
        vec![(Provider::OpenAI, "env-key".to_string(), Some("https://proxy.example/v1".to_string()))]
    );
    let (model, messages) = &calls.completions[0];
    assert_eq!(model, "gpt-3.5-turbo");
    assert_eq!(messages, &vec![ChatTurn::new(Role::System, "be brief"), ChatTurn::new(Role::User, "ping")]);
}

#[tokio::test]
async fn test_chat_model_default_is_openai_only() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, _) = post(
        app(None, calls.clone()),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}],"apiKey":"or-key","isOpenRouter":true})
    ).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        app(None, calls.clone()),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}],"apiKey":"or-key","isOpenRouter":true,"model":"openai/gpt-4"})
    ).await;
    assert_eq!(status, StatusCode::OK);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.configs[0].0, Provider::OpenRouter);
    assert_eq!(calls.completions[0].0, "");
    assert_eq!(calls.completions[1].0, "openai/gpt-4");
}

#[tokio::test]
async fn test_chat_surfaces_upstream_message() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(
        app(None, calls),
        "/api/chat",
        json!({"messages":[{"role":"user","content":"hi"}],"apiKey":"bad"})
    ).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Incorrect API key provided");
}

#[tokio::test]
async fn test_models_without_key_returns_defaults() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(app(None, calls.clone()), "/api/models", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No API key provided. Using default models list.");
    assert_eq!(body["models"].as_array().unwrap().len(), 5);
    assert_eq!(body["models"][0]["id"], "gpt-3.5-turbo");

    let (status, body) = post(app(Some("env-key"), calls), "/api/models", json!({"isOpenRouter":true})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["models"], json!([]));
    assert_eq!(body["error"], "API key required for OpenRouter. Please provide an API key.");
}

#[tokio::test]
async fn test_models_lists_and_maps_auth_failures() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(app(Some("env-key"), calls.clone()), "/api/models", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"], json!([{"id":"gpt-4o"},{"id":"gpt-3.5-turbo"}]));

    let (status, body) = post(
        app(None, calls.clone()),
        "/api/models",
        json!({"apiKey":"or-key","isOpenRouter":true,"apiEndpoint":"https://ignored.example"})
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][2]["id"], "custom");
    assert_eq!(calls.lock().unwrap().configs.last().unwrap().2, None);

    let (status, body) = post(app(None, calls.clone()), "/api/models", json!({"apiKey":"bad"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid OpenAI API key. Please check your API key and try again.");

    let (status, body) = post(app(None, calls), "/api/models", json!({"apiKey":"bad","isOpenRouter":true})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid OpenRouter API key. Please check your API key and try again.");
}

#[tokio::test]
async fn test_prompt_is_trimmed_or_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompt.txt");
    std::fs::write(&path, "\n  You are Riko.  \n").unwrap();

    let state = AppState::new(None, &path, "http://localhost:3000");
    let (status, body) = send(router(state), Method::GET, "/api/prompt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "You are Riko.");

    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = send(app(None, calls), Method::GET, "/api/prompt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "");
}

#[tokio::test]
async fn test_sheets_offsets_conversation_ids() {
    let sheet = Arc::new(MemorySheet::default());
    sheet.rows
        .lock()
        .unwrap()
        .extend([
            vec!["Conversation ID".to_string(), "Speaker".to_string()],
            vec!["7".to_string(), "user".to_string()],
        ]);
    let state = AppState::new(None, "prompt.txt", "http://localhost:3000").with_sheets(sheet.clone());

    let (status, body) = post(
        router(state),
        "/api/sheets",
        json!({
            "data":[
                {"conversationId":"1","speaker":"user","message":"hi"},
                {"conversationId":2,"speaker":"riko","message":"hey"}
            ],
            "submitterName":"ana"
        })
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success":true,"updatedRows":2}));
    let rows = sheet.rows.lock().unwrap();
    assert_eq!(rows[2], vec!["8", "user", "hi", "ana"]);
    assert_eq!(rows[3], vec!["9", "riko", "hey", "ana"]);
}

#[tokio::test]
async fn test_sheets_offset_overflow_is_an_error() {
    let sheet = Arc::new(MemorySheet::default());
    sheet.rows
        .lock()
        .unwrap()
        .extend([vec!["Conversation ID".to_string()], vec![i64::MAX.to_string()]]);
    let state = AppState::new(None, "prompt.txt", "http://localhost:3000").with_sheets(sheet.clone());

    let (status, body) = post(
        router(state),
        "/api/sheets",
        json!({"data":[{"conversationId":"1","speaker":"user","message":"hi"}],"submitterName":"ana"})
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Error writing to Google Sheets: Invalid conversation id '1'");
    assert_eq!(sheet.rows.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sheets_unconfigured_is_an_error() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let (status, body) = post(app(None, calls), "/api/sheets", json!({"data":[],"submitterName":"ana"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Error writing to Google Sheets: spreadsheet access is not configured");
}

#[tokio::test]
async fn test_rate_limit_rejects_bursts() {
    let state = AppState::new(None, "prompt.txt", "http://localhost:3000").with_rate_limit(1);
    let app = router(state);

    let (first, _) = send(app.clone(), Method::GET, "/api/prompt", None).await;
    let (second, body) = send(app, Method::GET, "/api/prompt", None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests");
}
