use async_trait::async_trait;
use log::{ debug, error };
use reqwest::header::{ ACCEPT, AUTHORIZATION };
use serde::Deserialize;
use serde_json::{ json, Value as JsonValue };
use std::path::PathBuf;
use url::Url;
use yup_oauth2::{ read_service_account_key, ServiceAccountAuthenticator, ServiceAccountKey };

use super::{ SheetStore, SheetsError };

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub enum Credentials {
    KeyFile(PathBuf),
    Inline {
        client_email: String,
        /// PEM key; literal `\n` sequences from env files are accepted.
        private_key: String,
        project_id: Option<String>,
    },
}

impl Credentials {
    async fn service_account_key(&self) -> Result<ServiceAccountKey, SheetsError> {
        match self {
            Credentials::KeyFile(path) => Ok(read_service_account_key(path).await?),
            Credentials::Inline { client_email, private_key, project_id } => {
                let key =
                    json!({
                    "type": "service_account",
                    "project_id": project_id,
                    "client_email": client_email,
                    "private_key": private_key.replace("\\n", "\n"),
                    "token_uri": TOKEN_URI,
                });
                Ok(serde_json::from_value(key)?)
            }
        }
    }
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_rows: u64,
}

fn cell_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// A Google Sheets tab addressed by spreadsheet id and numeric sheet gid,
/// accessed through the Sheets v4 REST API with service-account auth.
pub struct GoogleSheetStore {
    http: reqwest::Client,
    spreadsheet_id: String,
    sheet_gid: String,
    credentials: Credentials,
}

impl GoogleSheetStore {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_gid: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_gid: sheet_gid.into(),
            credentials,
        }
    }

    async fn access_token(&self) -> Result<String, SheetsError> {
        let key = self.credentials.service_account_key().await?;
        let auth = ServiceAccountAuthenticator::builder(key)
            .build().await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;
        let token = auth.token(&[SHEETS_SCOPE]).await.map_err(|e| SheetsError::Auth(e.to_string()))?;
        token
            .token()
            .map(|t| t.to_string())
            .ok_or_else(|| SheetsError::Auth("OAuth token was None".to_string()))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = Url::parse(SHEETS_API)?.join(&self.spreadsheet_id)?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .extend(segments);
        Ok(url)
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, req: reqwest::RequestBuilder) -> Result<T, SheetsError> {
        let token = self.access_token().await?;
        let resp = req
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            error!("Sheets API returned {}: {}", status, message);
            return Err(SheetsError::Api { status: status.as_u16(), message });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn sheet_title(&self) -> Result<String, SheetsError> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("includeGridData", "false");
        let spreadsheet: Spreadsheet = self.send(self.http.get(url)).await?;
        spreadsheet.sheets
            .into_iter()
            .find(|s| s.properties.sheet_id.to_string() == self.sheet_gid)
            .map(|s| s.properties.title)
            .ok_or_else(|| SheetsError::SheetNotFound(self.sheet_gid.clone()))
    }

    async fn range(&self) -> Result<String, SheetsError> {
        Ok(format!("'{}'!A:D", self.sheet_title().await?))
    }
}

#[async_trait]
impl SheetStore for GoogleSheetStore {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        let range = self.range().await?;
        let url = self.url(&["values", &range])?;
        debug!("Reading sheet range {}", range);
        let values: ValueRange = self.send(self.http.get(url)).await?;
        Ok(
            values.values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect()
        )
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<u64, SheetsError> {
        let range = self.range().await?;
        let mut url = self.url(&["values", &format!("{}:append", range)])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": rows });
        let resp: AppendResponse = self.send(self.http.post(url).json(&body)).await?;
        Ok(resp.updates.map(|u| u.updated_rows).unwrap_or(0))
    }
}
