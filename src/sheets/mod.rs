//! Appending collected conversations to a shared spreadsheet.
//!
//! Conversation ids in a submission are local to the submitter, so they are
//! offset by the highest id already present in the sheet.

pub mod google;

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::models::api::{ SheetRow, SheetsRequest };
use crate::models::chat::leading_integer;

pub use google::{ Credentials, GoogleSheetStore };

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Sheets request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Sheets API returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },
    #[error("Invalid Sheets URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Sheet with GID {0} not found")]
    SheetNotFound(String),
    #[error("Invalid conversation id '{0}'")]
    InvalidConversationId(String),
    #[error("Failed to read service account key: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid service account key: {0}")]
    Key(#[from] serde_json::Error),
}

/// A sheet holding rows of `[conversation id, speaker, message, submitter]`.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Returns the number of rows the backend reports as written.
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<u64, SheetsError>;
}

/// Highest leading integer in the first column, ignoring the header row.
pub fn latest_conversation_id(rows: &[Vec<String>]) -> i64 {
    rows.iter()
        .skip(1)
        .filter_map(|row| row.first())
        .filter(|cell| !cell.is_empty())
        .filter_map(|cell| leading_integer(cell))
        .fold(0, i64::max)
}

pub fn build_rows(data: &[SheetRow], latest: i64, submitter: &str) -> Result<Vec<Vec<String>>, SheetsError> {
    data.iter()
        .map(|row| {
            let offset = leading_integer(&row.conversation_id)
                .and_then(|local| latest.checked_add(local))
                .ok_or_else(|| SheetsError::InvalidConversationId(row.conversation_id.clone()))?;
            Ok(
                vec![
                    offset.to_string(),
                    row.speaker.clone(),
                    row.message.clone(),
                    submitter.to_string()
                ]
            )
        })
        .collect()
}

pub async fn append_submission(store: &dyn SheetStore, request: &SheetsRequest) -> Result<u64, SheetsError> {
    let existing = store.read_rows().await?;
    let latest = latest_conversation_id(&existing);
    let rows = build_rows(&request.data, latest, &request.submitter_name)?;
    info!(
        "Appending {} row(s) from '{}' above conversation id {}",
        rows.len(),
        request.submitter_name,
        latest
    );
    store.append_rows(rows).await
}
