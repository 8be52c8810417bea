//! Best-effort import of conversation data from loosely structured JSON text.
//!
//! Strategies run in a fixed order and fall through on failure:
//! whole-document JSON (for `.json`), a formatted multi-line array,
//! line-delimited JSON with a per-value fallback pass, and finally the
//! recovery scanner for broken arrays of input/output pairs.

pub mod convert;
pub mod detect;
pub mod lines;
pub mod recovery;

use log::{ info, warn };
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::models::chat::ImportRecord;

/// Uploads larger than this are rejected before reading.
pub const MAX_IMPORT_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Jsonl,
    Txt,
}

impl FromStr for FileFormat {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(FileFormat::Json),
            "jsonl" => Ok(FileFormat::Jsonl),
            "txt" => Ok(FileFormat::Txt),
            other => Err(ImportError::UnsupportedExtension(other.to_string())),
        }
    }
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .parse()
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Please select a .jsonl, .json or .txt file (got '{0}')")]
    UnsupportedExtension(String),
    #[error("File is too large ({size} bytes). Maximum size is 5MB")]
    TooLarge {
        size: u64,
    },
    #[error("Failed to read import file: {0}")]
    Io(#[from] std::io::Error),
    #[error("No valid data found in the file")]
    NoValidData,
    #[error(
        "No valid conversation data found in the file. Please ensure it contains messages in one of the supported formats."
    )]
    NoConversationData,
}

/// Checks extension and size, then reads the file as UTF-8 text.
pub fn read_import_file(path: &Path) -> Result<(String, FileFormat), ImportError> {
    let format = FileFormat::from_path(path)?;
    let size = fs::metadata(path)?.len();
    if size > MAX_IMPORT_BYTES {
        return Err(ImportError::TooLarge { size });
    }
    Ok((fs::read_to_string(path)?, format))
}

/// Runs the strategy chain and keeps only records with at least one
/// user or assistant message.
pub fn parse_import(text: &str, format: FileFormat) -> Result<Vec<ImportRecord>, ImportError> {
    let records: Vec<ImportRecord> = collect_records(text, format)?
        .into_iter()
        .filter(|record| {
            let valid = record.is_valid();
            if !valid {
                warn!("Dropping imported record without user or assistant messages");
            }
            valid
        })
        .collect();

    if records.is_empty() {
        return Err(ImportError::NoValidData);
    }
    info!("Parsed {} import record(s)", records.len());
    Ok(records)
}

fn collect_records(text: &str, format: FileFormat) -> Result<Vec<ImportRecord>, ImportError> {
    let detection = detect::detect(text, format);

    if detection.whole_document {
        if let Some(records) = detect::parse_whole(text).and_then(|v| convert::convert_document(&v)) {
            return Ok(records);
        }
    }

    if detection.formatted_array {
        if let Some(records) = detect::parse_whole(text).and_then(|v| convert::input_output_pairs(&v)) {
            return Ok(records);
        }
    }

    let values = lines::parse_lines(text);
    if values.is_empty() && !detection.formatted_array {
        return Err(ImportError::NoValidData);
    }

    let records: Vec<ImportRecord> = values.iter().filter_map(convert::line_messages_record).collect();
    if !records.is_empty() {
        return Ok(records);
    }

    let records: Vec<ImportRecord> = values.iter().flat_map(convert::line_fallback_records).collect();
    if !records.is_empty() {
        return Ok(records);
    }

    if detection.formatted_array {
        let recovered = recovery::recover_pairs(text);
        if !recovered.is_empty() {
            info!("Recovered {} record(s) from a malformed JSON array", recovered.len());
            return Ok(recovered);
        }
    }

    if values.is_empty() {
        return Err(ImportError::NoValidData);
    }
    Err(ImportError::NoConversationData)
}
