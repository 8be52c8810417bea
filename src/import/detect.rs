use log::debug;
use serde_json::Value as JsonValue;

use super::FileFormat;

/// Which structured strategies are worth attempting before line-by-line
/// parsing. Line parsing is always the final fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Try the whole text as a single JSON value.
    pub whole_document: bool,
    /// First line opens with `[` and last line closes with `]`.
    pub formatted_array: bool,
}

pub fn detect(text: &str, format: FileFormat) -> Detection {
    Detection {
        whole_document: format == FileFormat::Json,
        formatted_array: looks_like_formatted_array(text),
    }
}

pub fn looks_like_formatted_array(text: &str) -> bool {
    let trimmed = text.trim();
    let first = trimmed.split('\n').next().unwrap_or("").trim();
    let last = trimmed.rsplit('\n').next().unwrap_or("").trim();
    first.starts_with('[') && last.ends_with(']')
}

/// Parses the trimmed text as one JSON value. Never fails loudly.
pub fn parse_whole(text: &str) -> Option<JsonValue> {
    match serde_json::from_str(text.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Whole-document JSON parse failed, falling back: {}", e);
            None
        }
    }
}
