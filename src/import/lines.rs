//! Line-delimited JSON with light repair of formatted-JSON fragments.

use log::warn;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Blank line or pure punctuation.
    Skipped,
    Parsed(JsonValue),
    Failed(String),
}

/// Punctuation-only lines and truncated fragments such as `"x",` or `},`.
fn is_structural(trimmed: &str) -> bool {
    matches!(trimmed, "" | "[" | "]" | "{" | "}" | ",")
        || (trimmed.starts_with('"') && trimmed.ends_with(',') && !trimmed.contains(':'))
        || (trimmed.starts_with('}') && trimmed.ends_with(','))
}

/// A bare `"key": value` line is wrapped in braces, dropping one trailing comma.
fn repair(trimmed: &str) -> String {
    if !trimmed.starts_with('"') || trimmed.contains('{') {
        return trimmed.to_string();
    }
    let body = trimmed.strip_suffix(',').unwrap_or(trimmed);
    format!("{{{}}}", body)
}

pub fn parse_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if is_structural(trimmed) {
        return LineOutcome::Skipped;
    }
    match serde_json::from_str(&repair(trimmed)) {
        Ok(value) => LineOutcome::Parsed(value),
        Err(e) => LineOutcome::Failed(e.to_string()),
    }
}

/// Parses every line independently; failures are logged and dropped.
pub fn parse_lines(text: &str) -> Vec<JsonValue> {
    let mut values = Vec::new();
    for (number, line) in text.trim().split('\n').enumerate() {
        match parse_line(line) {
            LineOutcome::Parsed(value) => values.push(value),
            LineOutcome::Skipped => {}
            LineOutcome::Failed(e) => warn!("Dropping unparseable line {}: {}", number + 1, e),
        }
    }
    values
}
