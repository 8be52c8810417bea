//! Last-resort scanner for pretty-printed arrays of `input_text`/`output_text`
//! objects that no longer parse as JSON (truncated files, stray quotes).
//!
//! The scanner is a two-state machine driven one line at a time. Only lines
//! that are exactly `{`, `}` or `},` change state; `"key": value` lines fill
//! the current object; everything else is ignored. It never fails.

use log::warn;

use crate::models::chat::ImportRecord;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PartialPair {
    input_text: Option<String>,
    output_text: Option<String>,
    id: Option<String>,
    conversation_id: Option<String>,
    convo_id: Option<String>,
}

impl PartialPair {
    fn set(&mut self, key: &str, value: String) {
        let slot = match key {
            "input_text" => &mut self.input_text,
            "output_text" => &mut self.output_text,
            "id" => &mut self.id,
            "conversation_id" => &mut self.conversation_id,
            "convo_id" => &mut self.convo_id,
            _ => return,
        };
        *slot = Some(value);
    }

    fn into_record(self) -> Option<ImportRecord> {
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let input = present(&self.input_text)?;
        let output = present(&self.output_text)?;
        let id = present(&self.id)
            .or_else(|| present(&self.conversation_id))
            .or_else(|| present(&self.convo_id));
        Some(ImportRecord::from_pair(id, &input, &output))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    AwaitingObject,
    InObject(PartialPair),
}

#[derive(Debug)]
pub struct RecoveryScanner {
    state: ScanState,
    records: Vec<ImportRecord>,
}

impl Default for RecoveryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryScanner {
    pub fn new() -> Self {
        Self { state: ScanState::AwaitingObject, records: Vec::new() }
    }

    pub fn is_in_object(&self) -> bool {
        matches!(self.state, ScanState::InObject(_))
    }

    pub fn feed(&mut self, line: &str) {
        let trimmed = line.trim();
        match trimmed {
            // A fresh `{` discards whatever was accumulated so far.
            "{" => {
                self.state = ScanState::InObject(PartialPair::default());
            }
            "}" | "}," => {
                let state = std::mem::replace(&mut self.state, ScanState::AwaitingObject);
                if let ScanState::InObject(pair) = state {
                    if let Some(record) = pair.into_record() {
                        self.records.push(record);
                    }
                }
            }
            _ => {
                if let ScanState::InObject(pair) = &mut self.state {
                    if let Some((key, value)) = split_property(trimmed) {
                        pair.set(&key, value);
                    }
                }
            }
        }
    }

    pub fn finish(self) -> Vec<ImportRecord> {
        self.records
    }
}

/// Splits `"key": value[,]` into the key and a decoded value.
fn split_property(trimmed: &str) -> Option<(String, String)> {
    if !trimmed.starts_with('"') {
        return None;
    }
    let colon = trimmed.find(':')?;
    // The key sits between the opening quote and the character before the colon.
    let key = trimmed.get(1..colon.checked_sub(1)?)?.trim().to_string();
    let raw = trimmed[colon + 1..].trim();
    let raw = raw.strip_suffix(',').unwrap_or(raw);
    Some((key, decode_value(raw)))
}

fn decode_value(raw: &str) -> String {
    if !raw.starts_with('"') {
        return raw.to_string();
    }
    match serde_json::from_str::<String>(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Recovering malformed string value {}: {}", raw, e);
            let unquoted = if raw.len() >= 2 && raw.ends_with('"') {
                &raw[1..raw.len() - 1]
            } else {
                raw
            };
            unquoted.replace("\\\"", "\"")
        }
    }
}

pub fn recover_pairs(text: &str) -> Vec<ImportRecord> {
    let mut scanner = RecoveryScanner::new();
    for line in text.trim().split('\n') {
        scanner.feed(line);
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatTurn, Role };

    #[test]
    fn test_recovers_pairs_from_broken_array() {
        let text = r#"[
  {
    "input_text": "hi",
    "output_text": "hello",
    "id": "3"
  },
  {
    "input_text": "say "cheese"",
    "output_text": "ok",
    "convo_id": 9
  },
  {
    "input_text": "truncated
"#;
        let records = recover_pairs(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some("3"));
        assert_eq!(records[0].messages, vec![
            ChatTurn::new(Role::User, "hi"),
            ChatTurn::new(Role::Assistant, "hello"),
        ]);
        assert_eq!(records[1].messages[0].content, "say \"cheese\"");
        assert_eq!(records[1].id.as_deref(), Some("9"));
    }

    #[test]
    fn test_open_brace_discards_partial_object() {
        let mut scanner = RecoveryScanner::new();
        scanner.feed("{");
        scanner.feed("\"input_text\": \"lost\",");
        scanner.feed("{");
        scanner.feed("\"output_text\": \"only output\"");
        scanner.feed("}");
        assert!(!scanner.is_in_object());
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn test_properties_outside_objects_are_ignored() {
        let mut scanner = RecoveryScanner::new();
        scanner.feed("\"input_text\": \"a\",");
        scanner.feed("\"output_text\": \"b\"");
        scanner.feed("}");
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn test_escaped_values_decode() {
        assert_eq!(decode_value(r#""line\nbreak""#), "line\nbreak");
        assert_eq!(decode_value("42"), "42");
        assert_eq!(decode_value(r#""half \"quoted"#), "\"half \"quoted");
    }

    #[test]
    fn test_unrecognized_keys_do_not_count() {
        let records = recover_pairs("{\n\"prompt\": \"a\",\n\"output_text\": \"b\"\n}");
        assert!(records.is_empty());
    }
}
