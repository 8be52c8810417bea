//! Shape converters over parsed JSON values.
//!
//! Each converter is a predicate + transform pair: it returns `None` when the
//! value does not have its shape (or yields nothing after filtering) so the
//! caller can move on to the next candidate.

use log::warn;
use serde_json::Value as JsonValue;

use crate::models::chat::{ ChatTurn, ImportRecord, Role };

/// Fields that may carry a grouping id, in priority order.
const ID_FIELDS: [&str; 3] = ["id", "conversation_id", "convo_id"];

/// Loose truthiness: missing, null, false, zero and empty strings are falsy.
pub(crate) fn is_truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

pub(crate) fn text_of(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy_text(value: Option<&JsonValue>) -> Option<String> {
    if is_truthy(value) { value.map(text_of) } else { None }
}

/// First truthy of `id`, `conversation_id`, `convo_id`.
pub(crate) fn record_id(item: &JsonValue) -> Option<String> {
    ID_FIELDS.iter().find_map(|key| truthy_text(item.get(*key)))
}

fn looks_like_message(item: &JsonValue) -> bool {
    is_truthy(item.get("role")) && is_truthy(item.get("content"))
}

fn to_turn(item: &JsonValue) -> Option<ChatTurn> {
    let role = item.get("role")?.as_str()?;
    let role = match role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => {
            warn!("Skipping imported message: {}", e);
            return None;
        }
    };
    let content = item.get("content").map(text_of).unwrap_or_default();
    Some(ChatTurn::new(role, content))
}

fn non_empty(records: Vec<ImportRecord>) -> Option<Vec<ImportRecord>> {
    if records.is_empty() { None } else { Some(records) }
}

/// `[{role, content}, ...]` becomes a single id-less record.
pub fn message_array(value: &JsonValue) -> Option<Vec<ImportRecord>> {
    let items = value.as_array()?;
    if !items.iter().any(looks_like_message) {
        return None;
    }
    let messages: Vec<ChatTurn> = items.iter().filter_map(to_turn).collect();
    if messages.is_empty() {
        return None;
    }
    Some(vec![ImportRecord::new(None, messages)])
}

/// A single `{input_text, output_text}` object becomes a user/assistant pair.
pub(crate) fn pair_record(item: &JsonValue) -> Option<ImportRecord> {
    let input = item.get("input_text");
    let output = item.get("output_text");
    if !is_truthy(input) || !is_truthy(output) {
        return None;
    }
    Some(ImportRecord::from_pair(record_id(item), &text_of(input?), &text_of(output?)))
}

/// `[{input_text, output_text, id?}, ...]`, one record per qualifying element.
pub fn input_output_pairs(value: &JsonValue) -> Option<Vec<ImportRecord>> {
    let items = value.as_array()?;
    non_empty(items.iter().filter_map(pair_record).collect())
}

/// An object carrying its own `messages` array, passed through with its `id`.
pub(crate) fn messages_record(item: &JsonValue) -> Option<ImportRecord> {
    let messages = item.get("messages").filter(|v| is_truthy(Some(v)))?;
    let turns = messages.as_array()?.iter().filter_map(to_turn).collect();
    Some(ImportRecord::new(truthy_text(item.get("id")), turns))
}

/// An object with a `conversations: [{from, value}]` field. `from == "human"`
/// maps to the user role, anything else to assistant.
pub(crate) fn conversations_record(item: &JsonValue) -> Option<ImportRecord> {
    let conversations = item.get("conversations")?.as_array()?;
    let turns: Vec<ChatTurn> = conversations
        .iter()
        .map(|conv| {
            let role = if conv.get("from").and_then(JsonValue::as_str) == Some("human") {
                Role::User
            } else {
                Role::Assistant
            };
            ChatTurn::new(role, conv.get("value").map(text_of).unwrap_or_default())
        })
        .collect();
    if turns.is_empty() {
        return None;
    }
    Some(ImportRecord::new(None, turns))
}

/// `[{messages} | {conversations}, ...]`
pub fn conversation_array(value: &JsonValue) -> Option<Vec<ImportRecord>> {
    let items = value.as_array()?;
    non_empty(
        items
            .iter()
            .filter_map(|item| messages_record(item).or_else(|| conversations_record(item)))
            .collect()
    )
}

/// Whole-document conversion: first matching converter wins.
pub fn convert_document(value: &JsonValue) -> Option<Vec<ImportRecord>> {
    message_array(value)
        .or_else(|| input_output_pairs(value))
        .or_else(|| conversation_array(value))
}

/// First pass over line-parsed values: only objects exposing a non-empty
/// `messages` array qualify.
pub fn line_messages_record(value: &JsonValue) -> Option<ImportRecord> {
    let has_messages = value
        .get("messages")
        .and_then(JsonValue::as_array)
        .map(|m| !m.is_empty())
        .unwrap_or(false);
    if has_messages { messages_record(value) } else { None }
}

/// Second pass over line-parsed values, tried per value.
pub fn line_fallback_records(value: &JsonValue) -> Vec<ImportRecord> {
    if let Some(records) = message_array(value) {
        return records;
    }
    pair_record(value)
        .or_else(|| conversations_record(value))
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallback_prefers_pair_over_conversations() {
        let value = json!({
            "input_text": "q",
            "output_text": "a",
            "conversations": [{"from": "human", "value": "other"}]
        });
        let records = line_fallback_records(&value);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].messages[0], ChatTurn::new(Role::User, "q"));
    }

    #[test]
    fn test_message_array_keeps_order() {
        let value = json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"}
        ]);
        let records = message_array(&value).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, None);
        let roles: Vec<Role> = records[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_message_array_needs_role_and_content() {
        assert!(message_array(&json!([{"role": "user"}])).is_none());
        assert!(message_array(&json!({"role": "user", "content": "x"})).is_none());
    }

    #[test]
    fn test_pairs_carry_id_by_priority() {
        let value = json!([
            {"input_text": "a", "output_text": "b", "conversation_id": "c1", "convo_id": "c2"},
            {"input_text": "c", "output_text": "d", "id": 7},
            {"input_text": "e", "output_text": ""},
            {"input_text": "f", "output_text": "g", "id": ""}
        ]);
        let records = input_output_pairs(&value).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id.as_deref(), Some("c1"));
        assert_eq!(records[1].id.as_deref(), Some("7"));
        assert_eq!(records[2].id, None);
        assert_eq!(records[1].messages[0], ChatTurn::new(Role::User, "c"));
        assert_eq!(records[1].messages[1], ChatTurn::new(Role::Assistant, "d"));
    }

    #[test]
    fn test_pairs_with_no_match_is_none() {
        assert!(input_output_pairs(&json!([{"input_text": "only"}])).is_none());
    }

    #[test]
    fn test_conversations_field_maps_roles() {
        let value = json!([
            {"conversations": [
                {"from": "human", "value": "q"},
                {"from": "gpt", "value": "a"}
            ]}
        ]);
        let records = conversation_array(&value).unwrap();
        assert_eq!(records[0].messages, vec![
            ChatTurn::new(Role::User, "q"),
            ChatTurn::new(Role::Assistant, "a"),
        ]);
    }

    #[test]
    fn test_messages_pass_through_with_id() {
        let value = json!([{"id": "42", "messages": [{"role": "user", "content": "x"}]}]);
        let records = conversation_array(&value).unwrap();
        assert_eq!(records[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn test_document_priority() {
        // An array that looks like both messages and pairs is read as messages.
        let value = json!([
            {"role": "user", "content": "hi", "input_text": "x", "output_text": "y"}
        ]);
        let records = convert_document(&value).unwrap();
        assert_eq!(records[0].messages, vec![ChatTurn::new(Role::User, "hi")]);
    }

    #[test]
    fn test_unknown_roles_are_skipped() {
        let value = json!([
            {"role": "tool", "content": "ignored"},
            {"role": "user", "content": "kept"}
        ]);
        let records = message_array(&value).unwrap();
        assert_eq!(records[0].messages, vec![ChatTurn::new(Role::User, "kept")]);
    }
}
