//! Serializers from stored conversations to training-data files.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::models::api::SheetRow;
use crate::models::chat::{ ChatMessage, ChatTurn, Conversation, Role };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(ExportFormat::Jsonl),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(format!("Unknown export format: '{}' (expected jsonl, json or csv)", s)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn default_file_name(&self) -> String {
        format!("training-data.{}", self.extension())
    }
}

#[derive(Serialize)]
struct JsonlEntry {
    messages: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    id: &'a str,
    messages: Vec<ChatTurn>,
}

fn turns(conversation: &Conversation) -> Vec<ChatTurn> {
    conversation.messages.iter().map(ChatMessage::turn).collect()
}

/// One `{"messages": [...]}` line per conversation, each newline-terminated.
pub fn to_jsonl(conversations: &[Conversation]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for conversation in conversations {
        out.push_str(&serde_json::to_string(&JsonlEntry { messages: turns(conversation) })?);
        out.push('\n');
    }
    Ok(out)
}

pub fn to_pretty_json(conversations: &[Conversation]) -> Result<String, serde_json::Error> {
    let entries: Vec<JsonEntry> = conversations
        .iter()
        .map(|c| JsonEntry { id: &c.id, messages: turns(c) })
        .collect();
    serde_json::to_string_pretty(&entries)
}

/// Quotes are doubled; commas and newlines inside content are not protected.
pub fn to_csv(conversations: &[Conversation]) -> String {
    let mut out = String::from("Conversation ID,Role,Content\n");
    for conversation in conversations {
        for message in &conversation.messages {
            out.push_str(
                &format!("{},\"{}\",\"{}\"\n", conversation.id, message.role, message.content.replace('"', "\"\""))
            );
        }
    }
    out
}

pub fn encode(conversations: &[Conversation], format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Jsonl => to_jsonl(conversations),
        ExportFormat::Json => to_pretty_json(conversations),
        ExportFormat::Csv => Ok(to_csv(conversations)),
    }
}

/// Flattens every message into a spreadsheet row. Anything that is not a
/// user message is attributed to the assistant persona `riko`.
pub fn sheet_rows(conversations: &[Conversation]) -> Vec<SheetRow> {
    conversations
        .iter()
        .flat_map(|c| {
            c.messages.iter().map(move |m| SheetRow {
                conversation_id: c.id.clone(),
                speaker: (if m.role == Role::User { "user" } else { "riko" }).to_string(),
                message: m.content.clone(),
            })
        })
        .collect()
}
