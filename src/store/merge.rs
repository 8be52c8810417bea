use log::{ debug, info };
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::ConversationStore;
use crate::models::chat::{ ChatMessage, ChatTurn, Conversation, ImportRecord, Role };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportTarget {
    /// Group records into conversations by id.
    #[default]
    New,
    /// Append every message to the active conversation.
    Current,
}

impl FromStr for ImportTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(ImportTarget::New),
            "current" => Ok(ImportTarget::Current),
            _ => Err(format!("Unknown import target: '{}' (expected new or current)", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub messages: usize,
    /// First system message found in the import, to become the system prompt.
    pub system_prompt: Option<String>,
    pub switched_to: Option<String>,
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.created.is_empty() && self.updated.is_empty() {
            return write!(
                f,
                "Import successful! Added {} message{} to the current conversation.",
                self.messages,
                plural(self.messages)
            );
        }
        write!(f, "Import successful! ")?;
        if !self.created.is_empty() {
            write!(f, "Created {} new conversation{}", self.created.len(), plural(self.created.len()))?;
        }
        if !self.updated.is_empty() {
            if !self.created.is_empty() {
                write!(f, " and ")?;
            }
            write!(f, "Updated {} existing conversation{}", self.updated.len(), plural(self.updated.len()))?;
        }
        write!(f, " with {} message{}.", self.messages, plural(self.messages))
    }
}

/// Records with the same id share a group; id-less records each get their own.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupKey {
    Named(String),
    Anonymous,
}

fn group_records(records: Vec<ImportRecord>) -> Vec<(GroupKey, Vec<ImportRecord>)> {
    let mut groups: Vec<(GroupKey, Vec<ImportRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let Some(id) = record.id.clone() else {
            groups.push((GroupKey::Anonymous, vec![record]));
            continue;
        };
        match index.get(&id) {
            Some(&slot) => groups[slot].1.push(record),
            None => {
                index.insert(id.clone(), groups.len());
                groups.push((GroupKey::Named(id), vec![record]));
            }
        }
    }
    groups
}

fn stamp_all<'a>(turns: impl IntoIterator<Item = &'a ChatTurn>) -> Vec<ChatMessage> {
    turns
        .into_iter()
        .filter(|turn| turn.role != Role::System)
        .map(|turn| ChatMessage::stamped(turn.role, turn.content.clone()))
        .collect()
}

impl ConversationStore {
    /// Commits imported records. System messages never become chat messages;
    /// in `New` mode the first one found is reported as the new system prompt.
    pub fn merge_import(&mut self, records: Vec<ImportRecord>, target: ImportTarget) -> ImportSummary {
        match target {
            ImportTarget::Current => self.append_to_current(records),
            ImportTarget::New => self.merge_grouped(records),
        }
    }

    fn append_to_current(&mut self, records: Vec<ImportRecord>) -> ImportSummary {
        let messages = stamp_all(records.iter().flat_map(|r| r.messages.iter()));
        let count = messages.len();
        self.ensure_current().messages.extend(messages);
        info!("Appended {} imported message(s) to conversation {}", count, self.current_conversation_id);
        ImportSummary { messages: count, ..ImportSummary::default() }
    }

    fn merge_grouped(&mut self, records: Vec<ImportRecord>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let mut ids = self.id_allocator();
        let mut created: Vec<Conversation> = Vec::new();
        let mut existing: HashMap<String, usize> = HashMap::new();
        for (slot, conversation) in self.conversations.iter().enumerate() {
            existing.entry(conversation.id.clone()).or_insert(slot);
        }

        for (key, members) in group_records(records) {
            if summary.system_prompt.is_none() {
                summary.system_prompt = members
                    .iter()
                    .flat_map(|r| r.messages.iter())
                    .find(|turn| turn.role == Role::System)
                    .map(|turn| turn.content.clone());
            }
            let messages = stamp_all(members.iter().flat_map(|r| r.messages.iter()));
            summary.messages += messages.len();

            if let GroupKey::Named(name) = &key {
                if let Some(&slot) = existing.get(name) {
                    debug!("Appending {} imported message(s) to conversation {}", messages.len(), name);
                    self.conversations[slot].messages.extend(messages);
                    summary.updated.push(name.clone());
                    continue;
                }
            }

            let id = match key {
                GroupKey::Named(name) if ids.reserve_numeric(&name) => name,
                _ => ids.next_id(),
            };
            let mut conversation = Conversation::new(id);
            conversation.messages = messages;
            summary.created.push(conversation.id.clone());
            created.push(conversation);
        }

        if let Some(first) = created.first() {
            self.current_conversation_id = first.id.clone();
            summary.switched_to = Some(first.id.clone());
        }
        self.conversations.extend(created);
        info!(
            "Import created {} and updated {} conversation(s)",
            summary.created.len(),
            summary.updated.len()
        );
        summary
    }
}
