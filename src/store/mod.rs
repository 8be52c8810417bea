//! Local conversation state: the ordered conversation list plus the active
//! conversation id, persisted as a JSON file.

mod merge;

pub use merge::{ ImportSummary, ImportTarget };

use log::info;
use serde::{ Deserialize, Serialize };
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::models::chat::{ formatted_now, leading_integer, ChatMessage, ChatTurn, Conversation, Role };

const PREVIEW_LEN: usize = 30;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Conversation store JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Conversation '{0}' not found")]
    ConversationNotFound(String),
    #[error("Message '{0}' not found in the current conversation")]
    MessageNotFound(String),
    #[error("Message '{0}' cannot be regenerated: it must be an assistant reply to a user message")]
    NotRegenerable(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStore {
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: String,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            current_conversation_id: "1".to_string(),
        }
    }
}

impl ConversationStore {
    /// A missing file yields an empty store; a corrupt one is an error so it
    /// is never silently overwritten.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            info!("No conversation store at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.get(&self.current_conversation_id)
    }

    fn current_mut(&mut self) -> Result<&mut Conversation, StoreError> {
        let id = self.current_conversation_id.clone();
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ConversationNotFound(id))
    }

    /// The active conversation, created on first use.
    pub(crate) fn ensure_current(&mut self) -> &mut Conversation {
        let id = self.current_conversation_id.clone();
        match self.conversations.iter().position(|c| c.id == id) {
            Some(index) => &mut self.conversations[index],
            None => {
                self.conversations.push(Conversation::new(id));
                let last = self.conversations.len() - 1;
                &mut self.conversations[last]
            }
        }
    }

    /// Role/content history of the active conversation.
    pub fn current_turns(&self) -> Vec<ChatTurn> {
        self.current()
            .map(|c| c.messages.iter().map(ChatMessage::turn).collect())
            .unwrap_or_default()
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> ChatMessage {
        let message = ChatMessage::stamped(role, content);
        self.ensure_current().messages.push(message.clone());
        message
    }

    /// Moves to a fresh id one above every numeric id seen so far.
    pub fn start_new_conversation(&mut self) -> String {
        let mut ids = self.id_allocator();
        ids.claim(self.current_conversation_id.clone());
        let id = ids.next_id();
        self.current_conversation_id = id.clone();
        id
    }

    pub fn switch_to(&mut self, id: &str) -> Result<(), StoreError> {
        if self.get(id).is_none() {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        self.current_conversation_id = id.to_string();
        Ok(())
    }

    pub fn edit_message(&mut self, message_id: &str, content: impl Into<String>) -> Result<(), StoreError> {
        let message = self
            .current_mut()?
            .messages.iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.content = content.into();
        message.edited = true;
        message.edited_at = Some(formatted_now());
        Ok(())
    }

    pub fn delete_message(&mut self, message_id: &str) -> Result<(), StoreError> {
        let conversation = self.current_mut()?;
        let before = conversation.messages.len();
        conversation.messages.retain(|m| m.id != message_id);
        if conversation.messages.len() == before {
            return Err(StoreError::MessageNotFound(message_id.to_string()));
        }
        Ok(())
    }

    /// Deleting the active conversation promotes the first remaining one, or
    /// starts a new one when none are left.
    pub fn delete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        if id == self.current_conversation_id {
            match self.conversations.first() {
                Some(first) => {
                    self.current_conversation_id = first.id.clone();
                }
                None => {
                    self.start_new_conversation();
                }
            }
        }
        Ok(())
    }

    /// Position of an assistant message and the history that produced it.
    pub fn regeneration_context(&self, message_id: &str) -> Result<(usize, Vec<ChatTurn>), StoreError> {
        let conversation = self
            .current()
            .ok_or_else(|| StoreError::ConversationNotFound(self.current_conversation_id.clone()))?;
        let index = conversation.messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        let target = &conversation.messages[index];
        if index == 0 || target.role != Role::Assistant || conversation.messages[index - 1].role != Role::User {
            return Err(StoreError::NotRegenerable(message_id.to_string()));
        }
        let history = conversation.messages[..index].iter().map(ChatMessage::turn).collect();
        Ok((index, history))
    }

    /// Replaces the message at `index` with a fresh assistant message.
    pub fn replace_message(&mut self, index: usize, content: impl Into<String>) -> Result<ChatMessage, StoreError> {
        let conversation = self.current_mut()?;
        let slot = conversation.messages
            .get_mut(index)
            .ok_or_else(|| StoreError::MessageNotFound(format!("#{}", index)))?;
        *slot = ChatMessage::stamped(Role::Assistant, content);
        Ok(slot.clone())
    }

    /// First user message (or first message), truncated for listings.
    pub fn preview(conversation: &Conversation) -> String {
        let message = conversation.messages
            .iter()
            .find(|m| m.role == Role::User)
            .or_else(|| conversation.messages.first());
        match message {
            None => "Empty conversation".to_string(),
            Some(m) if m.content.chars().count() > PREVIEW_LEN => {
                format!("{}...", m.content.chars().take(PREVIEW_LEN).collect::<String>())
            }
            Some(m) => m.content.clone(),
        }
    }

    pub(crate) fn id_allocator(&self) -> IdAllocator {
        IdAllocator::new(self.conversations.iter().map(|c| c.id.clone()))
    }
}

/// Hands out sequential numeric conversation ids that never collide with an
/// id already in use.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    in_use: HashSet<String>,
    next: i64,
}

/// The id that would follow `id`, or `None` when `id` is not numeric or has
/// no representable successor.
fn successor(id: &str) -> Option<i64> {
    leading_integer(id)?.checked_add(1)
}

impl IdAllocator {
    pub(crate) fn new(ids: impl IntoIterator<Item = String>) -> Self {
        let in_use: HashSet<String> = ids.into_iter().collect();
        let next = in_use
            .iter()
            .filter_map(|id| successor(id))
            .fold(1, i64::max);
        Self { in_use, next }
    }

    pub(crate) fn is_free(&self, id: &str) -> bool {
        !self.in_use.contains(id)
    }

    pub(crate) fn claim(&mut self, id: String) {
        if let Some(after) = successor(&id) {
            self.next = self.next.max(after);
        }
        self.in_use.insert(id);
    }

    /// Claims an all-digit id for reuse as-is. Fails when the id is taken
    /// or too large to be followed by another id.
    pub(crate) fn reserve_numeric(&mut self, id: &str) -> bool {
        let numeric = !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
        if !numeric || !self.is_free(id) || successor(id).is_none() {
            return false;
        }
        self.claim(id.to_string());
        true
    }

    pub(crate) fn next_id(&mut self) -> String {
        loop {
            let candidate = self.next.to_string();
            self.next = self.next.saturating_add(1);
            if self.in_use.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
