use chrono::{ Local, Utc };
use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown message role: '{}'", s)),
        }
    }
}

/// A bare role/content pair, the shape exchanged with chat providers and
/// produced by import converters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
}

impl ChatMessage {
    /// Stamps a fresh id and timestamp onto a role/content pair.
    pub fn stamped(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: generate_message_id(),
            timestamp: formatted_now(),
            edited: false,
            edited_at: None,
        }
    }

    pub fn turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub created_at: String,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: formatted_now(),
        }
    }
}

/// Transient pre-commit form of a conversation produced by the import
/// pipeline. Carries no timestamps or message ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub messages: Vec<ChatTurn>,
}

impl ImportRecord {
    pub fn new(id: Option<String>, messages: Vec<ChatTurn>) -> Self {
        Self { id, messages }
    }

    /// An input/output pair becomes a user turn followed by an assistant turn.
    pub fn from_pair(id: Option<String>, input: &str, output: &str) -> Self {
        Self::new(id, vec![ChatTurn::new(Role::User, input), ChatTurn::new(Role::Assistant, output)])
    }

    /// A record needs at least one user or assistant turn; a lone system
    /// message does not count.
    pub fn is_valid(&self) -> bool {
        self.messages.iter().any(|m| m.role != Role::System)
    }
}

/// `msg-<epoch millis>-<8 random chars>`
pub fn generate_message_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}", Utc::now().timestamp_millis(), &random[..8])
}

/// Local time rendered like `Oct 19, 02:30 PM`.
pub fn formatted_now() -> String {
    Local::now().format("%b %-d, %I:%M %p").to_string()
}

/// Integer value of the leading digits of `s` (after whitespace and an
/// optional sign), so `"12abc"` reads as 12 and `"abc"` as nothing.
pub fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let value: i64 = rest[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
