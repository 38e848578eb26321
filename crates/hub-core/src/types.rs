use serde::{Deserialize, Serialize};
use std::fmt;

/// CRM portal domain, e.g. `forestvologda.bitrix24.ru`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Portal(pub String);

impl Portal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Portal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Portal {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// CRM deal id, scoped to a `Portal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub i64);

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Helpdesk inbox id — globally unique, 1:1 with a `Transport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InboxId(pub i64);

impl fmt::Display for InboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Helpdesk conversation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Helpdesk contact id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub i64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Agent code, e.g. `"maksim"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentCode(pub String);

impl AgentCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Helpdesk message type: `0` incoming (client), `1` outgoing bot/agent,
/// `2` system activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum MessageType {
    Incoming = 0,
    Outgoing = 1,
    Activity = 2,
}

impl MessageType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(MessageType::Incoming),
            1 => Some(MessageType::Outgoing),
            2 => Some(MessageType::Activity),
            _ => None,
        }
    }
}

/// A single helpdesk message, boundary representation (spec §9: permissive
/// decoders at the boundary, strict types from then on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpdeskMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub private: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
