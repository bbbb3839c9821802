//! Message domain type.
//!
//! Messages are the append-only conversation record: the user writes one,
//! the assistant answers, tool results are folded in as their own role.
//! Once created a message is never edited — history only grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (agent prompt, context preamble)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single message in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// The session this message belongs to
    pub session_id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional metadata (provider info, tool call details, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with the given role.
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::System, content)
    }

    /// Create a tool result message correlated to a tool call.
    pub fn tool_result(
        session_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(session_id, Role::Tool, content);
        msg.metadata.insert(
            "tool_call_id".into(),
            serde_json::Value::String(tool_call_id.into()),
        );
        msg
    }

    /// Attach a metadata entry, builder-style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Request payload for appending a message to a session directly.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CreateMessageRequest {
    pub fn into_message(self, session_id: impl Into<String>) -> Message {
        let mut msg = Message::new(session_id, self.role, self.content);
        msg.metadata = self.metadata;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("sess-1", "Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert_eq!(msg.session_id, "sess-1");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("sess-1", "call_42", "{\"success\":true}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(
            msg.metadata.get("tool_call_id").and_then(|v| v.as_str()),
            Some("call_42")
        );
    }

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(role, Role::Tool);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("robot".parse::<Role>().is_err());
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("sess-1", "Test message");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, Role::User);
    }
}
