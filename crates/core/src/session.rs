//! Session domain type — a persistent conversation with one agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The default context strategy for new sessions.
pub const DEFAULT_STRATEGY: &str = "last_n";

/// A conversation session bound to an agent.
///
/// The session owns its message history (append-only) and selects which
/// context strategy bounds that history before each provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: String,

    /// The agent this session converses with
    pub agent_id: String,

    /// Optional display title
    #[serde(default)]
    pub title: String,

    /// Context strategy name ("last_n", "sliding_window", "summarize")
    pub context_strategy: String,

    /// Strategy configuration (e.g. {"count": 10})
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context_config: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a session under an agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub context_strategy: Option<String>,
    #[serde(default)]
    pub context_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CreateSessionRequest {
    pub fn into_session(self, agent_id: impl Into<String>) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            title: self.title,
            context_strategy: self
                .context_strategy
                .unwrap_or_else(|| DEFAULT_STRATEGY.into()),
            context_config: self.context_config.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request payload for updating a session. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub context_strategy: Option<String>,
    pub context_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Session {
    pub fn apply(&mut self, req: UpdateSessionRequest) {
        if let Some(title) = req.title {
            self.title = title;
        }
        if let Some(strategy) = req.context_strategy {
            self.context_strategy = strategy;
        }
        if let Some(config) = req.context_config {
            self.context_config = config;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults_to_last_n() {
        let session = CreateSessionRequest::default().into_session("agent-1");
        assert_eq!(session.context_strategy, "last_n");
        assert_eq!(session.agent_id, "agent-1");
        assert!(session.context_config.is_empty());
    }

    #[test]
    fn create_with_strategy() {
        let mut config = serde_json::Map::new();
        config.insert("window_size".into(), serde_json::json!(3));
        let session = CreateSessionRequest {
            title: "debugging".into(),
            context_strategy: Some("sliding_window".into()),
            context_config: Some(config),
        }
        .into_session("agent-1");
        assert_eq!(session.context_strategy, "sliding_window");
        assert_eq!(
            session.context_config.get("window_size").and_then(|v| v.as_i64()),
            Some(3)
        );
    }

    #[test]
    fn update_is_partial() {
        let mut session = CreateSessionRequest::default().into_session("agent-1");
        session.apply(UpdateSessionRequest {
            title: Some("renamed".into()),
            ..Default::default()
        });
        assert_eq!(session.title, "renamed");
        assert_eq!(session.context_strategy, "last_n");
    }
}
