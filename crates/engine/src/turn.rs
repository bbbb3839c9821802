//! Turn mechanics: the state machine states, the buffered working set, and
//! tool-call parsing.

use serde::{Deserialize, Serialize};
use tracing::warn;

use agentry_core::error::StorageError;
use agentry_core::message::Message;
use agentry_core::provider::{ChatResponse, ProviderToolCall};
use agentry_core::storage::MessageStore;

/// Maximum provider↔tool iterations per turn.
pub const MAX_ITERATIONS: u32 = 5;

/// The orchestrator's per-iteration states.
///
/// `Finalize` is the only successful terminal state; a turn that cannot
/// reach it within [`MAX_ITERATIONS`] aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    BuildContext,
    CallProvider,
    ParseResponse,
    ExecuteTools,
    AppendResults,
    Finalize,
}

/// The outcome of one requested tool call, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// The per-turn message buffer.
///
/// Seeded from persisted history, extended with messages produced during
/// the turn. Pending messages become visible to context strategies
/// immediately but reach storage only via [`WorkingSet::flush`], which the
/// orchestrator calls on reaching a terminal state. An aborted turn drops
/// the buffer, so no partial assistant/tool messages are ever persisted.
pub struct WorkingSet {
    persisted: Vec<Message>,
    pending: Vec<Message>,
}

impl WorkingSet {
    /// Seed the working set from persisted session history.
    pub fn seed(history: Vec<Message>) -> Self {
        Self {
            persisted: history,
            pending: Vec::new(),
        }
    }

    /// The full ordered view: persisted history followed by pending
    /// messages, in production order.
    pub fn messages(&self) -> Vec<Message> {
        let mut all = self.persisted.clone();
        all.extend(self.pending.iter().cloned());
        all
    }

    /// Buffer a freshly produced message.
    pub fn push(&mut self, message: Message) {
        self.pending.push(message);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush all pending messages to storage in production order.
    pub async fn flush(&mut self, store: &dyn MessageStore) -> Result<(), StorageError> {
        for message in &self.pending {
            store.append(message).await?;
        }
        self.persisted.append(&mut self.pending);
        Ok(())
    }
}

/// Extract requested tool calls from a provider response.
///
/// The structured `tool_calls` metadata is authoritative. When it is empty,
/// a best-effort scan of the content text runs as a documented degraded
/// mode: some backends emit a JSON object with a `tool_calls` array as
/// plain content. Anything unparseable is ignored.
pub fn parse_tool_calls(response: &ChatResponse) -> Vec<ProviderToolCall> {
    if !response.tool_calls.is_empty() {
        return ensure_call_ids(response.tool_calls.clone());
    }

    // Degraded path: content-sniffing. Unreliable by design; only accept a
    // well-formed JSON object.
    if response.content.contains("tool_calls") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response.content)
            && let Some(raw_calls) = value.get("tool_calls").and_then(|v| v.as_array())
        {
            warn!("parsed tool calls from response content; provider metadata was empty");
            let calls = raw_calls
                .iter()
                .filter_map(|c| {
                    let function = c.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = match function.get("arguments") {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(obj) => obj.to_string(),
                        None => "{}".into(),
                    };
                    Some(ProviderToolCall {
                        id: c.get("id").and_then(|v| v.as_str()).unwrap_or_default().into(),
                        name,
                        arguments,
                    })
                })
                .collect();
            return ensure_call_ids(calls);
        }
    }

    Vec::new()
}

/// Every call needs an id for result correlation; synthesize when absent.
fn ensure_call_ids(mut calls: Vec<ProviderToolCall>) -> Vec<ProviderToolCall> {
    for call in &mut calls {
        if call.id.is_empty() {
            call.id = uuid::Uuid::new_v4().to_string();
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_storage::InMemoryStorage;

    fn response_with(content: &str, tool_calls: Vec<ProviderToolCall>) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            model: "m".into(),
            usage: None,
            finish_reason: None,
            tool_calls,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn metadata_tool_calls_are_authoritative() {
        let response = response_with(
            "ignore this text",
            vec![ProviderToolCall {
                id: "c1".into(),
                name: "calculator".into(),
                arguments: r#"{"expression":"1+1"}"#.into(),
            }],
        );
        let calls = parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].name, "calculator");
    }

    #[test]
    fn missing_ids_are_synthesized() {
        let response = response_with(
            "",
            vec![ProviderToolCall {
                id: String::new(),
                name: "calculator".into(),
                arguments: "{}".into(),
            }],
        );
        let calls = parse_tool_calls(&response);
        assert!(!calls[0].id.is_empty());
    }

    #[test]
    fn content_scan_parses_well_formed_json() {
        let content = r#"{"tool_calls":[{"function":{"name":"calculator","arguments":{"expression":"2+2"}}}]}"#;
        let response = response_with(content, vec![]);
        let calls = parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculator");
        let args: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(args["expression"], "2+2");
    }

    #[test]
    fn content_scan_ignores_prose() {
        let response = response_with("I would use tool_calls here if I could.", vec![]);
        assert!(parse_tool_calls(&response).is_empty());
    }

    #[test]
    fn no_tool_calls_anywhere() {
        let response = response_with("Just a plain answer.", vec![]);
        assert!(parse_tool_calls(&response).is_empty());
    }

    #[tokio::test]
    async fn working_set_buffers_until_flush() {
        let storage = InMemoryStorage::new();
        let stores = storage.stores();

        let mut ws = WorkingSet::seed(vec![Message::user("sess", "hello")]);
        ws.push(Message::assistant("sess", "thinking"));
        ws.push(Message::tool_result("sess", "c1", "{}"));

        // Pending messages are visible to the working view...
        assert_eq!(ws.messages().len(), 3);
        assert_eq!(ws.pending_len(), 2);

        // ...but not yet persisted.
        let (persisted, _) = stores.messages.list_by_session("sess", 100, 0).await.unwrap();
        assert!(persisted.is_empty());

        ws.flush(stores.messages.as_ref()).await.unwrap();
        assert_eq!(ws.pending_len(), 0);
        let (persisted, _) = stores.messages.list_by_session("sess", 100, 0).await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].content, "thinking");
    }

    #[tokio::test]
    async fn dropped_working_set_persists_nothing() {
        let storage = InMemoryStorage::new();
        let stores = storage.stores();

        {
            let mut ws = WorkingSet::seed(vec![]);
            ws.push(Message::assistant("sess", "never stored"));
        }

        let (persisted, _) = stores.messages.list_by_session("sess", 100, 0).await.unwrap();
        assert!(persisted.is_empty());
    }
}
