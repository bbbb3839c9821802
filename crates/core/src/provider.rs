//! Provider port — the abstraction over LLM backends.
//!
//! A Provider knows how to send a bounded message list to an LLM and get a
//! response back, either complete or as a stream of chunks. Tool-call
//! requests come back as structured metadata on the response; the engine
//! treats that metadata as authoritative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, Role};
use crate::tool::ToolDefinition;

/// A message in provider wire format: role + content only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Convert bounded domain messages into provider wire format.
pub fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// A request to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,

    /// The bounded message list produced by a context strategy.
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: u32,

    #[serde(default)]
    pub stream: bool,

    /// Tool definitions the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Provider-specific extra options.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A tool call requested by the model, parsed from provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderToolCall {
    /// Call id assigned by the provider (or synthesized if absent).
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Raw JSON-encoded argument object.
    pub arguments: String,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,

    /// Which model actually responded.
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Structured tool-call requests. Empty means a final text answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ProviderToolCall>,

    /// Provider-specific metadata.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The core Provider trait.
///
/// Every LLM backend implements this. The engine calls `chat()` or
/// `stream()` without knowing which backend serves the request.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `chat()` and wraps the result as a
    /// single terminal chunk.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let response = self.chat(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.content,
                done: true,
                model: Some(response.model),
                finish_reason: response.finish_reason,
                metadata: response.metadata,
            }))
            .await;
        Ok(rx)
    }

    /// List available models for this provider.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_messages_carry_role_and_content() {
        let messages = vec![
            Message::system("s1", "be helpful"),
            Message::user("s1", "hi"),
        ];
        let wire = to_chat_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, Role::System);
        assert_eq!(wire[1].content, "hi");
    }

    #[test]
    fn chat_request_serialization_skips_empty_tools() {
        let req = ChatRequest {
            model: "llama3.2".into(),
            messages: vec![],
            temperature: 0.7,
            max_tokens: 100,
            stream: false,
            tools: vec![],
            options: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[tokio::test]
    async fn default_stream_wraps_chat() {
        struct OneShot;

        #[async_trait]
        impl Provider for OneShot {
            fn name(&self) -> &str {
                "oneshot"
            }
            async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
                Ok(ChatResponse {
                    content: "hello".into(),
                    model: "m".into(),
                    usage: None,
                    finish_reason: Some("stop".into()),
                    tool_calls: vec![],
                    metadata: serde_json::Map::new(),
                })
            }
        }

        let provider = OneShot;
        let mut rx = provider
            .stream(ChatRequest {
                model: "m".into(),
                messages: vec![],
                temperature: 0.0,
                max_tokens: 10,
                stream: true,
                tools: vec![],
                options: serde_json::Map::new(),
            })
            .await
            .unwrap();

        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content, "hello");
        assert!(chunk.done);
    }
}
