//! Ollama provider implementation.
//!
//! Talks to a local or remote Ollama daemon over its native HTTP API:
//! `/api/chat` for completions (non-streaming and line-delimited streaming)
//! and `/api/tags` for model listing and health checks.
//!
//! Tool-call requests arrive as structured `message.tool_calls` entries and
//! are surfaced on the response as authoritative metadata — never parsed
//! out of the content text.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agentry_core::error::ProviderError;
use agentry_core::message::Role;
use agentry_core::provider::{
    ChatMessage, ChatRequest, ChatResponse, Provider, ProviderToolCall, StreamChunk, Usage,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// An Ollama LLM provider.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider against the given base URL (or the local default).
    pub fn new(base_url: Option<&str>) -> Self {
        let base_url = base_url
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self { base_url, client }
    }

    fn to_api_request(&self, request: &ChatRequest, stream: bool) -> ApiChatRequest {
        let mut options = serde_json::Map::new();
        if request.temperature > 0.0 {
            options.insert("temperature".into(), serde_json::json!(request.temperature));
        }
        if request.max_tokens > 0 {
            options.insert("num_predict".into(), serde_json::json!(request.max_tokens));
        }
        for (k, v) in &request.options {
            options.insert(k.clone(), v.clone());
        }

        ApiChatRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            stream,
            options,
            tools: request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.to_api_request(&request, false);

        debug!(model = %request.model, tools = request.tools.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let api: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(api.into_chat_response())
    }

    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.to_api_request(&request, true);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(16);

        // Ollama streams newline-delimited JSON objects; a body chunk may
        // carry a partial line, so buffer across chunks.
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let api: ApiChatResponse = match serde_json::from_str(line) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "failed to parse streaming response line");
                            continue;
                        }
                    };

                    let done = api.done;
                    let chunk = StreamChunk {
                        content: api.message.content.clone(),
                        done,
                        model: Some(api.model.clone()),
                        finish_reason: api.done_reason.clone(),
                        metadata: serde_json::Map::new(),
                    };

                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }

                    if done {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let api: ApiModelsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(api.models.into_iter().map(|m| m.name).collect())
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    options: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default = "empty_message")]
    message: ApiMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

fn empty_message() -> ApiMessage {
    ApiMessage {
        role: Role::Assistant,
        content: String::new(),
        tool_calls: Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default = "assistant_role")]
    #[allow(dead_code)]
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

fn assistant_role() -> Role {
    Role::Assistant
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiToolFunction,
}

#[derive(Debug, Deserialize)]
struct ApiToolFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiModelsResponse {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    name: String,
}

impl ApiChatResponse {
    fn into_chat_response(self) -> ChatResponse {
        let tool_calls: Vec<ProviderToolCall> = self
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ProviderToolCall {
                // Ollama does not assign call ids; synthesize one so batch
                // correlation works downstream.
                id: uuid::Uuid::new_v4().to_string(),
                name: tc.function.name,
                arguments: serde_json::Value::Object(tc.function.arguments).to_string(),
            })
            .collect();

        let usage = match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt_tokens = prompt.unwrap_or(0);
                let completion_tokens = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                })
            }
        };

        ChatResponse {
            content: self.message.content,
            model: self.model,
            usage,
            finish_reason: self.done_reason,
            tool_calls,
            metadata: serde_json::Map::new(),
        }
    }
}
