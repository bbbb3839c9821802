//! Agent domain type — an LLM configuration plus a system prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An AI agent configuration.
///
/// An agent pairs a provider/model choice with a system prompt and sampling
/// parameters. Sessions reference an agent; the engine resolves it per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Which LLM provider serves this agent (e.g. "ollama")
    pub provider: String,

    /// The model to request from the provider
    pub model: String,

    /// The agent's base system prompt
    pub system_prompt: String,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum tokens per response
    pub max_tokens: u32,

    /// Provider-specific extra options
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Request payload for creating an agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CreateAgentRequest {
    /// Validate required fields. Returns the name of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.provider.trim().is_empty() {
            return Err("provider is required".into());
        }
        if self.model.trim().is_empty() {
            return Err("model is required".into());
        }
        if self.system_prompt.trim().is_empty() {
            return Err("system_prompt is required".into());
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err("temperature must be between 0 and 2".into());
        }
        if let Some(m) = self.max_tokens
            && m == 0
        {
            return Err("max_tokens must be positive".into());
        }
        Ok(())
    }

    /// Materialize an [`Agent`] with a fresh ID and timestamps.
    pub fn into_agent(self) -> Agent {
        let now = Utc::now();
        Agent {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            description: self.description,
            provider: self.provider,
            model: self.model,
            system_prompt: self.system_prompt,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            config: self.config.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request payload for updating an agent. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Agent {
    /// Apply an update request, refreshing the updated_at timestamp.
    pub fn apply(&mut self, req: UpdateAgentRequest) {
        if let Some(name) = req.name {
            self.name = name;
        }
        if let Some(description) = req.description {
            self.description = description;
        }
        if let Some(provider) = req.provider {
            self.provider = provider;
        }
        if let Some(model) = req.model {
            self.model = model;
        }
        if let Some(system_prompt) = req.system_prompt {
            self.system_prompt = system_prompt;
        }
        if let Some(temperature) = req.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = req.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(config) = req.config {
            self.config = config;
        }
        self.updated_at = Utc::now();
    }
}
