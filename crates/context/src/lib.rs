//! Context strategies — pure functions bounding conversation history.
//!
//! Unbounded session history has to fit a fixed context window before every
//! provider call. Each strategy takes the full history plus a config map and
//! returns a bounded message list whose first element is always a
//! synthesized system message. Strategies are deterministic and never
//! mutate the supplied history.

pub mod last_n;
pub mod sliding_window;
pub mod summarize;

pub use last_n::LastNStrategy;
pub use sliding_window::SlidingWindowStrategy;
pub use summarize::SummarizeStrategy;

use std::collections::HashMap;

use agentry_core::message::Message;
use thiserror::Error;

/// Strategy configuration is a plain JSON object, as stored on the session.
pub type StrategyConfig = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("invalid context config: {0}")]
    InvalidConfig(String),
}

/// A pluggable history-bounding strategy.
///
/// `build_context` is a pure function of its inputs: identical prompts,
/// history, and config always produce an identical bounded list.
pub trait ContextStrategy: Send + Sync {
    /// The name sessions reference this strategy by.
    fn name(&self) -> &'static str;

    /// The default configuration, surfaced in listings.
    fn default_config(&self) -> StrategyConfig;

    /// Bound `history` into a prompt window. Element 0 of the returned list
    /// is always a synthesized system message.
    fn build_context(
        &self,
        system_prompt: &str,
        agent_prompt: &str,
        history: &[Message],
        config: &StrategyConfig,
    ) -> Result<Vec<Message>, ContextError>;
}

/// Combine the base system prompt and the agent prompt into one system
/// message body, falling back to a generic assistant prompt when both are
/// empty.
pub fn build_system_message(system_prompt: &str, agent_prompt: &str) -> String {
    match (system_prompt.is_empty(), agent_prompt.is_empty()) {
        (true, true) => "You are a helpful AI assistant.".into(),
        (true, false) => agent_prompt.into(),
        (false, true) => system_prompt.into(),
        (false, false) => format!("{system_prompt}\n\n{agent_prompt}"),
    }
}

/// Read an integer config value, accepting any JSON number.
pub(crate) fn config_int(config: &StrategyConfig, key: &str, default: i64) -> i64 {
    match config.get(key) {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        None => default,
    }
}

/// A name-keyed collection of context strategies, seeded with the three
/// built-ins. Populated at startup and read-only thereafter.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Box<dyn ContextStrategy>>,
}

impl StrategyRegistry {
    /// Create a registry with the default strategies registered.
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register(Box::new(LastNStrategy));
        registry.register(Box::new(SlidingWindowStrategy));
        registry.register(Box::new(SummarizeStrategy));
        registry
    }

    pub fn register(&mut self, strategy: Box<dyn ContextStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ContextStrategy> {
        self.strategies.get(name).map(|s| s.as_ref())
    }

    /// All registered strategy names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.strategies.keys().copied().collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use agentry_core::message::{Message, Role};

    /// Build an alternating user/assistant history of `n` messages whose
    /// contents are "msg 0" … "msg n-1".
    pub fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new("sess", role, format!("msg {i}"))
            })
            .collect()
    }
}
