//! Last-N strategy — keep the tail of the conversation.

use agentry_core::message::Message;

use crate::{ContextError, ContextStrategy, StrategyConfig, build_system_message, config_int};

const DEFAULT_COUNT: i64 = 10;

/// Returns the system message followed by the last N history messages in
/// original order.
pub struct LastNStrategy;

impl ContextStrategy for LastNStrategy {
    fn name(&self) -> &'static str {
        "last_n"
    }

    fn default_config(&self) -> StrategyConfig {
        let mut config = StrategyConfig::new();
        config.insert("count".into(), serde_json::json!(DEFAULT_COUNT));
        config
    }

    fn build_context(
        &self,
        system_prompt: &str,
        agent_prompt: &str,
        history: &[Message],
        config: &StrategyConfig,
    ) -> Result<Vec<Message>, ContextError> {
        let count = config_int(config, "count", DEFAULT_COUNT);
        if count <= 0 {
            return Err(ContextError::InvalidConfig("count must be positive".into()));
        }

        let mut context = vec![Message::system(
            "",
            build_system_message(system_prompt, agent_prompt),
        )];

        let start = history.len().saturating_sub(count as usize);
        context.extend(history[start..].iter().cloned());

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::history;
    use agentry_core::message::Role;

    fn config(count: i64) -> StrategyConfig {
        let mut c = StrategyConfig::new();
        c.insert("count".into(), serde_json::json!(count));
        c
    }

    #[test]
    fn returns_system_plus_min_count_len() {
        let strategy = LastNStrategy;
        let h = history(20);

        let context = strategy.build_context("sys", "", &h, &config(5)).unwrap();
        assert_eq!(context.len(), 1 + 5);
        assert_eq!(context[0].role, Role::System);
        // The five most recent messages, in original order.
        assert_eq!(context[1].content, "msg 15");
        assert_eq!(context[5].content, "msg 19");
    }

    #[test]
    fn short_history_returned_whole() {
        let strategy = LastNStrategy;
        let h = history(3);
        let context = strategy.build_context("sys", "", &h, &config(10)).unwrap();
        assert_eq!(context.len(), 1 + 3);
    }

    #[test]
    fn empty_history_yields_only_system() {
        let strategy = LastNStrategy;
        let context = strategy
            .build_context("sys", "", &[], &StrategyConfig::new())
            .unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[0].content, "sys");
    }

    #[test]
    fn default_count_is_ten() {
        let strategy = LastNStrategy;
        let h = history(30);
        let context = strategy
            .build_context("sys", "", &h, &StrategyConfig::new())
            .unwrap();
        assert_eq!(context.len(), 1 + 10);
    }

    #[test]
    fn rejects_non_positive_count() {
        let strategy = LastNStrategy;
        let h = history(5);
        assert!(strategy.build_context("sys", "", &h, &config(0)).is_err());
        assert!(strategy.build_context("sys", "", &h, &config(-3)).is_err());
    }

    #[test]
    fn history_is_not_mutated() {
        let strategy = LastNStrategy;
        let h = history(8);
        let before: Vec<String> = h.iter().map(|m| m.content.clone()).collect();
        strategy.build_context("sys", "", &h, &config(2)).unwrap();
        let after: Vec<String> = h.iter().map(|m| m.content.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let strategy = LastNStrategy;
        let h = history(12);
        let a = strategy.build_context("sys", "agent", &h, &config(4)).unwrap();
        let b = strategy.build_context("sys", "agent", &h, &config(4)).unwrap();
        let contents_a: Vec<&str> = a.iter().map(|m| m.content.as_str()).collect();
        let contents_b: Vec<&str> = b.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents_a, contents_b);
    }
}
