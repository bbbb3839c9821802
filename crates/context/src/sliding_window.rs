//! Sliding-window strategy — recent window plus overlap from the discard.

use agentry_core::message::Message;

use crate::{ContextError, ContextStrategy, StrategyConfig, build_system_message, config_int};

const DEFAULT_WINDOW_SIZE: i64 = 5;
const DEFAULT_OVERLAP: i64 = 2;

/// Returns the system message followed by the most recent `window_size`
/// messages; when the discarded prefix is long enough, `overlap` messages
/// immediately preceding the window are included as well. Total included is
/// `window_size + overlap` for long histories, degrading gracefully to all
/// of history when it is shorter.
pub struct SlidingWindowStrategy;

impl ContextStrategy for SlidingWindowStrategy {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn default_config(&self) -> StrategyConfig {
        let mut config = StrategyConfig::new();
        config.insert("window_size".into(), serde_json::json!(DEFAULT_WINDOW_SIZE));
        config.insert("overlap".into(), serde_json::json!(DEFAULT_OVERLAP));
        config
    }

    fn build_context(
        &self,
        system_prompt: &str,
        agent_prompt: &str,
        history: &[Message],
        config: &StrategyConfig,
    ) -> Result<Vec<Message>, ContextError> {
        let window_size = config_int(config, "window_size", DEFAULT_WINDOW_SIZE);
        let overlap = config_int(config, "overlap", DEFAULT_OVERLAP);

        if window_size <= 0 {
            return Err(ContextError::InvalidConfig(
                "window_size must be positive".into(),
            ));
        }
        if overlap < 0 || overlap >= window_size {
            return Err(ContextError::InvalidConfig(
                "overlap must be between 0 and window_size-1".into(),
            ));
        }

        let window_size = window_size as usize;
        let overlap = overlap as usize;

        let mut context = vec![Message::system(
            "",
            build_system_message(system_prompt, agent_prompt),
        )];

        if history.len() <= window_size {
            context.extend(history.iter().cloned());
            return Ok(context);
        }

        // Slide from the end; pull in overlap only when the discarded prefix
        // is longer than the overlap itself.
        let window_start = history.len() - window_size;
        let start = if window_start > overlap {
            window_start - overlap
        } else {
            0
        };

        context.extend(history[start..].iter().cloned());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::history;
    use agentry_core::message::Role;

    fn config(window_size: i64, overlap: i64) -> StrategyConfig {
        let mut c = StrategyConfig::new();
        c.insert("window_size".into(), serde_json::json!(window_size));
        c.insert("overlap".into(), serde_json::json!(overlap));
        c
    }

    #[test]
    fn long_history_includes_window_plus_overlap() {
        let strategy = SlidingWindowStrategy;
        let h = history(20);

        let context = strategy.build_context("sys", "", &h, &config(5, 2)).unwrap();
        // 1 system + 5 window + 2 overlap
        assert_eq!(context.len(), 8);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[1].content, "msg 13");
        assert_eq!(context[7].content, "msg 19");
    }

    #[test]
    fn twelve_messages_window_three_overlap_one() {
        let strategy = SlidingWindowStrategy;
        let h = history(12);
        let context = strategy.build_context("sys", "", &h, &config(3, 1)).unwrap();
        // 1 system + 3 window + 1 overlap = 5
        assert_eq!(context.len(), 5);
        assert_eq!(context[1].content, "msg 8");
        assert_eq!(context[4].content, "msg 11");
    }

    #[test]
    fn short_history_returned_whole() {
        let strategy = SlidingWindowStrategy;
        let h = history(4);
        let context = strategy.build_context("sys", "", &h, &config(5, 2)).unwrap();
        assert_eq!(context.len(), 1 + 4);
    }

    #[test]
    fn small_prefix_degrades_to_full_history() {
        let strategy = SlidingWindowStrategy;
        // 6 messages, window 5: prefix of 1 is not longer than overlap 2, so
        // everything is included.
        let h = history(6);
        let context = strategy.build_context("sys", "", &h, &config(5, 2)).unwrap();
        assert_eq!(context.len(), 1 + 6);
    }

    #[test]
    fn defaults_are_five_and_two() {
        let strategy = SlidingWindowStrategy;
        let h = history(30);
        let context = strategy
            .build_context("sys", "", &h, &StrategyConfig::new())
            .unwrap();
        assert_eq!(context.len(), 1 + 5 + 2);
    }

    #[test]
    fn rejects_bad_config() {
        let strategy = SlidingWindowStrategy;
        let h = history(10);
        assert!(strategy.build_context("s", "", &h, &config(0, 0)).is_err());
        assert!(strategy.build_context("s", "", &h, &config(5, -1)).is_err());
        assert!(strategy.build_context("s", "", &h, &config(5, 5)).is_err());
        assert!(strategy.build_context("s", "", &h, &config(5, 7)).is_err());
    }

    #[test]
    fn zero_overlap_is_allowed() {
        let strategy = SlidingWindowStrategy;
        let h = history(10);
        let context = strategy.build_context("s", "", &h, &config(4, 0)).unwrap();
        assert_eq!(context.len(), 1 + 4);
        assert_eq!(context[1].content, "msg 6");
    }

    #[test]
    fn history_is_not_mutated() {
        let strategy = SlidingWindowStrategy;
        let h = history(15);
        let before = h.len();
        strategy.build_context("s", "", &h, &config(5, 2)).unwrap();
        assert_eq!(h.len(), before);
    }
}
