//! Summarize strategy — collapse old history into a synthetic summary.

use agentry_core::message::{Message, Role};

use crate::{ContextError, ContextStrategy, StrategyConfig, build_system_message, config_int};

const DEFAULT_MAX_CONTEXT_LENGTH: i64 = 20;
const DEFAULT_KEEP_RECENT: i64 = 5;

/// Keyword hints scanned for in summarized content, in fixed order so the
/// summary text is deterministic.
const TOPIC_KEYWORDS: &[&str] = &[
    "code",
    "programming",
    "bug",
    "error",
    "help",
    "question",
    "problem",
    "solution",
];

/// If history fits within `max_context_length`, returns it unmodified.
/// Otherwise the oldest `len - keep_recent` messages are replaced with one
/// synthetic system message containing a heuristic summary (role counts
/// plus keyword topic hints), followed verbatim by the most recent
/// `keep_recent` messages.
pub struct SummarizeStrategy;

impl ContextStrategy for SummarizeStrategy {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn default_config(&self) -> StrategyConfig {
        let mut config = StrategyConfig::new();
        config.insert(
            "max_context_length".into(),
            serde_json::json!(DEFAULT_MAX_CONTEXT_LENGTH),
        );
        config.insert("keep_recent".into(), serde_json::json!(DEFAULT_KEEP_RECENT));
        config
    }

    fn build_context(
        &self,
        system_prompt: &str,
        agent_prompt: &str,
        history: &[Message],
        config: &StrategyConfig,
    ) -> Result<Vec<Message>, ContextError> {
        let max_context_length =
            config_int(config, "max_context_length", DEFAULT_MAX_CONTEXT_LENGTH);
        let keep_recent = config_int(config, "keep_recent", DEFAULT_KEEP_RECENT);

        if max_context_length <= 0 || keep_recent <= 0 {
            return Err(ContextError::InvalidConfig(
                "max_context_length and keep_recent must be positive".into(),
            ));
        }

        let mut context = vec![Message::system(
            "",
            build_system_message(system_prompt, agent_prompt),
        )];

        if history.len() <= max_context_length as usize {
            context.extend(history.iter().cloned());
            return Ok(context);
        }

        let split = history.len().saturating_sub(keep_recent as usize);
        let (old, recent) = history.split_at(split);

        let summary = summarize(old);
        if !summary.is_empty() {
            context.push(Message::system(
                "",
                format!("Previous conversation summary: {summary}"),
            ));
        }

        context.extend(recent.iter().cloned());
        Ok(context)
    }
}

/// Heuristic one-line summary of a message slice: role counts plus topic
/// hints from keyword scanning. A proper summary would call the model; this
/// path has to stay pure and offline.
fn summarize(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let user_count = messages.iter().filter(|m| m.role == Role::User).count();
    let assistant_count = messages.iter().filter(|m| m.role == Role::Assistant).count();

    let mut summary = format!(
        "The conversation included {user_count} user messages and {assistant_count} assistant responses"
    );

    let topics = extract_topics(messages);
    if !topics.is_empty() {
        summary.push_str(&format!(". Topics discussed: {}", topics.join(", ")));
    }

    summary.push('.');
    summary
}

fn extract_topics(messages: &[Message]) -> Vec<String> {
    TOPIC_KEYWORDS
        .iter()
        .filter(|topic| {
            messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(*topic))
        })
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::history;

    fn config(max: i64, keep: i64) -> StrategyConfig {
        let mut c = StrategyConfig::new();
        c.insert("max_context_length".into(), serde_json::json!(max));
        c.insert("keep_recent".into(), serde_json::json!(keep));
        c
    }

    #[test]
    fn short_history_passes_through() {
        let strategy = SummarizeStrategy;
        let h = history(10);
        let context = strategy.build_context("sys", "", &h, &config(20, 5)).unwrap();
        assert_eq!(context.len(), 1 + 10);
        assert_eq!(context[1].content, "msg 0");
    }

    #[test]
    fn long_history_is_summarized() {
        let strategy = SummarizeStrategy;
        let h = history(30);

        let context = strategy.build_context("sys", "", &h, &config(20, 5)).unwrap();
        // 1 system + 1 summary + 5 recent
        assert_eq!(context.len(), 7);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[1].role, Role::System);
        assert!(context[1].content.starts_with("Previous conversation summary:"));
        // 25 summarized: 13 user (even indices 0..24), 12 assistant
        assert!(context[1].content.contains("13 user messages"));
        assert!(context[1].content.contains("12 assistant responses"));
        // Recent tail is verbatim.
        assert_eq!(context[2].content, "msg 25");
        assert_eq!(context[6].content, "msg 29");
    }

    #[test]
    fn topic_hints_are_detected() {
        let strategy = SummarizeStrategy;
        let mut h = history(25);
        h[0].content = "I found a bug in my code".into();

        let context = strategy.build_context("sys", "", &h, &config(20, 5)).unwrap();
        let summary = &context[1].content;
        assert!(summary.contains("code"));
        assert!(summary.contains("bug"));
    }

    #[test]
    fn boundary_length_is_not_summarized() {
        let strategy = SummarizeStrategy;
        let h = history(20);
        let context = strategy.build_context("sys", "", &h, &config(20, 5)).unwrap();
        assert_eq!(context.len(), 1 + 20);
    }

    #[test]
    fn rejects_non_positive_config() {
        let strategy = SummarizeStrategy;
        let h = history(5);
        assert!(strategy.build_context("s", "", &h, &config(0, 5)).is_err());
        assert!(strategy.build_context("s", "", &h, &config(20, 0)).is_err());
        assert!(strategy.build_context("s", "", &h, &config(-1, -1)).is_err());
    }

    #[test]
    fn defaults_apply() {
        let strategy = SummarizeStrategy;
        let h = history(25);
        let context = strategy
            .build_context("sys", "", &h, &StrategyConfig::new())
            .unwrap();
        // Defaults: max 20, keep 5 → 1 system + 1 summary + 5 recent
        assert_eq!(context.len(), 7);
    }

    #[test]
    fn summary_is_deterministic() {
        let strategy = SummarizeStrategy;
        let mut h = history(25);
        h[0].content = "help with a programming error".into();
        let a = strategy.build_context("s", "", &h, &config(20, 5)).unwrap();
        let b = strategy.build_context("s", "", &h, &config(20, 5)).unwrap();
        assert_eq!(a[1].content, b[1].content);
    }
}
