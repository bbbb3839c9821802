//! Text processor tool — string transforms and simple extraction.

use async_trait::async_trait;

use agentry_core::error::{ErrorCode, ValidationError};
use agentry_core::tool::{
    Example, ExecutionContext, InputMap, Parameter, ParameterType, Tool, ToolResult, ToolSchema,
};

use crate::validate::validate_input;

const OPERATIONS: &[&str] = &[
    "uppercase",
    "lowercase",
    "title_case",
    "word_count",
    "char_count",
    "reverse",
    "trim",
    "extract_emails",
    "extract_urls",
];

pub struct TextProcessorTool;

#[async_trait]
impl Tool for TextProcessorTool {
    fn name(&self) -> &str {
        "text_processor"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "text_processor",
            "Processes and manipulates text with various operations",
        )
        .with_parameter(Parameter::required(
            "text",
            ParameterType::String,
            "The text to process",
        ))
        .with_parameter(
            Parameter::required("operation", ParameterType::String, "Text operation to perform")
                .with_enum(OPERATIONS),
        )
        .with_example(Example {
            description: "Convert text to uppercase".into(),
            input: serde_json::json!({"text": "hello world", "operation": "uppercase"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            output: serde_json::json!({"result": "HELLO WORLD", "operation": "uppercase"}),
        })
        .with_example(Example {
            description: "Count words in text".into(),
            input: serde_json::json!({"text": "The quick brown fox", "operation": "word_count"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            output: serde_json::json!({"result": 4, "operation": "word_count"}),
        })
    }

    fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
        validate_input(&self.schema(), input)
    }

    async fn execute(&self, _ctx: ExecutionContext, input: InputMap) -> ToolResult {
        let text = input.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        let operation = input
            .get("operation")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let result: serde_json::Value = match operation {
            "uppercase" => text.to_uppercase().into(),
            "lowercase" => text.to_lowercase().into(),
            "title_case" => title_case(text).into(),
            "word_count" => (text.split_whitespace().count() as u64).into(),
            "char_count" => (text.chars().count() as u64).into(),
            "reverse" => text.chars().rev().collect::<String>().into(),
            "trim" => text.trim().into(),
            "extract_emails" => serde_json::json!(extract_emails(text)),
            "extract_urls" => serde_json::json!(extract_urls(text)),
            other => {
                return ToolResult::error(
                    ErrorCode::ExecutionError,
                    format!("unknown operation: {other}"),
                );
            }
        };

        ToolResult::ok(serde_json::json!({
            "result": result,
            "operation": operation,
            "original": text,
        }))
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_emails(text: &str) -> Vec<String> {
    // Pattern kept deliberately simple; full RFC 5322 is not the goal.
    let re = regex::Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
        .unwrap_or_else(|_| unreachable!("static regex"));
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

fn extract_urls(text: &str) -> Vec<String> {
    let re = regex::Regex::new(r"https?://[^\s]+").unwrap_or_else(|_| unreachable!("static regex"));
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(text: &str, operation: &str) -> InputMap {
        serde_json::json!({"text": text, "operation": operation})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("sess", "agent", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn uppercase() {
        let result = TextProcessorTool.execute(ctx(), args("hello world", "uppercase")).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["result"], "HELLO WORLD");
    }

    #[tokio::test]
    async fn word_count() {
        let result = TextProcessorTool
            .execute(ctx(), args("The quick brown fox", "word_count"))
            .await;
        assert_eq!(result.data.unwrap()["result"], 4);
    }

    #[tokio::test]
    async fn char_count_is_unicode_aware() {
        let result = TextProcessorTool.execute(ctx(), args("héllo", "char_count")).await;
        assert_eq!(result.data.unwrap()["result"], 5);
    }

    #[tokio::test]
    async fn reverse_handles_unicode() {
        let result = TextProcessorTool.execute(ctx(), args("héllo", "reverse")).await;
        assert_eq!(result.data.unwrap()["result"], "olléh");
    }

    #[tokio::test]
    async fn title_case_op() {
        let result = TextProcessorTool
            .execute(ctx(), args("the QUICK brown", "title_case"))
            .await;
        assert_eq!(result.data.unwrap()["result"], "The Quick Brown");
    }

    #[tokio::test]
    async fn extract_emails_op() {
        let result = TextProcessorTool
            .execute(
                ctx(),
                args("contact alice@example.com or bob@test.org today", "extract_emails"),
            )
            .await;
        let data = result.data.unwrap();
        assert_eq!(
            data["result"],
            serde_json::json!(["alice@example.com", "bob@test.org"])
        );
    }

    #[tokio::test]
    async fn extract_urls_op() {
        let result = TextProcessorTool
            .execute(
                ctx(),
                args("see https://example.com/docs and http://test.org", "extract_urls"),
            )
            .await;
        let data = result.data.unwrap();
        assert_eq!(
            data["result"],
            serde_json::json!(["https://example.com/docs", "http://test.org"])
        );
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = TextProcessorTool
            .validate(&args("hi", "shout"))
            .unwrap_err();
        assert_eq!(err.parameter, "operation");
    }
}
