//! The tool executor — isolation, timeout, and failure containment.
//!
//! Every tool body runs as its own spawned task. A panic inside the body is
//! caught at the join boundary and converted to a `PANIC` result; it never
//! propagates into the calling task. The deadline is raced against
//! completion, and the caller's cancellation token is honored throughout.
//!
//! Timeout caveat: a body that does not observe its cancellation token is
//! abandoned when the deadline passes — the caller gets a `TIMEOUT` result,
//! but the task may keep running unobserved until it finishes on its own.
//! Well-behaved tool bodies select on `ctx.cancel.cancelled()`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use agentry_core::error::ErrorCode;
use agentry_core::tool::{CallInfo, ExecutionContext, InputMap, ToolRegistry, ToolResult};

use crate::validate::sanitize_input;

/// Executes tools from a shared registry with a per-call deadline.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// A copy of this executor sharing the registry but with a different
    /// per-call deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            registry: self.registry.clone(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one tool call with a fresh cancellation scope.
    pub async fn execute(&self, tool_name: &str, session_id: &str, input: InputMap) -> ToolResult {
        self.execute_with(
            tool_name,
            session_id,
            "default-agent",
            &CancellationToken::new(),
            input,
        )
        .await
    }

    /// Execute one tool call under the caller's cancellation token.
    ///
    /// Validation and availability failures short-circuit before the tool
    /// body ever runs. Every returned result carries its elapsed wall-clock
    /// duration.
    pub async fn execute_with(
        &self,
        tool_name: &str,
        session_id: &str,
        agent_id: &str,
        cancel: &CancellationToken,
        input: InputMap,
    ) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.registry.get(tool_name) else {
            return stamp(
                ToolResult::error(ErrorCode::ToolNotFound, format!("tool '{tool_name}' not found")),
                start,
            );
        };

        if !tool.is_available() {
            return stamp(
                ToolResult::error(
                    ErrorCode::ToolUnavailable,
                    format!("tool '{tool_name}' is not available"),
                ),
                start,
            );
        }

        if let Err(err) = tool.validate(&input) {
            return stamp(ToolResult::validation_error(&err), start);
        }

        let sanitized = match sanitize_input(&tool.schema(), &input) {
            Ok(s) => s,
            Err(err) => return stamp(ToolResult::validation_error(&err), start),
        };

        if cancel.is_cancelled() {
            return stamp(
                ToolResult::error(ErrorCode::Cancelled, "execution cancelled"),
                start,
            );
        }

        let mut ctx = ExecutionContext::new(session_id, agent_id, self.timeout);
        let body_cancel = cancel.child_token();
        ctx.cancel = body_cancel.clone();

        debug!(tool = tool_name, request_id = %ctx.request_id, "executing tool");

        // The body runs in its own task so a panic is caught at the join
        // boundary instead of unwinding into the caller.
        let registry = self.registry.clone();
        let name = tool_name.to_string();
        let handle = tokio::spawn(async move {
            match registry.get(&name) {
                Some(tool) => Some(tool.execute(ctx, sanitized).await),
                None => None,
            }
        });

        let result = tokio::select! {
            joined = tokio::time::timeout(self.timeout, handle) => match joined {
                Ok(Ok(Some(result))) => result,
                Ok(Ok(None)) => {
                    ToolResult::error(ErrorCode::NilResult, "tool returned no result")
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    warn!(tool = tool_name, "tool execution panicked");
                    ToolResult::error(ErrorCode::Panic, "tool execution panicked")
                }
                Ok(Err(_)) => {
                    ToolResult::error(ErrorCode::NilResult, "tool task produced no result")
                }
                Err(_elapsed) => {
                    // Signal cooperative bodies to stop; the task itself is
                    // abandoned, not killed.
                    body_cancel.cancel();
                    warn!(tool = tool_name, timeout_ms = self.timeout.as_millis() as u64, "tool execution timed out");
                    ToolResult::error(ErrorCode::Timeout, "execution timeout")
                }
            },
            _ = cancel.cancelled() => {
                body_cancel.cancel();
                ToolResult::error(ErrorCode::Cancelled, "execution cancelled")
            }
        };

        stamp(result, start)
    }

    /// Execute a batch of calls as independent concurrent tasks.
    ///
    /// Fan-in is keyed by call id: exactly one result per submitted call id,
    /// with no ordering guarantee among concurrently completing calls. One
    /// call's failure never affects, delays, or cancels any other call —
    /// that independence is part of this method's contract.
    pub async fn execute_many(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        calls: Vec<CallInfo>,
    ) -> HashMap<String, ToolResult> {
        let mut handles = Vec::with_capacity(calls.len());

        for call in calls {
            let executor = self.clone();
            let session_id = session_id.to_string();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let result = executor
                    .execute_with(
                        &call.tool_name,
                        &session_id,
                        "default-agent",
                        &cancel,
                        call.arguments,
                    )
                    .await;
                (call.call_id, result)
            }));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for handle in handles {
            // The inner execute_with already contains panics; a join error
            // here would mean the fan-out wrapper itself died.
            if let Ok((call_id, result)) = handle.await {
                results.insert(call_id, result);
            }
        }

        results
    }
}

fn stamp(mut result: ToolResult, start: Instant) -> ToolResult {
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::error::ValidationError;
    use agentry_core::tool::{Parameter, ParameterType, Tool, ToolSchema};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::validate::validate_input;

    struct SleepTool {
        sleep: Duration,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleeper"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("sleeper", "Sleeps then answers")
        }
        fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
            validate_input(&self.schema(), input)
        }
        async fn execute(&self, _ctx: ExecutionContext, _input: InputMap) -> ToolResult {
            tokio::time::sleep(self.sleep).await;
            ToolResult::ok(serde_json::json!({"slept_ms": self.sleep.as_millis() as u64}))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panicker"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("panicker", "Always panics")
        }
        fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
            validate_input(&self.schema(), input)
        }
        async fn execute(&self, _ctx: ExecutionContext, _input: InputMap) -> ToolResult {
            panic!("deliberate test panic");
        }
    }

    struct FlagTool {
        invoked: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Tool for FlagTool {
        fn name(&self) -> &str {
            "flagger"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("flagger", "Records invocation").with_parameter(Parameter::required(
                "value",
                ParameterType::Number,
                "A number",
            ))
        }
        fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
            validate_input(&self.schema(), input)
        }
        async fn execute(&self, _ctx: ExecutionContext, input: InputMap) -> ToolResult {
            self.invoked.store(true, Ordering::SeqCst);
            ToolResult::ok(serde_json::json!({"value": input.get("value")}))
        }
    }

    struct DownTool;

    #[async_trait]
    impl Tool for DownTool {
        fn name(&self) -> &str {
            "down"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("down", "Always offline")
        }
        fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
            validate_input(&self.schema(), input)
        }
        async fn execute(&self, _ctx: ExecutionContext, _input: InputMap) -> ToolResult {
            ToolResult::ok(serde_json::Value::Null)
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    fn executor_with(tools: Vec<Box<dyn Tool>>, timeout: Duration) -> Executor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Executor::new(Arc::new(registry), timeout)
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast() {
        let executor = executor_with(vec![], Duration::from_secs(1));
        let result = executor.execute("nope", "sess", InputMap::new()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::ToolNotFound));
    }

    #[tokio::test]
    async fn unavailable_tool_fails_before_body() {
        let executor = executor_with(vec![Box::new(DownTool)], Duration::from_secs(1));
        let result = executor.execute("down", "sess", InputMap::new()).await;
        assert_eq!(result.error_code, Some(ErrorCode::ToolUnavailable));
    }

    #[tokio::test]
    async fn validation_failure_short_circuits_body() {
        let invoked = Arc::new(AtomicBool::new(false));
        let executor = executor_with(
            vec![Box::new(FlagTool {
                invoked: invoked.clone(),
            })],
            Duration::from_secs(1),
        );

        let result = executor.execute("flagger", "sess", InputMap::new()).await;
        assert_eq!(result.error_code, Some(ErrorCode::ValidationError));
        assert!(!invoked.load(Ordering::SeqCst), "body must not run on invalid input");
    }

    #[tokio::test]
    async fn timeout_is_bounded() {
        let executor = executor_with(
            vec![Box::new(SleepTool {
                sleep: Duration::from_secs(30),
            })],
            Duration::from_millis(50),
        );

        let start = Instant::now();
        let result = executor.execute("sleeper", "sess", InputMap::new()).await;
        let elapsed = start.elapsed();

        assert_eq!(result.error_code, Some(ErrorCode::Timeout));
        assert!(elapsed < Duration::from_secs(2), "returned in {elapsed:?}");
        assert!(result.duration_ms >= 50);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let executor = executor_with(vec![Box::new(PanicTool)], Duration::from_secs(1));
        let result = executor.execute("panicker", "sess", InputMap::new()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::Panic));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let executor = executor_with(
            vec![Box::new(SleepTool {
                sleep: Duration::from_secs(30),
            })],
            Duration::from_secs(60),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = executor
            .execute_with("sleeper", "sess", "agent", &cancel, InputMap::new())
            .await;
        assert_eq!(result.error_code, Some(ErrorCode::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_mid_flight() {
        let executor = executor_with(
            vec![Box::new(SleepTool {
                sleep: Duration::from_secs(30),
            })],
            Duration::from_secs(60),
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = executor
            .execute_with("sleeper", "sess", "agent", &cancel, InputMap::new())
            .await;
        assert_eq!(result.error_code, Some(ErrorCode::Cancelled));
    }

    #[tokio::test]
    async fn success_records_duration() {
        let executor = executor_with(
            vec![Box::new(SleepTool {
                sleep: Duration::from_millis(20),
            })],
            Duration::from_secs(5),
        );
        let result = executor.execute("sleeper", "sess", InputMap::new()).await;
        assert!(result.success);
        assert!(result.duration_ms >= 20);
    }

    #[tokio::test]
    async fn execute_many_returns_one_result_per_call_id() {
        let invoked = Arc::new(AtomicBool::new(false));
        let executor = executor_with(
            vec![
                Box::new(FlagTool {
                    invoked: invoked.clone(),
                }),
                Box::new(PanicTool),
                Box::new(SleepTool {
                    sleep: Duration::from_millis(5),
                }),
            ],
            Duration::from_secs(5),
        );

        let calls = vec![
            CallInfo {
                tool_name: "flagger".into(),
                arguments: serde_json::json!({"value": 7}).as_object().cloned().unwrap(),
                call_id: "call-1".into(),
            },
            CallInfo {
                tool_name: "panicker".into(),
                arguments: InputMap::new(),
                call_id: "call-2".into(),
            },
            CallInfo {
                tool_name: "missing_tool".into(),
                arguments: InputMap::new(),
                call_id: "call-3".into(),
            },
            CallInfo {
                tool_name: "sleeper".into(),
                arguments: InputMap::new(),
                call_id: "call-4".into(),
            },
        ];

        let results = executor
            .execute_many("sess", &CancellationToken::new(), calls)
            .await;

        assert_eq!(results.len(), 4);
        assert!(results["call-1"].success);
        assert_eq!(results["call-2"].error_code, Some(ErrorCode::Panic));
        assert_eq!(results["call-3"].error_code, Some(ErrorCode::ToolNotFound));
        assert!(results["call-4"].success);
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_others() {
        // A panicking call and a timing-out call run alongside a healthy one;
        // the healthy call's outcome is unchanged.
        let executor = executor_with(
            vec![
                Box::new(PanicTool),
                Box::new(SleepTool {
                    sleep: Duration::from_millis(10),
                }),
            ],
            Duration::from_secs(5),
        );

        let calls = vec![
            CallInfo {
                tool_name: "panicker".into(),
                arguments: InputMap::new(),
                call_id: "bad".into(),
            },
            CallInfo {
                tool_name: "sleeper".into(),
                arguments: InputMap::new(),
                call_id: "good".into(),
            },
        ];

        let results = executor
            .execute_many("sess", &CancellationToken::new(), calls)
            .await;

        assert_eq!(results["bad"].error_code, Some(ErrorCode::Panic));
        assert!(results["good"].success);
    }
}
