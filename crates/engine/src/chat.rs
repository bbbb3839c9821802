//! Chat services: plain chat, streaming chat, and the tool-enabled turn
//! orchestrator.
//!
//! The tool path drives the bounded state machine described in the crate
//! docs. Provider failures abort the turn; tool failures are folded back
//! into the conversation so the model can adapt on the next iteration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentry_context::{ContextStrategy, StrategyRegistry};
use agentry_core::agent::Agent;
use agentry_core::message::Message;
use agentry_core::provider::{
    ChatRequest, ChatResponse, Provider, StreamChunk, to_chat_messages,
};
use agentry_core::session::Session;
use agentry_core::storage::Stores;
use agentry_core::tool::{CallInfo, InputMap};
use agentry_providers::ProviderRegistry;
use agentry_tools::Executor;

use crate::error::EngineError;
use crate::prompt;
use crate::turn::{MAX_ITERATIONS, ToolCallOutcome, TurnState, WorkingSet, parse_tool_calls};

/// How much history seeds the working set. Bounding happens in the context
/// strategy; this is only a hard ceiling on what is loaded.
const HISTORY_LIMIT: i64 = 1000;

/// A plain (tool-less) chat request.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub session_id: String,
    pub message: String,
    pub metadata: InputMap,
}

/// A tool-enabled chat request.
#[derive(Debug, Clone)]
pub struct ToolChatRequest {
    pub session_id: String,
    pub message: String,
    /// Tool names the model may call; empty means all available tools.
    pub tools: Vec<String>,
    /// "auto" (default) or "none".
    pub tool_choice: String,
    pub metadata: InputMap,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ToolChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            tools: Vec::new(),
            tool_choice: "auto".into(),
            metadata: InputMap::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// The result of a plain chat turn.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatOutcome {
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub response: String,
    pub metadata: InputMap,
}

/// The result of a tool-enabled chat turn.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolChatOutcome {
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallOutcome>,
    pub finish_reason: String,
    pub metadata: InputMap,
}

/// The conversation engine. One instance serves all sessions.
pub struct ChatService {
    stores: Stores,
    providers: Arc<ProviderRegistry>,
    strategies: Arc<StrategyRegistry>,
    executor: Executor,
}

impl ChatService {
    pub fn new(
        stores: Stores,
        providers: Arc<ProviderRegistry>,
        strategies: Arc<StrategyRegistry>,
        executor: Executor,
    ) -> Self {
        Self {
            stores,
            providers,
            strategies,
            executor,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Resolve the session, its agent, and a healthy provider.
    async fn resolve(
        &self,
        session_id: &str,
    ) -> Result<(Session, Agent, Arc<dyn Provider>), EngineError> {
        let session = self
            .stores
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.into()))?;

        let agent = self
            .stores
            .agents
            .get(&session.agent_id)
            .await?
            .ok_or_else(|| EngineError::AgentNotFound(session.agent_id.clone()))?;

        let provider = self
            .providers
            .get(&agent.provider)
            .ok_or_else(|| EngineError::UnknownProvider(agent.provider.clone()))?;

        if !provider.is_available().await {
            return Err(EngineError::ProviderUnavailable(agent.provider.clone()));
        }

        Ok((session, agent, provider))
    }

    fn strategy_for(&self, session: &Session) -> Result<&dyn ContextStrategy, EngineError> {
        self.strategies
            .get(&session.context_strategy)
            .ok_or_else(|| EngineError::UnknownStrategy(session.context_strategy.clone()))
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>, EngineError> {
        let (history, _) = self
            .stores
            .messages
            .list_by_session(session_id, HISTORY_LIMIT, 0)
            .await?;
        Ok(history)
    }

    // ── Plain chat ────────────────────────────────────────────────────────

    /// One provider call, no tools: persist the user message, bound the
    /// history, call the provider, persist and return the answer.
    pub async fn chat(&self, req: ChatTurnRequest) -> Result<ChatOutcome, EngineError> {
        let (session, agent, provider) = self.resolve(&req.session_id).await?;
        let strategy = self.strategy_for(&session)?;

        let mut user_message = Message::user(&session.id, &req.message);
        user_message.metadata = req.metadata;
        self.stores.messages.append(&user_message).await?;

        let history = self.load_history(&session.id).await?;
        let context = strategy.build_context(
            &agent.system_prompt,
            "",
            &history,
            &session.context_config,
        )?;

        let response = provider
            .chat(ChatRequest {
                model: agent.model.clone(),
                messages: to_chat_messages(&context),
                temperature: agent.temperature,
                max_tokens: agent.max_tokens,
                stream: false,
                tools: vec![],
                options: agent.config.clone(),
            })
            .await?;

        let metadata = response_metadata(&agent, &session, context.len(), &response);
        let mut assistant_message = Message::assistant(&session.id, &response.content);
        assistant_message.metadata = metadata.clone();
        self.stores.messages.append(&assistant_message).await?;

        info!(
            session_id = %session.id,
            user_message_id = %user_message.id,
            assistant_message_id = %assistant_message.id,
            provider = %agent.provider,
            model = %agent.model,
            "chat completed"
        );

        Ok(ChatOutcome {
            user_message_id: user_message.id,
            assistant_message_id: assistant_message.id,
            response: response.content,
            metadata,
        })
    }

    // ── Streaming chat ────────────────────────────────────────────────────

    /// Streaming variant of [`ChatService::chat`]. Provider chunks are
    /// forwarded as they arrive; when the terminal chunk lands, the
    /// accumulated assistant message is persisted and one extra chunk
    /// carrying the message ids is emitted.
    pub async fn stream(
        &self,
        req: ChatTurnRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, agentry_core::error::ProviderError>>,
        EngineError,
    > {
        let (session, agent, provider) = self.resolve(&req.session_id).await?;
        let strategy = self.strategy_for(&session)?;

        let mut user_message = Message::user(&session.id, &req.message);
        user_message.metadata = req.metadata;
        self.stores.messages.append(&user_message).await?;

        let history = self.load_history(&session.id).await?;
        let context = strategy.build_context(
            &agent.system_prompt,
            "",
            &history,
            &session.context_config,
        )?;
        let context_len = context.len();

        let mut chunks = provider
            .stream(ChatRequest {
                model: agent.model.clone(),
                messages: to_chat_messages(&context),
                temperature: agent.temperature,
                max_tokens: agent.max_tokens,
                stream: true,
                tools: vec![],
                options: agent.config.clone(),
            })
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let messages = self.stores.messages.clone();
        let session_id = session.id.clone();
        let user_message_id = user_message.id.clone();
        let provider_name = agent.provider.clone();
        let model = agent.model.clone();
        let strategy_name = session.context_strategy.clone();

        tokio::spawn(async move {
            let mut full_response = String::new();

            while let Some(chunk) = chunks.recv().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                full_response.push_str(&chunk.content);
                let done = chunk.done;

                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }

                if done {
                    let mut assistant_message = Message::assistant(&session_id, &full_response);
                    assistant_message.metadata.insert("provider".into(), provider_name.into());
                    assistant_message.metadata.insert("model".into(), model.into());
                    assistant_message
                        .metadata
                        .insert("context_length".into(), serde_json::json!(context_len));
                    assistant_message
                        .metadata
                        .insert("strategy".into(), strategy_name.into());
                    assistant_message.metadata.insert("streamed".into(), serde_json::json!(true));

                    match messages.append(&assistant_message).await {
                        Ok(()) => {
                            let mut metadata = serde_json::Map::new();
                            metadata.insert(
                                "user_message_id".into(),
                                serde_json::json!(user_message_id),
                            );
                            metadata.insert(
                                "assistant_message_id".into(),
                                serde_json::json!(assistant_message.id),
                            );
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: String::new(),
                                    done: true,
                                    model: None,
                                    finish_reason: None,
                                    metadata,
                                }))
                                .await;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to persist streamed assistant message");
                        }
                    }
                    return;
                }
            }
        });

        Ok(rx)
    }

    // ── Tool-enabled chat ─────────────────────────────────────────────────

    /// Run one tool-enabled turn through the bounded state machine.
    ///
    /// The caller's user message is persisted up front; everything else the
    /// turn produces is buffered in the working set and flushed only on
    /// `FINALIZE`. Provider failures and iteration exhaustion abort the
    /// turn with the buffer dropped.
    pub async fn chat_with_tools(
        &self,
        req: ToolChatRequest,
    ) -> Result<ToolChatOutcome, EngineError> {
        let (session, agent, provider) = self.resolve(&req.session_id).await?;
        let strategy = self.strategy_for(&session)?;

        let available_tools = self.available_tools(&req);

        let mut user_message = Message::user(&session.id, &req.message);
        user_message.metadata = req.metadata.clone();
        self.stores.messages.append(&user_message).await?;

        info!(
            session_id = %session.id,
            user_message_id = %user_message.id,
            tools = available_tools.len(),
            tool_choice = %req.tool_choice,
            "processing chat request with tools"
        );

        let history = self.load_history(&session.id).await?;
        let mut working_set = WorkingSet::seed(history);
        let mut all_outcomes: Vec<ToolCallOutcome> = Vec::new();
        let cancel = CancellationToken::new();

        let temperature = req.temperature.unwrap_or(agent.temperature);
        let max_tokens = req.max_tokens.unwrap_or(agent.max_tokens);

        for iteration in 1..=MAX_ITERATIONS {
            debug!(session_id = %session.id, iteration, state = ?TurnState::BuildContext, "turn iteration");

            let enhanced_prompt = prompt::build_system_prompt(
                &agent.system_prompt,
                self.executor.registry(),
                &available_tools,
            );
            let context = strategy.build_context(
                &enhanced_prompt,
                "",
                &working_set.messages(),
                &session.context_config,
            )?;

            let tool_definitions = if !available_tools.is_empty() && req.tool_choice != "none" {
                self.executor.registry().definitions(&available_tools)
            } else {
                Vec::new()
            };
            let tools_attached = !tool_definitions.is_empty();

            debug!(state = ?TurnState::CallProvider, context_length = context.len(), "calling provider");
            let response = provider
                .chat(ChatRequest {
                    model: agent.model.clone(),
                    messages: to_chat_messages(&context),
                    temperature,
                    max_tokens,
                    stream: false,
                    tools: tool_definitions,
                    options: agent.config.clone(),
                })
                .await?;

            debug!(state = ?TurnState::ParseResponse, "parsing response");
            let calls = parse_tool_calls(&response);

            if calls.is_empty() {
                debug!(state = ?TurnState::Finalize, "finalizing turn");
                let mut metadata = response_metadata(&agent, &session, context.len(), &response);
                metadata.insert("tools_available".into(), serde_json::json!(tools_attached));

                let mut assistant_message = Message::assistant(&session.id, &response.content);
                assistant_message.metadata = metadata.clone();
                let assistant_message_id = assistant_message.id.clone();
                working_set.push(assistant_message);
                working_set.flush(self.stores.messages.as_ref()).await?;

                return Ok(ToolChatOutcome {
                    user_message_id: user_message.id,
                    assistant_message_id,
                    response: response.content,
                    tool_calls: all_outcomes,
                    finish_reason: response.finish_reason.unwrap_or_else(|| "stop".into()),
                    metadata,
                });
            }

            debug!(state = ?TurnState::ExecuteTools, count = calls.len(), "executing tool calls");
            let outcomes = self.run_tool_calls(&session.id, &cancel, &calls).await;

            debug!(state = ?TurnState::AppendResults, "appending tool results");
            let assistant_message =
                assistant_message_with_tool_calls(&session, &agent, &response, &calls, &outcomes);
            working_set.push(assistant_message);

            for outcome in &outcomes {
                working_set.push(tool_result_message(&session.id, outcome));
            }
            all_outcomes.extend(outcomes);
        }

        warn!(session_id = %session.id, "turn exhausted its iteration bound");
        Err(EngineError::MaxIterationsExceeded {
            iterations: MAX_ITERATIONS,
            tool_calls: all_outcomes,
        })
    }

    /// The tools this turn may use: the caller's selection, or every
    /// currently-available registered tool.
    fn available_tools(&self, req: &ToolChatRequest) -> Vec<String> {
        if !req.tools.is_empty() {
            return req.tools.clone();
        }
        self.executor
            .registry()
            .list()
            .into_iter()
            .filter(|name| {
                self.executor
                    .registry()
                    .get(name)
                    .map(|t| t.is_available())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Execute one iteration's requested calls concurrently and report the
    /// outcomes in request order.
    ///
    /// Malformed argument payloads become failed outcomes without invoking
    /// anything, the same as an execution failure — never a turn abort.
    async fn run_tool_calls(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        calls: &[agentry_core::provider::ProviderToolCall],
    ) -> Vec<ToolCallOutcome> {
        let mut parse_failures: HashMap<String, ToolCallOutcome> = HashMap::new();
        let mut call_infos = Vec::new();

        for call in calls {
            match serde_json::from_str::<serde_json::Value>(&call.arguments)
                .ok()
                .and_then(|v| v.as_object().cloned())
            {
                Some(arguments) => call_infos.push(CallInfo {
                    tool_name: call.name.clone(),
                    arguments,
                    call_id: call.id.clone(),
                }),
                None => {
                    warn!(tool = %call.name, "malformed tool call arguments");
                    parse_failures.insert(
                        call.id.clone(),
                        ToolCallOutcome {
                            id: call.id.clone(),
                            tool_name: call.name.clone(),
                            success: false,
                            result: None,
                            error: Some("invalid tool arguments: expected a JSON object".into()),
                            duration_ms: 0,
                        },
                    );
                }
            }
        }

        let mut results = self.executor.execute_many(session_id, cancel, call_infos).await;

        calls
            .iter()
            .map(|call| {
                if let Some(outcome) = parse_failures.remove(&call.id) {
                    return outcome;
                }
                match results.remove(&call.id) {
                    Some(result) => ToolCallOutcome {
                        id: call.id.clone(),
                        tool_name: call.name.clone(),
                        success: result.success,
                        result: result.data,
                        error: result.error,
                        duration_ms: result.duration_ms,
                    },
                    // Unreachable in practice: execute_many returns one
                    // result per submitted call id.
                    None => ToolCallOutcome {
                        id: call.id.clone(),
                        tool_name: call.name.clone(),
                        success: false,
                        result: None,
                        error: Some("no result produced".into()),
                        duration_ms: 0,
                    },
                }
            })
            .collect()
    }
}

/// Shared response metadata recorded on assistant messages.
fn response_metadata(
    agent: &Agent,
    session: &Session,
    context_length: usize,
    response: &ChatResponse,
) -> InputMap {
    let mut metadata = InputMap::new();
    metadata.insert("provider".into(), serde_json::json!(agent.provider));
    metadata.insert("model".into(), serde_json::json!(response.model));
    metadata.insert("context_length".into(), serde_json::json!(context_length));
    metadata.insert("strategy".into(), serde_json::json!(session.context_strategy));
    if let Some(reason) = &response.finish_reason {
        metadata.insert("finish_reason".into(), serde_json::json!(reason));
    }
    if let Some(usage) = &response.usage {
        metadata.insert(
            "usage".into(),
            serde_json::json!({
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total_tokens,
            }),
        );
    }
    metadata
}

/// The assistant message recorded for an iteration that requested tools,
/// annotated with the raw call list and per-call outcome summaries.
fn assistant_message_with_tool_calls(
    session: &Session,
    agent: &Agent,
    response: &ChatResponse,
    calls: &[agentry_core::provider::ProviderToolCall],
    outcomes: &[ToolCallOutcome],
) -> Message {
    let mut metadata = response_metadata(agent, session, 0, response);
    metadata.remove("context_length");
    metadata.insert("finish_reason".into(), serde_json::json!("tool_calls"));
    metadata.insert("tool_calls".into(), serde_json::json!(calls.len()));

    let details: Vec<serde_json::Value> = calls
        .iter()
        .zip(outcomes)
        .map(|(call, outcome)| {
            serde_json::json!({
                "id": call.id,
                "tool_name": call.name,
                "arguments": call.arguments,
                "success": outcome.success,
                "duration_ms": outcome.duration_ms,
            })
        })
        .collect();
    metadata.insert("tool_call_details".into(), serde_json::json!(details));

    let mut message = Message::assistant(&session.id, &response.content);
    message.metadata = metadata;
    message
}

/// One tool-result message per call, content describing success/failure and
/// payload, fed back to the model on the next iteration.
fn tool_result_message(session_id: &str, outcome: &ToolCallOutcome) -> Message {
    let content = if outcome.success {
        serde_json::json!({"success": true, "result": outcome.result})
    } else {
        serde_json::json!({"success": false, "error": outcome.error})
    };

    Message::tool_result(session_id, &outcome.id, content.to_string())
        .with_metadata("tool_result", serde_json::json!(true))
        .with_metadata("tool_name", serde_json::json!(outcome.tool_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_context::StrategyRegistry;
    use agentry_core::agent::CreateAgentRequest;
    use agentry_core::error::ProviderError;
    use agentry_core::message::Role;
    use agentry_core::provider::ProviderToolCall;
    use agentry_core::session::CreateSessionRequest;
    use agentry_storage::InMemoryStorage;
    use agentry_tools::builtin_registry;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A provider that replays a scripted sequence of responses and records
    /// every request it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ChatResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
        available: bool,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                available: true,
            }
        }

        fn recorded_requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Network("script exhausted".into()))
        }

        async fn is_available(&self) -> bool {
            self.available
        }
    }

    fn text_response(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            model: "scripted-model".into(),
            usage: None,
            finish_reason: Some("stop".into()),
            tool_calls: vec![],
            metadata: serde_json::Map::new(),
        }
    }

    fn tool_response(calls: Vec<(&str, &str)>) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            model: "scripted-model".into(),
            usage: None,
            finish_reason: None,
            tool_calls: calls
                .into_iter()
                .map(|(name, arguments)| ProviderToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: name.into(),
                    arguments: arguments.into(),
                })
                .collect(),
            metadata: serde_json::Map::new(),
        }
    }

    struct Harness {
        service: ChatService,
        stores: Stores,
        session_id: String,
        provider: Arc<ScriptedProvider>,
    }

    async fn harness(provider: ScriptedProvider) -> Harness {
        harness_with_session(provider, CreateSessionRequest::default()).await
    }

    async fn harness_with_session(
        provider: ScriptedProvider,
        session_req: CreateSessionRequest,
    ) -> Harness {
        let storage = InMemoryStorage::new();
        let stores = storage.stores();

        let agent = CreateAgentRequest {
            name: "tester".into(),
            description: String::new(),
            provider: "scripted".into(),
            model: "scripted-model".into(),
            system_prompt: "You are a test assistant.".into(),
            temperature: None,
            max_tokens: None,
            config: None,
        }
        .into_agent();
        stores.agents.create(&agent).await.unwrap();

        let session = session_req.into_session(&agent.id);
        stores.sessions.create(&session).await.unwrap();

        let provider = Arc::new(provider);
        let mut providers = ProviderRegistry::new();
        providers.register(provider.clone());

        let registry = Arc::new(builtin_registry().unwrap());
        let executor = Executor::new(registry, Duration::from_secs(5));

        let service = ChatService::new(
            stores.clone(),
            Arc::new(providers),
            Arc::new(StrategyRegistry::new()),
            executor,
        );

        Harness {
            service,
            stores,
            session_id: session.id,
            provider,
        }
    }

    async fn persisted(harness: &Harness) -> Vec<Message> {
        let (messages, _) = harness
            .stores
            .messages
            .list_by_session(&harness.session_id, 100, 0)
            .await
            .unwrap();
        messages
    }

    #[tokio::test]
    async fn plain_chat_persists_both_messages() {
        let h = harness(ScriptedProvider::new(vec![text_response("Hello there!")])).await;

        let outcome = h
            .service
            .chat(ChatTurnRequest {
                session_id: h.session_id.clone(),
                message: "Hi".into(),
                metadata: InputMap::new(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.response, "Hello there!");
        assert_eq!(outcome.metadata.get("strategy").and_then(|v| v.as_str()), Some("last_n"));

        let messages = persisted(&h).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello there!");
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let h = harness(ScriptedProvider::new(vec![])).await;
        let err = h
            .service
            .chat(ChatTurnRequest {
                session_id: "no-such-session".into(),
                message: "Hi".into(),
                metadata: InputMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn unavailable_provider_aborts_before_persisting() {
        let mut provider = ScriptedProvider::new(vec![text_response("never")]);
        provider.available = false;
        let h = harness(provider).await;

        let err = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProviderUnavailable(_)));
        assert!(persisted(&h).await.is_empty());
    }

    #[tokio::test]
    async fn tool_turn_executes_and_finalizes() {
        let h = harness(ScriptedProvider::new(vec![
            tool_response(vec![("calculator", r#"{"expression":"2 + 3"}"#)]),
            text_response("The answer is 5."),
        ]))
        .await;

        let outcome = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "What is 2 + 3?"))
            .await
            .unwrap();

        assert_eq!(outcome.response, "The answer is 5.");
        assert_eq!(outcome.finish_reason, "stop");
        assert_eq!(outcome.tool_calls.len(), 1);
        let call = &outcome.tool_calls[0];
        assert!(call.success);
        assert_eq!(call.tool_name, "calculator");
        assert_eq!(call.result.as_ref().unwrap()["result"], 5.0);

        // user, assistant (tool request), tool result, assistant (final)
        let messages = persisted(&h).await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.contains("\"success\":true"));
        assert_eq!(messages[3].role, Role::Assistant);

        // First request carried tool definitions; the second saw the tool
        // result fed back into context.
        let requests = h.provider.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].tools.is_empty());
        assert!(requests[1].messages.iter().any(|m| m.role == Role::Tool));
    }

    #[tokio::test]
    async fn unknown_tool_failure_completes_turn() {
        let h = harness(ScriptedProvider::new(vec![
            tool_response(vec![("definitely_not_a_tool", "{}")]),
            text_response("I could not use that tool."),
        ]))
        .await;

        let outcome = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "Use the magic tool"))
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(!outcome.tool_calls[0].success);
        assert!(outcome.tool_calls[0].error.as_ref().unwrap().contains("not found"));
        assert_eq!(outcome.response, "I could not use that tool.");
    }

    #[tokio::test]
    async fn malformed_arguments_are_a_tool_failure_not_an_abort() {
        let h = harness(ScriptedProvider::new(vec![
            tool_response(vec![("calculator", "this is not json")]),
            text_response("Sorry about that."),
        ]))
        .await;

        let outcome = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "calc"))
            .await
            .unwrap();

        assert!(!outcome.tool_calls[0].success);
        assert!(outcome.tool_calls[0].error.as_ref().unwrap().contains("invalid tool arguments"));
    }

    #[tokio::test]
    async fn looping_turn_hits_iteration_bound() {
        let responses: Vec<ChatResponse> = (0..MAX_ITERATIONS + 1)
            .map(|_| tool_response(vec![("calculator", r#"{"expression":"1 + 1"}"#)]))
            .collect();
        let h = harness(ScriptedProvider::new(responses)).await;

        let err = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "loop forever"))
            .await
            .unwrap_err();

        match err {
            EngineError::MaxIterationsExceeded {
                iterations,
                tool_calls,
            } => {
                assert_eq!(iterations, MAX_ITERATIONS);
                assert_eq!(tool_calls.len(), MAX_ITERATIONS as usize);
            }
            other => panic!("expected MaxIterationsExceeded, got {other:?}"),
        }

        // Only the caller's user message survives an aborted turn.
        let messages = persisted(&h).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn provider_error_mid_turn_drops_buffered_messages() {
        // One tool round, then the script runs out: the second provider
        // call fails and the turn aborts.
        let h = harness(ScriptedProvider::new(vec![tool_response(vec![(
            "calculator",
            r#"{"expression":"1 + 1"}"#,
        )])]))
        .await;

        let err = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "compute"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));

        let messages = persisted(&h).await;
        assert_eq!(messages.len(), 1, "only the user message may persist");
    }

    #[tokio::test]
    async fn tool_choice_none_sends_no_definitions() {
        let h = harness(ScriptedProvider::new(vec![text_response("plain")])).await;

        let mut req = ToolChatRequest::new(&h.session_id, "hi");
        req.tool_choice = "none".into();
        h.service.chat_with_tools(req).await.unwrap();

        let requests = h.provider.recorded_requests();
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn sliding_window_bounds_provider_context() {
        let mut config = serde_json::Map::new();
        config.insert("window_size".into(), serde_json::json!(3));
        config.insert("overlap".into(), serde_json::json!(1));
        let h = harness_with_session(
            ScriptedProvider::new(vec![text_response("bounded")]),
            CreateSessionRequest {
                title: String::new(),
                context_strategy: Some("sliding_window".into()),
                context_config: Some(config),
            },
        )
        .await;

        // Pre-seed 11 messages; the turn's user message makes 12.
        for i in 0..11 {
            h.stores
                .messages
                .append(&Message::user(&h.session_id, format!("old {i}")))
                .await
                .unwrap();
        }

        h.service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "latest"))
            .await
            .unwrap();

        // 1 system + 3 window + 1 overlap = 5
        let requests = h.provider.recorded_requests();
        assert_eq!(requests[0].messages.len(), 5);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[4].content, "latest");
    }

    #[tokio::test]
    async fn parallel_tool_calls_all_report() {
        let h = harness(ScriptedProvider::new(vec![
            tool_response(vec![
                ("calculator", r#"{"expression":"2 + 2"}"#),
                ("text_processor", r#"{"text":"hi there","operation":"word_count"}"#),
                ("nope_tool", "{}"),
            ]),
            text_response("done"),
        ]))
        .await;

        let outcome = h
            .service
            .chat_with_tools(ToolChatRequest::new(&h.session_id, "do three things"))
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls.len(), 3);
        assert!(outcome.tool_calls[0].success);
        assert_eq!(outcome.tool_calls[0].result.as_ref().unwrap()["result"], 4.0);
        assert!(outcome.tool_calls[1].success);
        assert_eq!(outcome.tool_calls[1].result.as_ref().unwrap()["result"], 2);
        assert!(!outcome.tool_calls[2].success);

        // One tool-result message per call, between the two assistant
        // messages.
        let messages = persisted(&h).await;
        let tool_messages: Vec<&Message> =
            messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 3);
    }

    #[tokio::test]
    async fn stream_persists_accumulated_message() {
        let h = harness(ScriptedProvider::new(vec![text_response("streamed answer")])).await;

        let mut rx = h
            .service
            .stream(ChatTurnRequest {
                session_id: h.session_id.clone(),
                message: "stream it".into(),
                metadata: InputMap::new(),
            })
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap());
        }

        // Provider chunk + terminal id chunk.
        assert!(chunks.len() >= 2);
        let last = chunks.last().unwrap();
        assert!(last.done);
        assert!(last.metadata.contains_key("assistant_message_id"));

        let messages = persisted(&h).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "streamed answer");
        assert_eq!(
            messages[1].metadata.get("streamed"),
            Some(&serde_json::json!(true))
        );
    }
}
