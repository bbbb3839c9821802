//! The conversation orchestrator — the heart of Agentry.
//!
//! One caller turn drives a bounded state machine:
//!
//! ```text
//! BUILD_CONTEXT → CALL_PROVIDER → PARSE_RESPONSE ─┬─→ FINALIZE
//!        ↑                                        │
//!        └── APPEND_RESULTS ← EXECUTE_TOOLS ←─────┘ (tool calls requested)
//! ```
//!
//! Each iteration bounds the working set through a context strategy, calls
//! the provider, and either finalizes (no tool calls) or executes the
//! requested tools concurrently and feeds their results back. The loop is
//! capped at [`MAX_ITERATIONS`]; exhaustion aborts the turn.
//!
//! Messages produced during a turn are buffered in the working set and
//! flushed to storage only when the turn reaches a terminal state, so an
//! aborted turn leaves no partial assistant/tool messages behind.

pub mod chat;
pub mod error;
pub mod prompt;
pub mod turn;

pub use chat::{ChatOutcome, ChatService, ChatTurnRequest, ToolChatRequest, ToolChatOutcome};
pub use error::EngineError;
pub use turn::{MAX_ITERATIONS, ToolCallOutcome, TurnState, WorkingSet, parse_tool_calls};
