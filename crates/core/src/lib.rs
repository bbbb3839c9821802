//! # Agentry Core
//!
//! Domain types, traits, and error definitions for the Agentry agent backend.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is defined as a trait here. Implementations live
//! in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod storage;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, CreateAgentRequest, UpdateAgentRequest};
pub use error::{ErrorCode, ProviderError, RegistryError, StorageError, ValidationError};
pub use message::{Message, Role};
pub use provider::{ChatRequest, ChatResponse, Provider, ProviderToolCall, StreamChunk, Usage};
pub use session::{CreateSessionRequest, Session, UpdateSessionRequest};
pub use storage::{AgentStore, MessageStore, SessionStore, Stores};
pub use tool::{
    CallInfo, ExecutionContext, Parameter, ParameterType, Tool, ToolDefinition, ToolRegistry,
    ToolResult, ToolSchema,
};
