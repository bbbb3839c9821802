//! Storage ports — the persistence boundary.
//!
//! The engine reads and writes agents, sessions, and messages through these
//! traits and never touches a database directly. Implementations live in
//! `agentry-storage` (SQLite, in-memory).

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::StorageError;
use crate::message::Message;
use crate::session::Session;

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create(&self, agent: &Agent) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<Agent>, StorageError>;
    async fn update(&self, agent: &Agent) -> Result<(), StorageError>;
    /// Returns whether the agent existed.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
    /// Returns a page of agents plus the total count.
    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Agent>, i64), StorageError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError>;
    async fn update(&self, session: &Session) -> Result<(), StorageError>;
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
    async fn list_by_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Session>, i64), StorageError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to its session's history.
    async fn append(&self, message: &Message) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<Message>, StorageError>;
    /// Messages in append order, plus the session's total count.
    async fn list_by_session(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), StorageError>;
    async fn delete_by_session(&self, session_id: &str) -> Result<u64, StorageError>;
}

/// The aggregated storage handle handed to services.
#[derive(Clone)]
pub struct Stores {
    pub agents: Arc<dyn AgentStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
}
