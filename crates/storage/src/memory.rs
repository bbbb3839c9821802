//! In-memory storage backend for tests.
//!
//! Keeps everything in mutex-guarded maps. No guard is ever held across an
//! await point, so the std mutex is fine here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agentry_core::agent::Agent;
use agentry_core::error::StorageError;
use agentry_core::message::Message;
use agentry_core::session::Session;
use agentry_core::storage::{AgentStore, MessageStore, SessionStore, Stores};

#[derive(Default)]
struct State {
    agents: HashMap<String, Agent>,
    sessions: HashMap<String, Session>,
    /// Append-ordered per session.
    messages: Vec<Message>,
}

/// An ephemeral implementation of all three storage ports.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            agents: Arc::new(self.clone()),
            sessions: Arc::new(self.clone()),
            messages: Arc::new(self.clone()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AgentStore for InMemoryStorage {
    async fn create(&self, agent: &Agent) -> Result<(), StorageError> {
        self.lock().agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>, StorageError> {
        Ok(self.lock().agents.get(id).cloned())
    }

    async fn update(&self, agent: &Agent) -> Result<(), StorageError> {
        let mut state = self.lock();
        if !state.agents.contains_key(&agent.id) {
            return Err(StorageError::NotFound(format!("agent {}", agent.id)));
        }
        state.agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.lock().agents.remove(id).is_some())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Agent>, i64), StorageError> {
        let state = self.lock();
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = agents.len() as i64;
        let page = agents
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn create(&self, session: &Session) -> Result<(), StorageError> {
        self.lock().sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.lock().sessions.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<(), StorageError> {
        let mut state = self.lock();
        if !state.sessions.contains_key(&session.id) {
            return Err(StorageError::NotFound(format!("session {}", session.id)));
        }
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut state = self.lock();
        let existed = state.sessions.remove(id).is_some();
        if existed {
            state.messages.retain(|m| m.session_id != id);
        }
        Ok(existed)
    }

    async fn list_by_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Session>, i64), StorageError> {
        let state = self.lock();
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = sessions.len() as i64;
        let page = sessions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl MessageStore for InMemoryStorage {
    async fn append(&self, message: &Message) -> Result<(), StorageError> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, StorageError> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_by_session(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), StorageError> {
        let state = self.lock();
        let all: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<u64, StorageError> {
        let mut state = self.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.session_id != session_id);
        Ok((before - state.messages.len()) as u64)
    }
}
