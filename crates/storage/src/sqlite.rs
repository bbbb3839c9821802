//! SQLite storage backend.
//!
//! One database file with three tables: `agents`, `sessions`, `messages`.
//! Messages carry an autoincrement rowid alias so append order survives
//! equal timestamps. JSON columns are stored as TEXT.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use agentry_core::agent::Agent;
use agentry_core::error::StorageError;
use agentry_core::message::{Message, Role};
use agentry_core::session::Session;
use agentry_core::storage::{AgentStore, MessageStore, SessionStore, Stores};

/// A SQLite-backed implementation of all three storage ports.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Database(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Database(format!("failed to open SQLite: {e}")))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        info!("SQLite storage initialized at {path}");
        Ok(storage)
    }

    /// Bundle this backend into the aggregated handle services consume.
    pub fn stores(&self) -> Stores {
        Stores {
            agents: Arc::new(self.clone()),
            sessions: Arc::new(self.clone()),
            messages: Arc::new(self.clone()),
        }
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                description   TEXT NOT NULL DEFAULT '',
                provider      TEXT NOT NULL,
                model         TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                temperature   REAL NOT NULL DEFAULT 0.7,
                max_tokens    INTEGER NOT NULL DEFAULT 1000,
                config        TEXT NOT NULL DEFAULT '{}',
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("agents table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id               TEXT PRIMARY KEY,
                agent_id         TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                title            TEXT NOT NULL DEFAULT '',
                context_strategy TEXT NOT NULL DEFAULT 'last_n',
                context_config   TEXT NOT NULL DEFAULT '{}',
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, iid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("messages index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(format!("sessions index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_json_map(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn get_column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, StorageError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Database(format!("{column} column: {e}")))
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, StorageError> {
    let config: String = get_column(row, "config")?;
    let created_at: String = get_column(row, "created_at")?;
    let updated_at: String = get_column(row, "updated_at")?;

    Ok(Agent {
        id: get_column(row, "id")?,
        name: get_column(row, "name")?,
        description: get_column(row, "description")?,
        provider: get_column(row, "provider")?,
        model: get_column(row, "model")?,
        system_prompt: get_column(row, "system_prompt")?,
        temperature: get_column::<f64>(row, "temperature")? as f32,
        max_tokens: get_column::<i64>(row, "max_tokens")? as u32,
        config: parse_json_map(&config),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let context_config: String = get_column(row, "context_config")?;
    let created_at: String = get_column(row, "created_at")?;
    let updated_at: String = get_column(row, "updated_at")?;

    Ok(Session {
        id: get_column(row, "id")?,
        agent_id: get_column(row, "agent_id")?,
        title: get_column(row, "title")?,
        context_strategy: get_column(row, "context_strategy")?,
        context_config: parse_json_map(&context_config),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
    let role_raw: String = get_column(row, "role")?;
    let role: Role = role_raw
        .parse()
        .map_err(|e: String| StorageError::Database(e))?;
    let metadata: String = get_column(row, "metadata")?;
    let created_at: String = get_column(row, "created_at")?;

    Ok(Message {
        id: get_column(row, "id")?,
        session_id: get_column(row, "session_id")?,
        role,
        content: get_column(row, "content")?,
        metadata: parse_json_map(&metadata),
        created_at: parse_timestamp(&created_at),
    })
}

fn count_from(row: &sqlx::sqlite::SqliteRow) -> Result<i64, StorageError> {
    get_column(row, "cnt")
}

// ── AgentStore ────────────────────────────────────────────────────────────

#[async_trait]
impl AgentStore for SqliteStorage {
    async fn create(&self, agent: &Agent) -> Result<(), StorageError> {
        let config = serde_json::to_string(&agent.config)?;
        sqlx::query(
            r#"
            INSERT INTO agents
                (id, name, description, provider, model, system_prompt,
                 temperature, max_tokens, config, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.provider)
        .bind(&agent.model)
        .bind(&agent.system_prompt)
        .bind(agent.temperature as f64)
        .bind(agent.max_tokens as i64)
        .bind(&config)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("INSERT agent: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("SELECT agent: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(row_to_agent(r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, agent: &Agent) -> Result<(), StorageError> {
        let config = serde_json::to_string(&agent.config)?;
        let result = sqlx::query(
            r#"
            UPDATE agents SET
                name = ?2, description = ?3, provider = ?4, model = ?5,
                system_prompt = ?6, temperature = ?7, max_tokens = ?8,
                config = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.provider)
        .bind(&agent.model)
        .bind(&agent.system_prompt)
        .bind(agent.temperature as f64)
        .bind(agent.max_tokens as i64)
        .bind(&config)
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("UPDATE agent: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("agent {}", agent.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("DELETE agent: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Agent>, i64), StorageError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("LIST agents: {e}")))?;

        let agents: Result<Vec<Agent>, StorageError> = rows.iter().map(row_to_agent).collect();

        let count_row = sqlx::query("SELECT COUNT(*) AS cnt FROM agents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("COUNT agents: {e}")))?;

        Ok((agents?, count_from(&count_row)?))
    }
}

// ── SessionStore ──────────────────────────────────────────────────────────

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn create(&self, session: &Session) -> Result<(), StorageError> {
        let config = serde_json::to_string(&session.context_config)?;
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, agent_id, title, context_strategy, context_config, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.agent_id)
        .bind(&session.title)
        .bind(&session.context_strategy)
        .bind(&config)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("INSERT session: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("SELECT session: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, session: &Session) -> Result<(), StorageError> {
        let config = serde_json::to_string(&session.context_config)?;
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                title = ?2, context_strategy = ?3, context_config = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(&session.context_strategy)
        .bind(&config)
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("UPDATE session: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("DELETE session: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Session>, i64), StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE agent_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("LIST sessions: {e}")))?;

        let sessions: Result<Vec<Session>, StorageError> = rows.iter().map(row_to_session).collect();

        let count_row = sqlx::query("SELECT COUNT(*) AS cnt FROM sessions WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("COUNT sessions: {e}")))?;

        Ok((sessions?, count_from(&count_row)?))
    }
}

// ── MessageStore ──────────────────────────────────────────────────────────

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn append(&self, message: &Message) -> Result<(), StorageError> {
        let metadata = serde_json::to_string(&message.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, session_id, role, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&metadata)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("INSERT message: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, StorageError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("SELECT message: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(row_to_message(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_session(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY iid ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("LIST messages: {e}")))?;

        let messages: Result<Vec<Message>, StorageError> = rows.iter().map(row_to_message).collect();

        let count_row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("COUNT messages: {e}")))?;

        Ok((messages?, count_from(&count_row)?))
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("DELETE messages: {e}")))?;
        Ok(result.rows_affected())
    }
}
