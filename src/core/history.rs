//! Bounded per-(user, chat) conversation history.
//!
//! Backed by SQLite. Each key keeps at most `max_history` turns: when full,
//! the single oldest turn is evicted before the new one is inserted, and the
//! whole check-evict-insert runs in one transaction.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ChatMessage, ROLE_ASSISTANT, ROLE_USER};
use crate::utils::text::truncate_chars;

/// Longest stored turn, in characters.
pub const MAX_TURN_CHARS: usize = 2000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS llm (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id   INTEGER NOT NULL,
        chat_id   INTEGER NOT NULL,
        role      TEXT    NOT NULL,
        content   TEXT    NOT NULL,
        timestamp TEXT    NOT NULL
    );

    CREATE INDEX IF NOT EXISTS llm_history_user_chat_idx ON llm (user_id, chat_id);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create history directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("history store lock poisoned")]
    Poisoned,
    #[error("unknown role '{0}' in history")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => ROLE_USER,
            TurnRole::Assistant => ROLE_ASSISTANT,
        }
    }

    fn parse(role: &str) -> Result<Self, StoreError> {
        match role {
            ROLE_USER => Ok(TurnRole::User),
            ROLE_ASSISTANT => Ok(TurnRole::Assistant),
            other => Err(StoreError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        match turn.role {
            TurnRole::User => ChatMessage::user(turn.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

pub struct ConversationStore {
    conn: Mutex<Connection>,
    max_history: usize,
}

impl ConversationStore {
    /// Opens (or creates) the database at `path`. A `max_history` of zero is
    /// raised to one.
    pub fn open(path: &Path, max_history: usize) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), max_history, "Opened conversation history");
        Self::with_connection(conn, max_history)
    }

    pub fn open_in_memory(max_history: usize) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, max_history)
    }

    fn with_connection(conn: Connection, max_history: usize) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_history: max_history.max(1),
        })
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Appends a turn, truncated to [`MAX_TURN_CHARS`], evicting the oldest
    /// turn of the key when it is already full.
    pub fn save(
        &self,
        user_id: i64,
        chat_id: i64,
        role: TurnRole,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        self.insert_turn(&tx, user_id, chat_id, role, content)?;
        tx.commit()?;
        Ok(())
    }

    /// Saves a user turn and the assistant's answer together; either both
    /// are stored or neither is.
    pub fn save_exchange(
        &self,
        user_id: i64,
        chat_id: i64,
        query: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        self.insert_turn(&tx, user_id, chat_id, TurnRole::User, query)?;
        self.insert_turn(&tx, user_id, chat_id, TurnRole::Assistant, answer)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_turn(
        &self,
        tx: &Transaction<'_>,
        user_id: i64,
        chat_id: i64,
        role: TurnRole,
        content: &str,
    ) -> Result<(), StoreError> {
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM llm WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id],
            |row| row.get(0),
        )?;

        if count >= self.max_history as i64 {
            let evicted: Option<i64> = tx
                .query_row(
                    "SELECT id FROM llm WHERE user_id = ?1 AND chat_id = ?2 ORDER BY id ASC LIMIT 1",
                    params![user_id, chat_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = evicted {
                tx.execute("DELETE FROM llm WHERE id = ?1", params![id])?;
                debug!(user_id, chat_id, evicted = id, "Evicted oldest history turn");
            }
        }

        let content = truncate_chars(content, MAX_TURN_CHARS);
        tx.execute(
            "INSERT INTO llm (user_id, chat_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                chat_id,
                role.as_str(),
                content,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Turns for the key, oldest first.
    pub fn get_history(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, role, content, timestamp FROM llm
             WHERE user_id = ?1 AND chat_id = ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id, chat_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (id, role, content, timestamp) = row?;
            turns.push(ConversationTurn {
                id,
                user_id,
                chat_id,
                role: TurnRole::parse(&role)?,
                content,
                created_at: DateTime::parse_from_rfc3339(&timestamp)
                    .map(|stamp| stamp.with_timezone(&Utc))
                    .unwrap_or_default(),
            });
        }
        Ok(turns)
    }

    /// History as chat messages, ready to follow a system message.
    pub fn history_messages(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .get_history(user_id, chat_id)?
            .iter()
            .map(ChatMessage::from)
            .collect())
    }

    pub fn clear(&self, user_id: i64, chat_id: i64) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM llm WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id],
        )?;
        debug!(user_id, chat_id, removed, "Cleared history");
        Ok(removed)
    }

    pub fn count(&self, user_id: i64, chat_id: i64) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM llm WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
