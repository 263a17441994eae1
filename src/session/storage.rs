// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-based session storage.

use std::path::{Path, PathBuf};
#[cfg(feature = "telemetry")]
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::SessionError;
use crate::recorder::AgentInteraction;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::types::{
    derive_title, MessageId, MessagePage, MessageRole, NewMessage, Session, SessionId,
    SessionWithMessages, StoredMessage, DEFAULT_TITLE,
};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

const SESSION_COLUMNS: &str = "id, project_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, agent_name, interactions, created_at";

/// Session storage using SQLite.
pub struct SessionStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SessionStorage {
    /// Open or create a session database at `db_path`.
    pub fn open_at(db_path: &Path) -> Result<Self, SessionError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;

        // WAL lets readers proceed while a task appends
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let storage = Self::with_connection(conn, Some(db_path.to_path_buf()))?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.storage.open", start.elapsed());

        Ok(storage)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SessionError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, SessionError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn, path };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Database file location, if on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<(), SessionError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT 'New Chat',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                agent_name TEXT,
                interactions TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id, updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);
            "#,
        )?;

        let current_version: Option<u32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .optional()?;

        match current_version {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(v) if v > SCHEMA_VERSION => {
                return Err(SessionError::Corrupted(format!(
                    "database schema version {v} is newer than supported version {SCHEMA_VERSION}"
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Create a new session.
    pub fn create_session(&self, project_id: i64, title: Option<&str>) -> Result<Session, SessionError> {
        let now = now_micros();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        self.conn.execute(
            "INSERT INTO sessions (project_id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![project_id, title, now, now],
        )?;

        let id = self.conn.last_insert_rowid();
        Ok(Session {
            id,
            project_id,
            title: title.to_string(),
            created_at: from_micros(now)?,
            updated_at: from_micros(now)?,
        })
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: SessionId) -> Result<Option<Session>, SessionError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let raw = self
            .conn
            .query_row(&sql, params![id], RawSession::from_row)
            .optional()?;
        raw.map(RawSession::into_session).transpose()
    }

    /// Sessions of a project, most recently updated first.
    pub fn list_sessions(&self, project_id: i64) -> Result<Vec<Session>, SessionError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_id = ? ORDER BY updated_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id], RawSession::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawSession::into_session).collect()
    }

    /// Delete a session and its messages.
    pub fn delete_session(&self, id: SessionId) -> Result<bool, SessionError> {
        // Messages go with it via ON DELETE CASCADE
        let rows = self.conn.execute("DELETE FROM sessions WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Append a message. The first user message of an untitled session
    /// also sets its title.
    pub fn append(&mut self, session_id: SessionId, message: &NewMessage) -> Result<StoredMessage, SessionError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let interactions = serde_json::to_string(&message.interactions)?;
        let now = now_micros();

        let tx = self.conn.transaction()?;

        let title: Option<String> = tx
            .query_row("SELECT title FROM sessions WHERE id = ?", params![session_id], |row| row.get(0))
            .optional()?;
        let Some(title) = title else {
            return Err(SessionError::NotFound(session_id));
        };

        if message.role == MessageRole::User && title == DEFAULT_TITLE {
            let has_user_message: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE session_id = ? AND role = 'user')",
                params![session_id],
                |row| row.get(0),
            )?;
            if !has_user_message {
                tx.execute(
                    "UPDATE sessions SET title = ? WHERE id = ?",
                    params![derive_title(&message.content), session_id],
                )?;
            }
        }

        tx.execute(
            "INSERT INTO messages (session_id, role, content, agent_name, interactions, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                session_id,
                message.role.as_str(),
                message.content,
                message.agent_name,
                interactions,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE sessions SET updated_at = ? WHERE id = ?",
            params![now, session_id],
        )?;
        tx.commit()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.storage.append", start.elapsed());

        Ok(StoredMessage {
            id,
            session_id,
            role: message.role,
            content: message.content.clone(),
            agent_name: message.agent_name.clone(),
            interactions: message.interactions.clone(),
            created_at: from_micros(now)?,
        })
    }

    /// All messages of a session in id order.
    pub fn messages(&self, session_id: SessionId) -> Result<Vec<StoredMessage>, SessionError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id], RawMessage::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawMessage::into_message).collect()
    }

    /// A session with its full history.
    pub fn get(&self, session_id: SessionId) -> Result<Option<SessionWithMessages>, SessionError> {
        let Some(session) = self.get_session(session_id)? else {
            return Ok(None);
        };
        let messages = self.messages(session_id)?;
        Ok(Some(SessionWithMessages { session, messages }))
    }

    /// Messages with id greater than `after`, at most `limit` of them.
    pub fn get_since(
        &self,
        session_id: SessionId,
        after: MessageId,
        limit: usize,
    ) -> Result<MessagePage, SessionError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if self.get_session(session_id)?.is_none() {
            return Err(SessionError::NotFound(session_id));
        }

        let limit = limit.max(1);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? AND id > ? ORDER BY id LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        // One extra row tells us whether another page exists
        let rows = stmt
            .query_map(params![session_id, after, (limit + 1) as i64], RawMessage::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = rows.len() > limit;
        let messages = rows
            .into_iter()
            .take(limit)
            .map(RawMessage::into_message)
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.storage.get_since", start.elapsed());

        Ok(MessagePage { messages, has_more })
    }
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, SessionError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| SessionError::Corrupted(format!("invalid timestamp {micros}")))
}

struct RawSession {
    id: i64,
    project_id: i64,
    title: String,
    created_at: i64,
    updated_at: i64,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_session(self) -> Result<Session, SessionError> {
        Ok(Session {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

struct RawMessage {
    id: i64,
    session_id: i64,
    role: String,
    content: String,
    agent_name: Option<String>,
    interactions: String,
    created_at: i64,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            agent_name: row.get(4)?,
            interactions: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_message(self) -> Result<StoredMessage, SessionError> {
        let role = MessageRole::parse(&self.role)
            .ok_or_else(|| SessionError::Corrupted(format!("unknown message role '{}'", self.role)))?;
        let interactions: Vec<AgentInteraction> = serde_json::from_str(&self.interactions)?;

        Ok(StoredMessage {
            id: self.id,
            session_id: self.session_id,
            role,
            content: self.content,
            agent_name: self.agent_name,
            interactions,
            created_at: from_micros(self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::InteractionKind;
    use tempfile::tempdir;

    fn thought(text: &str) -> AgentInteraction {
        AgentInteraction {
            agent_name: "Coder".to_string(),
            kind: InteractionKind::Thought,
            content: text.to_string(),
            tool_name: None,
            tool_arguments: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_open_on_disk_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/sessions.db");
        let storage = SessionStorage::open_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(storage.path(), Some(path.as_path()));

        // Reopening keeps the data
        let session = storage.create_session(3, None).unwrap();
        drop(storage);
        let storage = SessionStorage::open_at(&path).unwrap();
        assert_eq!(storage.get_session(session.id).unwrap().unwrap().project_id, 3);
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let session = storage.create_session(1, None).unwrap();
        assert_eq!(session.title, DEFAULT_TITLE);

        storage.append(session.id, &NewMessage::user("Build a settings page")).unwrap();
        storage.append(session.id, &NewMessage::user("Also add a footer")).unwrap();

        let session = storage.get_session(session.id).unwrap().unwrap();
        assert_eq!(session.title, "Build a settings page");
    }

    #[test]
    fn test_explicit_title_is_kept() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let session = storage.create_session(1, Some("Landing page")).unwrap();
        storage.append(session.id, &NewMessage::user("hello")).unwrap();
        assert_eq!(storage.get_session(session.id).unwrap().unwrap().title, "Landing page");
    }

    #[test]
    fn test_message_ids_strictly_increase() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let a = storage.create_session(1, None).unwrap();
        let b = storage.create_session(1, None).unwrap();

        let mut last = 0;
        for i in 0..10 {
            let session = if i % 2 == 0 { a.id } else { b.id };
            let msg = storage.append(session, &NewMessage::user(format!("m{i}"))).unwrap();
            assert!(msg.id > last);
            last = msg.id;
        }
    }

    #[test]
    fn test_get_since_pages() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let session = storage.create_session(1, None).unwrap();

        let ids: Vec<i64> = (0..5)
            .map(|i| {
                storage
                    .append(session.id, &NewMessage::assistant("Coder", format!("turn {i}"), vec![thought("x")]))
                    .unwrap()
                    .id
            })
            .collect();

        let page = storage.get_since(session.id, ids[1], 2).unwrap();
        assert_eq!(page.messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[3]]);
        assert!(page.has_more);
        assert_eq!(page.messages[0].interactions.len(), 1);
        assert_eq!(page.messages[0].agent_name.as_deref(), Some("Coder"));

        let page = storage.get_since(session.id, ids[3], 2).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.has_more);

        let page = storage.get_since(session.id, ids[4], 10).unwrap();
        assert!(page.messages.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_get_since_missing_session() {
        let storage = SessionStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.get_since(99, 0, 10),
            Err(SessionError::NotFound(99))
        ));
    }

    #[test]
    fn test_append_to_missing_session() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.append(42, &NewMessage::user("hi")),
            Err(SessionError::NotFound(42))
        ));
    }

    #[test]
    fn test_delete_cascades() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let session = storage.create_session(1, None).unwrap();
        storage.append(session.id, &NewMessage::user("hi")).unwrap();

        assert!(storage.delete_session(session.id).unwrap());
        assert!(!storage.delete_session(session.id).unwrap());
        assert!(storage.messages(session.id).unwrap().is_empty());
        assert!(storage.get(session.id).unwrap().is_none());
    }

    #[test]
    fn test_list_sessions_scoped_to_project() {
        let mut storage = SessionStorage::open_in_memory().unwrap();
        let first = storage.create_session(1, None).unwrap();
        let second = storage.create_session(1, None).unwrap();
        storage.create_session(2, None).unwrap();

        // Touch the older session so it sorts first
        std::thread::sleep(std::time::Duration::from_millis(2));
        storage.append(first.id, &NewMessage::user("bump")).unwrap();

        let listed = storage.list_sessions(1).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }
}
