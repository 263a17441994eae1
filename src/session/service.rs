// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Async session store shared by the HTTP server and running tasks.

use std::path::Path;
use std::sync::Arc;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use tokio::sync::Mutex;

use crate::error::SessionError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::storage::SessionStorage;
use super::types::{
    MessageId, MessagePage, NewMessage, Session, SessionId, SessionWithMessages, StoredMessage,
    DEFAULT_PAGE_LIMIT,
};

/// Cloneable handle over one [`SessionStorage`]. Every operation takes the
/// storage lock, so appends are serialized.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<Mutex<SessionStorage>>,
    page_limit: usize,
}

impl SessionStore {
    /// Open the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, SessionError> {
        Ok(Self::with_storage(SessionStorage::open_at(db_path)?))
    }

    /// A store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self, SessionError> {
        Ok(Self::with_storage(SessionStorage::open_in_memory()?))
    }

    pub fn with_storage(storage: SessionStorage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Default page size for [`get_since`](Self::get_since).
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub async fn create_session(&self, project_id: i64, title: Option<&str>) -> Result<Session, SessionError> {
        let storage = self.storage.lock().await;
        storage.create_session(project_id, title)
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Option<Session>, SessionError> {
        let storage = self.storage.lock().await;
        storage.get_session(id)
    }

    /// The session, provided it belongs to `project_id`.
    pub async fn session_for_project(&self, id: SessionId, project_id: i64) -> Result<Session, SessionError> {
        match self.get_session(id).await? {
            Some(session) if session.project_id == project_id => Ok(session),
            _ => Err(SessionError::NotFound(id)),
        }
    }

    pub async fn list_sessions(&self, project_id: i64) -> Result<Vec<Session>, SessionError> {
        let storage = self.storage.lock().await;
        storage.list_sessions(project_id)
    }

    pub async fn delete_session(&self, id: SessionId) -> Result<bool, SessionError> {
        let storage = self.storage.lock().await;
        storage.delete_session(id)
    }

    /// Append one message; the only mutation of a session's history.
    pub async fn append(&self, session_id: SessionId, message: NewMessage) -> Result<StoredMessage, SessionError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let mut storage = self.storage.lock().await;
        let stored = storage.append(session_id, &message)?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.append", start.elapsed());

        Ok(stored)
    }

    pub async fn get(&self, session_id: SessionId) -> Result<Option<SessionWithMessages>, SessionError> {
        let storage = self.storage.lock().await;
        storage.get(session_id)
    }

    /// Messages after `after`, at most `limit` (or the store's page limit).
    pub async fn get_since(
        &self,
        session_id: SessionId,
        after: MessageId,
        limit: Option<usize>,
    ) -> Result<MessagePage, SessionError> {
        let limit = limit.unwrap_or(self.page_limit).min(self.page_limit.max(1));
        let storage = self.storage.lock().await;
        storage.get_since(session_id, after, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_appends_keep_ids_unique() {
        let store = SessionStore::in_memory().unwrap();
        let session_id = store.create_session(1, None).await.unwrap().id;

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(session_id, NewMessage::user(format!("m{i}"))).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);

        let history = store.get(session_id).await.unwrap().unwrap();
        assert_eq!(history.messages.len(), 20);
    }

    #[tokio::test]
    async fn test_get_since_caps_limit() {
        let store = SessionStore::in_memory().unwrap().with_page_limit(3);
        let session = store.create_session(1, None).await.unwrap();
        for i in 0..5 {
            store.append(session.id, NewMessage::user(format!("m{i}"))).await.unwrap();
        }

        let page = store.get_since(session.id, 0, Some(50)).await.unwrap();
        assert_eq!(page.messages.len(), 3);
        assert!(page.has_more);

        let page = store.get_since(session.id, 0, Some(10)).await.unwrap();
        assert_eq!(page.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_session_for_project_checks_owner() {
        let store = SessionStore::in_memory().unwrap();
        let session = store.create_session(7, None).await.unwrap();

        assert!(store.session_for_project(session.id, 7).await.is_ok());
        assert!(matches!(
            store.session_for_project(session.id, 8).await,
            Err(SessionError::NotFound(_))
        ));
    }
}
