// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable sessions and messages, with reconnection support.
//!
//! - **Types**: [`Session`], [`StoredMessage`], [`NewMessage`], [`MessagePage`]
//! - **Storage**: SQLite persistence ([`SessionStorage`])
//! - **Service**: async, cloneable facade ([`SessionStore`])
//!
//! # Example
//!
//! ```rust,ignore
//! use codeweave::session::{NewMessage, SessionStore};
//!
//! let store = SessionStore::open(Path::new("codeweave.db"))?;
//! let session = store.create_session(1, None).await?;
//! let seen = store.append(session.id, NewMessage::user("Add a footer")).await?;
//!
//! // After a reconnect, fetch only what the client has not seen
//! let page = store.get_since(session.id, seen.id, None).await?;
//! ```

pub mod service;
pub mod storage;
pub mod types;

pub use service::SessionStore;
pub use storage::{SessionStorage, SCHEMA_VERSION};
pub use types::{
    derive_title, MessageId, MessagePage, MessageRole, NewMessage, Session, SessionId,
    SessionWithMessages, StoredMessage, DEFAULT_PAGE_LIMIT, DEFAULT_TITLE,
};
