// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session types for conversation persistence and reconnection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recorder::AgentInteraction;

/// Session identifier.
pub type SessionId = i64;

/// Message identifier, strictly increasing across the store.
pub type MessageId = i64;

/// Title given to a session before its first user message.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum title length derived from the first user message.
pub const TITLE_MAX_CHARS: usize = 50;

/// Default page size for `get_since`.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One continuing conversation scoped to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A message as written to the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub interactions: Vec<AgentInteraction>,
    pub created_at: DateTime<Utc>,
}

/// A message waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub agent_name: Option<String>,
    pub interactions: Vec<AgentInteraction>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            agent_name: None,
            interactions: Vec::new(),
        }
    }

    pub fn assistant(
        agent_name: impl Into<String>,
        content: impl Into<String>,
        interactions: Vec<AgentInteraction>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            agent_name: Some(agent_name.into()),
            interactions,
        }
    }
}

/// A session with its full message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWithMessages {
    #[serde(flatten)]
    pub session: Session,
    pub messages: Vec<StoredMessage>,
}

/// One page of messages after a given id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<StoredMessage>,
    pub has_more: bool,
}

/// Derive a session title from the first user message.
pub fn derive_title(first_message: &str) -> String {
    let line = first_message.trim();
    if line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
    if line.chars().count() > TITLE_MAX_CHARS {
        title = title.trim_end().to_string();
        title.push_str("...");
    }
    title
}
