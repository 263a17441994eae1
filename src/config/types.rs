// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`AppConfig`] is the on-disk shape (JSON or YAML, camelCase, every field
//! optional). [`ResolvedConfig`] is the merged result with every value set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of participant turns per task.
pub const DEFAULT_MAX_ROUNDS: usize = 20;

/// Default number of files listed in a project snapshot.
pub const DEFAULT_SNAPSHOT_MAX_FILES: usize = 50;

pub use crate::workspace::snapshot::DEFAULT_PREVIEW_CHARS;

/// Default HTTP bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Configuration file model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Directory holding one `project_{id}` root per project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<String>,

    /// SQLite database file for sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Provider to use (openai, ollama, openai-compatible)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Custom base URL for the provider API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum participant turns per task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,

    /// Page size for reconnection queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_ms: Option<u64>,

    /// Additional shell patterns refused by `run_terminal_cmd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_commands: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<WebSearchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Keyword lists for choosing the first speaker of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Requests mentioning one of these go straight to the Coder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_keywords: Option<Vec<String>>,

    /// Requests mentioning one of these always start with the Planner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_keywords: Option<Vec<String>>,
}

/// Project snapshot sent with the first message of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

/// Resolved routing keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRouting {
    pub direct_keywords: Vec<String>,
    pub plan_keywords: Vec<String>,
}

impl Default for ResolvedRouting {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            direct_keywords: words(&[
                "fix", "typo", "rename", "console.log", "console log", "tweak", "color", "colour",
                "font", "padding", "margin",
            ]),
            plan_keywords: words(&[
                "design", "build", "architecture", "refactor", "implement", "page", "feature",
                "application", "from scratch",
            ]),
        }
    }
}

/// Resolved configuration with all values set.
/// This is the merged result of global, local, and CLI configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub projects_dir: PathBuf,
    pub database_path: PathBuf,
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_rounds: usize,
    pub page_limit: usize,
    pub command_timeout_ms: u64,
    pub blocked_commands: Vec<String>,
    pub routing: ResolvedRouting,
    pub snapshot_max_files: usize,
    pub snapshot_preview_chars: usize,
    pub web_search_endpoint: String,
    pub web_search_max_results: usize,
    pub bind: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            projects_dir: PathBuf::from("projects"),
            database_path: PathBuf::from("codeweave.db"),
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: Some(0.7),
            max_rounds: DEFAULT_MAX_ROUNDS,
            page_limit: crate::session::DEFAULT_PAGE_LIMIT,
            command_timeout_ms: crate::tools::DEFAULT_TIMEOUT_MS,
            blocked_commands: Vec::new(),
            routing: ResolvedRouting::default(),
            snapshot_max_files: DEFAULT_SNAPSHOT_MAX_FILES,
            snapshot_preview_chars: DEFAULT_PREVIEW_CHARS,
            web_search_endpoint: crate::tools::DEFAULT_WEB_SEARCH_ENDPOINT.to_string(),
            web_search_max_results: 5,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}
