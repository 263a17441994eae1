// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool catalog for the Coder agent.
//!
//! # Architecture
//!
//! - [`ToolKind`] - closed set of every tool the catalog knows
//! - [`ToolHandler`] trait - one implementation per kind
//! - [`ToolRegistry`] - validates arguments against each tool's JSON schema
//!   and dispatches to the handler, always producing a [`ToolOutcome`]
//! - [`ToolContext`] - the [`WorkspaceHandle`] and settings every call runs with
//!
//! # Example
//!
//! ```rust,ignore
//! use codeweave::tools::{ToolContext, ToolRegistry};
//!
//! let registry = ToolRegistry::new();
//! let result = registry
//!     .dispatch(&ctx, "read_file", json!({"path": "src/App.js"}))
//!     .await;
//! assert!(result.outcome.success);
//! ```

pub mod handlers;
pub mod registry;

pub use registry::{DispatchResult, ToolHandler, ToolKind, ToolOutcome, ToolRegistry};

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolError;
use crate::workspace::WorkspaceHandle;

/// Parse JSON arguments into a typed struct.
pub fn parse_arguments<T>(arguments: &serde_json::Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolError::InvalidArguments(format!("Failed to parse arguments: {err}")))
}

/// Default limit for file reading operations.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Maximum line length before truncation.
pub const MAX_LINE_LENGTH: usize = 2000;

/// Default timeout for command execution in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Maximum timeout for command execution in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 600_000; // 10 minutes

/// Default web search endpoint (DuckDuckGo instant answers).
pub const DEFAULT_WEB_SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Truncate text to a maximum byte length, respecting UTF-8 boundaries.
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    if end == 0 {
        return String::new();
    }

    format!("{}... [truncated]", &text[..end])
}

/// Truncate output by lines, keeping first and last portions.
pub fn truncate_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let total = lines.len();

    if total <= max_lines {
        return output.to_string();
    }

    let keep = max_lines / 2;
    let first_part: Vec<&str> = lines.iter().take(keep).copied().collect();
    let last_part: Vec<&str> = lines.iter().skip(total - keep).copied().collect();
    let omitted = total - keep * 2;

    format!(
        "{}\n\n... [{omitted} lines omitted] ...\n\n{}",
        first_part.join("\n"),
        last_part.join("\n")
    )
}

/// Web lookup settings.
#[derive(Debug, Clone)]
pub struct WebSearchSettings {
    pub endpoint: String,
    pub max_results: usize,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WEB_SEARCH_ENDPOINT.to_string(),
            max_results: 5,
        }
    }
}

/// Process-wide tool settings, shared by every task.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub command_timeout: Duration,
    /// Extra shell patterns refused by `run_terminal_cmd`.
    pub blocked_commands: Vec<String>,
    pub web_search: WebSearchSettings,
    pub http: reqwest::Client,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            blocked_commands: Vec::new(),
            web_search: WebSearchSettings::default(),
            http: default_http_client(),
        }
    }
}

impl From<&crate::config::ResolvedConfig> for ToolSettings {
    fn from(config: &crate::config::ResolvedConfig) -> Self {
        Self {
            command_timeout: Duration::from_millis(config.command_timeout_ms.clamp(1, MAX_TIMEOUT_MS)),
            blocked_commands: config.blocked_commands.clone(),
            web_search: WebSearchSettings {
                endpoint: config.web_search_endpoint.clone(),
                max_results: config.web_search_max_results.max(1),
            },
            http: default_http_client(),
        }
    }
}

/// HTTP client used by `web_search`.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(concat!("codeweave/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Everything a tool call runs against.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: WorkspaceHandle,
    pub settings: Arc<ToolSettings>,
}

impl ToolContext {
    pub fn new(workspace: WorkspaceHandle, settings: Arc<ToolSettings>) -> Self {
        Self { workspace, settings }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_short() {
        let text = "Hello, world!";
        assert_eq!(truncate_text(text, 100), text);
    }

    #[test]
    fn test_truncate_text_utf8() {
        let text = "こんにちは"; // 5 characters, 15 bytes
        let truncated = truncate_text(text, 6);
        assert!(truncated.starts_with("こん"));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_truncate_output_long() {
        let lines: Vec<String> = (1..=20).map(|i| format!("line{i}")).collect();
        let output = lines.join("\n");
        let truncated = truncate_output(&output, 6);
        assert!(truncated.contains("line1\n"));
        assert!(truncated.contains("line20"));
        assert!(truncated.contains("[14 lines omitted]"));
    }

    #[test]
    fn test_parse_arguments_invalid() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct TestArgs {
            required_field: String,
        }

        let value = serde_json::json!({"wrong_field": "value"});
        let err = parse_arguments::<TestArgs>(&value).unwrap_err();
        assert_eq!(err.reason(), "invalid_arguments");
    }
}
