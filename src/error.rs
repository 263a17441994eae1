// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for codeweave.
//!
//! Each layer gets its own `thiserror` enum. Tool errors never escape a task:
//! they are turned into a structured outcome with a stable [`ToolError::reason`]
//! code. Task errors are the only ones a remote observer ever sees.

use thiserror::Error;

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Replay script exhausted after {0} responses")]
    ScriptExhausted(usize),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }
}

/// Errors that can occur during tool validation and execution.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Path escapes workspace root: {0}")]
    PathEscape(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Command blocked: {0}")]
    BlockedCommand(String),

    #[error("Version control error: {0}")]
    VcsError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ToolError {
    /// Stable machine-readable reason code reported alongside the error text.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::SchemaViolation(_) => "schema_violation",
            Self::PathEscape(_) => "path_escape",
            Self::FileNotFound(_) => "file_not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::IoError(_) => "io_error",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::Timeout(_) => "timeout",
            Self::BlockedCommand(_) => "blocked_command",
            Self::VcsError(_) => "vcs_error",
            Self::NetworkError(_) => "network_error",
        }
    }

    /// True for errors raised before the tool touched anything.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InvalidArguments(_)
                | Self::SchemaViolation(_)
                | Self::PathEscape(_)
                | Self::BlockedCommand(_)
        )
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors raised while resolving or leasing a project workspace.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Project not found: {0}")]
    ProjectNotFound(i64),

    #[error("Workspace root is not a directory: {0}")]
    NotADirectory(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for WorkspaceError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur during session storage operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored data corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

/// Task-level failures. These end a task and surface as an `error` event.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Model request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage failure: {0}")]
    Session(#[from] SessionError),

    #[error("Workspace unavailable: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Malformed agent output: {0}")]
    MalformedOutput(String),

    #[error("Task aborted: {0}")]
    Internal(String),
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ProviderError::NetworkError("timeout".to_string()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(!ProviderError::AuthError("invalid key".to_string()).is_retryable());
        assert!(!ProviderError::ScriptExhausted(3).is_retryable());
    }

    #[test]
    fn test_provider_error_api() {
        let err = ProviderError::api("Bad request", 400);
        match err {
            ProviderError::ApiError { message, status_code } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_tool_error_reasons_are_stable() {
        assert_eq!(ToolError::PathEscape("../x".into()).reason(), "path_escape");
        assert_eq!(ToolError::SchemaViolation("x".into()).reason(), "schema_violation");
        assert_eq!(ToolError::BlockedCommand("vite".into()).reason(), "blocked_command");
        assert_eq!(ToolError::VcsError("conflict".into()).reason(), "vcs_error");
        assert_eq!(ToolError::Timeout(10).reason(), "timeout");
    }

    #[test]
    fn test_tool_error_validation_split() {
        assert!(ToolError::PathEscape("/etc".into()).is_validation());
        assert!(ToolError::InvalidArguments("x".into()).is_validation());
        assert!(!ToolError::IoError("disk".into()).is_validation());
        assert!(!ToolError::ExecutionFailed("exit 1".into()).is_validation());
    }

    #[test]
    fn test_tool_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let tool_err: ToolError = io_err.into();
        assert!(matches!(tool_err, ToolError::FileNotFound(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_task_error_from_provider() {
        let task_err: TaskError = ProviderError::AuthError("invalid".to_string()).into();
        assert!(matches!(task_err, TaskError::Provider(_)));
        assert!(task_err.to_string().contains("invalid"));
    }
}
