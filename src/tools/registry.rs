// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool registry and handler trait.
//!
//! This module defines the core abstractions for the tool system:
//! - [`ToolKind`], the closed set of tools
//! - [`ToolHandler`] trait that every kind implements
//! - [`ToolRegistry`] for validating and dispatching tool calls
//! - [`ToolOutcome`], the `{success, data | error, reason}` result shape

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use tracing::{debug, info_span, warn, Instrument};

use super::handlers::{
    CsvReadHandler, CsvWriteHandler, DeleteFileHandler, EditFileHandler, FileSearchHandler,
    GitHandler, GitOp, GlobSearchHandler, GrepSearchHandler, JsonReadHandler,
    JsonValidateHandler, JsonWriteHandler, ListDirHandler, ReadFileHandler, TerminalHandler,
    WebSearchHandler, WriteFileHandler,
};
use super::ToolContext;
use crate::error::ToolError;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
use crate::types::ToolDefinition;

/// Trait that all tool handlers implement.
///
/// Handlers return structured JSON on success. Every failure is a
/// [`ToolError`]; the registry turns it into a failed [`ToolOutcome`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool against the given workspace.
    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Every tool in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    EditFile,
    DeleteFile,
    ListDir,
    GlobSearch,
    GrepSearch,
    FileSearch,
    ReadJson,
    WriteJson,
    ValidateJson,
    ReadCsv,
    WriteCsv,
    GitStatus,
    GitAdd,
    GitCommit,
    GitDiff,
    GitLog,
    GitBranch,
    RunTerminalCmd,
    WebSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 21] = [
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::EditFile,
        ToolKind::DeleteFile,
        ToolKind::ListDir,
        ToolKind::GlobSearch,
        ToolKind::GrepSearch,
        ToolKind::FileSearch,
        ToolKind::ReadJson,
        ToolKind::WriteJson,
        ToolKind::ValidateJson,
        ToolKind::ReadCsv,
        ToolKind::WriteCsv,
        ToolKind::GitStatus,
        ToolKind::GitAdd,
        ToolKind::GitCommit,
        ToolKind::GitDiff,
        ToolKind::GitLog,
        ToolKind::GitBranch,
        ToolKind::RunTerminalCmd,
        ToolKind::WebSearch,
    ];

    /// Wire name the model uses to call the tool.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::EditFile => "edit_file",
            ToolKind::DeleteFile => "delete_file",
            ToolKind::ListDir => "list_dir",
            ToolKind::GlobSearch => "glob_search",
            ToolKind::GrepSearch => "grep_search",
            ToolKind::FileSearch => "file_search",
            ToolKind::ReadJson => "read_json",
            ToolKind::WriteJson => "write_json",
            ToolKind::ValidateJson => "validate_json",
            ToolKind::ReadCsv => "read_csv",
            ToolKind::WriteCsv => "write_csv",
            ToolKind::GitStatus => "git_status",
            ToolKind::GitAdd => "git_add",
            ToolKind::GitCommit => "git_commit",
            ToolKind::GitDiff => "git_diff",
            ToolKind::GitLog => "git_log",
            ToolKind::GitBranch => "git_branch",
            ToolKind::RunTerminalCmd => "run_terminal_cmd",
            ToolKind::WebSearch => "web_search",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// The handler implementing this kind.
    pub fn handler(self) -> &'static dyn ToolHandler {
        match self {
            ToolKind::ReadFile => &ReadFileHandler,
            ToolKind::WriteFile => &WriteFileHandler,
            ToolKind::EditFile => &EditFileHandler,
            ToolKind::DeleteFile => &DeleteFileHandler,
            ToolKind::ListDir => &ListDirHandler,
            ToolKind::GlobSearch => &GlobSearchHandler,
            ToolKind::GrepSearch => &GrepSearchHandler,
            ToolKind::FileSearch => &FileSearchHandler,
            ToolKind::ReadJson => &JsonReadHandler,
            ToolKind::WriteJson => &JsonWriteHandler,
            ToolKind::ValidateJson => &JsonValidateHandler,
            ToolKind::ReadCsv => &CsvReadHandler,
            ToolKind::WriteCsv => &CsvWriteHandler,
            ToolKind::GitStatus => &GitHandler { op: GitOp::Status },
            ToolKind::GitAdd => &GitHandler { op: GitOp::Add },
            ToolKind::GitCommit => &GitHandler { op: GitOp::Commit },
            ToolKind::GitDiff => &GitHandler { op: GitOp::Diff },
            ToolKind::GitLog => &GitHandler { op: GitOp::Log },
            ToolKind::GitBranch => &GitHandler { op: GitOp::Branch },
            ToolKind::RunTerminalCmd => &TerminalHandler,
            ToolKind::WebSearch => &WebSearchHandler,
        }
    }
}

/// Uniform result of one tool call, as seen by the model and the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolOutcome {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            reason: None,
        }
    }

    pub fn failed(err: &ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            reason: Some(err.reason().to_string()),
        }
    }

    /// Compact JSON text handed back to the model.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"success\":{},\"error\":\"unserializable outcome\"}}", self.success)
        })
    }
}

/// Result of dispatching a tool call.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Name of the tool that was called
    pub tool_name: String,
    pub outcome: ToolOutcome,
    /// Duration of execution
    pub duration: Duration,
}

impl DispatchResult {
    pub fn is_error(&self) -> bool {
        !self.outcome.success
    }
}

struct RegisteredTool {
    kind: ToolKind,
    definition: ToolDefinition,
    validator: Option<jsonschema::Validator>,
}

/// Registry of the tools an agent may call.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Registry holding the full catalog.
    pub fn new() -> Self {
        Self::with_kinds(&ToolKind::ALL)
    }

    /// Registry restricted to a subset of the catalog.
    pub fn with_kinds(kinds: &[ToolKind]) -> Self {
        let tools = kinds
            .iter()
            .map(|&kind| {
                let definition = kind.handler().definition();
                let schema = definition.input_schema.to_value();
                let validator = match jsonschema::validator_for(&schema) {
                    Ok(v) => Some(v),
                    Err(_err) => {
                        #[cfg(feature = "telemetry")]
                        warn!(tool = kind.name(), error = %_err, "Tool schema failed to compile");
                        None
                    }
                };
                RegisteredTool {
                    kind,
                    definition,
                    validator,
                }
            })
            .collect();

        Self { tools }
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Get all tool definitions, in catalog order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Get all tool names.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.kind.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        let kind = ToolKind::from_name(name)?;
        self.tools.iter().find(|t| t.kind == kind)
    }

    /// Validate arguments against the tool's schema.
    pub fn validate(&self, name: &str, input: &serde_json::Value) -> Result<ToolKind, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if let Some(validator) = &tool.validator {
            if !validator.is_valid(input) {
                let messages = validator
                    .iter_errors(input)
                    .map(|err| err.to_string())
                    .collect::<Vec<_>>();
                return Err(ToolError::SchemaViolation(messages.join("; ")));
            }
        }

        Ok(tool.kind)
    }

    /// Dispatch a tool call and return the result. Never fails.
    ///
    /// Unknown names and schema violations are rejected before the handler
    /// runs, so they cannot have side effects.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        tool_name: &str,
        input: serde_json::Value,
    ) -> DispatchResult {
        let start = Instant::now();

        let result = match self.validate(tool_name, &input) {
            Ok(kind) => {
                #[cfg(feature = "telemetry")]
                debug!(tool = %tool_name, "Executing tool");

                #[cfg(feature = "telemetry")]
                let result = kind
                    .handler()
                    .execute(ctx, input)
                    .instrument(info_span!("tool_execute", tool = %tool_name))
                    .await;

                #[cfg(not(feature = "telemetry"))]
                let result = kind.handler().execute(ctx, input).await;

                result
            }
            Err(err) => Err(err),
        };

        let duration = start.elapsed();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tool(tool_name, duration, result.is_ok());

        let outcome = match result {
            Ok(data) => {
                #[cfg(feature = "telemetry")]
                debug!(
                    tool = %tool_name,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    "Tool execution succeeded"
                );
                ToolOutcome::ok(data)
            }
            Err(err) => {
                #[cfg(feature = "telemetry")]
                debug!(
                    tool = %tool_name,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    reason = err.reason(),
                    error = %err,
                    "Tool execution failed"
                );
                ToolOutcome::failed(&err)
            }
        };

        DispatchResult {
            tool_name: tool_name.to_string(),
            outcome,
            duration,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use serde_json::json;

    #[test]
    fn test_every_kind_has_matching_definition() {
        for kind in ToolKind::ALL {
            let def = kind.handler().definition();
            assert_eq!(def.name, kind.name());
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            assert!(!def.description.is_empty());
        }
    }

    #[test]
    fn test_all_schemas_compile() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), ToolKind::ALL.len());
        assert!(registry.tools.iter().all(|t| t.validator.is_some()));
    }

    #[test]
    fn test_subset_registry() {
        let registry = ToolRegistry::with_kinds(&[ToolKind::ReadFile, ToolKind::ListDir]);
        assert!(registry.contains("read_file"));
        assert!(!registry.contains("write_file"));
        assert_eq!(registry.tool_names(), vec!["read_file", "list_dir"]);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let (_temp, ctx) = temp_context();
        let registry = ToolRegistry::new();
        let result = registry.dispatch(&ctx, "format_disk", json!({})).await;

        assert!(result.is_error());
        assert_eq!(result.outcome.reason.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_schema_violation_has_no_side_effects() {
        let (temp, ctx) = temp_context();
        let registry = ToolRegistry::new();

        // content must be a string
        let result = registry
            .dispatch(&ctx, "write_file", json!({"path": "a.txt", "content": 42}))
            .await;

        assert!(result.is_error());
        assert_eq!(result.outcome.reason.as_deref(), Some("schema_violation"));
        assert!(!temp.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_dispatch_success_roundtrip() {
        let (temp, ctx) = temp_context();
        std::fs::write(temp.path().join("hello.txt"), "hi\n").unwrap();
        let registry = ToolRegistry::new();

        let result = registry
            .dispatch(&ctx, "read_file", json!({"path": "hello.txt"}))
            .await;

        assert!(result.outcome.success, "{:?}", result.outcome);
        assert_eq!(result.outcome.data.as_ref().unwrap()["content"], "hi");
    }

    #[test]
    fn test_outcome_json_shape() {
        let ok = ToolOutcome::ok(json!({"bytes": 3}));
        assert_eq!(ok.to_json_string(), r#"{"success":true,"data":{"bytes":3}}"#);

        let failed = ToolOutcome::failed(&ToolError::PathEscape("../x".into()));
        let value: serde_json::Value = serde_json::from_str(&failed.to_json_string()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["reason"], "path_escape");
        assert!(value.get("data").is_none());
    }
}
