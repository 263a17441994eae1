// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Edit file tool handler.
//!
//! Performs exact string replacements in workspace files.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, truncate_text, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::ChangeKind;

/// Handler for the `edit_file` tool.
pub struct EditFileHandler;

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,

    /// The exact text to find and replace.
    old_string: String,

    new_string: String,

    /// If true, replace all occurrences (default: false).
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl ToolHandler for EditFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "edit_file",
            "Replace an exact block of text in a file. old_string must match exactly once unless replace_all is set",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", json!({
                    "type": "string",
                    "description": "Path of the file, relative to the project root"
                }))
                .with_property("old_string", json!({
                    "type": "string",
                    "description": "The exact text to find"
                }))
                .with_property("new_string", json!({
                    "type": "string",
                    "description": "The text to replace it with"
                }))
                .with_property("replace_all", json!({
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }))
                .with_required(vec![
                    "path".to_string(),
                    "old_string".to_string(),
                    "new_string".to_string(),
                ]),
        )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(path, replace_all, replacements)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: EditFileArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        {
            let span = tracing::Span::current();
            span.record("path", args.path.as_str());
            span.record("replace_all", args.replace_all);
        }

        if args.old_string.is_empty() {
            return Err(ToolError::InvalidArguments(
                "old_string must not be empty".to_string(),
            ));
        }

        if args.old_string == args.new_string {
            return Err(ToolError::InvalidArguments(
                "new_string must be different from old_string".to_string(),
            ));
        }

        let path = ctx.workspace.resolve(&args.path)?;

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| map_io_error(&args.path, e, "read file"))?;

        let count = content.matches(&args.old_string).count();

        if count == 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string not found in {}. The exact text '{}' was not found",
                args.path,
                truncate_text(&args.old_string, 50)
            )));
        }

        if !args.replace_all && count > 1 {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string appears {count} times in {}. \
                 Either provide more context to make it unique, or use replace_all: true",
                args.path
            )));
        }

        let new_content = if args.replace_all {
            content.replace(&args.old_string, &args.new_string)
        } else {
            content.replacen(&args.old_string, &args.new_string, 1)
        };

        fs::write(&path, &new_content)
            .await
            .map_err(|e| map_io_error(&args.path, e, "write file"))?;

        ctx.workspace.record_change(&path, ChangeKind::Modified);

        let replaced_count = if args.replace_all { count } else { 1 };

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("replacements", replaced_count);
            debug!(path = %path.display(), replacements = replaced_count, "Edit complete");
        }

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "replacements": replaced_count,
        }))
    }
}
