// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Write file tool handler.
//!
//! Creates or overwrites a workspace file, creating parent directories.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::ChangeKind;

/// Handler for the `write_file` tool.
pub struct WriteFileHandler;

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "write_file",
            "Write content to a file, creating it and any missing parent directories",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", json!({
                    "type": "string",
                    "description": "Path of the file, relative to the project root"
                }))
                .with_property("content", json!({
                    "type": "string",
                    "description": "Full content to write"
                }))
                .with_required(vec!["path".to_string(), "content".to_string()]),
        )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(path, bytes, created)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: WriteFileArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        {
            let span = tracing::Span::current();
            span.record("path", args.path.as_str());
            span.record("bytes", args.content.len());
        }

        let path = ctx.workspace.resolve(&args.path)?;
        if path.is_dir() {
            return Err(ToolError::InvalidArguments(format!("{} is a directory", args.path)));
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| map_io_error(&args.path, e, "create parent directories"))?;
            }
        }

        let existed = path.exists();

        fs::write(&path, &args.content)
            .await
            .map_err(|e| map_io_error(&args.path, e, "write file"))?;

        ctx.workspace.record_change(
            &path,
            if existed { ChangeKind::Modified } else { ChangeKind::Created },
        );

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("created", !existed);
            debug!(path = %path.display(), created = !existed, "File write complete");
        }

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "created": !existed,
            "bytes_written": args.content.len(),
            "lines": args.content.lines().count(),
        }))
    }
}
