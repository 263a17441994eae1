// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! List directory tool handler.
//!
//! Lists one level of a workspace directory, directories first. Dependency
//! and build output directories are skipped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::is_ignored;

/// Handler for the `list_dir` tool.
pub struct ListDirHandler;

const DEFAULT_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    /// Directory to list (default: project root).
    #[serde(default = "default_path")]
    path: String,

    #[serde(default = "default_limit")]
    limit: usize,

    /// Show hidden files (starting with .).
    #[serde(default)]
    show_hidden: bool,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
struct DirEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

#[async_trait]
impl ToolHandler for ListDirHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_dir", "List the contents of a project directory")
            .with_schema(
                InputSchema::new()
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Directory relative to the project root (default: \".\")"
                    }))
                    .with_property("limit", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of entries (default: 200)"
                    }))
                    .with_property("show_hidden", json!({
                        "type": "boolean",
                        "description": "Show hidden files (default: false)"
                    })),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(path, entries)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: ListDirArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("path", args.path.as_str());

        let path = ctx.workspace.resolve(&args.path)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| map_io_error(&args.path, e, "access directory"))?;

        if !metadata.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "Path is not a directory: {}",
                args.path
            )));
        }

        let (entries, total) = list_directory(ctx, &path, args.limit, args.show_hidden).await?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("entries", entries.len());
            debug!(path = %path.display(), entries = entries.len(), "Directory listed");
        }

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "count": entries.len(),
            "truncated": total > entries.len(),
            "items": entries,
        }))
    }
}

async fn list_directory(
    ctx: &ToolContext,
    path: &Path,
    limit: usize,
    show_hidden: bool,
) -> Result<(Vec<DirEntry>, usize), ToolError> {
    let mut dir = fs::read_dir(path)
        .await
        .map_err(|e| ToolError::IoError(format!("Failed to read directory: {e}")))?;

    let mut entries: Vec<DirEntry> = Vec::new();

    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| ToolError::IoError(format!("Failed to read directory entry: {e}")))?
    {
        let name = entry.file_name().to_string_lossy().to_string();

        if is_ignored(&name) || (!show_hidden && name.starts_with('.')) {
            continue;
        }

        let metadata = entry.metadata().await.ok();
        let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);

        entries.push(DirEntry {
            path: ctx.workspace.relative(&entry.path()),
            kind: if is_dir { "directory" } else { "file" },
            size: if is_dir { None } else { metadata.map(|m| m.len()) },
            name,
        });
    }

    // Directories first, then alphabetically
    entries.sort_by(|a, b| match (a.kind, b.kind) {
        ("directory", "file") => std::cmp::Ordering::Less,
        ("file", "directory") => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    let total = entries.len();
    entries.truncate(limit);
    Ok((entries, total))
}
