// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Glob search tool handler.
//!
//! Finds workspace files matching a glob pattern, most recently modified
//! first.

use async_trait::async_trait;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use super::workspace_files;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `glob_search` tool.
pub struct GlobSearchHandler;

const DEFAULT_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct GlobSearchArgs {
    /// Glob pattern, e.g. `**/*.tsx`.
    pattern: String,

    /// Directory to search in (default: project root).
    #[serde(default)]
    path: Option<String>,

    #[serde(default)]
    case_sensitive: bool,

    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[async_trait]
impl ToolHandler for GlobSearchHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("glob_search", "Find files by glob pattern (e.g. '**/*.tsx', 'src/**/*.css')")
            .with_schema(
                InputSchema::new()
                    .with_property("pattern", json!({
                        "type": "string",
                        "description": "Glob pattern relative to the search directory"
                    }))
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Directory to search in (default: project root)"
                    }))
                    .with_property("case_sensitive", json!({
                        "type": "boolean",
                        "description": "Match case-sensitively (default: false)"
                    }))
                    .with_property("limit", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of results (default: 200)"
                    }))
                    .with_required(vec!["pattern".to_string()]),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(pattern, files_found)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: GlobSearchArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("pattern", args.pattern.as_str());

        let pattern = args.pattern.trim();
        if pattern.is_empty() {
            return Err(ToolError::InvalidArguments("pattern must not be empty".to_string()));
        }

        let base = ctx.workspace.resolve(args.path.as_deref().unwrap_or("."))?;
        if !base.is_dir() {
            return Err(ToolError::FileNotFound(ctx.workspace.relative(&base)));
        }

        let glob_set = build_glob_set(pattern, args.case_sensitive)?;
        let matches = find_matching_files(&base, &glob_set);

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("files_found", matches.len());
            debug!(pattern, files = matches.len(), "Glob search complete");
        }

        let total = matches.len();
        let files: Vec<String> = matches
            .into_iter()
            .take(args.limit)
            .map(|p| ctx.workspace.relative(&p))
            .collect();

        Ok(json!({
            "pattern": pattern,
            "count": files.len(),
            "truncated": total > files.len(),
            "matches": files,
        }))
    }
}

fn build_glob_set(pattern: &str, case_sensitive: bool) -> Result<GlobSet, ToolError> {
    let glob = GlobBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .literal_separator(false)
        .build()
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob pattern: {e}")))?;

    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder
        .build()
        .map_err(|e| ToolError::InvalidArguments(format!("Failed to build glob set: {e}")))
}

fn find_matching_files(base: &Path, glob_set: &GlobSet) -> Vec<PathBuf> {
    let mut entries: Vec<(PathBuf, std::time::SystemTime)> = workspace_files(base)
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(base)
                .map(|rel| glob_set.is_match(rel))
                .unwrap_or(false)
        })
        .map(|entry| {
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            (entry.into_path(), mtime)
        })
        .collect();

    // Most recent first, path as a stable tiebreak
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().map(|(path, _)| path).collect()
}
