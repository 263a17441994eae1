// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File name search: case-insensitive substring match on workspace paths.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::workspace_files;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `file_search` tool.
pub struct FileSearchHandler;

const MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct FileSearchArgs {
    query: String,
}

#[async_trait]
impl ToolHandler for FileSearchHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_search",
            "Find files whose path contains the query (case-insensitive, at most 10 results)",
        )
        .with_schema(
            InputSchema::new()
                .with_property("query", json!({
                    "type": "string",
                    "description": "Part of the file name or path"
                }))
                .with_required(vec!["query".to_string()]),
        )
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: FileSearchArgs = parse_arguments(&input)?;
        let needle = args.query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let mut matches: Vec<String> = workspace_files(ctx.workspace.root())
            .map(|entry| ctx.workspace.relative(entry.path()))
            .filter(|rel| rel.to_lowercase().contains(&needle))
            .collect();

        // Shorter paths are usually the better hit
        matches.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        matches.truncate(MAX_RESULTS);

        Ok(json!({
            "query": args.query,
            "count": matches.len(),
            "matches": matches,
        }))
    }
}
