// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Grep search tool handler.
//!
//! Regex search over workspace text files, line by line.

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use super::workspace_files;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, truncate_text, ToolContext, MAX_LINE_LENGTH};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `grep_search` tool.
pub struct GrepSearchHandler;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct GrepArgs {
    /// Regular expression to search for.
    query: String,

    /// Glob restricting which files are searched, e.g. `*.ts`.
    #[serde(default)]
    include_pattern: Option<String>,

    /// Glob excluding files from the search.
    #[serde(default)]
    exclude_pattern: Option<String>,

    #[serde(default)]
    case_sensitive: bool,

    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
struct GrepMatch {
    file: String,
    line: usize,
    content: String,
}

#[async_trait]
impl ToolHandler for GrepSearchHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("grep_search", "Search file contents with a regular expression")
            .with_schema(
                InputSchema::new()
                    .with_property("query", json!({
                        "type": "string",
                        "description": "Regular expression to search for"
                    }))
                    .with_property("include_pattern", json!({
                        "type": "string",
                        "description": "Glob of files to include (e.g. '*.tsx')"
                    }))
                    .with_property("exclude_pattern", json!({
                        "type": "string",
                        "description": "Glob of files to exclude"
                    }))
                    .with_property("case_sensitive", json!({
                        "type": "boolean",
                        "description": "Case-sensitive search (default: false)"
                    }))
                    .with_property("limit", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of matching lines (default: 50)"
                    }))
                    .with_required(vec!["query".to_string()]),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(query, matches)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: GrepArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("query", args.query.as_str());

        if args.query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let regex = RegexBuilder::new(&args.query)
            .case_insensitive(!args.case_sensitive)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid regex: {e}")))?;

        let include = args.include_pattern.as_deref().map(compile_glob).transpose()?;
        let exclude = args.exclude_pattern.as_deref().map(compile_glob).transpose()?;
        let limit = args.limit.min(MAX_LIMIT);

        let root = ctx.workspace.root().to_path_buf();
        let (results, hit_limit) = search_files(&root, &regex, include.as_ref(), exclude.as_ref(), limit);

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("matches", results.len());
            debug!(query = %args.query, matches = results.len(), "Grep search complete");
        }

        Ok(json!({
            "query": args.query,
            "count": results.len(),
            "truncated": hit_limit,
            "results": results,
        }))
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, ToolError> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob pattern: {e}")))
}

/// Glob patterns without a `/` match against the file name only.
fn glob_matches(matcher: &GlobMatcher, rel: &Path) -> bool {
    if matcher.glob().glob().contains('/') {
        matcher.is_match(rel)
    } else {
        rel.file_name().map(|n| matcher.is_match(n)).unwrap_or(false)
    }
}

fn search_files(
    root: &Path,
    regex: &regex::Regex,
    include: Option<&GlobMatcher>,
    exclude: Option<&GlobMatcher>,
    limit: usize,
) -> (Vec<GrepMatch>, bool) {
    let mut results = Vec::new();

    for entry in workspace_files(root) {
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if include.is_some_and(|g| !glob_matches(g, rel)) {
            continue;
        }
        if exclude.is_some_and(|g| glob_matches(g, rel)) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }

        // Binary or non-UTF-8 files are skipped
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let display = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        for (idx, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                if results.len() >= limit {
                    return (results, true);
                }
                results.push(GrepMatch {
                    file: display.clone(),
                    line: idx + 1,
                    content: truncate_text(line.trim_end(), MAX_LINE_LENGTH),
                });
            }
        }
    }

    (results, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use std::fs;

    fn setup() -> (tempfile::TempDir, ToolContext) {
        let (temp, ctx) = temp_context();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/App.tsx"), "export function App() {\n  return null;\n}\n").unwrap();
        fs::write(temp.path().join("src/util.ts"), "export const TODO = 1;\nfunction app() {}\n").unwrap();
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_grep_case_insensitive_default() {
        let (_temp, ctx) = setup();
        let result = GrepSearchHandler
            .execute(&ctx, json!({"query": "function app"}))
            .await
            .unwrap();
        assert_eq!(result["count"], 2);
    }

    #[tokio::test]
    async fn test_grep_include_pattern() {
        let (_temp, ctx) = setup();
        let result = GrepSearchHandler
            .execute(&ctx, json!({"query": "export", "include_pattern": "*.ts"}))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["results"][0]["file"], "src/util.ts");
        assert_eq!(result["results"][0]["line"], 1);
    }

    #[tokio::test]
    async fn test_grep_limit() {
        let (_temp, ctx) = setup();
        let result = GrepSearchHandler
            .execute(&ctx, json!({"query": ".", "limit": 1}))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["truncated"], true);
    }

    #[tokio::test]
    async fn test_grep_invalid_regex() {
        let (_temp, ctx) = setup();
        let err = GrepSearchHandler
            .execute(&ctx, json!({"query": "("}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_arguments");
    }
}
