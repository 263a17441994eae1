// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delete file tool handler.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::debug;

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::ChangeKind;

/// Handler for the `delete_file` tool. Directories are refused.
pub struct DeleteFileHandler;

#[derive(Debug, Deserialize)]
struct DeleteFileArgs {
    path: String,
}

#[async_trait]
impl ToolHandler for DeleteFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("delete_file", "Delete a file from the project")
            .with_schema(
                InputSchema::new()
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Path of the file, relative to the project root"
                    }))
                    .with_required(vec!["path".to_string()]),
            )
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: DeleteFileArgs = parse_arguments(&input)?;
        let path = ctx.workspace.resolve(&args.path)?;

        if path == ctx.workspace.root() || path.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "{} is a directory; only files can be deleted",
                args.path
            )));
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| map_io_error(&args.path, e, "delete file"))?;

        ctx.workspace.record_change(&path, ChangeKind::Deleted);

        #[cfg(feature = "telemetry")]
        debug!(path = %path.display(), "File deleted");

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "deleted": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;

    #[tokio::test]
    async fn test_delete_file() {
        let (temp, ctx) = temp_context();
        std::fs::write(temp.path().join("old.css"), "body {}").unwrap();

        let result = DeleteFileHandler
            .execute(&ctx, json!({"path": "old.css"}))
            .await
            .unwrap();

        assert_eq!(result["deleted"], true);
        assert!(!temp.path().join("old.css").exists());
        assert_eq!(ctx.workspace.changed_files()[0].change, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_delete_missing_file() {
        let (_temp, ctx) = temp_context();
        let err = DeleteFileHandler
            .execute(&ctx, json!({"path": "ghost.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "file_not_found");
    }

    #[tokio::test]
    async fn test_delete_directory_refused() {
        let (temp, ctx) = temp_context();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        let err = DeleteFileHandler
            .execute(&ctx, json!({"path": "src"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_arguments");
        assert!(temp.path().join("src").exists());
    }
}
