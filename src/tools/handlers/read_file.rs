// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read file tool handler.
//!
//! Reads a workspace file, optionally a window of lines, with lossy UTF-8
//! decoding and long-line truncation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext, DEFAULT_READ_LIMIT, MAX_LINE_LENGTH};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `read_file` tool.
pub struct ReadFileHandler;

/// Arguments for the read_file tool.
#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    /// Workspace path of the file to read.
    path: String,

    /// 1-indexed line number to start reading from (default: 1).
    #[serde(default = "default_offset")]
    offset: usize,

    /// Maximum number of lines to return (default: 2000).
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_offset() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("read_file", "Read the contents of a file in the project")
            .with_schema(
                InputSchema::new()
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Path of the file, relative to the project root"
                    }))
                    .with_property("offset", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "1-indexed line number to start reading from (default: 1)"
                    }))
                    .with_property("limit", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of lines to return (default: 2000)"
                    }))
                    .with_required(vec!["path".to_string()]),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(path, lines_read)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: ReadFileArgs = parse_arguments(&input)?;

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("path", args.path.as_str());

        if args.offset == 0 || args.limit == 0 {
            return Err(ToolError::InvalidArguments(
                "offset and limit must be at least 1".to_string(),
            ));
        }

        let path = ctx.workspace.resolve(&args.path)?;
        let window = read_file_lines(&path, args.offset, args.limit).await?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("lines_read", window.lines.len());
            debug!(path = %args.path, lines = window.lines.len(), "File read complete");
        }

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "content": window.lines.join("\n"),
            "start_line": args.offset,
            "num_lines": window.lines.len(),
            "total_lines": window.total_lines,
        }))
    }
}

struct LineWindow {
    lines: Vec<String>,
    total_lines: usize,
}

/// Read lines from a file with offset and limit, counting every line.
async fn read_file_lines(path: &Path, offset: usize, limit: usize) -> Result<LineWindow, ToolError> {
    let file = File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::FileNotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(path.display().to_string()),
        _ => ToolError::IoError(format!("Failed to open file: {e}")),
    })?;

    let mut reader = BufReader::new(file);
    let mut collected = Vec::new();
    let mut line_number = 0usize;
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let bytes_read = reader
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(|e| ToolError::IoError(format!("Failed to read file: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        // Remove trailing newlines (LF and CRLF)
        if buffer.last() == Some(&b'\n') {
            buffer.pop();
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
        }

        line_number += 1;

        if line_number >= offset && collected.len() < limit {
            collected.push(format_line(&buffer));
        }
    }

    if line_number > 0 && offset > line_number {
        return Err(ToolError::InvalidArguments(format!(
            "offset {offset} exceeds file length ({line_number} lines)"
        )));
    }

    Ok(LineWindow {
        lines: collected,
        total_lines: line_number,
    })
}

/// Decode a line lossily and cut it at [`MAX_LINE_LENGTH`] bytes.
fn format_line(bytes: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(bytes);

    if decoded.len() > MAX_LINE_LENGTH {
        let mut end = MAX_LINE_LENGTH;
        while end > 0 && !decoded.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &decoded[..end])
    } else {
        decoded.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use std::fs;

    #[tokio::test]
    async fn test_read_file_window() {
        let (temp, ctx) = temp_context();
        fs::write(temp.path().join("notes.txt"), "line1\nline2\nline3\n").unwrap();

        let result = ReadFileHandler
            .execute(&ctx, json!({"path": "notes.txt", "offset": 2, "limit": 1}))
            .await
            .unwrap();

        assert_eq!(result["content"], "line2");
        assert_eq!(result["num_lines"], 1);
        assert_eq!(result["total_lines"], 3);
    }

    #[tokio::test]
    async fn test_read_file_crlf() {
        let (temp, ctx) = temp_context();
        fs::write(temp.path().join("win.txt"), b"line1\r\nline2\r\n").unwrap();

        let result = ReadFileHandler
            .execute(&ctx, json!({"path": "win.txt"}))
            .await
            .unwrap();

        assert_eq!(result["content"], "line1\nline2");
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let (_temp, ctx) = temp_context();
        let err = ReadFileHandler
            .execute(&ctx, json!({"path": "missing.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_read_file_outside_workspace() {
        let (_temp, ctx) = temp_context();
        let err = ReadFileHandler
            .execute(&ctx, json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "path_escape");
    }

    #[tokio::test]
    async fn test_offset_past_end() {
        let (temp, ctx) = temp_context();
        fs::write(temp.path().join("short.txt"), "only\n").unwrap();
        let err = ReadFileHandler
            .execute(&ctx, json!({"path": "short.txt", "offset": 5}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_arguments");
    }

    #[test]
    fn test_format_line_non_utf8() {
        let result = format_line(&[0xff, 0xfe, b'a', b'b']);
        assert!(result.contains("ab"));
    }
}
