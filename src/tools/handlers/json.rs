// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON file tools: `read_json`, `write_json`, `validate_json`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs;

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::ChangeKind;

/// Handler for the `read_json` tool.
pub struct JsonReadHandler;

/// Handler for the `write_json` tool.
pub struct JsonWriteHandler;

/// Handler for the `validate_json` tool.
pub struct JsonValidateHandler;

#[derive(Debug, Deserialize)]
struct ReadJsonArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteJsonArgs {
    path: String,
    data: serde_json::Value,
    #[serde(default = "default_indent")]
    indent: usize,
}

fn default_indent() -> usize {
    2
}

#[derive(Debug, Deserialize)]
struct ValidateJsonArgs {
    path: String,
    /// Inline JSON Schema.
    #[serde(default)]
    schema: Option<serde_json::Value>,
    /// Workspace path of a JSON Schema file.
    #[serde(default)]
    schema_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SyntaxError {
    message: String,
    line: usize,
    column: usize,
}

fn path_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Path of the JSON file, relative to the project root"
    })
}

async fn read_text(ctx: &ToolContext, raw: &str) -> Result<(std::path::PathBuf, String), ToolError> {
    let path = ctx.workspace.resolve(raw)?;
    let text = fs::read_to_string(&path)
        .await
        .map_err(|e| map_io_error(raw, e, "read file"))?;
    Ok((path, text))
}

/// Serialize with a configurable indent width.
pub(crate) fn to_pretty_json(value: &serde_json::Value, indent: usize) -> Result<String, ToolError> {
    let indent_bytes = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent_bytes);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to serialize JSON: {e}")))?;
    String::from_utf8(out).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
}

#[async_trait]
impl ToolHandler for JsonReadHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("read_json", "Read and parse a JSON file")
            .with_schema(
                InputSchema::new()
                    .with_property("path", path_property())
                    .with_required(vec!["path".to_string()]),
            )
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: ReadJsonArgs = parse_arguments(&input)?;
        let (path, text) = read_text(ctx, &args.path).await?;

        let data: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ToolError::ExecutionFailed(format!(
                "Invalid JSON in {} at line {}, column {}: {e}",
                args.path,
                e.line(),
                e.column()
            ))
        })?;

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "data": data,
        }))
    }
}

#[async_trait]
impl ToolHandler for JsonWriteHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("write_json", "Write a value to a JSON file, pretty-printed")
            .with_schema(
                InputSchema::new()
                    .with_property("path", path_property())
                    .with_property("data", json!({
                        "description": "Any JSON value to write"
                    }))
                    .with_property("indent", json!({
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 8,
                        "description": "Indent width in spaces (default: 2)"
                    }))
                    .with_required(vec!["path".to_string(), "data".to_string()]),
            )
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: WriteJsonArgs = parse_arguments(&input)?;
        let path = ctx.workspace.resolve(&args.path)?;

        let mut text = to_pretty_json(&args.data, args.indent)?;
        text.push('\n');

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io_error(&args.path, e, "create parent directories"))?;
        }

        let existed = path.exists();
        fs::write(&path, &text)
            .await
            .map_err(|e| map_io_error(&args.path, e, "write file"))?;

        ctx.workspace.record_change(
            &path,
            if existed { ChangeKind::Modified } else { ChangeKind::Created },
        );

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "bytes_written": text.len(),
        }))
    }
}

#[async_trait]
impl ToolHandler for JsonValidateHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "validate_json",
            "Check that a file is valid JSON, optionally against a JSON Schema",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", path_property())
                .with_property("schema", json!({
                    "type": "object",
                    "description": "Inline JSON Schema to validate against"
                }))
                .with_property("schema_path", json!({
                    "type": "string",
                    "description": "Path of a JSON Schema file in the project"
                }))
                .with_required(vec!["path".to_string()]),
        )
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: ValidateJsonArgs = parse_arguments(&input)?;
        let (path, text) = read_text(ctx, &args.path).await?;
        let rel = ctx.workspace.relative(&path);

        let document: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                return Ok(json!({
                    "path": rel,
                    "valid": false,
                    "syntax_error": SyntaxError {
                        message: e.to_string(),
                        line: e.line(),
                        column: e.column(),
                    },
                }));
            }
        };

        let schema = match (args.schema, args.schema_path) {
            (Some(schema), _) => Some(schema),
            (None, Some(schema_path)) => {
                let (_, schema_text) = read_text(ctx, &schema_path).await?;
                Some(serde_json::from_str(&schema_text).map_err(|e| {
                    ToolError::InvalidArguments(format!("Schema file is not valid JSON: {e}"))
                })?)
            }
            (None, None) => None,
        };

        let Some(schema) = schema else {
            return Ok(json!({"path": rel, "valid": true}));
        };

        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid schema: {e}")))?;

        let errors: Vec<String> = validator
            .iter_errors(&document)
            .map(|err| err.to_string())
            .collect();

        Ok(json!({
            "path": rel,
            "valid": errors.is_empty(),
            "schema_errors": errors,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use std::fs as stdfs;

    #[tokio::test]
    async fn test_write_then_read_json() {
        let (temp, ctx) = temp_context();

        JsonWriteHandler
            .execute(&ctx, json!({"path": "config/app.json", "data": {"theme": "dark", "size": 2}}))
            .await
            .unwrap();

        let text = stdfs::read_to_string(temp.path().join("config/app.json")).unwrap();
        assert!(text.contains("\n  \"theme\": \"dark\""));
        assert!(text.ends_with("}\n"));

        let read = JsonReadHandler
            .execute(&ctx, json!({"path": "config/app.json"}))
            .await
            .unwrap();
        assert_eq!(read["data"]["size"], 2);
    }

    #[tokio::test]
    async fn test_read_json_invalid() {
        let (temp, ctx) = temp_context();
        stdfs::write(temp.path().join("bad.json"), "{\"a\": }").unwrap();

        let err = JsonReadHandler.execute(&ctx, json!({"path": "bad.json"})).await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn test_validate_json_syntax_error_reports_position() {
        let (temp, ctx) = temp_context();
        stdfs::write(temp.path().join("bad.json"), "{\n  \"a\": 1,\n}").unwrap();

        let result = JsonValidateHandler
            .execute(&ctx, json!({"path": "bad.json"}))
            .await
            .unwrap();

        assert_eq!(result["valid"], false);
        assert_eq!(result["syntax_error"]["line"], 3);
    }

    #[tokio::test]
    async fn test_validate_json_against_schema() {
        let (temp, ctx) = temp_context();
        stdfs::write(temp.path().join("package.json"), r#"{"name": 5}"#).unwrap();

        let result = JsonValidateHandler
            .execute(
                &ctx,
                json!({
                    "path": "package.json",
                    "schema": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name", "version"]
                    }
                }),
            )
            .await
            .unwrap();

        assert_eq!(result["valid"], false);
        assert_eq!(result["schema_errors"].as_array().unwrap().len(), 2);
    }
}
