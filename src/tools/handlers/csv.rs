// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! CSV file tools: `read_csv` and `write_csv`.
//!
//! Quoting follows RFC 4180: fields containing the delimiter, a quote, or a
//! line break are wrapped in quotes and inner quotes are doubled.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::fs;

use super::map_io_error;
use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};
use crate::workspace::ChangeKind;

/// Handler for the `read_csv` tool.
pub struct CsvReadHandler;

/// Handler for the `write_csv` tool.
pub struct CsvWriteHandler;

const DEFAULT_ROW_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct ReadCsvArgs {
    path: String,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default = "default_true")]
    has_header: bool,
    #[serde(default = "default_row_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct WriteCsvArgs {
    path: String,
    rows: Vec<Value>,
    /// Column order; taken from the first object row when omitted.
    #[serde(default)]
    headers: Option<Vec<String>>,
    #[serde(default = "default_delimiter")]
    delimiter: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_true() -> bool {
    true
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

fn single_char(delimiter: &str) -> Result<char, ToolError> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
        _ => Err(ToolError::InvalidArguments(format!(
            "delimiter must be a single character other than a quote or newline, got {delimiter:?}"
        ))),
    }
}

/// Split CSV text into records of fields.
pub(crate) fn parse_csv(text: &str, delimiter: char) -> Result<Vec<Vec<String>>, ToolError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    // Set once the field has any content, including an empty quoted `""`.
    let mut field_started = false;
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_started = false;
                line += 1;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(ToolError::ExecutionFailed(format!(
            "Unterminated quoted field starting before line {line}"
        )));
    }

    if field_started || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render rows of objects or arrays as CSV text.
pub(crate) fn write_csv_text(
    rows: &[Value],
    headers: Option<Vec<String>>,
    delimiter: char,
) -> Result<String, ToolError> {
    let headers = headers.or_else(|| {
        rows.iter()
            .find_map(|r| r.as_object())
            .map(|obj| obj.keys().cloned().collect())
    });

    let sep = delimiter.to_string();
    let mut out = String::new();

    if let Some(headers) = &headers {
        let line: Vec<String> = headers.iter().map(|h| escape_field(h, delimiter)).collect();
        out.push_str(&line.join(&sep));
        out.push_str("\r\n");
    }

    for (idx, row) in rows.iter().enumerate() {
        let cells: Vec<String> = match row {
            Value::Array(items) => items.iter().map(cell_text).collect(),
            Value::Object(obj) => {
                let Some(headers) = &headers else {
                    return Err(ToolError::InvalidArguments("object rows need headers".to_string()));
                };
                headers
                    .iter()
                    .map(|h| obj.get(h).map(cell_text).unwrap_or_default())
                    .collect()
            }
            _ => {
                return Err(ToolError::InvalidArguments(format!(
                    "row {idx} must be an object or an array"
                )))
            }
        };
        let line: Vec<String> = cells.iter().map(|c| escape_field(c, delimiter)).collect();
        out.push_str(&line.join(&sep));
        out.push_str("\r\n");
    }

    Ok(out)
}

#[async_trait]
impl ToolHandler for CsvReadHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("read_csv", "Read a CSV file into rows")
            .with_schema(
                InputSchema::new()
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Path of the CSV file, relative to the project root"
                    }))
                    .with_property("delimiter", json!({
                        "type": "string",
                        "description": "Field delimiter (default: ',')"
                    }))
                    .with_property("has_header", json!({
                        "type": "boolean",
                        "description": "First row holds column names (default: true)"
                    }))
                    .with_property("limit", json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of data rows (default: 1000)"
                    }))
                    .with_required(vec!["path".to_string()]),
            )
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<Value, ToolError> {
        let args: ReadCsvArgs = parse_arguments(&input)?;
        let delimiter = single_char(&args.delimiter)?;
        let path = ctx.workspace.resolve(&args.path)?;

        let text = fs::read_to_string(&path)
            .await
            .map_err(|e| map_io_error(&args.path, e, "read file"))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut records = parse_csv(text, delimiter)?.into_iter();
        let headers = if args.has_header { records.next() } else { None };

        let all: Vec<Vec<String>> = records.collect();
        let total = all.len();

        let rows: Vec<Value> = all
            .into_iter()
            .take(args.limit)
            .map(|record| match &headers {
                Some(headers) => {
                    let mut obj = Map::new();
                    for (i, name) in headers.iter().enumerate() {
                        let cell = record.get(i).cloned().unwrap_or_default();
                        obj.insert(name.clone(), Value::String(cell));
                    }
                    Value::Object(obj)
                }
                None => Value::Array(record.into_iter().map(Value::String).collect()),
            })
            .collect();

        Ok(json!({
            "path": ctx.workspace.relative(&path),
            "headers": headers,
            "row_count": total,
            "truncated": total > rows.len(),
            "rows": rows,
        }))
    }
}

#[async_trait]
impl ToolHandler for CsvWriteHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("write_csv", "Write rows (objects or arrays) to a CSV file")
            .with_schema(
                InputSchema::new()
                    .with_property("path", json!({
                        "type": "string",
                        "description": "Path of the CSV file, relative to the project root"
                    }))
                    .with_property("rows", json!({
                        "type": "array",
                        "items": {"type": ["object", "array"]},
                        "description": "Rows to write"
                    }))
                    .with_property("headers", json!({
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Column order (default: keys of the first object row)"
                    }))
                    .with_property("delimiter", json!({
                        "type": "string",
                        "description": "Field delimiter (default: ',')"
                    }))
                    .with_required(vec!["path".to_string(), "rows".to_string()]),
            )
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<Value, ToolError> {
        let args: WriteCsvArgs = parse_arguments(&input)?;
        let delimiter = single_char(&args.delimiter)?;
        let path = ctx.workspace.resolve(&args.path)?;

        let text = write_csv_text(&args.rows, args.headers, delimiter)?;

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
            "rows_written": args.rows.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;

    #[test]
    fn test_parse_quoted_fields() {
        let records = parse_csv("name,note\r\n\"Doe, J\",\"said \"\"hi\"\"\nthen left\"\r\n", ',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][0], "Doe, J");
        assert_eq!(records[1][1], "said \"hi\"\nthen left");
    }

    #[test]
    fn test_trailing_empty_quoted_field_is_kept() {
        let records = parse_csv("name\nAda\n\"\"", ',').unwrap();
        assert_eq!(records, vec![vec!["name"], vec!["Ada"], vec![""]]);

        let records = parse_csv("a,b\n1,\"\"", ',').unwrap();
        assert_eq!(records[1], vec!["1", ""]);
        assert_eq!(parse_csv("", ',').unwrap(), Vec::<Vec<String>>::new());
    }

    #[test]
    fn test_parse_unterminated_quote() {
        assert!(parse_csv("a,\"b\n", ',').is_err());
    }

    #[test]
    fn test_escape_only_when_needed() {
        assert_eq!(escape_field("plain", ','), "plain");
        assert_eq!(escape_field("a,b", ','), "\"a,b\"");
        assert_eq!(escape_field("say \"x\"", ','), "\"say \"\"x\"\"\"");
    }

    #[tokio::test]
    async fn test_write_and_read_objects() {
        let (_temp, ctx) = temp_context();

        CsvWriteHandler
            .execute(
                &ctx,
                json!({
                    "path": "data/users.csv",
                    "headers": ["name", "age"],
                    "rows": [{"name": "Ann", "age": 31}, {"name": "Bo, Jr", "age": null}]
                }),
            )
            .await
            .unwrap();

        let read = CsvReadHandler
            .execute(&ctx, json!({"path": "data/users.csv"}))
            .await
            .unwrap();

        assert_eq!(read["headers"], json!(["name", "age"]));
        assert_eq!(read["row_count"], 2);
        assert_eq!(read["rows"][0]["age"], "31");
        assert_eq!(read["rows"][1]["name"], "Bo, Jr");
        assert_eq!(read["rows"][1]["age"], "");
    }

    #[tokio::test]
    async fn test_read_without_header_and_tab_delimiter() {
        let (temp, ctx) = temp_context();
        std::fs::write(temp.path().join("t.tsv"), "a\tb\nc\td\n").unwrap();

        let read = CsvReadHandler
            .execute(&ctx, json!({"path": "t.tsv", "delimiter": "\t", "has_header": false}))
            .await
            .unwrap();

        assert_eq!(read["rows"], json!([["a", "b"], ["c", "d"]]));
    }

    #[tokio::test]
    async fn test_bad_delimiter() {
        let (_temp, ctx) = temp_context();
        let err = CsvReadHandler
            .execute(&ctx, json!({"path": "x.csv", "delimiter": ";;"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_arguments");
    }
}
