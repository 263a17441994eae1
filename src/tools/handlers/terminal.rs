// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal command tool handler.
//!
//! Runs a shell command in the workspace root with a timeout. Commands that
//! start a long-running dev server, or that try to background themselves,
//! are refused before anything is spawned.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument, warn};

use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, truncate_output, ToolContext, MAX_TIMEOUT_MS};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `run_terminal_cmd` tool.
pub struct TerminalHandler;

const MAX_OUTPUT_LINES: usize = 500;

/// Command prefixes that never exit on their own.
pub const BLOCKED_COMMANDS: &[&str] = &[
    "npm run dev",
    "npm run start",
    "npm run build",
    "npm start",
    "yarn dev",
    "yarn start",
    "yarn build",
    "pnpm dev",
    "pnpm start",
    "pnpm build",
    "vite",
    "next dev",
    "next start",
    "react-scripts start",
];

#[derive(Debug, Deserialize)]
struct TerminalArgs {
    command: String,

    /// Timeout in milliseconds; capped by the configured command timeout.
    #[serde(default)]
    timeout: Option<u64>,
}

#[async_trait]
impl ToolHandler for TerminalHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "run_terminal_cmd",
            "Run a shell command in the project root. Dev servers and background jobs are not allowed.",
        )
        .with_schema(
            InputSchema::new()
                .with_property("command", json!({
                    "type": "string",
                    "description": "The shell command to run"
                }))
                .with_property("timeout", json!({
                    "type": "integer",
                    "minimum": 1,
                    "description": "Timeout in milliseconds"
                }))
                .with_required(vec!["command".to_string()]),
        )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(command, exit_code)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: TerminalArgs = parse_arguments(&input)?;
        let command = args.command.trim();

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("command", crate::tools::truncate_text(command, 100).as_str());

        if command.is_empty() {
            return Err(ToolError::InvalidArguments("command must not be empty".to_string()));
        }

        check_command(command, &ctx.settings.blocked_commands)?;

        let limit = ctx.settings.command_timeout;
        let timeout_duration = args
            .timeout
            .map(|ms| Duration::from_millis(ms.min(MAX_TIMEOUT_MS)).min(limit))
            .unwrap_or(limit);

        let result = run_command(command, ctx.workspace.root(), timeout_duration).await?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("exit_code", result.exit_code);
            debug!(
                exit_code = result.exit_code,
                duration_ms = result.duration.as_millis() as u64,
                "Command executed"
            );
        }

        let stdout = truncate_output(&result.stdout, MAX_OUTPUT_LINES);
        let stderr = truncate_output(&result.stderr, MAX_OUTPUT_LINES / 4);

        if result.exit_code != 0 {
            let mut message = format!("Command exited with code {}", result.exit_code);
            if !stderr.trim().is_empty() {
                message.push_str(&format!("\n[stderr]\n{}", stderr.trim_end()));
            }
            if !stdout.trim().is_empty() {
                message.push_str(&format!("\n[stdout]\n{}", stdout.trim_end()));
            }
            return Err(ToolError::ExecutionFailed(message));
        }

        Ok(json!({
            "command": command,
            "exit_code": result.exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": result.duration.as_millis() as u64,
        }))
    }
}

/// Refuse dev-server commands and backgrounding.
pub(crate) fn check_command(command: &str, extra: &[String]) -> Result<(), ToolError> {
    if has_background_operator(command) {
        return Err(ToolError::BlockedCommand(
            "Background processes ('&') are not allowed".to_string(),
        ));
    }

    let patterns = BLOCKED_COMMANDS
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str));

    for segment in split_segments(command) {
        let tokens: Vec<&str> = segment.split_whitespace().collect();
        // `npx vite` runs the same thing as `vite`
        let tokens = match tokens.first() {
            Some(&"npx") => &tokens[1..],
            _ => &tokens[..],
        };

        for pattern in patterns.clone() {
            let wanted: Vec<&str> = pattern.split_whitespace().collect();
            if !wanted.is_empty() && tokens.starts_with(&wanted) {
                return Err(ToolError::BlockedCommand(format!(
                    "'{pattern}' starts a long-running process and is not allowed"
                )));
            }
        }
    }

    Ok(())
}

/// Split on `&&`, `||`, `;` and `|`.
fn split_segments(command: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let bytes = command.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let step = match bytes[i] {
            b'&' if bytes.get(i + 1) == Some(&b'&') => 2,
            b'|' if bytes.get(i + 1) == Some(&b'|') => 2,
            b'|' | b';' => 1,
            _ => 0,
        };
        if step > 0 {
            segments.push(command[start..i].trim());
            i += step;
            start = i;
        } else {
            i += 1;
        }
    }
    segments.push(command[start..].trim());
    segments.retain(|s| !s.is_empty());
    segments
}

/// A lone `&` that is not part of `&&`, `2>&1` or `&>`.
fn has_background_operator(command: &str) -> bool {
    let bytes = command.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        if b != b'&' {
            return false;
        }
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 1).copied();
        prev != Some(b'&') && prev != Some(b'>') && next != Some(b'&') && next != Some(b'>')
    })
}

struct CommandResult {
    stdout: String,
    stderr: String,
    exit_code: i32,
    duration: Duration,
}

async fn run_command(command: &str, cwd: &Path, timeout_duration: Duration) -> Result<CommandResult, ToolError> {
    let start = Instant::now();

    let (shell, shell_flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };

    let mut cmd = Command::new(shell);
    cmd.arg(shell_flag)
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(timeout_duration, cmd.output()).await {
        Ok(Ok(output)) => Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        }),
        Ok(Err(e)) => Err(ToolError::ExecutionFailed(format!("Failed to execute command: {e}"))),
        Err(_) => {
            #[cfg(feature = "telemetry")]
            warn!(command, "Command timed out");
            Err(ToolError::Timeout(timeout_duration.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use crate::tools::ToolSettings;
    use std::sync::Arc;

    #[test]
    fn test_blocks_dev_servers() {
        for cmd in [
            "npm run dev",
            "npm start",
            "cd app && yarn dev",
            "npx vite --port 3000",
            "next dev",
            "npm install; npm run build",
        ] {
            let err = check_command(cmd, &[]).unwrap_err();
            assert_eq!(err.reason(), "blocked_command", "{cmd}");
        }
    }

    #[test]
    fn test_allows_ordinary_commands() {
        for cmd in [
            "npm install vite",
            "npm test",
            "ls -la && cat package.json",
            "npm run lint 2>&1",
            "echo hi &> out.txt",
            "grep -r vite src | head",
        ] {
            assert!(check_command(cmd, &[]).is_ok(), "{cmd}");
        }
    }

    #[test]
    fn test_blocks_background() {
        let err = check_command("sleep 100 &", &[]).unwrap_err();
        assert_eq!(err.reason(), "blocked_command");
        assert!(check_command("python -m http.server & echo ok", &[]).is_err());
    }

    #[test]
    fn test_extra_patterns() {
        let extra = vec!["cargo watch".to_string()];
        assert!(check_command("cargo watch -x test", &extra).is_err());
        assert!(check_command("cargo test", &extra).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_workspace_root() {
        let (temp, ctx) = temp_context();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();

        let result = TerminalHandler
            .execute(&ctx, json!({"command": "ls"}))
            .await
            .unwrap();

        assert_eq!(result["exit_code"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let (_temp, ctx) = temp_context();
        let err = TerminalHandler
            .execute(&ctx, json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "execution_failed");
        let message = err.to_string();
        assert!(message.contains("code 3"));
        assert!(message.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let (_temp, mut ctx) = temp_context();
        ctx.settings = Arc::new(ToolSettings {
            command_timeout: Duration::from_millis(200),
            ..ToolSettings::default()
        });

        let err = TerminalHandler
            .execute(&ctx, json!({"command": "sleep 5"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "timeout");
    }
}
