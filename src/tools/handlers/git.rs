// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Version control tools backed by the `git` CLI.
//!
//! Every command runs with the workspace root as its working directory.
//! `git_add` and `git_commit` initialize a repository on first use.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, truncate_output, ToolContext};
use crate::types::{InputSchema, ToolDefinition};

const MAX_DIFF_LINES: usize = 1000;
const DEFAULT_LOG_LIMIT: usize = 10;
const FALLBACK_AUTHOR: &str = "codeweave";
const FALLBACK_EMAIL: &str = "codeweave@localhost";

/// Which git operation a [`GitHandler`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    Status,
    Add,
    Commit,
    Diff,
    Log,
    Branch,
}

/// Handler for the `git_*` tools.
pub struct GitHandler {
    pub op: GitOp,
}

#[derive(Debug, Default, Deserialize)]
struct PathsArgs {
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommitArgs {
    message: String,
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DiffArgs {
    #[serde(default)]
    staged: bool,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogArgs {
    #[serde(default = "default_log_limit")]
    limit: usize,
}

fn default_log_limit() -> usize {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Default, Deserialize)]
struct BranchArgs {
    #[serde(default)]
    name: Option<String>,
    /// Create the branch before switching to it.
    #[serde(default)]
    create: bool,
}

struct GitOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

async fn git(root: &Path, args: &[&str]) -> Result<GitOutput, ToolError> {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    // Repository discovery stops at the workspace root.
    if let Some(parent) = root.parent() {
        command.env("GIT_CEILING_DIRECTORIES", parent);
    }
    let output = command
        .output()
        .await
        .map_err(|e| ToolError::VcsError(format!("Failed to run git: {e}")))?;

    Ok(GitOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}

/// Run git and fail with `vcs_error` on a non-zero exit.
async fn git_checked(root: &Path, args: &[&str]) -> Result<String, ToolError> {
    let out = git(root, args).await?;
    if out.success {
        Ok(out.stdout)
    } else {
        let detail = if out.stderr.trim().is_empty() { out.stdout } else { out.stderr };
        Err(ToolError::VcsError(format!("git {}: {}", args.join(" "), detail.trim())))
    }
}

/// Only a repository rooted at the workspace counts; an enclosing one does not.
async fn is_repo(root: &Path) -> bool {
    tokio::fs::try_exists(root.join(".git")).await.unwrap_or(false)
}

async fn ensure_repo(root: &Path) -> Result<(), ToolError> {
    if !is_repo(root).await {
        git_checked(root, &["init"]).await?;
        #[cfg(feature = "telemetry")]
        debug!(root = %root.display(), "Initialized git repository");
    }
    Ok(())
}

async fn require_repo(root: &Path) -> Result<(), ToolError> {
    if is_repo(root).await {
        Ok(())
    } else {
        Err(ToolError::VcsError("Not a git repository".to_string()))
    }
}

/// Resolve tool paths through the workspace and hand git root-relative paths.
fn relative_paths(ctx: &ToolContext, raw: &[String]) -> Result<Vec<String>, ToolError> {
    raw.iter()
        .map(|p| {
            let resolved = ctx.workspace.resolve(p)?;
            Ok(ctx.workspace.relative(&resolved))
        })
        .collect()
}

async fn has_identity(root: &Path) -> bool {
    let name = git(root, &["config", "user.name"]).await;
    let email = git(root, &["config", "user.email"]).await;
    matches!((name, email), (Ok(n), Ok(e)) if n.success && e.success)
}

fn parse_status(porcelain: &str) -> Vec<serde_json::Value> {
    porcelain
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let (code, path) = line.split_at(3);
            json!({"status": code.trim(), "path": path})
        })
        .collect()
}

fn parse_log(text: &str) -> Vec<serde_json::Value> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '|');
            Some(json!({
                "hash": parts.next()?,
                "author": parts.next()?,
                "date": parts.next()?,
                "message": parts.next()?,
            }))
        })
        .collect()
}

impl GitHandler {
    async fn status(&self, ctx: &ToolContext) -> Result<serde_json::Value, ToolError> {
        let root = ctx.workspace.root();
        require_repo(root).await?;

        let porcelain = git_checked(root, &["status", "--porcelain"]).await?;
        let branch = git_checked(root, &["branch", "--show-current"]).await.unwrap_or_default();
        let files = parse_status(&porcelain);

        Ok(json!({
            "branch": branch.trim(),
            "clean": files.is_empty(),
            "files": files,
        }))
    }

    async fn add(&self, ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: PathsArgs = parse_arguments(input)?;
        let paths = if args.paths.is_empty() {
            vec![".".to_string()]
        } else {
            relative_paths(ctx, &args.paths)?
        };

        let root = ctx.workspace.root();
        ensure_repo(root).await?;

        let mut cmd = vec!["add", "--"];
        cmd.extend(paths.iter().map(String::as_str));
        git_checked(root, &cmd).await?;

        Ok(json!({"staged": paths}))
    }

    async fn commit(&self, ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: CommitArgs = parse_arguments(input)?;
        if args.message.trim().is_empty() {
            return Err(ToolError::InvalidArguments("message must not be empty".to_string()));
        }

        let paths = if args.paths.is_empty() {
            vec![".".to_string()]
        } else {
            relative_paths(ctx, &args.paths)?
        };

        let root = ctx.workspace.root();
        ensure_repo(root).await?;

        let mut add = vec!["add", "-A", "--"];
        add.extend(paths.iter().map(String::as_str));
        git_checked(root, &add).await?;

        let author_name = format!("user.name={FALLBACK_AUTHOR}");
        let author_email = format!("user.email={FALLBACK_EMAIL}");
        let mut cmd: Vec<&str> = Vec::new();
        if !has_identity(root).await {
            cmd.extend(["-c", author_name.as_str(), "-c", author_email.as_str()]);
        }
        cmd.extend(["commit", "-m", args.message.as_str()]);

        let out = git(root, &cmd).await?;
        if !out.success {
            let combined = format!("{}{}", out.stdout, out.stderr);
            if combined.contains("nothing to commit") || combined.contains("no changes added to commit") {
                return Ok(json!({
                    "committed": false,
                    "message": "nothing to commit",
                }));
            }
            return Err(ToolError::VcsError(format!("git commit: {}", combined.trim())));
        }

        let hash = git_checked(root, &["rev-parse", "HEAD"]).await?;

        Ok(json!({
            "committed": true,
            "hash": hash.trim(),
            "message": args.message,
        }))
    }

    async fn diff(&self, ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: DiffArgs = parse_arguments(input)?;
        let root = ctx.workspace.root();
        require_repo(root).await?;

        let path = args
            .path
            .as_deref()
            .map(|p| ctx.workspace.resolve(p).map(|r| ctx.workspace.relative(&r)))
            .transpose()?;

        let mut cmd = vec!["diff"];
        if args.staged {
            cmd.push("--cached");
        }
        if let Some(path) = &path {
            cmd.extend(["--", path.as_str()]);
        }

        let diff = git_checked(root, &cmd).await?;

        Ok(json!({
            "staged": args.staged,
            "empty": diff.trim().is_empty(),
            "diff": truncate_output(&diff, MAX_DIFF_LINES),
        }))
    }

    async fn log(&self, ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: LogArgs = parse_arguments(input)?;
        let root = ctx.workspace.root();
        require_repo(root).await?;

        let limit = args.limit.max(1).to_string();
        let out = git(
            root,
            &["log", "--pretty=format:%H|%an|%ad|%s", "--date=iso", "-n", limit.as_str()],
        )
        .await?;

        // A fresh repository has no HEAD yet
        if !out.success {
            if out.stderr.contains("does not have any commits") {
                return Ok(json!({"commits": []}));
            }
            return Err(ToolError::VcsError(format!("git log: {}", out.stderr.trim())));
        }

        Ok(json!({"commits": parse_log(&out.stdout)}))
    }

    async fn branch(&self, ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: BranchArgs = parse_arguments(input)?;
        let root = ctx.workspace.root();
        require_repo(root).await?;

        if let Some(name) = args.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if name.starts_with('-') {
                return Err(ToolError::InvalidArguments(format!("Invalid branch name: {name}")));
            }
            if args.create {
                git_checked(root, &["checkout", "-b", name]).await?;
            } else {
                git_checked(root, &["checkout", name]).await?;
            }
            return Ok(json!({"current": name, "created": args.create}));
        }

        let listing = git_checked(root, &["branch", "--list"]).await?;
        let mut current = None;
        let branches: Vec<String> = listing
            .lines()
            .filter_map(|line| {
                let name = line.trim_start_matches(['*', ' ']).trim();
                if name.is_empty() {
                    return None;
                }
                if line.starts_with('*') {
                    current = Some(name.to_string());
                }
                Some(name.to_string())
            })
            .collect();

        Ok(json!({"current": current, "branches": branches}))
    }
}

#[async_trait]
impl ToolHandler for GitHandler {
    fn definition(&self) -> ToolDefinition {
        match self.op {
            GitOp::Status => ToolDefinition::new("git_status", "Show changed files in the project repository")
                .with_schema(InputSchema::new()),
            GitOp::Add => ToolDefinition::new("git_add", "Stage files (all changes if no paths are given)")
                .with_schema(InputSchema::new().with_property("paths", json!({
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Paths to stage"
                }))),
            GitOp::Commit => ToolDefinition::new("git_commit", "Stage and commit changes")
                .with_schema(
                    InputSchema::new()
                        .with_property("message", json!({
                            "type": "string",
                            "description": "Commit message"
                        }))
                        .with_property("paths", json!({
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Paths to commit (default: everything)"
                        }))
                        .with_required(vec!["message".to_string()]),
                ),
            GitOp::Diff => ToolDefinition::new("git_diff", "Show uncommitted changes")
                .with_schema(
                    InputSchema::new()
                        .with_property("staged", json!({
                            "type": "boolean",
                            "description": "Show staged changes instead of the working tree"
                        }))
                        .with_property("path", json!({
                            "type": "string",
                            "description": "Limit the diff to one path"
                        })),
                ),
            GitOp::Log => ToolDefinition::new("git_log", "Show recent commits")
                .with_schema(InputSchema::new().with_property("limit", json!({
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of commits (default: 10)"
                }))),
            GitOp::Branch => ToolDefinition::new("git_branch", "List branches, or switch to (and optionally create) one")
                .with_schema(
                    InputSchema::new()
                        .with_property("name", json!({
                            "type": "string",
                            "description": "Branch to switch to"
                        }))
                        .with_property("create", json!({
                            "type": "boolean",
                            "description": "Create the branch first"
                        })),
                ),
        }
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(op = ?self.op)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        match self.op {
            GitOp::Status => self.status(ctx).await,
            GitOp::Add => self.add(ctx, &input).await,
            GitOp::Commit => self.commit(ctx, &input).await,
            GitOp::Diff => self.diff(ctx, &input).await,
            GitOp::Log => self.log(ctx, &input).await,
            GitOp::Branch => self.branch(ctx, &input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::temp_context;
    use std::fs;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_parse_status() {
        let files = parse_status(" M src/App.jsx\n?? src/Settings.jsx\n");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["status"], "M");
        assert_eq!(files[1]["path"], "src/Settings.jsx");
    }

    #[test]
    fn test_parse_log() {
        let commits = parse_log("abc123|Ann|2026-01-01 10:00:00 +0000|Add page | with pipe\n");
        assert_eq!(commits[0]["author"], "Ann");
        assert_eq!(commits[0]["message"], "Add page | with pipe");
    }

    #[tokio::test]
    async fn test_status_outside_repo() {
        if !git_available() {
            return;
        }
        let (_temp, ctx) = temp_context();
        let err = GitHandler { op: GitOp::Status }
            .execute(&ctx, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "vcs_error");
    }

    #[tokio::test]
    async fn test_commit_flow() {
        if !git_available() {
            return;
        }
        let (temp, ctx) = temp_context();
        fs::write(temp.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let commit = GitHandler { op: GitOp::Commit }
            .execute(&ctx, json!({"message": "Initial page"}))
            .await
            .unwrap();
        assert_eq!(commit["committed"], true);

        let again = GitHandler { op: GitOp::Commit }
            .execute(&ctx, json!({"message": "Nothing new"}))
            .await
            .unwrap();
        assert_eq!(again["committed"], false);
        assert_eq!(again["message"], "nothing to commit");

        let log = GitHandler { op: GitOp::Log }
            .execute(&ctx, json!({"limit": 5}))
            .await
            .unwrap();
        assert_eq!(log["commits"][0]["message"], "Initial page");

        let status = GitHandler { op: GitOp::Status }
            .execute(&ctx, json!({}))
            .await
            .unwrap();
        assert_eq!(status["clean"], true);
    }

    fn run_git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=t", "-c", "user.email=t@t"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    #[tokio::test]
    async fn test_enclosing_repository_is_never_touched() {
        if !git_available() {
            return;
        }
        let outer = tempfile::tempdir().unwrap();
        run_git(outer.path(), &["init", "-q"]);
        fs::write(outer.path().join("outside.txt"), "outer").unwrap();
        run_git(outer.path(), &["add", "outside.txt"]);

        let project = outer.path().join("project_1");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("index.html"), "<h1>hi</h1>").unwrap();
        let handle = crate::workspace::WorkspaceHandle::new(1, &project).unwrap();
        let ctx = ToolContext::new(handle, std::sync::Arc::new(crate::tools::ToolSettings::default()));

        // No repository of its own yet: read-only tools refuse.
        let err = GitHandler { op: GitOp::Status }
            .execute(&ctx, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "vcs_error");

        let commit = GitHandler { op: GitOp::Commit }
            .execute(&ctx, json!({"message": "Project page"}))
            .await
            .unwrap();
        assert_eq!(commit["committed"], true);
        assert!(project.join(".git").exists());

        let status = GitHandler { op: GitOp::Status }
            .execute(&ctx, json!({}))
            .await
            .unwrap();
        assert_eq!(status["clean"], true);
        assert!(!status.to_string().contains("outside.txt"));

        // The outer index still holds only its own staged file, uncommitted.
        let outer_status = std::process::Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(outer.path())
            .output()
            .unwrap();
        let outer_status = String::from_utf8_lossy(&outer_status.stdout);
        assert!(outer_status.contains("A  outside.txt"));
        let outer_head = std::process::Command::new("git")
            .args(["rev-parse", "--verify", "HEAD"])
            .current_dir(outer.path())
            .output()
            .unwrap();
        assert!(!outer_head.status.success());
    }

    #[tokio::test]
    async fn test_add_rejects_escaping_path() {
        if !git_available() {
            return;
        }
        let (_temp, ctx) = temp_context();
        let err = GitHandler { op: GitOp::Add }
            .execute(&ctx, json!({"paths": ["../outside"]}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "path_escape");
    }
}
