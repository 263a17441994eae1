// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Explicit workspace handle threaded through every tool call.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

#[cfg(feature = "telemetry")]
use tracing::warn;

use crate::error::{ToolError, WorkspaceError};

/// How a file was affected during a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A changed-file descriptor reported in the `complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    pub change: ChangeKind,
}

struct HandleInner {
    project_id: i64,
    root: PathBuf,
    changes: Mutex<Vec<ChangedFile>>,
}

/// A project root plus the set of files touched through it.
///
/// Cloning is cheap; clones share the change log.
#[derive(Clone)]
pub struct WorkspaceHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for WorkspaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceHandle")
            .field("project_id", &self.inner.project_id)
            .field("root", &self.inner.root)
            .finish()
    }
}

impl WorkspaceHandle {
    /// Create a handle over an existing directory. The root is canonicalized.
    pub fn new(project_id: i64, root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root)
            .map_err(|_| WorkspaceError::ProjectNotFound(project_id))?;
        if !canonical.is_dir() {
            return Err(WorkspaceError::NotADirectory(canonical.display().to_string()));
        }

        Ok(Self {
            inner: Arc::new(HandleInner {
                project_id,
                root: canonical,
                changes: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn project_id(&self) -> i64 {
        self.inner.project_id
    }

    /// Canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Resolve a tool-supplied path to an absolute path inside the root.
    ///
    /// Relative paths join the root; absolute paths must already point inside
    /// it. `..` is folded lexically, then the deepest existing ancestor is
    /// canonicalized so symlinks cannot lead out. No file is touched.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidArguments("path must not be empty".to_string()));
        }

        let requested = Path::new(trimmed);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.inner.root.join(requested)
        };

        let normalized = normalize_lexically(&joined)
            .ok_or_else(|| ToolError::PathEscape(trimmed.to_string()))?;

        let resolved = canonicalize_existing_prefix(&normalized)
            .ok_or_else(|| ToolError::PathEscape(trimmed.to_string()))?;

        if !resolved.starts_with(&self.inner.root) {
            #[cfg(feature = "telemetry")]
            warn!(path = %trimmed, root = %self.inner.root.display(), "Rejected path outside workspace");
            return Err(ToolError::PathEscape(trimmed.to_string()));
        }

        Ok(resolved)
    }

    /// Display form of a resolved path relative to the root.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.inner.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        }
    }

    /// Record that a file was created, modified, or deleted.
    ///
    /// Repeated changes to one path collapse to their net effect.
    pub fn record_change(&self, path: &Path, change: ChangeKind) {
        let rel = self.relative(path);
        let mut changes = self.inner.changes.lock().unwrap_or_else(|e| e.into_inner());

        let Some(idx) = changes.iter().position(|c| c.path == rel) else {
            changes.push(ChangedFile { path: rel, change });
            return;
        };

        let merged = match (changes[idx].change, change) {
            (ChangeKind::Created, ChangeKind::Deleted) => None,
            (ChangeKind::Created, _) => Some(ChangeKind::Created),
            (ChangeKind::Deleted, ChangeKind::Created) => Some(ChangeKind::Modified),
            (_, next) => Some(next),
        };

        match merged {
            Some(kind) => changes[idx].change = kind,
            None => {
                changes.remove(idx);
            }
        }
    }

    /// Snapshot of the change log, in first-touch order.
    pub fn changed_files(&self) -> Vec<ChangedFile> {
        self.inner
            .changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Fold `.` and `..` without touching the filesystem.
///
/// Returns `None` if `..` would climb above the filesystem root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Canonicalize the deepest ancestor that exists and re-append the rest.
///
/// Uses `symlink_metadata` so a dangling link counts as existing; its
/// canonicalization then fails and the path is refused.
fn canonicalize_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    while std::fs::symlink_metadata(&existing).is_err() {
        let name = existing.file_name()?.to_os_string();
        tail.push(name);
        if !existing.pop() {
            return None;
        }
    }

    let mut resolved = std::fs::canonicalize(&existing).ok()?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    Some(resolved)
}
