// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only snapshot of project files used to seed a task.

use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

use super::handle::WorkspaceHandle;

/// Directories never included in snapshots or listings.
pub const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// Default number of characters previewed per file.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Default cap on the number of files in a snapshot.
pub const DEFAULT_MAX_FILES: usize = 200;

/// Returns true for entries under one of the [`IGNORED_DIRS`].
pub fn is_ignored(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotFile {
    pub path: String,
    /// First characters of the file, `None` for binary content.
    pub preview: Option<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectSnapshot {
    pub files: Vec<SnapshotFile>,
    /// Set when `max_files` cut the listing short.
    pub omitted: usize,
}

impl ProjectSnapshot {
    /// Walk the workspace and preview each text file.
    ///
    /// Blocking; call from `spawn_blocking` in async code.
    pub fn capture(handle: &WorkspaceHandle, max_files: usize, preview_chars: usize) -> Self {
        let root = handle.root();
        let mut paths: Vec<_> = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(&e.file_name().to_string_lossy()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        let omitted = paths.len().saturating_sub(max_files);
        paths.truncate(max_files);

        let files = paths
            .iter()
            .map(|path| {
                let (preview, truncated) = preview_file(path, preview_chars);
                SnapshotFile {
                    path: handle.relative(path),
                    preview,
                    truncated,
                }
            })
            .collect();

        Self { files, omitted }
    }

    /// Text block appended to the seed message.
    pub fn render(&self) -> String {
        if self.files.is_empty() {
            return "The project is empty.".to_string();
        }

        let mut out = format!("Existing files ({}):\n", self.files.len() + self.omitted);
        for file in &self.files {
            out.push_str(&format!("- {}\n", file.path));
        }
        if self.omitted > 0 {
            out.push_str(&format!("- ... and {} more\n", self.omitted));
        }

        for file in &self.files {
            if let Some(preview) = &file.preview {
                if preview.trim().is_empty() {
                    continue;
                }
                out.push_str(&format!("\n--- {} ---\n{}", file.path, preview));
                if file.truncated {
                    out.push_str("\n[...]");
                }
                out.push('\n');
            }
        }
        out
    }
}

fn preview_file(path: &Path, preview_chars: usize) -> (Option<String>, bool) {
    let Ok(bytes) = std::fs::read(path) else {
        return (None, false);
    };
    if bytes.contains(&0) {
        return (None, false);
    }
    let Ok(text) = String::from_utf8(bytes) else {
        return (None, false);
    };

    let mut chars = text.char_indices();
    match chars.nth(preview_chars) {
        Some((cut, _)) => (Some(text[..cut].to_string()), true),
        None => (Some(text), false),
    }
}
