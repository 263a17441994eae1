// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool handler implementations.
//!
//! One module per tool family. Handlers receive a [`ToolContext`] and must
//! resolve every path through its workspace handle.
//!
//! [`ToolContext`]: crate::tools::ToolContext

mod csv;
mod delete_file;
mod edit_file;
mod file_search;
mod git;
mod glob_search;
mod grep_search;
mod json;
mod list_dir;
mod read_file;
mod terminal;
mod web_search;
mod write_file;

pub use csv::{CsvReadHandler, CsvWriteHandler};
pub use delete_file::DeleteFileHandler;
pub use edit_file::EditFileHandler;
pub use file_search::FileSearchHandler;
pub use git::{GitHandler, GitOp};
pub use glob_search::GlobSearchHandler;
pub use grep_search::GrepSearchHandler;
pub use json::{JsonReadHandler, JsonValidateHandler, JsonWriteHandler};
pub use list_dir::ListDirHandler;
pub use read_file::ReadFileHandler;
pub use terminal::{TerminalHandler, BLOCKED_COMMANDS};
pub use web_search::WebSearchHandler;
pub use write_file::WriteFileHandler;

use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::error::ToolError;
use crate::workspace::is_ignored;

/// Map an I/O failure on `raw` to the matching tool error.
pub(crate) fn map_io_error(raw: &str, e: io::Error, action: &str) -> ToolError {
    match e.kind() {
        io::ErrorKind::NotFound => ToolError::FileNotFound(raw.to_string()),
        io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(raw.to_string()),
        _ => ToolError::IoError(format!("Failed to {action} {raw}: {e}")),
    }
}

/// Regular files under `root`, skipping ignored directories. Symlinks are
/// not followed.
pub(crate) fn workspace_files(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && entry.file_name().to_str().map(is_ignored).unwrap_or(false))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
}
