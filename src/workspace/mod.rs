// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Project workspaces.
//!
//! A task never changes the process working directory. Instead it acquires a
//! [`WorkspaceLease`] for its project, and every tool receives the lease's
//! [`WorkspaceHandle`], which confines paths to the project root and records
//! which files were touched.
//!
//! - [`ProjectResolver`] - project id to `project_{id}` directory
//! - [`WorkspaceLeases`] - one live lease per project
//! - [`ProjectSnapshot`] - file listing with previews for task seeding

pub mod handle;
pub mod lease;
pub mod snapshot;

pub use handle::{ChangeKind, ChangedFile, WorkspaceHandle};
pub use lease::{ProjectResolver, WorkspaceLease, WorkspaceLeases};
pub use snapshot::{is_ignored, ProjectSnapshot, SnapshotFile, IGNORED_DIRS};
