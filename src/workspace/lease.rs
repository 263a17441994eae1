// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Project resolution and exclusive per-project leases.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[cfg(feature = "telemetry")]
use tracing::debug;

use super::handle::{ChangedFile, WorkspaceHandle};
use crate::error::WorkspaceError;

/// Maps project ids to their directories under a base directory.
#[derive(Debug, Clone)]
pub struct ProjectResolver {
    projects_dir: PathBuf,
}

impl ProjectResolver {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Directory for a project, whether or not it exists.
    pub fn project_dir(&self, project_id: i64) -> PathBuf {
        self.projects_dir.join(format!("project_{project_id}"))
    }

    /// Resolve to an existing project root.
    pub fn resolve(&self, project_id: i64) -> Result<PathBuf, WorkspaceError> {
        let dir = self.project_dir(project_id);
        if !dir.is_dir() {
            return Err(WorkspaceError::ProjectNotFound(project_id));
        }
        Ok(dir)
    }
}

/// Hands out at most one live [`WorkspaceLease`] per project.
///
/// Leases on different projects never wait on each other.
pub struct WorkspaceLeases {
    resolver: ProjectResolver,
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl WorkspaceLeases {
    pub fn new(resolver: ProjectResolver) -> Self {
        Self {
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &ProjectResolver {
        &self.resolver
    }

    /// Wait for exclusive occupancy of a project and return its lease.
    pub async fn acquire(&self, project_id: i64) -> Result<WorkspaceLease, WorkspaceError> {
        let root = self.resolver.resolve(project_id)?;

        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(project_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        let handle = WorkspaceHandle::new(project_id, &root)?;

        #[cfg(feature = "telemetry")]
        debug!(project_id, root = %handle.root().display(), "Workspace lease acquired");

        Ok(WorkspaceLease {
            handle,
            _guard: guard,
        })
    }
}

/// Exclusive occupancy of one project root. Dropping it releases the lease.
#[derive(Debug)]
pub struct WorkspaceLease {
    handle: WorkspaceHandle,
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceLease {
    pub fn handle(&self) -> &WorkspaceHandle {
        &self.handle
    }

    /// Release the lease and return the files changed while it was held.
    pub fn release(self) -> Vec<ChangedFile> {
        let changes = self.handle.changed_files();

        #[cfg(feature = "telemetry")]
        debug!(
            project_id = self.handle.project_id(),
            changed = changes.len(),
            "Workspace lease released"
        );

        changes
    }
}
