// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task inputs, FSM states and task outcomes.

use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;
use crate::config::{ResolvedConfig, DEFAULT_MAX_ROUNDS, DEFAULT_PREVIEW_CHARS, DEFAULT_SNAPSHOT_MAX_FILES};
use crate::session::StoredMessage;
use crate::workspace::ChangedFile;

/// Explicit routing hint attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestTag {
    Simple,
    Direct,
    Plan,
    Complex,
}

impl RequestTag {
    /// The speaker this tag asks for.
    pub fn speaker(self) -> AgentRole {
        match self {
            Self::Simple | Self::Direct => AgentRole::Coder,
            Self::Plan | Self::Complex => AgentRole::Planner,
        }
    }
}

impl std::str::FromStr for RequestTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "direct" => Ok(Self::Direct),
            "plan" => Ok(Self::Plan),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown request tag: {other}")),
        }
    }
}

/// One user request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub message: String,
    #[serde(default)]
    pub tags: Vec<RequestTag>,
}

impl TaskRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: RequestTag) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Conditions observed after a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationFlags {
    /// The last turn carried the completion marker.
    pub completion_marker: bool,
    pub round_limit_reached: bool,
    pub fatal_error: bool,
}

/// Why a task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    RoundLimit,
    Failed,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::RoundLimit => "round_limit",
            Self::Failed => "failed",
        }
    }
}

/// Result of one FSM step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Speak(AgentRole),
    Stop(Termination),
}

/// Limits for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub max_rounds: usize,
    pub snapshot_max_files: usize,
    pub preview_chars: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            snapshot_max_files: DEFAULT_SNAPSHOT_MAX_FILES,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl From<&ResolvedConfig> for OrchestratorSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            max_rounds: config.max_rounds.max(1),
            snapshot_max_files: config.snapshot_max_files,
            preview_chars: config.snapshot_preview_chars,
        }
    }
}

/// A finished (not failed) task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Last assistant message of the task.
    pub final_message: StoredMessage,
    pub termination: Termination,
    pub rounds: usize,
    pub changed_files: Vec<ChangedFile>,
}

impl TaskOutcome {
    /// True when the round limit stopped the task.
    pub fn incomplete(&self) -> bool {
        self.termination == Termination::RoundLimit
    }
}
