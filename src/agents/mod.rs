// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The two agent roles and the provider-backed roster that plays them.
//!
//! The Planner answers with strategy text and is never offered tools. The
//! Coder is offered the whole tool catalog and finishes a task by ending a
//! message with [`COMPLETION_MARKER`].

pub mod prompts;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "telemetry")]
use std::time::Instant;
#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{Message, ProviderResponse, SharedProvider, ToolDefinition};

pub use prompts::{CODER_SYSTEM_PROMPT, CONTINUE_PROMPT, PLANNER_SYSTEM_PROMPT};

/// Token the Coder emits to say the task is finished.
pub const COMPLETION_MARKER: &str = "TASK_COMPLETED";

/// Provider calls per agent turn, counting the first.
pub const DEFAULT_PROVIDER_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles on each further one.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Remove every completion marker from `text`.
///
/// Returns the trimmed remainder and whether a marker was present.
pub fn strip_completion_marker(text: &str) -> (String, bool) {
    if !text.contains(COMPLETION_MARKER) {
        return (text.trim().to_string(), false);
    }
    (text.replace(COMPLETION_MARKER, "").trim().to_string(), true)
}

/// A participant in a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Planner,
    Coder,
}

impl AgentRole {
    /// Name recorded on interactions and stored messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Planner => "Planner",
            Self::Coder => "Coder",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Both roles, backed by one provider.
pub struct AgentRoster {
    provider: SharedProvider,
    tools: Vec<ToolDefinition>,
    planner_prompt: String,
    coder_prompt: String,
    attempts: u32,
    backoff: Duration,
}

impl AgentRoster {
    /// A roster whose Coder is offered `tools`.
    pub fn new(provider: SharedProvider, tools: Vec<ToolDefinition>) -> Self {
        Self {
            provider,
            tools,
            planner_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
            coder_prompt: CODER_SYSTEM_PROMPT.to_string(),
            attempts: DEFAULT_PROVIDER_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Retry transient provider failures up to `attempts` calls in total.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Replace a role's system prompt.
    pub fn with_prompt(mut self, role: AgentRole, prompt: impl Into<String>) -> Self {
        match role {
            AgentRole::Planner => self.planner_prompt = prompt.into(),
            AgentRole::Coder => self.coder_prompt = prompt.into(),
        }
        self
    }

    pub fn system_prompt(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Planner => &self.planner_prompt,
            AgentRole::Coder => &self.coder_prompt,
        }
    }

    /// Tool definitions offered to `role`.
    pub fn tools_for(&self, role: AgentRole) -> Option<&[ToolDefinition]> {
        match role {
            AgentRole::Planner => None,
            AgentRole::Coder => Some(&self.tools),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Ask `role` for its next message given its view of the conversation.
    ///
    /// Tool calls in a Planner response are dropped: the Planner never acts.
    pub async fn respond(&self, role: AgentRole, transcript: &[Message]) -> Result<ProviderResponse, ProviderError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();
        #[cfg(feature = "telemetry")]
        debug!(role = %role, messages = transcript.len(), "Requesting agent turn");

        let mut response = self.chat_with_retry(role, transcript).await?;

        if role == AgentRole::Planner && response.has_tool_calls() {
            #[cfg(feature = "telemetry")]
            warn!(calls = response.tool_calls.len(), "Dropping tool calls from Planner");
            response.tool_calls.clear();
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(
            match role {
                AgentRole::Planner => "agent.planner",
                AgentRole::Coder => "agent.coder",
            },
            start.elapsed(),
        );

        Ok(response)
    }

    /// Only rate limits, timeouts and network failures are retried.
    async fn chat_with_retry(&self, role: AgentRole, transcript: &[Message]) -> Result<ProviderResponse, ProviderError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self
                .provider
                .chat(transcript, self.tools_for(role), Some(self.system_prompt(role)))
                .await
            {
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    #[cfg(feature = "telemetry")]
                    warn!(role = %role, attempt, error = %err, "Provider call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
