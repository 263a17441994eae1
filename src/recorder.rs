// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Interaction recording.
//!
//! The orchestrator reports each observable step of a turn (a thought, a
//! tool call, a tool response) to an [`InteractionRecorder`], which
//! normalizes it into an [`AgentInteraction`], forwards it live to an
//! [`InteractionSink`], and keeps it for the turn's persisted message.
//!
//! Timestamps are strictly increasing within one recorder, so a response
//! can never carry a timestamp at or before its call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::agents::strip_completion_marker;
use crate::tools::ToolOutcome;
use crate::types::ToolCall;

/// Kind of an observable step inside an assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Thought,
    ToolCall,
    ToolResponse,
}

/// One observable step inside an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInteraction {
    pub agent_name: String,
    pub kind: InteractionKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_arguments: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Receives interactions as they are produced.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    async fn interaction(&self, interaction: &AgentInteraction);
}

/// Sink that drops everything.
pub struct NullSink;

#[async_trait]
impl InteractionSink for NullSink {
    async fn interaction(&self, _interaction: &AgentInteraction) {}
}

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    agent: String,
}

/// Normalizes a task's turns into ordered interactions.
pub struct InteractionRecorder<'a, S: InteractionSink + ?Sized> {
    sink: &'a S,
    last_timestamp: Option<DateTime<Utc>>,
    pending: Vec<PendingCall>,
    turn: Vec<AgentInteraction>,
}

impl<'a, S: InteractionSink + ?Sized> InteractionRecorder<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self {
            sink,
            last_timestamp: None,
            pending: Vec::new(),
            turn: Vec::new(),
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    async fn emit(&mut self, interaction: AgentInteraction) {
        self.sink.interaction(&interaction).await;
        self.turn.push(interaction);
    }

    /// Record the narrative part of a turn. Text that is empty once the
    /// completion marker is removed is not recorded.
    pub async fn thought(&mut self, agent: &str, text: &str) -> bool {
        let (stripped, _) = strip_completion_marker(text);
        if stripped.is_empty() {
            return false;
        }

        let timestamp = self.next_timestamp();
        self.emit(AgentInteraction {
            agent_name: agent.to_string(),
            kind: InteractionKind::Thought,
            content: stripped,
            tool_name: None,
            tool_arguments: None,
            timestamp,
        })
        .await;
        true
    }

    /// Record an attempted tool invocation.
    pub async fn tool_call(&mut self, agent: &str, call: &ToolCall) {
        self.pending.push(PendingCall {
            id: call.id.clone(),
            name: call.name.clone(),
            agent: agent.to_string(),
        });

        let timestamp = self.next_timestamp();
        self.emit(AgentInteraction {
            agent_name: agent.to_string(),
            kind: InteractionKind::ToolCall,
            content: format!("Calling tool: {}", call.name),
            tool_name: Some(call.name.clone()),
            tool_arguments: Some(call.input.clone()),
            timestamp,
        })
        .await;
    }

    /// Record the outcome of a call made earlier with [`tool_call`].
    ///
    /// The response is attributed to the agent that made the call. A
    /// response is paired by call id, falling back to the oldest unmatched
    /// call of the same tool.
    ///
    /// [`tool_call`]: Self::tool_call
    pub async fn tool_response(&mut self, call_id: &str, tool_name: &str, outcome: &ToolOutcome) {
        let position = self
            .pending
            .iter()
            .position(|p| p.id == call_id)
            .or_else(|| self.pending.iter().position(|p| p.name == tool_name));

        let agent = match position {
            Some(idx) => self.pending.remove(idx).agent,
            None => {
                #[cfg(feature = "telemetry")]
                warn!(tool = tool_name, call_id, "Tool response without a matching call");
                "System".to_string()
            }
        };

        let timestamp = self.next_timestamp();
        self.emit(AgentInteraction {
            agent_name: agent,
            kind: InteractionKind::ToolResponse,
            content: outcome.to_json_string(),
            tool_name: Some(tool_name.to_string()),
            tool_arguments: None,
            timestamp,
        })
        .await;
    }

    /// Calls still waiting for a response.
    pub fn unmatched_calls(&self) -> usize {
        self.pending.len()
    }

    /// Take the interactions recorded since the last call.
    pub fn take_turn(&mut self) -> Vec<AgentInteraction> {
        #[cfg(feature = "telemetry")]
        debug!(interactions = self.turn.len(), "Turn recorded");
        std::mem::take(&mut self.turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<AgentInteraction>>,
    }

    #[async_trait]
    impl InteractionSink for CollectingSink {
        async fn interaction(&self, interaction: &AgentInteraction) {
            self.seen.lock().unwrap().push(interaction.clone());
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({"path": "src/main.js"}),
        }
    }

    #[tokio::test]
    async fn test_call_response_pairing_and_order() {
        let sink = CollectingSink::default();
        let mut recorder = InteractionRecorder::new(&sink);

        recorder.thought("Coder", "I'll add the log line.").await;
        recorder.tool_call("Coder", &call("c1", "read_file")).await;
        recorder.tool_response("c1", "read_file", &ToolOutcome::ok(json!({"content": "x"}))).await;
        recorder.tool_call("Coder", &call("c2", "edit_file")).await;
        recorder.tool_response("c2", "edit_file", &ToolOutcome::ok(json!({"replacements": 1}))).await;

        let seen = sink.seen.lock().unwrap().clone();
        let kinds: Vec<_> = seen.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InteractionKind::Thought,
                InteractionKind::ToolCall,
                InteractionKind::ToolResponse,
                InteractionKind::ToolCall,
                InteractionKind::ToolResponse,
            ]
        );
        assert_eq!(seen[2].agent_name, "Coder");
        assert_eq!(seen[2].tool_name.as_deref(), Some("read_file"));
        assert_eq!(seen[1].tool_arguments, Some(json!({"path": "src/main.js"})));
        assert!(seen[2].content.contains("\"success\":true"));
        assert_eq!(recorder.unmatched_calls(), 0);

        assert_eq!(recorder.take_turn().len(), 5);
        assert!(recorder.take_turn().is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let mut recorder = InteractionRecorder::new(&NullSink);
        for i in 0..50 {
            recorder.tool_call("Coder", &call(&i.to_string(), "list_dir")).await;
            recorder
                .tool_response(&i.to_string(), "list_dir", &ToolOutcome::ok(json!({})))
                .await;
        }
        let turn = recorder.take_turn();
        assert!(turn.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_marker_only_thought_is_skipped() {
        let sink = CollectingSink::default();
        let mut recorder = InteractionRecorder::new(&sink);

        assert!(!recorder.thought("Coder", "  TASK_COMPLETED \n").await);
        assert!(recorder.thought("Coder", "Done. TASK_COMPLETED").await);

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content, "Done.");
    }

    #[tokio::test]
    async fn test_response_falls_back_to_tool_name() {
        let mut recorder = InteractionRecorder::new(&NullSink);
        recorder.tool_call("Coder", &call("a", "write_file")).await;
        recorder
            .tool_response("unknown", "write_file", &ToolOutcome::ok(json!({})))
            .await;
        assert_eq!(recorder.unmatched_calls(), 0);

        let turn = recorder.take_turn();
        assert_eq!(turn[1].agent_name, "Coder");
    }

    #[test]
    fn test_interaction_wire_shape() {
        let interaction = AgentInteraction {
            agent_name: "Planner".to_string(),
            kind: InteractionKind::Thought,
            content: "Plan".to_string(),
            tool_name: None,
            tool_arguments: None,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&interaction).unwrap();
        assert_eq!(value["kind"], "thought");
        assert!(value.get("tool_name").is_none());
    }
}
