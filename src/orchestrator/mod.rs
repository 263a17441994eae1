// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task orchestration.
//!
//! [`Orchestrator::run`] plays one task against a leased workspace: it seeds
//! the conversation with the request and a project snapshot, asks
//! [`routing::next_speaker`] who speaks next, runs that agent's turn, and
//! stops on the completion marker, the round limit, or a fatal error.
//!
//! Each completed turn is persisted as one assistant message as soon as it
//! ends, so a reconnecting client sees progress while the task runs. Tool
//! calls inside a turn are dispatched one at a time, in order.

mod routing;
mod types;

pub use routing::{next_speaker, RoutingPolicy};
pub use types::{
    Next, OrchestratorSettings, RequestTag, TaskOutcome, TaskRequest, Termination, TerminationFlags,
};

use std::sync::Arc;

#[cfg(feature = "telemetry")]
use tracing::{debug, info, Instrument};

#[cfg(feature = "telemetry")]
use crate::telemetry::{TaskResult, TaskSpan, GLOBAL_METRICS};

use crate::agents::{strip_completion_marker, AgentRole, AgentRoster, CONTINUE_PROMPT};
use crate::config::ResolvedConfig;
use crate::error::TaskError;
use crate::recorder::{InteractionRecorder, InteractionSink};
use crate::session::{NewMessage, SessionId, SessionStore, StoredMessage};
use crate::tools::{ToolContext, ToolRegistry, ToolSettings};
use crate::types::{ContentBlock, Message, Role, SharedProvider};
use crate::workspace::{ProjectSnapshot, WorkspaceHandle};

/// Agent name on messages written by the orchestrator itself.
pub const SYSTEM_AGENT: &str = "System";

/// What one turn left behind.
struct TurnResult {
    completed: bool,
    message: Option<StoredMessage>,
}

/// Per-task conversation state. The Planner and the Coder see different
/// transcripts: the Planner never sees tool traffic.
struct Conversation {
    planner: Vec<Message>,
    coder: Vec<Message>,
}

/// Runs tasks. Shared across requests; holds no per-task state.
pub struct Orchestrator {
    roster: AgentRoster,
    registry: Arc<ToolRegistry>,
    tool_settings: Arc<ToolSettings>,
    policy: RoutingPolicy,
    settings: OrchestratorSettings,
    store: SessionStore,
}

impl Orchestrator {
    /// An orchestrator over the full tool catalog with default limits.
    pub fn new(provider: SharedProvider, store: SessionStore) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        Self {
            roster: AgentRoster::new(provider, registry.definitions()),
            registry,
            tool_settings: Arc::new(ToolSettings::default()),
            policy: RoutingPolicy::default(),
            settings: OrchestratorSettings::default(),
            store,
        }
    }

    /// An orchestrator configured from a resolved config.
    pub fn from_config(config: &ResolvedConfig, provider: SharedProvider, store: SessionStore) -> Self {
        Self::new(provider, store)
            .with_policy(RoutingPolicy::from(&config.routing))
            .with_settings(OrchestratorSettings::from(config))
            .with_tool_settings(ToolSettings::from(config))
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tool_settings(mut self, settings: ToolSettings) -> Self {
        self.tool_settings = Arc::new(settings);
        self
    }

    /// Replace the roster, e.g. to use custom prompts.
    pub fn with_roster(mut self, roster: AgentRoster) -> Self {
        self.roster = roster;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    /// Run one task to termination.
    ///
    /// Interactions reach `sink` as they are produced. Returns the final
    /// message on completion or round-limit exhaustion; any model, storage
    /// or internal failure ends the task with an error. Tool effects already
    /// applied are kept either way.
    pub async fn run<S: InteractionSink + ?Sized>(
        &self,
        workspace: &WorkspaceHandle,
        session_id: SessionId,
        request: &TaskRequest,
        sink: &S,
    ) -> Result<TaskOutcome, TaskError> {
        #[cfg(feature = "telemetry")]
        {
            let task_span = TaskSpan::start(workspace.project_id(), session_id);
            let result = self
                .drive(workspace, session_id, request, sink)
                .instrument(task_span.span().clone())
                .await;

            let termination = match &result {
                Ok(outcome) => {
                    task_span.record_rounds(outcome.rounds);
                    outcome.termination
                }
                Err(_) => Termination::Failed,
            };
            GLOBAL_METRICS.record_task(match termination {
                Termination::Completed => TaskResult::Completed,
                Termination::RoundLimit => TaskResult::RoundLimit,
                Termination::Failed => TaskResult::Failed,
            });
            task_span.finish(termination.as_str(), &result);
            result
        }

        #[cfg(not(feature = "telemetry"))]
        self.drive(workspace, session_id, request, sink).await
    }

    async fn drive<S: InteractionSink + ?Sized>(
        &self,
        workspace: &WorkspaceHandle,
        session_id: SessionId,
        request: &TaskRequest,
        sink: &S,
    ) -> Result<TaskOutcome, TaskError> {
        let seed = self.seed_message(workspace, request).await?;
        let mut conversation = Conversation {
            planner: vec![Message::user(seed.clone())],
            coder: vec![Message::user(seed)],
        };
        let ctx = ToolContext::new(workspace.clone(), self.tool_settings.clone());
        let mut recorder = InteractionRecorder::new(sink);

        let initial = self.policy.initial_speaker(request);
        #[cfg(feature = "telemetry")]
        info!(initial = %initial, max_rounds = self.settings.max_rounds, "Task started");

        let mut last: Option<AgentRole> = None;
        let mut flags = TerminationFlags::default();
        let mut rounds = 0;
        let mut final_message: Option<StoredMessage> = None;
        let mut failure: Option<TaskError> = None;

        let termination = loop {
            let role = match next_speaker(initial, last, flags) {
                Next::Speak(role) => role,
                Next::Stop(termination) => break termination,
            };
            rounds += 1;

            #[cfg(feature = "telemetry")]
            debug!(round = rounds, speaker = %role, "Turn started");

            let turn = match role {
                AgentRole::Planner => self.planner_turn(&mut recorder, session_id, &mut conversation).await,
                AgentRole::Coder => {
                    self.coder_turn(&ctx, &mut recorder, session_id, &mut conversation)
                        .await
                }
            };

            match turn {
                Ok(turn) => {
                    flags.completion_marker = turn.completed;
                    if turn.message.is_some() {
                        final_message = turn.message;
                    }
                }
                Err(err) => {
                    flags.fatal_error = true;
                    failure = Some(err);
                }
            }
            flags.round_limit_reached = rounds >= self.settings.max_rounds;
            last = Some(role);
        };

        if termination == Termination::Failed {
            return Err(failure.unwrap_or_else(|| TaskError::Internal("task stopped without a cause".to_string())));
        }

        let final_message = match final_message {
            Some(message) => message,
            None => {
                let content = match termination {
                    Termination::RoundLimit => {
                        format!("Stopped after {rounds} rounds before the task was finished.")
                    }
                    _ => "Task completed.".to_string(),
                };
                self.store
                    .append(session_id, NewMessage::assistant(SYSTEM_AGENT, content, Vec::new()))
                    .await?
            }
        };

        Ok(TaskOutcome {
            final_message,
            termination,
            rounds,
            changed_files: workspace.changed_files(),
        })
    }

    /// The user request followed by a listing of the project.
    async fn seed_message(&self, workspace: &WorkspaceHandle, request: &TaskRequest) -> Result<String, TaskError> {
        let handle = workspace.clone();
        let max_files = self.settings.snapshot_max_files;
        let preview_chars = self.settings.preview_chars;
        let snapshot = tokio::task::spawn_blocking(move || ProjectSnapshot::capture(&handle, max_files, preview_chars))
            .await
            .map_err(|e| TaskError::Internal(format!("project snapshot failed: {e}")))?;

        Ok(format!(
            "{}\n\n## Project files\n\n{}",
            request.message.trim(),
            snapshot.render()
        ))
    }

    async fn planner_turn<S: InteractionSink + ?Sized>(
        &self,
        recorder: &mut InteractionRecorder<'_, S>,
        session_id: SessionId,
        conversation: &mut Conversation,
    ) -> Result<TurnResult, TaskError> {
        let response = self.roster.respond(AgentRole::Planner, &conversation.planner).await?;
        let (plan, _) = strip_completion_marker(&response.content);
        if plan.is_empty() {
            return Err(TaskError::MalformedOutput("the Planner returned an empty response".to_string()));
        }

        let name = AgentRole::Planner.display_name();
        recorder.thought(name, &response.content).await;

        conversation.planner.push(Message::assistant(plan.clone()));
        conversation
            .coder
            .push(Message::user(format!("Plan from the Planner:\n\n{plan}")));

        let stored = self
            .store
            .append(session_id, NewMessage::assistant(name, plan, recorder.take_turn()))
            .await?;

        Ok(TurnResult {
            completed: false,
            message: Some(stored),
        })
    }

    async fn coder_turn<S: InteractionSink + ?Sized>(
        &self,
        ctx: &ToolContext,
        recorder: &mut InteractionRecorder<'_, S>,
        session_id: SessionId,
        conversation: &mut Conversation,
    ) -> Result<TurnResult, TaskError> {
        let response = self.roster.respond(AgentRole::Coder, &conversation.coder).await?;
        if response.content.trim().is_empty() && !response.has_tool_calls() {
            return Err(TaskError::MalformedOutput(
                "the Coder returned neither text nor tool calls".to_string(),
            ));
        }

        let name = AgentRole::Coder.display_name();
        let (text, completed) = strip_completion_marker(&response.content);
        recorder.thought(name, &response.content).await;

        let mut blocks = Vec::with_capacity(response.tool_calls.len() + 1);
        if !response.content.is_empty() {
            blocks.push(ContentBlock::text(response.content.clone()));
        }
        for call in &response.tool_calls {
            blocks.push(ContentBlock::tool_use(&call.id, &call.name, call.input.clone()));
        }
        conversation.coder.push(Message::with_blocks(Role::Assistant, blocks));

        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            recorder.tool_call(name, call).await;
            let dispatched = self.registry.dispatch(ctx, &call.name, call.input.clone()).await;
            recorder.tool_response(&call.id, &call.name, &dispatched.outcome).await;
            results.push(ContentBlock::tool_result(
                &call.id,
                dispatched.outcome.to_json_string(),
                dispatched.is_error(),
            ));
        }

        if !results.is_empty() {
            conversation.coder.push(Message::with_blocks(Role::User, results));
        } else if !completed {
            conversation.coder.push(Message::user(CONTINUE_PROMPT));
        }

        let interactions = recorder.take_turn();
        if text.is_empty() && interactions.is_empty() {
            return Ok(TurnResult {
                completed,
                message: None,
            });
        }

        let content = if text.is_empty() {
            let tools: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
            format!("Used tools: {}", tools.join(", "))
        } else {
            text
        };
        let stored = self
            .store
            .append(session_id, NewMessage::assistant(name, content, interactions))
            .await?;

        Ok(TurnResult {
            completed,
            message: Some(stored),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::ReplayProvider;
    use crate::recorder::{AgentInteraction, InteractionKind, NullSink};
    use crate::types::{ProviderResponse, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

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

    impl CollectingSink {
        fn kinds(&self) -> Vec<(String, InteractionKind)> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|i| (i.agent_name.clone(), i.kind))
                .collect()
        }
    }

    fn call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }

    async fn setup(script: Vec<ProviderResponse>) -> (TempDir, WorkspaceHandle, Orchestrator, Arc<ReplayProvider>, SessionId) {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("index.js"), "console.log('start');\n").unwrap();
        let workspace = WorkspaceHandle::new(1, temp.path()).unwrap();

        let provider = Arc::new(ReplayProvider::new(script));
        let store = SessionStore::in_memory().unwrap();
        let session_id = store.create_session(1, None).await.unwrap().id;
        let orchestrator = Orchestrator::new(provider.clone(), store);
        (temp, workspace, orchestrator, provider, session_id)
    }

    #[tokio::test]
    async fn test_simple_edit_goes_straight_to_coder() {
        let (temp, workspace, orchestrator, provider, session_id) = setup(vec![
            ProviderResponse::with_tool_calls(
                "Adding the log line.",
                vec![call(
                    "c1",
                    "edit_file",
                    json!({"path": "index.js", "old_string": "console.log('start');", "new_string": "console.log('start');\nconsole.log('ready');"}),
                )],
            ),
            ProviderResponse::text("Added a console log to index.js.\n\nTASK_COMPLETED"),
        ])
        .await;

        let sink = CollectingSink::default();
        let request = TaskRequest::new("add a console log to the entry file").with_tag(RequestTag::Simple);
        let outcome = orchestrator.run(&workspace, session_id, &request, &sink).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(!outcome.incomplete());
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.final_message.content, "Added a console log to index.js.");
        assert_eq!(outcome.final_message.agent_name.as_deref(), Some("Coder"));
        assert_eq!(outcome.changed_files.len(), 1);

        let written = std::fs::read_to_string(temp.path().join("index.js")).unwrap();
        assert!(written.contains("console.log('ready');"));

        let coder = "Coder".to_string();
        assert_eq!(
            sink.kinds(),
            vec![
                (coder.clone(), InteractionKind::Thought),
                (coder.clone(), InteractionKind::ToolCall),
                (coder.clone(), InteractionKind::ToolResponse),
                (coder, InteractionKind::Thought),
            ]
        );
        let seen = sink.seen.lock().unwrap();
        assert!(seen[2].content.contains("\"success\":true"));

        // The Coder spoke first and was offered tools.
        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].tool_count > 0);
        assert!(calls[0].last_text.contains("## Project files"));
    }

    #[tokio::test]
    async fn test_complex_request_starts_with_planner() {
        let (temp, workspace, orchestrator, provider, session_id) = setup(vec![
            ProviderResponse::text("PLAN: settings page\n1. Create settings.html"),
            ProviderResponse::with_tool_calls(
                "",
                vec![call("w1", "write_file", json!({"path": "settings.html", "content": "<h1>Settings</h1>"}))],
            ),
            ProviderResponse::text("Created settings.html. TASK_COMPLETED"),
        ])
        .await;

        let sink = CollectingSink::default();
        let request = TaskRequest::new("design and build a settings page");
        let outcome = orchestrator.run(&workspace, session_id, &request, &sink).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(temp.path().join("settings.html").exists());

        let kinds = sink.kinds();
        assert_eq!(kinds[0], ("Planner".to_string(), InteractionKind::Thought));
        assert_eq!(kinds[1], ("Coder".to_string(), InteractionKind::ToolCall));

        let calls = provider.calls();
        assert_eq!(calls[0].tool_count, 0);
        assert!(calls[1].last_text.contains("Plan from the Planner"));

        // Planner, tool-only Coder turn, final Coder turn.
        let session = orchestrator.store().get(session_id).await.unwrap().unwrap();
        let agents: Vec<_> = session.messages.iter().map(|m| m.agent_name.clone().unwrap()).collect();
        assert_eq!(agents, vec!["Planner", "Coder", "Coder"]);
        assert_eq!(session.messages[1].content, "Used tools: write_file");
        assert_eq!(session.messages[1].interactions.len(), 2);
    }

    #[tokio::test]
    async fn test_round_limit_returns_last_message_as_incomplete() {
        let (_temp, workspace, orchestrator, provider, session_id) = setup(vec![
            ProviderResponse::text("Looking around."),
            ProviderResponse::text("Still thinking."),
            ProviderResponse::text("never served"),
        ])
        .await;
        let orchestrator = orchestrator.with_settings(OrchestratorSettings {
            max_rounds: 2,
            ..Default::default()
        });

        let request = TaskRequest::new("fix it").with_tag(RequestTag::Direct);
        let outcome = orchestrator.run(&workspace, session_id, &request, &NullSink).await.unwrap();

        assert_eq!(outcome.termination, Termination::RoundLimit);
        assert!(outcome.incomplete());
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.final_message.content, "Still thinking.");
        assert_eq!(provider.remaining(), 1);
        assert!(provider.calls()[1].last_text.contains("TASK_COMPLETED"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_fatal() {
        let (_temp, workspace, orchestrator, _provider, session_id) =
            setup(vec![ProviderResponse::text("PLAN: 1. do it")]).await;

        let request = TaskRequest::new("build a feature");
        let err = orchestrator
            .run(&workspace, session_id, &request, &NullSink)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Provider(ProviderError::ScriptExhausted(1))));
        // The Planner turn was kept.
        let session = orchestrator.store().get(session_id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_is_malformed() {
        let (_temp, workspace, orchestrator, _provider, session_id) =
            setup(vec![ProviderResponse::text("   ")]).await;

        let request = TaskRequest::new("tweak").with_tag(RequestTag::Simple);
        let err = orchestrator
            .run(&workspace, session_id, &request, &NullSink)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_path_escape_is_reported_and_task_continues() {
        let (temp, workspace, orchestrator, _provider, session_id) = setup(vec![
            ProviderResponse::with_tool_calls(
                "Writing outside.",
                vec![call("x", "write_file", json!({"path": "../escaped.txt", "content": "nope"}))],
            ),
            ProviderResponse::text("Could not write there. TASK_COMPLETED"),
        ])
        .await;

        let sink = CollectingSink::default();
        let request = TaskRequest::new("fix").with_tag(RequestTag::Simple);
        let outcome = orchestrator.run(&workspace, session_id, &request, &sink).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.changed_files.is_empty());
        assert!(!temp.path().parent().unwrap().join("escaped.txt").exists());

        let seen = sink.seen.lock().unwrap();
        let response = seen.iter().find(|i| i.kind == InteractionKind::ToolResponse).unwrap();
        assert!(response.content.contains("\"success\":false"));
        assert!(response.content.contains("path_escape"));
    }

    #[tokio::test]
    async fn test_marker_only_completion_gets_fallback_message() {
        let (_temp, workspace, orchestrator, _provider, session_id) =
            setup(vec![ProviderResponse::text("TASK_COMPLETED")]).await;

        let request = TaskRequest::new("rename").with_tag(RequestTag::Direct);
        let outcome = orchestrator.run(&workspace, session_id, &request, &NullSink).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.final_message.content, "Task completed.");
        assert_eq!(outcome.final_message.agent_name.as_deref(), Some(SYSTEM_AGENT));
    }
}
