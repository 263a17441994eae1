// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Turns chat requests into running tasks and their event streams.

use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[cfg(feature = "telemetry")]
use tracing::{error, info, instrument, warn};

use crate::config::ResolvedConfig;
use crate::error::{SessionError, TaskError};
use crate::orchestrator::{Orchestrator, RequestTag, TaskRequest, SYSTEM_AGENT};
use crate::session::{NewMessage, SessionId, SessionStore};
use crate::types::SharedProvider;
use crate::workspace::{ProjectResolver, WorkspaceLeases};

use super::protocol::{CompletePayload, EventEmitter, WireEvent, WireFrame};

/// Body of a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Continue this session; a new one is created when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<RequestTag>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_tag(mut self, tag: RequestTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Reject requests that cannot start a task.
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        Ok(())
    }

    fn task(&self) -> TaskRequest {
        TaskRequest {
            message: self.message.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// User-facing text for a failed task.
pub fn error_message(err: &impl Display) -> String {
    format!("I encountered an error: {err}. Please try again.")
}

/// Entry point for chat requests, streaming or not.
#[derive(Clone)]
pub struct StreamGateway {
    leases: Arc<WorkspaceLeases>,
    orchestrator: Arc<Orchestrator>,
}

impl StreamGateway {
    pub fn new(leases: Arc<WorkspaceLeases>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { leases, orchestrator }
    }

    /// Open the session database and wire everything from `config`.
    pub fn from_config(config: &ResolvedConfig, provider: SharedProvider) -> Result<Self, SessionError> {
        let store = SessionStore::open(&config.database_path)?.with_page_limit(config.page_limit);
        let leases = WorkspaceLeases::new(ProjectResolver::new(&config.projects_dir));
        let orchestrator = Orchestrator::from_config(config, provider, store);
        Ok(Self::new(Arc::new(leases), Arc::new(orchestrator)))
    }

    pub fn leases(&self) -> &WorkspaceLeases {
        &self.leases
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn store(&self) -> &SessionStore {
        self.orchestrator.store()
    }

    /// Start a task and return its event stream.
    ///
    /// The task runs on its own tokio task; dropping the receiver does not
    /// stop it. The stream always ends with exactly one `complete` or
    /// `error` frame, including when the task panics.
    pub fn start(&self, project_id: i64, request: ChatRequest) -> mpsc::UnboundedReceiver<WireFrame> {
        let (emitter, rx) = EventEmitter::channel();
        let emitter = Arc::new(emitter);

        let gateway = self.clone();
        let task_emitter = Arc::clone(&emitter);
        let task = tokio::spawn(async move { gateway.execute(project_id, request, &task_emitter).await });

        tokio::spawn(async move {
            let terminal = match task.await {
                Ok(Ok(payload)) => WireEvent::Complete(payload),
                Ok(Err(err)) => WireEvent::Error {
                    message: error_message(&err),
                },
                Err(join_err) => {
                    #[cfg(feature = "telemetry")]
                    error!(project_id, error = %join_err, "Task aborted");
                    WireEvent::Error {
                        message: error_message(&format!("the task stopped unexpectedly ({join_err})")),
                    }
                }
            };
            emitter.finish(terminal);
        });

        rx
    }

    /// Run a task and return only its `complete` payload.
    ///
    /// The task runs on its own tokio task, so dropping the returned future
    /// (a disconnected HTTP client) leaves it running to completion.
    pub async fn run_to_completion(&self, project_id: i64, request: ChatRequest) -> Result<CompletePayload, TaskError> {
        let gateway = self.clone();
        let task = tokio::spawn(async move {
            gateway
                .execute(project_id, request, &EventEmitter::detached())
                .await
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                #[cfg(feature = "telemetry")]
                error!(project_id, error = %join_err, "Task aborted");
                Err(TaskError::Internal(format!("the task stopped unexpectedly ({join_err})")))
            }
        }
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(skip(self, request, emitter), fields(session_id = ?request.session_id))
    )]
    async fn execute(
        &self,
        project_id: i64,
        request: ChatRequest,
        emitter: &EventEmitter,
    ) -> Result<CompletePayload, TaskError> {
        self.leases.resolver().resolve(project_id)?;

        let store = self.store();
        let session = match request.session_id {
            Some(id) => store.session_for_project(id, project_id).await?,
            None => store.create_session(project_id, None).await?,
        };

        let user_message = store.append(session.id, NewMessage::user(request.message.clone())).await?;
        emitter.emit(WireEvent::Start {
            session_id: session.id,
            user_message_id: user_message.id,
        });

        #[cfg(feature = "telemetry")]
        info!(session_id = session.id, user_message_id = user_message.id, "Chat request accepted");

        match self.run_leased(project_id, session.id, &request.task(), emitter).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                let note = NewMessage::assistant(SYSTEM_AGENT, error_message(&err), Vec::new());
                if let Err(_store_err) = store.append(session.id, note).await {
                    #[cfg(feature = "telemetry")]
                    warn!(error = %_store_err, "Could not persist the error message");
                }
                Err(err)
            }
        }
    }

    /// Hold the project's lease for the whole task. The lease is released
    /// on every path, including a panic inside the task.
    async fn run_leased(
        &self,
        project_id: i64,
        session_id: SessionId,
        task: &TaskRequest,
        emitter: &EventEmitter,
    ) -> Result<CompletePayload, TaskError> {
        let lease = self.leases.acquire(project_id).await?;
        let result = self.orchestrator.run(lease.handle(), session_id, task, emitter).await;
        let changed_files = lease.release();
        let outcome = result?;

        Ok(CompletePayload {
            session_id,
            incomplete: outcome.incomplete(),
            message: outcome.final_message,
            changed_files,
        })
    }
}
