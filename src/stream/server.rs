// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP surface.
//!
//! | route | |
//! |---|---|
//! | `POST /api/chat/{project_id}/stream` | run a task, NDJSON event stream |
//! | `POST /api/chat/{project_id}` | run a task, `complete` payload as JSON |
//! | `GET, POST /api/chat/{project_id}/sessions` | list / create sessions |
//! | `GET, DELETE /api/chat/{project_id}/sessions/{session_id}` | one session with its messages |
//! | `GET /api/chat/{project_id}/sessions/{session_id}/messages?after=N&limit=M` | reconnection |
//! | `GET /health`, `GET /api/metrics` | |

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::CorsLayer;

#[cfg(feature = "telemetry")]
use tracing::{info, warn};

use crate::error::{SessionError, TaskError, WorkspaceError};
use crate::session::{MessageId, MessagePage, Session, SessionId, SessionWithMessages};
use crate::telemetry::{MetricsSnapshot, GLOBAL_METRICS};

use super::gateway::{error_message, ChatRequest, StreamGateway};
use super::protocol::{CompletePayload, WireFrame, NDJSON_CONTENT_TYPE};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: StreamGateway,
}

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::ProjectNotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Session(inner) => inner.into(),
            TaskError::Workspace(inner) => inner.into(),
            other => Self::Internal(error_message(&other)),
        }
    }
}

/// Build the application router.
pub fn router(gateway: StreamGateway) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(metrics))
        .route("/api/chat/{project_id}", post(chat))
        .route("/api/chat/{project_id}/stream", post(chat_stream))
        .route(
            "/api/chat/{project_id}/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/api/chat/{project_id}/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/api/chat/{project_id}/sessions/{session_id}/messages",
            get(messages_since),
        )
        .layer(CorsLayer::permissive())
        .with_state(AppState { gateway })
}

/// Bind and serve until Ctrl-C.
pub async fn serve(gateway: StreamGateway, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    #[cfg(feature = "telemetry")]
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(_err) = tokio::signal::ctrl_c().await {
        #[cfg(feature = "telemetry")]
        warn!(error = %_err, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics() -> Json<MetricsSnapshot> {
    Json(GLOBAL_METRICS.snapshot())
}

fn parse_chat(body: &Bytes) -> Result<ChatRequest, ApiError> {
    let request: ChatRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    request.validate().map_err(ApiError::BadRequest)?;
    Ok(request)
}

/// One NDJSON line per frame until the task's terminal frame.
fn ndjson_lines(mut frames: UnboundedReceiver<WireFrame>) -> impl Stream<Item = Result<String, Infallible>> {
    async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            yield Ok(frame.to_line());
        }
    }
}

/// POST /api/chat/{project_id}/stream
async fn chat_stream(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_chat(&body)?;
    state.gateway.leases().resolver().resolve(project_id)?;

    let frames = state.gateway.start(project_id, request);
    let lines = ndjson_lines(frames);

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// POST /api/chat/{project_id}
async fn chat(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    body: Bytes,
) -> Result<Json<CompletePayload>, ApiError> {
    let request = parse_chat(&body)?;
    state.gateway.leases().resolver().resolve(project_id)?;

    let payload = state.gateway.run_to_completion(project_id, request).await?;
    Ok(Json(payload))
}

#[derive(Debug, Default, Deserialize)]
struct CreateSession {
    #[serde(default)]
    title: Option<String>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Session>>, ApiError> {
    Ok(Json(state.gateway.store().list_sessions(project_id).await?))
}

async fn create_session(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    body: Bytes,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    state.gateway.leases().resolver().resolve(project_id)?;

    let params = if body.is_empty() {
        CreateSession::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let session = state
        .gateway
        .store()
        .create_session(project_id, params.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<AppState>,
    Path((project_id, session_id)): Path<(i64, SessionId)>,
) -> Result<Json<SessionWithMessages>, ApiError> {
    let store = state.gateway.store();
    store.session_for_project(session_id, project_id).await?;
    let session = store
        .get(session_id)
        .await?
        .ok_or(SessionError::NotFound(session_id))?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((project_id, session_id)): Path<(i64, SessionId)>,
) -> Result<StatusCode, ApiError> {
    let store = state.gateway.store();
    store.session_for_project(session_id, project_id).await?;
    if store.delete_session(session_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SessionError::NotFound(session_id).into())
    }
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    #[serde(default)]
    after: MessageId,
    limit: Option<usize>,
}

/// GET /api/chat/{project_id}/sessions/{session_id}/messages
async fn messages_since(
    State(state): State<AppState>,
    Path((project_id, session_id)): Path<(i64, SessionId)>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let store = state.gateway.store();
    store.session_for_project(session_id, project_id).await?;
    let page = store.get_since(session_id, query.after, query.limit).await?;
    Ok(Json(page))
}
