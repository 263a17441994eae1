// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! NDJSON wire protocol.
//!
//! Each line is one [`WireFrame`]:
//!
//! ```text
//! {"id":1,"type":"start","data":{"session_id":4,"user_message_id":17}}
//! {"id":2,"type":"agent_interaction","data":{"agent_name":"Coder","kind":"thought",...}}
//! {"id":3,"type":"complete","data":{"session_id":4,"message":{...},"changed_files":[],"incomplete":false}}
//! ```
//!
//! A stream ends with exactly one `complete` or `error` frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::recorder::{AgentInteraction, InteractionSink};
use crate::session::{MessageId, SessionId, StoredMessage};
use crate::workspace::ChangedFile;

/// Content type of the streaming endpoint.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Payload of the `complete` event, and the body of the non-streaming reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub session_id: SessionId,
    /// Final assistant message of the task.
    pub message: StoredMessage,
    pub changed_files: Vec<ChangedFile>,
    /// Set when the round limit stopped the task.
    #[serde(default)]
    pub incomplete: bool,
}

/// One event of a task stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WireEvent {
    Start {
        session_id: SessionId,
        user_message_id: MessageId,
    },
    AgentInteraction(AgentInteraction),
    Complete(CompletePayload),
    Error {
        message: String,
    },
}

impl WireEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// An event with its per-stream id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub id: u64,
    #[serde(flatten)]
    pub event: WireEvent,
}

impl WireFrame {
    /// One NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                let fallback = serde_json::json!({
                    "id": self.id,
                    "type": "error",
                    "data": { "message": format!("unserializable event: {e}") },
                });
                format!("{fallback}\n")
            }
        }
    }
}

/// Numbers events and forwards them to one stream.
///
/// Ids start at 1 and increase by one per event. After the terminal event
/// nothing else is sent. A dropped receiver is not an error: the task keeps
/// running and its results stay in the session store.
pub struct EventEmitter {
    next_id: AtomicU64,
    finished: AtomicBool,
    tx: mpsc::UnboundedSender<WireFrame>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WireFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            next_id: AtomicU64::new(1),
            finished: AtomicBool::new(false),
            tx,
        };
        (emitter, rx)
    }

    /// An emitter nobody listens to.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Send a non-terminal event. Returns `false` if the stream has ended.
    pub fn emit(&self, event: WireEvent) -> bool {
        if event.is_terminal() {
            return self.finish(event);
        }
        if self.finished.load(Ordering::SeqCst) {
            return false;
        }
        self.send(event);
        true
    }

    /// Send the terminal event. Only the first call has an effect.
    pub fn finish(&self, event: WireEvent) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "telemetry")]
            warn!("Dropping event after the stream finished");
            return false;
        }
        self.send(event);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn send(&self, event: WireEvent) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(WireFrame { id, event }).is_err() {
            #[cfg(feature = "telemetry")]
            debug!(id, "Stream receiver gone; event kept only in the store");
        }
    }
}

#[async_trait]
impl InteractionSink for EventEmitter {
    async fn interaction(&self, interaction: &AgentInteraction) {
        self.emit(WireEvent::AgentInteraction(interaction.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::InteractionKind;
    use crate::session::MessageRole;
    use chrono::Utc;

    fn message() -> StoredMessage {
        StoredMessage {
            id: 9,
            session_id: 4,
            role: MessageRole::Assistant,
            content: "Done.".to_string(),
            agent_name: Some("Coder".to_string()),
            interactions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_frame_shape() {
        let frame = WireFrame {
            id: 1,
            event: WireEvent::Start {
                session_id: 4,
                user_message_id: 17,
            },
        };
        let value: serde_json::Value = serde_json::from_str(frame.to_line().trim_end()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": 1, "type": "start", "data": {"session_id": 4, "user_message_id": 17}})
        );
        assert!(frame.to_line().ends_with('\n'));
        assert_eq!(frame.to_line().matches('\n').count(), 1);
    }

    #[test]
    fn test_interaction_frame_carries_tool_fields() {
        let frame = WireFrame {
            id: 2,
            event: WireEvent::AgentInteraction(AgentInteraction {
                agent_name: "Coder".to_string(),
                kind: InteractionKind::ToolCall,
                content: "Calling tool: write_file".to_string(),
                tool_name: Some("write_file".to_string()),
                tool_arguments: Some(serde_json::json!({"path": "a.txt"})),
                timestamp: Utc::now(),
            }),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_line()).unwrap();
        assert_eq!(value["type"], "agent_interaction");
        assert_eq!(value["data"]["kind"], "tool_call");
        assert_eq!(value["data"]["tool_arguments"]["path"], "a.txt");
    }

    #[test]
    fn test_complete_frame() {
        let frame = WireFrame {
            id: 3,
            event: WireEvent::Complete(CompletePayload {
                session_id: 4,
                message: message(),
                changed_files: Vec::new(),
                incomplete: true,
            }),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_line()).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["data"]["message"]["content"], "Done.");
        assert_eq!(value["data"]["incomplete"], true);
    }

    #[tokio::test]
    async fn test_emitter_ids_and_single_terminal() {
        let (emitter, mut rx) = EventEmitter::channel();
        assert!(emitter.emit(WireEvent::Start {
            session_id: 1,
            user_message_id: 1
        }));
        assert!(emitter.finish(WireEvent::Error {
            message: "boom".to_string()
        }));
        assert!(!emitter.finish(WireEvent::Complete(CompletePayload {
            session_id: 1,
            message: message(),
            changed_files: Vec::new(),
            incomplete: false,
        })));
        assert!(!emitter.emit(WireEvent::Error {
            message: "again".to_string()
        }));
        drop(emitter);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, 1);
        assert_eq!(frames[1].id, 2);
        assert!(frames[1].event.is_terminal());
    }

    #[test]
    fn test_detached_emitter_never_fails() {
        let emitter = EventEmitter::detached();
        assert!(emitter.emit(WireEvent::Start {
            session_id: 1,
            user_message_id: 2
        }));
        assert!(!emitter.is_finished());
    }
}
