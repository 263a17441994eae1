// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! codeweave - a Planner/Coder agent pipeline over project workspaces.
//!
//! A chat request for a project becomes a *task*: the Planner drafts a plan
//! (unless the request is a small direct edit), then the Coder carries it
//! out with file, search, data, git, shell and web tools until it emits the
//! completion marker or the round limit is hit. Every thought, tool call and
//! tool response is streamed live as NDJSON and persisted per session so a
//! client can reconnect and catch up.
//!
//! # Architecture
//!
//! - [`workspace`] - project roots, exclusive leases, path confinement
//! - [`tools`] - the closed tool catalog and its JSON-Schema checked dispatch
//! - [`agents`] - the Planner and Coder roles over a [`Provider`]
//! - [`orchestrator`] - routing policy and the speaker state machine
//! - [`recorder`] - normalizes turns into timestamped interactions
//! - [`stream`] - wire protocol, task gateway, HTTP server
//! - [`session`] - SQLite-backed sessions and reconnection queries
//! - [`providers`] - OpenAI-compatible HTTP provider and a scripted replay provider
//! - [`config`] - layered JSON/YAML configuration
//! - [`telemetry`] - tracing setup and in-process metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use codeweave::config::{load_config, CliOptions};
//! use codeweave::providers::create_provider_from_config;
//! use codeweave::stream::{ChatRequest, StreamGateway};
//!
//! let config = load_config(&std::env::current_dir()?, CliOptions::default())?;
//! let gateway = StreamGateway::from_config(&config, create_provider_from_config(&config)?)?;
//! let mut frames = gateway.start(1, ChatRequest::new("add a footer"));
//! while let Some(frame) = frames.recv().await {
//!     print!("{}", frame.to_line());
//! }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod recorder;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod workspace;

pub use error::{ConfigError, ProviderError, Result, SessionError, TaskError, ToolError, WorkspaceError};
pub use orchestrator::{Orchestrator, RequestTag, TaskOutcome, TaskRequest, Termination};
pub use providers::{create_provider, create_provider_from_config, OpenAIProvider, ProviderType, ReplayProvider};
pub use stream::{ChatRequest, CompletePayload, StreamGateway, WireEvent, WireFrame};
pub use types::{
    ContentBlock, Message, MessageContent, Provider, ProviderConfig, ProviderResponse, Role, SharedProvider,
    StopReason, TokenUsage, ToolCall, ToolDefinition,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _msg = Message::user("test");
        let _response = ProviderResponse::empty();
        let _request = ChatRequest::new("hi").with_tag(RequestTag::Simple);
    }
}
