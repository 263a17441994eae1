// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live task streams: the NDJSON protocol, the gateway that runs tasks
//! behind it, and the HTTP server.

pub mod gateway;
pub mod protocol;
pub mod server;

pub use gateway::{error_message, ChatRequest, StreamGateway};
pub use protocol::{CompletePayload, EventEmitter, WireEvent, WireFrame, NDJSON_CONTENT_TYPE};
pub use server::{router, serve, ApiError, AppState};
