// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing and metrics.
//!
//! Every task runs inside a [`TaskSpan`] carrying a [`CorrelationId`], the
//! project id and the session id, so log lines from tool dispatch, provider
//! calls and storage can be tied back to one request. Counters and latency
//! histograms live in [`GLOBAL_METRICS`].
//!
//! ```rust,ignore
//! use codeweave::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::production())?;
//! ```

mod correlation;
mod init;
pub mod metrics;
mod spans;

pub use correlation::CorrelationId;
pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    Histogram, Metrics, MetricsSnapshot, OperationMetrics, TaskResult, ToolMetrics, GLOBAL_METRICS,
};
pub use spans::{SpanExt, TaskSpan};
