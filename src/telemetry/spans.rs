// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for task instrumentation.

use std::time::Instant;
use tracing::{info_span, Span};

use super::correlation::CorrelationId;

/// Extension trait for recording results on spans.
pub trait SpanExt {
    /// Record the result of an operation (success/error).
    fn record_result<T, E>(&self, result: &Result<T, E>);

    fn record_value(&self, name: &'static str, value: i64);

    fn record_str(&self, name: &'static str, value: &str);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>) {
        self.record("success", result.is_ok());
    }

    fn record_value(&self, name: &'static str, value: i64) {
        self.record(name, value);
    }

    fn record_str(&self, name: &'static str, value: &str) {
        self.record(name, value);
    }
}

/// Timing guard for one orchestrated task.
///
/// Opens a `task` span carrying the correlation id, project and session,
/// and records the task duration to the global metrics on finish.
pub struct TaskSpan {
    correlation_id: CorrelationId,
    start: Instant,
    span: Span,
}

impl TaskSpan {
    pub fn start(project_id: i64, session_id: i64) -> Self {
        let correlation_id = CorrelationId::new();
        let span = info_span!(
            "task",
            correlation_id = %correlation_id.short(),
            project_id,
            session_id,
            rounds = tracing::field::Empty,
            termination = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        );

        Self {
            correlation_id,
            start: Instant::now(),
            span,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the number of rounds played so far.
    pub fn record_rounds(&self, rounds: usize) {
        self.span.record_value("rounds", rounds as i64);
    }

    /// Finish the span with the task's result.
    pub fn finish<T, E>(self, termination: &str, result: &Result<T, E>) {
        let duration = self.start.elapsed();

        self.span.record("duration_ms", duration.as_secs_f64() * 1000.0);
        self.span.record_str("termination", termination);
        self.span.record_result(result);

        super::metrics::GLOBAL_METRICS.record_operation("task", duration);

        tracing::info!(parent: &self.span, termination, "Task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_span_records_metrics() {
        let span = TaskSpan::start(3, 9);
        span.record_rounds(2);
        assert_eq!(span.correlation_id().short().len(), 8);

        let before = super::super::metrics::GLOBAL_METRICS
            .operation_metrics("task")
            .map(|m| m.count)
            .unwrap_or(0);
        span.finish::<(), ()>("completed", &Ok(()));
        let after = super::super::metrics::GLOBAL_METRICS
            .operation_metrics("task")
            .map(|m| m.count)
            .unwrap_or(0);
        assert!(after > before);
    }
}
