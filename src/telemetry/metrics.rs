// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process metrics.
//!
//! Counters and latency histograms for tool calls, agent turns, storage
//! operations and whole tasks. The server exposes a [`MetricsSnapshot`] at
//! `GET /api/metrics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::Serialize;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// How a task ended, for the task counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    Completed,
    RoundLimit,
    Failed,
}

#[derive(Debug)]
pub struct Metrics {
    tools: RwLock<BTreeMap<String, ToolMetrics>>,
    operations: RwLock<BTreeMap<String, OperationMetrics>>,
    tokens: TokenMetrics,
    tasks: TaskCounters,
    start_time: Instant,
}

// A poisoned lock only means a writer panicked mid-update of a counter.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            operations: RwLock::new(BTreeMap::new()),
            tokens: TokenMetrics::default(),
            tasks: TaskCounters::default(),
            start_time: Instant::now(),
        }
    }

    /// Record one tool dispatch.
    pub fn record_tool(&self, name: &str, duration: Duration, success: bool) {
        write(&self.tools)
            .entry(name.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Record a named operation (`agent.coder`, `session.append`, ...).
    pub fn record_operation(&self, name: &str, duration: Duration) {
        write(&self.operations)
            .entry(name.to_string())
            .or_default()
            .record(duration);
    }

    pub fn record_tokens(&self, input: u64, output: u64) {
        self.tokens.input.fetch_add(input, Ordering::Relaxed);
        self.tokens.output.fetch_add(output, Ordering::Relaxed);
    }

    pub fn record_task(&self, result: TaskResult) {
        let counter = match result {
            TaskResult::Completed => &self.tasks.completed,
            TaskResult::RoundLimit => &self.tasks.round_limit,
            TaskResult::Failed => &self.tasks.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tool_metrics(&self, name: &str) -> Option<ToolMetrics> {
        read(&self.tools).get(name).cloned()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        read(&self.operations).get(name).cloned()
    }

    /// (input, output) token totals.
    pub fn token_counts(&self) -> (u64, u64) {
        (
            self.tokens.input.load(Ordering::Relaxed),
            self.tokens.output.load(Ordering::Relaxed),
        )
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (input_tokens, output_tokens) = self.token_counts();
        MetricsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            input_tokens,
            output_tokens,
            tasks: TaskSummary {
                completed: self.tasks.completed.load(Ordering::Relaxed),
                round_limit: self.tasks.round_limit.load(Ordering::Relaxed),
                failed: self.tasks.failed.load(Ordering::Relaxed),
            },
            tools: read(&self.tools)
                .iter()
                .map(|(name, m)| (name.clone(), m.summary()))
                .collect(),
            operations: read(&self.operations)
                .iter()
                .map(|(name, m)| (name.clone(), m.summary()))
                .collect(),
        }
    }

    pub fn reset(&self) {
        write(&self.tools).clear();
        write(&self.operations).clear();
        self.tokens.input.store(0, Ordering::Relaxed);
        self.tokens.output.store(0, Ordering::Relaxed);
        self.tasks.completed.store(0, Ordering::Relaxed);
        self.tasks.round_limit.store(0, Ordering::Relaxed);
        self.tasks.failed.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one tool.
#[derive(Debug, Clone)]
pub struct ToolMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl ToolMetrics {
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.invocations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => Duration::ZERO,
        }
    }

    /// Success rate in 0.0..=1.0; 1.0 before any call.
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }

    fn summary(&self) -> ToolSummary {
        ToolSummary {
            invocations: self.invocations,
            failures: self.failures,
            success_rate: self.success_rate(),
            avg_ms: millis(self.avg_duration()),
            max_ms: millis(self.max_duration),
        }
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }
}

/// Latency metrics for a named operation.
#[derive(Debug, Clone, Default)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    pub histogram: Histogram,
}

impl OperationMetrics {
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => Duration::ZERO,
        }
    }

    fn summary(&self) -> OperationSummary {
        OperationSummary {
            count: self.count,
            avg_ms: millis(self.avg_duration()),
            max_ms: millis(self.max_duration),
            p50_ms: millis(self.histogram.percentile(50.0)),
            p99_ms: millis(self.histogram.percentile(99.0)),
        }
    }
}

/// Fixed-bucket latency histogram. Bucket bounds are in milliseconds.
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds_ms: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn with_bounds(bounds_ms: Vec<u64>) -> Self {
        let counts = vec![0; bounds_ms.len() + 1];
        Self { bounds_ms, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let idx = self
            .bounds_ms
            .iter()
            .position(|&b| ms <= b)
            .unwrap_or(self.bounds_ms.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Upper bound of the bucket holding the `p`th percentile.
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut cumulative = 0;
        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let ms = match self.bounds_ms.get(i) {
                    Some(&bound) => bound,
                    None => self.bounds_ms.last().copied().unwrap_or(0) * 2,
                };
                return Duration::from_millis(ms);
            }
        }
        Duration::ZERO
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Model turns dominate: 10ms up to two minutes.
        Self::with_bounds(vec![10, 100, 500, 1_000, 5_000, 15_000, 60_000, 120_000])
    }
}

#[derive(Debug, Default)]
struct TokenMetrics {
    input: AtomicU64,
    output: AtomicU64,
}

#[derive(Debug, Default)]
struct TaskCounters {
    completed: AtomicU64,
    round_limit: AtomicU64,
    failed: AtomicU64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Serializable view of [`Metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tasks: TaskSummary,
    pub tools: BTreeMap<String, ToolSummary>,
    pub operations: BTreeMap<String, OperationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub completed: u64,
    pub round_limit: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub invocations: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
}

impl MetricsSnapshot {
    /// Plain-text report for the CLI.
    pub fn format_report(&self) -> String {
        let mut report = format!(
            "Uptime: {}s\nTokens: {} input, {} output\nTasks: {} completed, {} stopped at round limit, {} failed\n",
            self.uptime_secs,
            self.input_tokens,
            self.output_tokens,
            self.tasks.completed,
            self.tasks.round_limit,
            self.tasks.failed,
        );

        if !self.tools.is_empty() {
            report.push_str("\nTools:\n");
            for (name, m) in &self.tools {
                report.push_str(&format!(
                    "  {name}: {} calls, {:.1}% success, avg {:.1}ms\n",
                    m.invocations,
                    m.success_rate * 100.0,
                    m.avg_ms
                ));
            }
        }

        if !self.operations.is_empty() {
            report.push_str("\nOperations:\n");
            for (name, m) in &self.operations {
                report.push_str(&format!(
                    "  {name}: {} ops, avg {:.1}ms, p99 {:.0}ms\n",
                    m.count, m.avg_ms, m.p99_ms
                ));
            }
        }

        report
    }
}
