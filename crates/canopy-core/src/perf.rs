//! Scoped performance measurement.
//!
//! A span brackets one logical operation; closing it emits a report with
//! the wall-clock elapsed time and the caller's counters. Dropping a span
//! without closing it still emits a report, flagged as not completed, so
//! early returns and panics leave a trace instead of a gap.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Emitted once per span.
#[derive(Debug, Clone, Serialize)]
pub struct PerfReport {
    pub operation: String,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub counters: BTreeMap<String, u64>,
    /// False when the span was dropped without an explicit `end`.
    pub completed: bool,
}

fn serialize_millis<S>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

/// Destination for reports. Implementations must tolerate emission from
/// `Drop`, so they cannot be async.
pub trait PerfRecorder: Send + Sync {
    fn record(&self, report: PerfReport);
}

impl<R: PerfRecorder + ?Sized> PerfRecorder for std::sync::Arc<R> {
    fn record(&self, report: PerfReport) {
        (**self).record(report);
    }
}

/// Discards every report.
#[derive(Debug, Default)]
pub struct NoopRecorder;

impl PerfRecorder for NoopRecorder {
    fn record(&self, _report: PerfReport) {}
}

/// Buffers reports in memory; used by tests and the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    reports: Mutex<Vec<PerfReport>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<PerfReport> {
        self.reports.lock().map(|reports| reports.clone()).unwrap_or_default()
    }
}

impl PerfRecorder for MemoryRecorder {
    fn record(&self, report: PerfReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

/// Hands out measurement spans bound to one recorder.
pub struct PerfMonitor<R: PerfRecorder> {
    recorder: R,
}

impl<R: PerfRecorder> PerfMonitor<R> {
    pub fn new(recorder: R) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Opens a span for `operation`. Close it with [`PerfSpan::end`].
    pub fn span(&self, operation: impl Into<String>) -> PerfSpan<'_, R> {
        PerfSpan {
            monitor: self,
            operation: operation.into(),
            started_at: Instant::now(),
            counters: BTreeMap::new(),
            closed: false,
        }
    }
}

/// In-flight measurement. Accumulates counters until closed.
pub struct PerfSpan<'a, R: PerfRecorder> {
    monitor: &'a PerfMonitor<R>,
    operation: String,
    started_at: Instant,
    counters: BTreeMap<String, u64>,
    closed: bool,
}

impl<R: PerfRecorder> PerfSpan<'_, R> {
    /// Adds to a named counter, creating it at zero.
    pub fn add(&mut self, counter: &str, value: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += value;
    }

    /// Closes the span and emits a completed report.
    pub fn end(mut self) -> Duration {
        let elapsed = self.started_at.elapsed();
        self.closed = true;
        self.monitor.recorder.record(PerfReport {
            operation: std::mem::take(&mut self.operation),
            elapsed,
            counters: std::mem::take(&mut self.counters),
            completed: true,
        });
        elapsed
    }
}

impl<R: PerfRecorder> Drop for PerfSpan<'_, R> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.monitor.recorder.record(PerfReport {
            operation: std::mem::take(&mut self.operation),
            elapsed: self.started_at.elapsed(),
            counters: std::mem::take(&mut self.counters),
            completed: false,
        });
    }
}
