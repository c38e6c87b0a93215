//! Single-task extraction run

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::models::{Checkpoint, Message};
use crate::output::RowSink;
use crate::schema::{CoercionFailure, DiagnosticSink, RowMapper};
use crate::source::MessageSource;
use crate::task::InputTask;

/// Statistics and state produced by a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct TaskReport {
    /// Query sent to the source
    pub query: String,
    /// Number of rows handed to the sink
    pub rows_written: usize,
    /// Listed messages that could not be fetched
    pub messages_failed: usize,
    /// Cells that became null because their text did not fit the column type
    pub coercion_failures: usize,
    /// Set when the search failed and no rows were produced
    pub source_error: Option<String>,
    /// Cursor for the next incremental run
    pub next_checkpoint: Option<Checkpoint>,
    pub duration_ms: u64,
}

/// Forwards to the caller's sink and counts failures for the report
struct CountingDiagnostics<'a> {
    inner: &'a mut dyn DiagnosticSink,
    count: usize,
}

impl DiagnosticSink for CountingDiagnostics<'_> {
    fn record(&mut self, message: &Message, failure: CoercionFailure) {
        self.count += 1;
        self.inner.record(message, failure);
    }
}

/// Run one extraction
///
/// A failed search ends the run with an empty result: no rows, and no
/// checkpoint so the next run retries the same window. Sink errors are
/// returned as errors.
///
/// # Arguments
/// * `task` - Task configuration
/// * `mapper` - Row mapper built from the task's columns
/// * `source` - Where messages come from
/// * `sink` - Where rows go
/// * `diagnostics` - Receives coercion failures
/// * `previous` - Checkpoint emitted by the previous run, if any
/// * `now` - Query time; becomes the next checkpoint for incremental tasks
pub fn run_task(
    task: &InputTask,
    mapper: &RowMapper,
    source: &dyn MessageSource,
    sink: &mut dyn RowSink,
    diagnostics: &mut dyn DiagnosticSink,
    previous: Option<&Checkpoint>,
    now: DateTime<Utc>,
) -> Result<TaskReport> {
    let start = std::time::Instant::now();
    let mut report = TaskReport {
        query: task.build_query(previous),
        ..Default::default()
    };

    info!("Send query for user '{}': '{}'", task.user, report.query);

    let result = match source.search(&task.user, &report.query) {
        Ok(result) => result,
        Err(e) => {
            error!("Search failed: {:#}", e);
            report.source_error = Some(format!("{:#}", e));
            sink.finish()?;
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }
    };

    for failed in &result.failed {
        warn!("Skipping message {}: {}", failed.id, failed.error);
    }
    report.messages_failed = result.failed.len();

    let mut counting = CountingDiagnostics {
        inner: diagnostics,
        count: 0,
    };

    for message in &result.success {
        let row = mapper.map(message, &mut counting);
        sink.add_record(&row)?;
        report.rows_written += 1;
    }
    sink.finish()?;

    report.coercion_failures = counting.count;
    if task.incremental {
        report.next_checkpoint = Some(Checkpoint::at(now));
    }
    report.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Wrote {} rows ({} messages failed, {} cells nulled)",
        report.rows_written, report.messages_failed, report.coercion_failures
    );

    Ok(report)
}
