use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The three kinds of work a build performs, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    InlineSql,
    SqlFile,
    StoredProcedure,
}

impl StepKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::InlineSql => "inline_sql",
            StepKind::SqlFile => "sql_file",
            StepKind::StoredProcedure => "stored_procedure",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Timing and outcome of a single build step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionEvent {
    pub step_kind: StepKind,
    /// File path or procedure name; `None` for inline SQL.
    pub identifier: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl ExecutionEvent {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Result of a build that ran every step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub build_name: String,
    pub connection_name: String,
    pub total_duration: Duration,
    pub steps_executed: usize,
}

/// Receives step and build records from the executor.
///
/// The executor never touches global logging state; whatever sink it is built with is the
/// only place its records go.
pub trait EventSink: Send + Sync {
    fn step_started(&self, kind: StepKind, identifier: Option<&str>);

    fn step_finished(&self, event: &ExecutionEvent);

    fn build_completed(&self, summary: &BuildSummary);
}

/// Default sink: forwards every record to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn step_started(&self, kind: StepKind, identifier: Option<&str>) {
        tracing::info!(
            step = %kind,
            identifier = identifier.unwrap_or("-"),
            "step started"
        );
    }

    fn step_finished(&self, event: &ExecutionEvent) {
        let duration_ms = duration_ms(event.duration);
        let identifier = event.identifier.as_deref().unwrap_or("-");
        match event.outcome {
            Outcome::Success => tracing::info!(
                step = %event.step_kind,
                identifier,
                duration_ms,
                "step succeeded"
            ),
            Outcome::Failure => tracing::error!(
                step = %event.step_kind,
                identifier,
                duration_ms,
                "step failed"
            ),
        }
    }

    fn build_completed(&self, summary: &BuildSummary) {
        tracing::info!(
            build = %summary.build_name,
            connection = %summary.connection_name,
            steps = summary.steps_executed,
            duration_ms = duration_ms(summary.total_duration),
            "build completed"
        );
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
