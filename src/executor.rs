//! Runs one build definition against one connection.
//!
//! Steps always run in this order, stopping at the first failure:
//!
//! 1. inline SQL, when present and not blank
//! 2. each SQL file, in manifest order
//! 3. each stored procedure, in manifest order, with no arguments
//!
//! Every step produces exactly one [`ExecutionEvent`]. Whatever happens, the connection
//! handle is closed before [`BuildExecutor::execute`] returns.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::connection::ConnectionHandle;
use crate::error::DbBuilderError;
use crate::events::{BuildSummary, EventSink, ExecutionEvent, Outcome, StepKind, TracingSink};
use crate::manifest::BuildDefinition;

/// Knobs that apply to every step of a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Upper bound for any single step, whatever its kind.
    pub step_timeout: Option<Duration>,
}

/// One unit of work in a build, borrowed from its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    InlineSql(&'a str),
    SqlFile(&'a Path),
    StoredProcedure(&'a str),
}

impl Step<'_> {
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            Step::InlineSql(_) => StepKind::InlineSql,
            Step::SqlFile(_) => StepKind::SqlFile,
            Step::StoredProcedure(_) => StepKind::StoredProcedure,
        }
    }

    /// File path or procedure name; `None` for inline SQL.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        match self {
            Step::InlineSql(_) => None,
            Step::SqlFile(path) => Some(path.display().to_string()),
            Step::StoredProcedure(name) => Some((*name).to_string()),
        }
    }
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier() {
            Some(id) => write!(f, "{} {id}", self.kind()),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// The ordered steps `build` will run.
#[must_use]
pub fn plan_steps(build: &BuildDefinition) -> Vec<Step<'_>> {
    let mut steps = Vec::with_capacity(build.step_count());
    if let Some(sql) = build.effective_inline_sql() {
        steps.push(Step::InlineSql(sql));
    }
    steps.extend(build.sql_file_paths.iter().map(|p| Step::SqlFile(p.as_path())));
    steps.extend(
        build
            .stored_procedure_names
            .iter()
            .map(|name| Step::StoredProcedure(name.as_str())),
    );
    steps
}

pub struct BuildExecutor {
    sink: Arc<dyn EventSink>,
    options: ExecutorOptions,
}

impl Default for BuildExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl BuildExecutor {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            options: ExecutorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run every step of `build` on `handle`, then close `handle`.
    ///
    /// # Errors
    /// Returns `DbBuilderError::StepFailed` wrapping the first step's failure (execution or
    /// I/O), or `DbBuilderError::ConnectionError` if only the final close fails.
    pub async fn execute(
        &self,
        build: &BuildDefinition,
        mut handle: ConnectionHandle,
    ) -> Result<BuildSummary, DbBuilderError> {
        let started = Instant::now();
        let outcome = self.run_steps(build, &mut handle).await;
        let closed = handle.close().await;

        match (outcome, closed) {
            (Ok(steps_executed), Ok(())) => {
                let summary = BuildSummary {
                    build_name: build.build_name.clone(),
                    connection_name: build.connection_name.clone(),
                    total_duration: started.elapsed(),
                    steps_executed,
                };
                self.sink.build_completed(&summary);
                Ok(summary)
            }
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(step_err), Err(close_err)) => {
                tracing::warn!("closing connection after failed step also failed: {close_err}");
                Err(step_err)
            }
            (Err(step_err), Ok(())) => Err(step_err),
        }
    }

    async fn run_steps(
        &self,
        build: &BuildDefinition,
        handle: &mut ConnectionHandle,
    ) -> Result<usize, DbBuilderError> {
        let steps = plan_steps(build);
        for step in &steps {
            self.run_timed(step, handle).await?;
        }
        Ok(steps.len())
    }

    async fn run_timed(
        &self,
        step: &Step<'_>,
        handle: &mut ConnectionHandle,
    ) -> Result<(), DbBuilderError> {
        let kind = step.kind();
        let identifier = step.identifier();
        self.sink.step_started(kind, identifier.as_deref());

        let started_at = Utc::now();
        let timer = Instant::now();
        let result = self.bounded(run_step(step, handle)).await;
        let duration = timer.elapsed();

        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.sink.step_finished(&ExecutionEvent {
            step_kind: kind,
            identifier: identifier.clone(),
            started_at,
            duration,
            outcome,
        });

        result.map_err(|source| DbBuilderError::StepFailed {
            step: kind,
            identifier,
            elapsed: duration,
            source: Box::new(source),
        })
    }

    async fn bounded<F>(&self, fut: F) -> Result<(), DbBuilderError>
    where
        F: Future<Output = Result<(), DbBuilderError>>,
    {
        match self.options.step_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(DbBuilderError::execution(format!(
                    "step timed out after {}",
                    humantime::format_duration(limit)
                )))
            }),
            None => fut.await,
        }
    }
}

async fn run_step(step: &Step<'_>, handle: &mut ConnectionHandle) -> Result<(), DbBuilderError> {
    match *step {
        Step::InlineSql(sql) => handle.execute_raw_sql(sql).await,
        Step::SqlFile(path) => {
            let sql = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| DbBuilderError::IoError {
                    path: path.to_path_buf(),
                    source,
                })?;
            handle.execute_raw_sql(&sql).await
        }
        Step::StoredProcedure(name) => handle.call_stored_procedure_default(name).await,
    }
}
