use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::events::StepKind;

#[derive(Debug, Error)]
pub enum DbBuilderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {message}{}", statement_suffix(.statement))]
    ExecutionError {
        message: String,
        statement: Option<String>,
    },

    #[error("I/O error reading {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} step{} failed after {elapsed:?}: {source}", identifier_suffix(.identifier))]
    StepFailed {
        step: StepKind,
        identifier: Option<String>,
        elapsed: Duration,
        #[source]
        source: Box<DbBuilderError>,
    },
}

/// Coarse classification of a [`DbBuilderError`], looking through step wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connection,
    Execution,
    Io,
}

impl DbBuilderError {
    /// Execution error without statement context.
    pub fn execution(message: impl Into<String>) -> Self {
        DbBuilderError::ExecutionError {
            message: message.into(),
            statement: None,
        }
    }

    /// Execution error tagged with the statement (or batch) that produced it.
    pub fn execution_in(message: impl Into<String>, statement: &str) -> Self {
        DbBuilderError::ExecutionError {
            message: message.into(),
            statement: Some(abbreviate(statement)),
        }
    }

    /// Attach statement context to an execution error that has none yet.
    #[must_use]
    pub fn with_statement(self, statement: &str) -> Self {
        match self {
            DbBuilderError::ExecutionError {
                message,
                statement: None,
            } => DbBuilderError::execution_in(message, statement),
            other => other,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            DbBuilderError::ConfigError(_) => ErrorCategory::Configuration,
            DbBuilderError::ConnectionError(_) => ErrorCategory::Connection,
            DbBuilderError::ExecutionError { .. } => ErrorCategory::Execution,
            DbBuilderError::IoError { .. } => ErrorCategory::Io,
            DbBuilderError::StepFailed { source, .. } => source.category(),
        }
    }

    /// The underlying error with any step wrapper removed.
    #[must_use]
    pub fn root(&self) -> &DbBuilderError {
        match self {
            DbBuilderError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

const STATEMENT_CONTEXT_CHARS: usize = 120;

fn abbreviate(statement: &str) -> String {
    let trimmed = statement.trim();
    if trimmed.chars().count() <= STATEMENT_CONTEXT_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(STATEMENT_CONTEXT_CHARS).collect();
    short.push_str("...");
    short
}

fn statement_suffix(statement: &Option<String>) -> String {
    match statement {
        Some(stmt) => format!(" (statement: {stmt})"),
        None => String::new(),
    }
}

fn identifier_suffix(identifier: &Option<String>) -> String {
    match identifier {
        Some(id) => format!(" '{id}'"),
        None => String::new(),
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbBuilderError {
    fn from(err: rusqlite::Error) -> Self {
        DbBuilderError::execution(format!("SQLite error: {err}"))
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DbBuilderError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => DbBuilderError::execution(format!(
                "Postgres error {}: {}",
                db.code().code(),
                db.message()
            )),
            None => DbBuilderError::execution(format!("Postgres error: {err}")),
        }
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DbBuilderError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => DbBuilderError::execution(format!(
                "MySQL error {} ({}): {}",
                server.code, server.state, server.message
            )),
            other => DbBuilderError::execution(format!("MySQL error: {other}")),
        }
    }
}
