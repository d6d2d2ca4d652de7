// Dialect module - one implementation per database family
//
// - mysql: reference dialect, backed by mysql_async
// - postgres: tokio-postgres
// - sqlite: rusqlite on a blocking task

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::credentials::ConnectionProfile;
use crate::error::DbBuilderError;
use crate::types::ProcArg;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDialect;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDialect;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDialect;

/// A database family the builder can connect to.
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Identifier matched against a profile's `db_type`.
    fn id(&self) -> &'static str;

    /// Driver connection string for `profile`.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the profile cannot be expressed for this dialect.
    fn build_connection_string(&self, profile: &ConnectionProfile)
    -> Result<String, DbBuilderError>;

    /// Open one session for `profile`.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConnectionError` if the database cannot be reached.
    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DialectConnection>, DbBuilderError>;
}

/// One live session opened by a [`Dialect`].
///
/// Inputs are validated by [`ConnectionHandle`](crate::connection::ConnectionHandle) before
/// they reach an implementation.
#[async_trait]
pub trait DialectConnection: Send {
    /// Run a multi-statement batch as one transaction; roll back on any failure.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbBuilderError>;

    /// Call a stored procedure with positional arguments and commit on success.
    async fn call_procedure(&mut self, name: &str, args: &[ProcArg])
    -> Result<(), DbBuilderError>;

    /// Release the session.
    async fn close(self: Box<Self>) -> Result<(), DbBuilderError>;
}

/// Dialects known to a run, keyed by lowercase id.
#[derive(Clone, Default)]
pub struct DialectRegistry {
    dialects: BTreeMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Registry with no dialects.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every dialect compiled into this build.
    #[must_use]
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "mysql")]
        registry.register(Arc::new(MysqlDialect));
        #[cfg(feature = "postgres")]
        registry.register(Arc::new(PostgresDialect));
        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(SqliteDialect));
        registry
    }

    /// Add or replace a dialect.
    pub fn register(&mut self, dialect: Arc<dyn Dialect>) -> &mut Self {
        self.dialects
            .insert(dialect.id().to_ascii_lowercase(), dialect);
        self
    }

    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if no dialect is registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Dialect>, DbBuilderError> {
        self.dialects
            .get(&id.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                DbBuilderError::ConfigError(format!(
                    "Unrecognized db_type '{id}' (known: {})",
                    self.ids().join(", ")
                ))
            })
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.dialects.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.ids())
            .finish()
    }
}

static PROCEDURE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
        .expect("procedure name pattern compiles")
});

/// Accept plain or schema-qualified identifiers only; names are spliced into `CALL`.
///
/// # Errors
/// Returns `DbBuilderError::ExecutionError` if `name` is not a valid procedure identifier.
pub fn validate_procedure_name(name: &str) -> Result<(), DbBuilderError> {
    if PROCEDURE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(DbBuilderError::execution(format!(
            "invalid stored procedure name '{name}'"
        )))
    }
}

/// `CALL name(p1, p2, ...)` with one placeholder per argument.
pub(crate) fn call_statement(
    name: &str,
    arg_count: usize,
    placeholder: impl Fn(usize) -> String,
) -> String {
    let placeholders: Vec<String> = (1..=arg_count).map(placeholder).collect();
    format!("CALL {name}({})", placeholders.join(", "))
}
