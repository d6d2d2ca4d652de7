use crate::credentials::ConnectionProfile;
use crate::dialect::{DialectConnection, DialectRegistry, validate_procedure_name};
use crate::error::DbBuilderError;
use crate::types::ProcArg;

/// Owns the single database session used by one build run.
///
/// Each operation runs in its own transaction on the session. The handle is closed with
/// [`ConnectionHandle::close`]; after that, or after a failed close, every operation fails
/// with `DbBuilderError::ConnectionError`.
pub struct ConnectionHandle {
    dialect_id: String,
    connection_name: String,
    inner: Option<Box<dyn DialectConnection>>,
}

impl ConnectionHandle {
    /// Resolve the profile's dialect and open a session.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` for an unknown dialect (before any network
    /// activity) or `DbBuilderError::ConnectionError` if the database cannot be reached.
    pub async fn open(
        registry: &DialectRegistry,
        profile: &ConnectionProfile,
    ) -> Result<Self, DbBuilderError> {
        let dialect = registry.resolve(&profile.dialect)?;
        tracing::debug!(
            connection = %profile.name,
            dialect = dialect.id(),
            host = %profile.host,
            port = profile.port,
            schema = %profile.schema,
            "opening connection"
        );
        let inner = dialect.connect(profile).await?;
        Ok(Self::from_parts(dialect.id(), &profile.name, inner))
    }

    /// Wrap an already-open dialect session.
    #[must_use]
    pub fn from_parts(
        dialect_id: &str,
        connection_name: &str,
        inner: Box<dyn DialectConnection>,
    ) -> Self {
        Self {
            dialect_id: dialect_id.to_string(),
            connection_name: connection_name.to_string(),
            inner: Some(inner),
        }
    }

    #[must_use]
    pub fn dialect_id(&self) -> &str {
        &self.dialect_id
    }

    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn session(&mut self) -> Result<&mut Box<dyn DialectConnection>, DbBuilderError> {
        self.inner.as_mut().ok_or_else(|| {
            DbBuilderError::ConnectionError(format!(
                "connection '{}' is already closed",
                self.connection_name
            ))
        })
    }

    /// Execute `text` (one or more `;`-separated statements) as a single transaction.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ExecutionError` if `text` is blank or any statement fails;
    /// nothing from the batch is committed in that case.
    pub async fn execute_raw_sql(&mut self, text: &str) -> Result<(), DbBuilderError> {
        if text.trim().is_empty() {
            return Err(DbBuilderError::execution("refusing to execute an empty SQL batch"));
        }
        self.session()?.execute_batch(text).await
    }

    /// Call a stored procedure with positional arguments and commit on success.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ExecutionError` if the name is not a valid identifier or the
    /// database reports a failure.
    pub async fn call_stored_procedure(
        &mut self,
        name: &str,
        args: &[ProcArg],
    ) -> Result<(), DbBuilderError> {
        validate_procedure_name(name)?;
        self.session()?.call_procedure(name, args).await
    }

    /// Same as [`call_stored_procedure`](Self::call_stored_procedure) with no arguments.
    ///
    /// # Errors
    /// See [`call_stored_procedure`](Self::call_stored_procedure).
    pub async fn call_stored_procedure_default(&mut self, name: &str) -> Result<(), DbBuilderError> {
        self.call_stored_procedure(name, &[]).await
    }

    /// Release the session. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConnectionError` if the driver reports a failure while closing.
    pub async fn close(&mut self) -> Result<(), DbBuilderError> {
        match self.inner.take() {
            Some(inner) => {
                let result = inner.close().await;
                tracing::debug!(connection = %self.connection_name, "connection closed");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // driver resources are released by their own Drop impls
            tracing::warn!(
                connection = %self.connection_name,
                "connection handle dropped without close"
            );
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("dialect_id", &self.dialect_id)
            .field("connection_name", &self.connection_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
