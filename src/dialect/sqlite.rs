use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::{Connection, InterruptHandle};
use tokio::sync::Mutex;

use crate::credentials::ConnectionProfile;
use crate::error::DbBuilderError;
use crate::types::ProcArg;

use super::{Dialect, DialectConnection};

/// `None` once the session has been closed.
type SharedSqliteConnection = Arc<Mutex<Option<Connection>>>;

/// `SQLite` through `rusqlite`. The profile's `default_schema` is the database file path;
/// host, port and credentials are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

#[async_trait]
impl Dialect for SqliteDialect {
    fn id(&self) -> &'static str {
        "sqlite"
    }

    fn build_connection_string(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<String, DbBuilderError> {
        let path = profile.schema.trim();
        if path.is_empty() {
            return Err(DbBuilderError::ConfigError(format!(
                "connection '{}': default_schema must name the SQLite database file",
                profile.name
            )));
        }
        Ok(path.to_string())
    }

    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DialectConnection>, DbBuilderError> {
        let path = self.build_connection_string(profile)?;
        let conn = tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .map_err(|e| {
                DbBuilderError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })?
            .map_err(|e| {
                DbBuilderError::ConnectionError(format!("failed to open SQLite database: {e}"))
            })?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Box::new(SqliteConnection {
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt,
        }))
    }
}

pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    interrupt: Arc<InterruptHandle>,
}

/// Armed while a blocking task runs on the caller's behalf. If the caller's future is
/// dropped first (a step timeout), the running statement is interrupted and the task is
/// told not to commit.
struct CancelOnDrop {
    interrupt: Arc<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new(interrupt: Arc<InterruptHandle>) -> Self {
        Self {
            interrupt,
            cancelled: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
            self.interrupt.interrupt();
        }
    }
}

fn ensure_not_cancelled(cancelled: &AtomicBool) -> Result<(), DbBuilderError> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(DbBuilderError::execution("sqlite batch cancelled"));
    }
    Ok(())
}

async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    interrupt: Arc<InterruptHandle>,
    func: F,
) -> Result<R, DbBuilderError>
where
    F: FnOnce(&mut Connection, &AtomicBool) -> Result<R, DbBuilderError> + Send + 'static,
    R: Send + 'static,
{
    let mut cancel = CancelOnDrop::new(interrupt);
    let cancelled = Arc::clone(&cancel.cancelled);
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        let Some(conn) = guard.as_mut() else {
            return Err(DbBuilderError::ConnectionError(
                "SQLite connection is closed".into(),
            ));
        };
        ensure_not_cancelled(&cancelled)?;
        func(conn, &cancelled)
    })
    .await;
    cancel.disarm();
    result.map_err(|e| DbBuilderError::execution(format!("sqlite spawn_blocking join error: {e}")))?
}

#[async_trait]
impl DialectConnection for SqliteConnection {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbBuilderError> {
        let sql_owned = sql.to_owned();
        run_blocking(
            Arc::clone(&self.conn),
            Arc::clone(&self.interrupt),
            move |conn, cancelled| {
                // dropping an uncommitted rusqlite transaction rolls it back
                let tx = conn.transaction()?;
                tx.execute_batch(&sql_owned)
                    .map_err(|e| DbBuilderError::from(e).with_statement(&sql_owned))?;
                ensure_not_cancelled(cancelled)?;
                tx.commit()?;
                Ok(())
            },
        )
        .await
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        _args: &[ProcArg],
    ) -> Result<(), DbBuilderError> {
        Err(DbBuilderError::execution(format!(
            "SQLite does not support stored procedures (cannot call '{name}')"
        )))
    }

    async fn close(self: Box<Self>) -> Result<(), DbBuilderError> {
        // waits for a cancelled batch to finish rolling back
        let taken = self.conn.lock().await.take();
        let Some(conn) = taken else {
            return Ok(());
        };
        conn.close()
            .map_err(|(_, e)| DbBuilderError::ConnectionError(format!("SQLite close failed: {e}")))
    }
}
