use std::error::Error;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};
use tokio_util::bytes;

use crate::credentials::ConnectionProfile;
use crate::error::DbBuilderError;
use crate::types::ProcArg;

use super::{Dialect, DialectConnection, call_statement};

/// `PostgreSQL` through `tokio-postgres` (no TLS).
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

#[async_trait]
impl Dialect for PostgresDialect {
    fn id(&self) -> &'static str {
        "postgres"
    }

    fn build_connection_string(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<String, DbBuilderError> {
        if profile.host.trim().is_empty() {
            return Err(DbBuilderError::ConfigError(format!(
                "connection '{}': host is required",
                profile.name
            )));
        }
        if profile.schema.trim().is_empty() {
            return Err(DbBuilderError::ConfigError(format!(
                "connection '{}': dbname (default_schema) is required",
                profile.name
            )));
        }
        Ok(format!(
            "host={} port={} user={} password={} dbname={}",
            quote(profile.host.trim()),
            profile.port,
            quote(&profile.username),
            quote(&profile.password),
            quote(&profile.schema),
        ))
    }

    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DialectConnection>, DbBuilderError> {
        let conn_str = self.build_connection_string(profile)?;
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .map_err(|e| {
                DbBuilderError::ConnectionError(format!(
                    "failed to connect to Postgres at {}:{}: {e}",
                    profile.host, profile.port
                ))
            })?;

        // the connection object drives the socket; it finishes once the client is dropped
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Postgres connection ended with error: {e}");
            }
        });

        Ok(Box::new(PostgresConnection { client, driver }))
    }
}

pub struct PostgresConnection {
    client: Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl DialectConnection for PostgresConnection {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbBuilderError> {
        let tx = self.client.transaction().await?;
        let outcome = tx.batch_execute(sql).await;
        match outcome {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Postgres rollback after failed batch also failed: {rollback_err}");
                }
                Err(DbBuilderError::from(e).with_statement(sql))
            }
        }
    }

    async fn call_procedure(&mut self, name: &str, args: &[ProcArg]) -> Result<(), DbBuilderError> {
        let call = call_statement(name, args.len(), |i| format!("${i}"));
        let params: Vec<&(dyn ToSql + Sync)> =
            args.iter().map(|a| a as &(dyn ToSql + Sync)).collect();

        let tx = self.client.transaction().await?;
        let outcome = tx.execute(call.as_str(), &params).await;
        match outcome {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Postgres rollback after failed call also failed: {rollback_err}");
                }
                Err(DbBuilderError::from(e).with_statement(&call))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DbBuilderError> {
        let PostgresConnection { client, driver } = *self;
        drop(client);
        driver.await.map_err(|e| {
            DbBuilderError::ConnectionError(format!("Postgres connection task failed: {e}"))
        })
    }
}

/// Single-quote a libpq key/value, escaping backslashes and quotes.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

impl ProcArg {
    fn accepts_pg(&self, ty: &Type) -> bool {
        match self {
            ProcArg::Int(_) => matches!(*ty, Type::INT2 | Type::INT4 | Type::INT8),
            ProcArg::Float(_) => matches!(*ty, Type::FLOAT4 | Type::FLOAT8),
            ProcArg::Text(_) => <String as ToSql>::accepts(ty),
            ProcArg::Bool(_) => *ty == Type::BOOL,
            ProcArg::Timestamp(_) => <NaiveDateTime as ToSql>::accepts(ty),
            ProcArg::Null => true,
        }
    }
}

impl ToSql for ProcArg {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if !self.accepts_pg(ty) {
            return Err(format!("cannot bind {self:?} to a parameter of type {ty}").into());
        }
        match self {
            ProcArg::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            ProcArg::Float(f) if *ty == Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            ProcArg::Float(f) => f.to_sql(ty, out),
            ProcArg::Text(s) => s.to_sql(ty, out),
            ProcArg::Bool(b) => b.to_sql(ty, out),
            ProcArg::Timestamp(dt) => dt.to_sql(ty, out),
            ProcArg::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8 | Type::BOOL
        ) || <String as ToSql>::accepts(ty)
            || <NaiveDateTime as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}
