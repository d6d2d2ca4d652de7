//! Everything needed to load a manifest and credentials and run a build:
//! `use db_builder::prelude::*;`. Dialects are exported per enabled feature.

pub use crate::connection::ConnectionHandle;
pub use crate::credentials::{ConnectionProfile, CredentialSource, IniCredentials};
pub use crate::dialect::{Dialect, DialectConnection, DialectRegistry};
pub use crate::error::{DbBuilderError, ErrorCategory};
pub use crate::events::{
    BuildSummary, EventSink, ExecutionEvent, Outcome, StepKind, TracingSink,
};
pub use crate::executor::{BuildExecutor, ExecutorOptions, plan_steps};
pub use crate::manifest::{BuildDefinition, Manifest, ManifestSource};
pub use crate::runner::BuildRunner;
pub use crate::types::ProcArg;

#[cfg(feature = "mysql")]
pub use crate::dialect::MysqlDialect;
#[cfg(feature = "postgres")]
pub use crate::dialect::PostgresDialect;
#[cfg(feature = "sqlite")]
pub use crate::dialect::SqliteDialect;
