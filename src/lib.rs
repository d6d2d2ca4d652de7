//! Database build orchestration.
//!
//! A *build* is a named list of work against one connection: an optional inline SQL batch,
//! SQL script files, then stored procedures. [`BuildRunner`] resolves a build from a
//! [`Manifest`] and its connection from [`IniCredentials`], opens one [`ConnectionHandle`]
//! and hands both to a [`BuildExecutor`].
//!
//! ```rust,no_run
//! use db_builder::prelude::*;
//!
//! # async fn demo() -> Result<(), DbBuilderError> {
//! let manifest = Manifest::from_path("settings.json")?;
//! let credentials = IniCredentials::from_path("config.ini")?;
//! let summary = BuildRunner::new(&manifest, &credentials).run("nightly").await?;
//! println!("{} finished in {:?}", summary.build_name, summary.total_duration);
//! # Ok(()) }
//! ```

pub mod connection;
pub mod credentials;
pub mod dialect;
pub mod error;
pub mod events;
pub mod executor;
pub mod manifest;
pub mod prelude;
pub mod runner;
pub mod types;

pub use connection::ConnectionHandle;
pub use credentials::{ConnectionProfile, CredentialSource, IniCredentials};
pub use dialect::{Dialect, DialectConnection, DialectRegistry};
pub use error::{DbBuilderError, ErrorCategory};
pub use events::{BuildSummary, EventSink, ExecutionEvent, Outcome, StepKind, TracingSink};
pub use executor::{BuildExecutor, ExecutorOptions, Step, plan_steps};
pub use manifest::{BuildDefinition, Manifest, ManifestSource};
pub use runner::{BuildRunner, ResolvedBuild};
pub use types::ProcArg;
