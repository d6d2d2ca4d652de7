use crate::connection::ConnectionHandle;
use crate::credentials::{ConnectionProfile, CredentialSource};
use crate::dialect::DialectRegistry;
use crate::error::DbBuilderError;
use crate::events::BuildSummary;
use crate::executor::BuildExecutor;
use crate::manifest::{BuildDefinition, ManifestSource};

/// A build resolved down to the connection it will use, without connecting.
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    pub build: BuildDefinition,
    pub profile: ConnectionProfile,
    pub dialect_id: &'static str,
}

/// Wires manifest, credentials and dialects to a [`BuildExecutor`].
pub struct BuildRunner<'a> {
    manifest: &'a dyn ManifestSource,
    credentials: &'a dyn CredentialSource,
    registry: DialectRegistry,
    executor: BuildExecutor,
}

impl<'a> BuildRunner<'a> {
    #[must_use]
    pub fn new(manifest: &'a dyn ManifestSource, credentials: &'a dyn CredentialSource) -> Self {
        Self {
            manifest,
            credentials,
            registry: DialectRegistry::with_defaults(),
            executor: BuildExecutor::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DialectRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: BuildExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Look up the build, its connection profile and its dialect.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if any of the three cannot be resolved.
    pub fn resolve(&self, build_name: &str) -> Result<ResolvedBuild, DbBuilderError> {
        let build = self.manifest.build(build_name)?;
        let profile = self.credentials.profile(&build.connection_name)?;
        let dialect = self.registry.resolve(&profile.dialect)?;
        // surfaces profile problems (e.g. empty host) before any connection attempt
        dialect.build_connection_string(&profile)?;
        Ok(ResolvedBuild {
            build,
            profile,
            dialect_id: dialect.id(),
        })
    }

    /// Resolve and run `build_name` to completion.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` before connecting if resolution fails, otherwise
    /// the connection or step error from the run.
    pub async fn run(&self, build_name: &str) -> Result<BuildSummary, DbBuilderError> {
        let resolved = self.resolve(build_name)?;
        tracing::info!(
            build = %resolved.build.build_name,
            connection = %resolved.profile.name,
            dialect = resolved.dialect_id,
            steps = resolved.build.step_count(),
            "starting build"
        );
        let handle = ConnectionHandle::open(&self.registry, &resolved.profile).await?;
        self.executor.execute(&resolved.build, handle).await
    }
}
