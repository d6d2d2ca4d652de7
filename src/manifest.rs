//! Build manifests: a JSON array of named builds.
//!
//! ```json
//! [
//!   {
//!     "build_name": "nightly",
//!     "connection_name": "reporting",
//!     "raw_sql_to_execute": "TRUNCATE staging_orders;",
//!     "raw_sql_file_locations": ["sql/01_tables.sql", "sql/02_views.sql"],
//!     "stored_procedure_names": ["refresh_order_facts"]
//!   }
//! ]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DbBuilderError;

/// One named build, fully resolved from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildDefinition {
    pub build_name: String,
    pub connection_name: String,
    #[serde(default, rename = "raw_sql_to_execute")]
    pub inline_sql: Option<String>,
    #[serde(default, rename = "raw_sql_file_locations")]
    pub sql_file_paths: Vec<PathBuf>,
    #[serde(default)]
    pub stored_procedure_names: Vec<String>,
}

impl BuildDefinition {
    #[must_use]
    pub fn new(build_name: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            build_name: build_name.into(),
            connection_name: connection_name.into(),
            inline_sql: None,
            sql_file_paths: Vec::new(),
            stored_procedure_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_inline_sql(mut self, sql: impl Into<String>) -> Self {
        self.inline_sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn with_sql_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sql_file_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn with_stored_procedure(mut self, name: impl Into<String>) -> Self {
        self.stored_procedure_names.push(name.into());
        self
    }

    /// Inline SQL that should actually run; blank text counts as absent.
    #[must_use]
    pub fn effective_inline_sql(&self) -> Option<&str> {
        self.inline_sql
            .as_deref()
            .filter(|sql| !sql.trim().is_empty())
    }

    /// Number of steps the executor will attempt.
    #[must_use]
    pub fn step_count(&self) -> usize {
        usize::from(self.effective_inline_sql().is_some())
            + self.sql_file_paths.len()
            + self.stored_procedure_names.len()
    }
}

/// Lookup of build definitions by name.
pub trait ManifestSource {
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if no build has this name.
    fn build(&self, build_name: &str) -> Result<BuildDefinition, DbBuilderError>;
}

/// Every build in a manifest, in file order, with unique names.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    builds: Vec<BuildDefinition>,
}

impl Manifest {
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if two builds share a name.
    pub fn new(builds: Vec<BuildDefinition>) -> Result<Self, DbBuilderError> {
        let mut seen = HashSet::new();
        for build in &builds {
            if !seen.insert(build.build_name.as_str()) {
                return Err(DbBuilderError::ConfigError(format!(
                    "build '{}' is defined more than once in the manifest",
                    build.build_name
                )));
            }
        }
        Ok(Self { builds })
    }

    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the file cannot be read or is not a valid manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DbBuilderError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbBuilderError::ConfigError(format!(
                "failed to read manifest {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the JSON is not an array of build objects.
    pub fn from_json_str(json: &str) -> Result<Self, DbBuilderError> {
        let builds: Vec<BuildDefinition> = serde_json::from_str(json)
            .map_err(|e| DbBuilderError::ConfigError(format!("invalid manifest: {e}")))?;
        Self::new(builds)
    }

    #[must_use]
    pub fn build_names(&self) -> Vec<&str> {
        self.builds.iter().map(|b| b.build_name.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, build_name: &str) -> Option<&BuildDefinition> {
        self.builds.iter().find(|b| b.build_name == build_name)
    }
}

impl ManifestSource for Manifest {
    fn build(&self, build_name: &str) -> Result<BuildDefinition, DbBuilderError> {
        self.get(build_name).cloned().ok_or_else(|| {
            DbBuilderError::ConfigError(format!("build '{build_name}' not found in manifest"))
        })
    }
}
