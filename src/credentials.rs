//! Connection profiles and where they come from.
//!
//! The bundled [`IniCredentials`] reads one INI section per connection name:
//!
//! ```ini
//! [reporting]
//! host = db.internal
//! port = 3306
//! default_schema = reporting
//! username = builder
//! password = secret
//! db_type = mysql
//! ```
//!
//! Any key can be overridden from the environment as
//! `DB_BUILDER_<CONNECTION>__<KEY>`, e.g. `DB_BUILDER_REPORTING__PASSWORD`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use config::{Config, Environment, File, FileFormat, ValueKind};
use serde::Deserialize;

use crate::error::DbBuilderError;

pub const ENV_PREFIX: &str = "DB_BUILDER";

/// Connection parameters for one named connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    /// Dialect id, resolved against a [`DialectRegistry`](crate::dialect::DialectRegistry).
    pub dialect: String,
    pub host: String,
    pub port: u16,
    pub schema: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lookup of connection profiles by name.
pub trait CredentialSource {
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the profile is unknown or malformed.
    fn profile(&self, connection_name: &str) -> Result<ConnectionProfile, DbBuilderError>;
}

/// Raw section as it appears in the credentials file; every field is required.
#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    host: Option<String>,
    port: Option<String>,
    default_schema: Option<String>,
    username: Option<String>,
    password: Option<String>,
    db_type: Option<String>,
}

impl RawProfile {
    fn into_profile(self, name: &str) -> Result<ConnectionProfile, DbBuilderError> {
        let require = |value: Option<String>, key: &str| {
            value.ok_or_else(|| {
                DbBuilderError::ConfigError(format!(
                    "connection '{name}' is missing required key '{key}'"
                ))
            })
        };

        let port_raw = require(self.port, "port")?;
        let port = port_raw.trim().parse::<u16>().map_err(|e| {
            DbBuilderError::ConfigError(format!(
                "connection '{name}' has invalid port '{port_raw}': {e}"
            ))
        })?;

        Ok(ConnectionProfile {
            name: name.to_string(),
            dialect: require(self.db_type, "db_type")?.trim().to_string(),
            host: require(self.host, "host")?,
            port,
            schema: require(self.default_schema, "default_schema")?,
            username: require(self.username, "username")?,
            password: require(self.password, "password")?,
        })
    }
}

impl RawProfile {
    /// Keys present in `over` replace ours.
    fn overlay(self, over: RawProfile) -> RawProfile {
        RawProfile {
            host: over.host.or(self.host),
            port: over.port.or(self.port),
            default_schema: over.default_schema.or(self.default_schema),
            username: over.username.or(self.username),
            password: over.password.or(self.password),
            db_type: over.db_type.or(self.db_type),
        }
    }

    fn from_value(name: &str, value: &config::Value) -> Result<Self, DbBuilderError> {
        value.clone().try_deserialize().map_err(|e| {
            DbBuilderError::ConfigError(format!("connection '{name}' is malformed: {e}"))
        })
    }
}

/// Credentials loaded from an INI file plus environment overrides.
///
/// Section names keep their case from the file. Environment keys arrive lowercased, so an
/// override applies to the section whose name matches it case-insensitively.
pub struct IniCredentials {
    sections: BTreeMap<String, config::Value>,
    overrides: HashMap<String, config::Value>,
}

impl fmt::Debug for IniCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IniCredentials")
            .field("connections", &self.sections.keys().collect::<Vec<_>>())
            .field("overridden", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IniCredentials {
    /// Load the credentials file at `path`, applying `DB_BUILDER_*` overrides from the
    /// process environment.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the file is missing or cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DbBuilderError> {
        Self::from_path_with_env(path, env_source())
    }

    /// Like [`IniCredentials::from_path`], with the overrides read from `env` instead.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the file is missing or cannot be parsed.
    pub fn from_path_with_env(
        path: impl AsRef<Path>,
        env: Environment,
    ) -> Result<Self, DbBuilderError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DbBuilderError::ConfigError(format!(
                "credentials file {} does not exist",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            DbBuilderError::ConfigError(format!(
                "credentials path {} is not valid UTF-8",
                path.display()
            ))
        })?;

        let sections = tables(File::new(path_str, FileFormat::Ini)).map_err(|e| {
            DbBuilderError::ConfigError(format!(
                "failed to read credentials file {}: {e}",
                path.display()
            ))
        })?;
        let overrides = tables(env)
            .map_err(|e| {
                DbBuilderError::ConfigError(format!("failed to read credential overrides: {e}"))
            })?
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        Ok(Self {
            sections,
            overrides,
        })
    }

    /// Parse credentials from INI text; used for inline configuration and tests.
    /// The environment is not consulted.
    ///
    /// # Errors
    /// Returns `DbBuilderError::ConfigError` if the text is not valid INI.
    pub fn from_ini_str(ini: &str) -> Result<Self, DbBuilderError> {
        let sections = tables(File::from_str(ini, FileFormat::Ini))
            .map_err(|e| DbBuilderError::ConfigError(format!("failed to parse credentials: {e}")))?;
        Ok(Self {
            sections,
            overrides: HashMap::new(),
        })
    }

    /// Exact name first, then a case-insensitive match.
    fn section(&self, name: &str) -> Option<(&str, &config::Value)> {
        self.sections
            .get_key_value(name)
            .or_else(|| {
                self.sections
                    .iter()
                    .find(|(section, _)| section.eq_ignore_ascii_case(name))
            })
            .map(|(section, value)| (section.as_str(), value))
    }

    /// Names of every section in the file. Overrides for connections the file does not
    /// define are not listed.
    #[must_use]
    pub fn connection_names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }
}

impl CredentialSource for IniCredentials {
    fn profile(&self, connection_name: &str) -> Result<ConnectionProfile, DbBuilderError> {
        let (section, value) = self.section(connection_name).ok_or_else(|| {
            DbBuilderError::ConfigError(format!(
                "connection '{connection_name}' not found in credentials"
            ))
        })?;
        let mut raw = RawProfile::from_value(section, value)?;
        if let Some(over) = self.overrides.get(&section.to_lowercase()) {
            raw = raw.overlay(RawProfile::from_value(section, over)?);
        }
        raw.into_profile(connection_name)
    }
}

impl CredentialSource for HashMap<String, ConnectionProfile> {
    fn profile(&self, connection_name: &str) -> Result<ConnectionProfile, DbBuilderError> {
        self.get(connection_name).cloned().ok_or_else(|| {
            DbBuilderError::ConfigError(format!(
                "connection '{connection_name}' not found in credentials"
            ))
        })
    }
}

/// Top-level tables of `source`; stray root keys are ignored.
fn tables<S>(source: S) -> Result<BTreeMap<String, config::Value>, config::ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let root = Config::builder()
        .add_source(source)
        .build()?
        .try_deserialize::<HashMap<String, config::Value>>()?;
    Ok(root
        .into_iter()
        .filter(|(_, value)| matches!(value.kind, ValueKind::Table(_)))
        .collect())
}

/// `DB_BUILDER_<CONNECTION>__<KEY>` overrides from the process environment.
#[must_use]
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
