//! Configuration loading and validation.
//!
//! Configuration comes from a YAML file or, when none is given, from
//! environment variables (a `.env` file in the working directory is
//! honored).

mod types;
mod validation;

pub use types::*;

use types::{
    default_batch_size, default_content_schema, default_pg_host, default_pg_port,
    default_sqlite_path, default_target_connections,
};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::schema::RenameMap;
use crate::error::{MigrateError, Result};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Recognized keys: `SQLITE_PATH`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`,
    /// `DB_HOST`, `DB_PORT`, `DB_SCHEMA` and `BATCH_SIZE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MigrateError::Config(format!("{} is not set", key)))
        };

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| MigrateError::Config(format!("DB_PORT is not a port: '{}'", raw)))?,
            None => default_pg_port(),
        };
        let batch_size = match lookup("BATCH_SIZE") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                MigrateError::Config(format!("BATCH_SIZE is not a number: '{}'", raw))
            })?,
            None => default_batch_size(),
        };

        let config = Config {
            source: SourceConfig {
                path: lookup("SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_sqlite_path),
                ..SourceConfig::default()
            },
            target: TargetConfig {
                host: lookup("DB_HOST").unwrap_or_else(default_pg_host),
                port,
                database: required("DB_NAME")?,
                user: required("DB_USER")?,
                password: lookup("DB_PASSWORD").unwrap_or_default(),
                schema: lookup("DB_SCHEMA").unwrap_or_else(default_content_schema),
                max_connections: default_target_connections(),
            },
            migration: MigrationConfig {
                batch_size,
                field_renames: RenameMap::default(),
            },
            verify: VerifyConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl TargetConfig {
    /// Build a tokio-postgres connection config.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .connect_timeout(Duration::from_secs(30));
        if !self.password.is_empty() {
            pg.password(&self.password);
        }
        pg
    }
}
