//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::schema::{RenameMap, DEFAULT_TARGET_SCHEMA};

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Verification configuration.
    #[serde(default)]
    pub verify: VerifyConfig,
}

/// Source database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite file (default: "db.sqlite").
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,

    /// Pool size (default: 2).
    #[serde(default = "default_source_connections")]
    pub max_connections: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            max_connections: default_source_connections(),
        }
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host (default: "127.0.0.1").
    #[serde(default = "default_pg_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "content").
    #[serde(default = "default_content_schema")]
    pub schema: String,

    /// Pool size (default: 4).
    #[serde(default = "default_target_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per read batch and per INSERT statement (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Destination field name to source column name.
    #[serde(default)]
    pub field_renames: RenameMap,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            field_renames: RenameMap::default(),
        }
    }
}

/// Consistency verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Rows fetched per side per comparison page (default: 500).
    #[serde(default = "default_batch_size")]
    pub page_size: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            page_size: default_batch_size(),
        }
    }
}

// Default value functions

pub(crate) fn default_sqlite_path() -> PathBuf {
    PathBuf::from("db.sqlite")
}

fn default_source_connections() -> u32 {
    2
}

pub(crate) fn default_pg_host() -> String {
    "127.0.0.1".to_string()
}

pub(crate) fn default_pg_port() -> u16 {
    5432
}

pub(crate) fn default_content_schema() -> String {
    DEFAULT_TARGET_SCHEMA.to_string()
}

pub(crate) fn default_target_connections() -> usize {
    4
}

pub(crate) fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
