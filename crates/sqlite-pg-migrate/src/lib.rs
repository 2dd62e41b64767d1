//! # sqlite-pg-migrate
//!
//! Movies catalog migration from SQLite to PostgreSQL.
//!
//! The library moves five fixed entity types (film works, genres, persons
//! and the two join tables) from a SQLite file into a PostgreSQL schema:
//!
//! - **Truncate-then-insert** so every run fully replaces the destination
//! - **Batched streaming** with bounded memory regardless of table size
//! - **Conflict-safe inserts** (`ON CONFLICT (id) DO NOTHING`)
//! - **Consistency verification** by count and by id-ordered content
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(false).await?;
//!     println!("Migrated {} rows", result.rows_read);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod typemap;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, VerifyConfig};
pub use crate::core::{Entity, EntityKind, EntitySchema, RenameMap, SourceReader, SqlValue, TargetWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{CountCheck, EntityResult, HealthCheckResult, MigrationResult, Orchestrator};
pub use source::SqliteReader;
pub use target::PgWriter;
pub use verify::{Discrepancy, TableVerifyResult, VerifyResult, Verifier};
