//! Error types for the migration library.

use thiserror::Error;

use crate::core::schema::EntityKind;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when a store cannot be opened.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code when a source row cannot be decoded.
pub const EXIT_DECODE_ERROR: u8 = 3;
/// Process exit code when the destination rejects a batch.
pub const EXIT_WRITE_ERROR: u8 = 4;
/// Process exit code when verification finds a mismatch.
pub const EXIT_DISCREPANCY: u8 = 5;
/// Process exit code for other database errors.
pub const EXIT_DATABASE_ERROR: u8 = 6;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or destination store could not be opened
    #[error("Cannot connect to {store}: {message}")]
    Connection {
        store: &'static str,
        message: String,
    },

    /// A fetched row does not match the expected field arity or types
    #[error("Decode failed for {entity} (batch {batch}): {message}")]
    Decode {
        entity: EntityKind,
        batch: usize,
        message: String,
    },

    /// Destination rejected a batch for a reason other than a duplicate id
    #[error("Write failed for {entity} (batch {batch}): {message}")]
    Write {
        entity: EntityKind,
        batch: usize,
        message: String,
    },

    /// Source and destination disagree after a migration
    #[error("Discrepancy in {entity}: {detail}")]
    Discrepancy { entity: EntityKind, detail: String },

    /// A background transfer task ended abnormally
    #[error("Transfer failed for {entity}: {message}")]
    Transfer { entity: EntityKind, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error for the named store
    pub fn connection(store: &'static str, message: impl ToString) -> Self {
        MigrateError::Connection {
            store,
            message: message.to_string(),
        }
    }

    /// Create a Decode error
    pub fn decode(entity: EntityKind, batch: usize, message: impl Into<String>) -> Self {
        MigrateError::Decode {
            entity,
            batch,
            message: message.into(),
        }
    }

    /// Attribute a destination failure to a batch.
    ///
    /// Database errors become `Write` and writes are re-stamped with the
    /// batch index; a closed connection stays a connection failure and
    /// everything else passes through unchanged.
    pub fn at_batch(self, entity: EntityKind, batch: usize) -> Self {
        match self {
            MigrateError::Target(e) if e.is_closed() => MigrateError::connection("target", e),
            MigrateError::Target(e) => MigrateError::Write {
                entity,
                batch,
                message: describe_pg_error(&e),
            },
            MigrateError::Write { message, .. } => MigrateError::Write {
                entity,
                batch,
                message,
            },
            other => other,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Decode { .. } => EXIT_DECODE_ERROR,
            MigrateError::Write { .. } => EXIT_WRITE_ERROR,
            MigrateError::Discrepancy { .. } => EXIT_DISCREPANCY,
            MigrateError::Source(_) | MigrateError::Target(_) | MigrateError::Transfer { .. } => {
                EXIT_DATABASE_ERROR
            }
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }
}

/// Render a PostgreSQL error with its server-side detail when present.
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({}): {}", db.message(), db.code().code(), detail),
            None => format!("{} ({})", db.message(), db.code().code()),
        },
        None => e.to_string(),
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
