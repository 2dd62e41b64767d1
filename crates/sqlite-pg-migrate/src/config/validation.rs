//! Configuration validation.

use super::Config;
use crate::core::schema::{max_field_count, EntityKind};
use crate::error::{MigrateError, Result};

/// PostgreSQL caps bind parameters per statement at this value.
const MAX_BIND_PARAMS: usize = 65535;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }
    if config.source.max_connections == 0 {
        return Err(MigrateError::Config(
            "source.max_connections must be at least 1".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Migration config validation
    let batch_size = config.migration.batch_size;
    if batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    let params_per_statement = batch_size.checked_mul(max_field_count());
    if params_per_statement.map_or(true, |n| n > MAX_BIND_PARAMS) {
        return Err(MigrateError::Config(format!(
            "migration.batch_size {} exceeds the {} bind parameter limit ({} fields per row)",
            batch_size,
            MAX_BIND_PARAMS,
            max_field_count()
        )));
    }

    for (field, column) in config.migration.field_renames.iter() {
        if column.is_empty() {
            return Err(MigrateError::Config(format!(
                "migration.field_renames: empty source column for '{}'",
                field
            )));
        }
        let known = EntityKind::ALL
            .iter()
            .any(|kind| kind.schema().field(field).is_some());
        if !known {
            return Err(MigrateError::Config(format!(
                "migration.field_renames: unknown field '{}'",
                field
            )));
        }
    }

    if config.verify.page_size == 0 {
        return Err(MigrateError::Config(
            "verify.page_size must be at least 1".into(),
        ));
    }

    Ok(())
}
