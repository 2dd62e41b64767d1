//! Types for consistency verification.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::schema::EntityKind;
use crate::error::MigrateError;

/// First difference found between source and target for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Row counts differ; content was not compared.
    Count { source_rows: i64, target_rows: i64 },

    /// The rows at the same position in id order have different ids.
    /// `None` means that side ran out of rows.
    Id {
        position: u64,
        source_id: Option<Uuid>,
        target_id: Option<Uuid>,
    },

    /// Same id, different field content.
    Field {
        position: u64,
        id: Uuid,
        field: String,
        source_value: String,
        target_value: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |v: &Option<Uuid>| v.map_or_else(|| "<none>".to_string(), |u| u.to_string());
        match self {
            Discrepancy::Count {
                source_rows,
                target_rows,
            } => write!(
                f,
                "row count differs: source={} target={}",
                source_rows, target_rows
            ),
            Discrepancy::Id {
                position,
                source_id,
                target_id,
            } => write!(
                f,
                "row {} has id {} in source but {} in target",
                position,
                id(source_id),
                id(target_id)
            ),
            Discrepancy::Field {
                position,
                id,
                field,
                source_value,
                target_value,
            } => write!(
                f,
                "row {} (id {}) field '{}': source={} target={}",
                position, id, field, source_value, target_value
            ),
        }
    }
}

/// Verification result for a single entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableVerifyResult {
    /// Entity type checked.
    pub entity: EntityKind,
    /// Row count in source.
    pub source_row_count: i64,
    /// Row count in target.
    pub target_row_count: i64,
    /// Row pairs compared field by field.
    pub rows_compared: u64,
    /// Pages fetched from each side.
    pub pages: usize,
    /// First difference, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancy: Option<Discrepancy>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl TableVerifyResult {
    /// Check if the entity type is in sync.
    pub fn is_match(&self) -> bool {
        self.discrepancy.is_none()
    }

    /// The discrepancy as an error, if there is one.
    pub fn to_error(&self) -> Option<MigrateError> {
        self.discrepancy.as_ref().map(|d| MigrateError::Discrepancy {
            entity: self.entity,
            detail: d.to_string(),
        })
    }
}

/// Overall verification result for all entity types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Results for each entity type.
    pub tables: Vec<TableVerifyResult>,
    /// Entity types that matched.
    pub tables_in_sync: usize,
    /// Entity types with a discrepancy.
    pub tables_with_differences: usize,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl VerifyResult {
    /// Create a new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table result.
    pub fn add_table(&mut self, result: TableVerifyResult) {
        if result.is_match() {
            self.tables_in_sync += 1;
        } else {
            self.tables_with_differences += 1;
        }
        self.tables.push(result);
    }

    /// True when every entity type matched.
    pub fn all_match(&self) -> bool {
        self.tables_with_differences == 0
    }

    /// First discrepancy across all entity types, as an error.
    pub fn first_error(&self) -> Option<MigrateError> {
        self.tables.iter().find_map(TableVerifyResult::to_error)
    }
}
