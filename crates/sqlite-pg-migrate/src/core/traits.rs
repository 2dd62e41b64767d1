//! Store abstractions used by the migration engine.
//!
//! - [`SourceReader`]: streams typed batches out of the source store
//! - [`TargetWriter`]: truncates and bulk-upserts into the destination store
//!
//! Both also expose the count and keyset-page reads the consistency
//! verifier needs.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

use super::entity::Entity;
use super::schema::{EntityKind, RenameMap};

/// Read records from the source store.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Start streaming `E` records in batches of at most `batch_size`.
    ///
    /// Each call opens its own cursor. The receiver yields `Ok(batch)` until
    /// the table is exhausted; a decode or query failure is delivered as a
    /// final `Err`. Dropping the receiver abandons the read and releases the
    /// cursor.
    fn read<E: Entity>(&self, renames: &RenameMap, batch_size: usize)
        -> mpsc::Receiver<Result<Vec<E>>>;

    /// Number of rows in the entity's source table.
    async fn row_count(&self, kind: EntityKind) -> Result<i64>;

    /// Up to `limit` records with `id > after`, ordered by id.
    async fn read_page<E: Entity>(
        &self,
        renames: &RenameMap,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<E>>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write records to the destination store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Remove every row from the destination tables of `kinds`.
    async fn truncate(&self, kinds: &[EntityKind]) -> Result<()>;

    /// Insert a non-empty batch, skipping rows whose id already exists.
    ///
    /// Returns the number of rows actually inserted.
    async fn upsert<E: Entity>(&self, batch: &[E]) -> Result<u64>;

    /// Number of rows in the entity's destination table.
    async fn row_count(&self, kind: EntityKind) -> Result<i64>;

    /// Up to `limit` records with `id > after`, ordered by id.
    async fn read_page<E: Entity>(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<E>>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
