//! In-memory stores for exercising the orchestrator and verifier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::entity::Entity;
use crate::core::schema::{EntityKind, RenameMap};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

fn id_of(row: &[SqlValue]) -> Option<Uuid> {
    match row.first() {
        Some(SqlValue::Uuid(id)) => Some(*id),
        _ => None,
    }
}

/// Source whose tables are plain value rows, decoded on read.
#[derive(Default)]
pub struct MemorySource {
    tables: HashMap<EntityKind, Vec<Vec<SqlValue>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<E: Entity>(mut self, records: &[E]) -> Self {
        let rows = self.tables.entry(E::KIND).or_default();
        rows.extend(records.iter().map(Entity::to_values));
        self
    }

    /// Append a row that may not decode.
    pub fn with_raw_row(mut self, kind: EntityKind, row: Vec<SqlValue>) -> Self {
        self.tables.entry(kind).or_default().push(row);
        self
    }

    fn rows(&self, kind: EntityKind) -> Vec<Vec<SqlValue>> {
        self.tables.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn read<E: Entity>(
        &self,
        _renames: &RenameMap,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Vec<E>>> {
        let rows = self.rows(E::KIND);
        let (tx, rx) = mpsc::channel(rows.len() + 1);

        let mut batch = Vec::new();
        let mut batch_idx = 0;
        for row in rows {
            match E::from_values(row) {
                Ok(record) => batch.push(record),
                Err(msg) => {
                    let _ = tx.try_send(Err(MigrateError::decode(E::KIND, batch_idx, msg)));
                    return rx;
                }
            }
            if batch.len() == batch_size {
                let _ = tx.try_send(Ok(std::mem::take(&mut batch)));
                batch_idx += 1;
            }
        }
        if !batch.is_empty() {
            let _ = tx.try_send(Ok(batch));
        }
        rx
    }

    async fn row_count(&self, kind: EntityKind) -> Result<i64> {
        Ok(self.tables.get(&kind).map_or(0, Vec::len) as i64)
    }

    async fn read_page<E: Entity>(
        &self,
        _renames: &RenameMap,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<E>> {
        let mut rows = self.rows(E::KIND);
        rows.sort_by_key(|r| id_of(r));
        rows.into_iter()
            .filter(|r| after.is_none() || id_of(r) > after)
            .take(limit)
            .map(|r| E::from_values(r).map_err(|msg| MigrateError::decode(E::KIND, 0, msg)))
            .collect()
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Target keyed by id, with optional injected write failure.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<EntityKind, BTreeMap<Uuid, Vec<SqlValue>>>>,
    calls: Mutex<HashMap<EntityKind, usize>>,
    fail_at: Option<(EntityKind, usize)>,
    pub truncations: Mutex<Vec<Vec<EntityKind>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given upsert call (zero-based) for an entity kind.
    pub fn failing_at(mut self, kind: EntityKind, call: usize) -> Self {
        self.fail_at = Some((kind, call));
        self
    }

    /// Store records directly, bypassing upsert.
    pub fn seed<E: Entity>(&self, records: &[E]) {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(E::KIND).or_default();
        for record in records {
            table.insert(record.id(), record.to_values());
        }
    }

    /// Overwrite one stored row.
    pub fn replace<E: Entity>(&self, record: &E) {
        self.seed(std::slice::from_ref(record));
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<Uuid> {
        self.tables
            .lock()
            .unwrap()
            .get(&kind)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn upsert_calls(&self, kind: EntityKind) -> usize {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn truncate(&self, kinds: &[EntityKind]) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        for kind in kinds {
            tables.remove(kind);
        }
        self.truncations.lock().unwrap().push(kinds.to_vec());
        Ok(())
    }

    async fn upsert<E: Entity>(&self, batch: &[E]) -> Result<u64> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(E::KIND).or_insert(0);
            *n += 1;
            *n - 1
        };
        if self.fail_at == Some((E::KIND, call)) {
            return Err(MigrateError::Write {
                entity: E::KIND,
                batch: 0,
                message: "null value in column violates not-null constraint".into(),
            });
        }

        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(E::KIND).or_default();
        let mut inserted = 0;
        for record in batch {
            if !table.contains_key(&record.id()) {
                table.insert(record.id(), record.to_values());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn row_count(&self, kind: EntityKind) -> Result<i64> {
        Ok(self.ids(kind).len() as i64)
    }

    async fn read_page<E: Entity>(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<E>> {
        let tables = self.tables.lock().unwrap();
        let Some(table) = tables.get(&E::KIND) else {
            return Ok(Vec::new());
        };
        table
            .iter()
            .filter(|(id, _)| after.map_or(true, |a| **id > a))
            .take(limit)
            .map(|(_, row)| {
                E::from_values(row.clone()).map_err(|msg| MigrateError::decode(E::KIND, 0, msg))
            })
            .collect()
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
