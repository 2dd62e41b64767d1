//! Post-migration consistency verification.
//!
//! For each entity type the verifier compares row counts, then walks both
//! stores in id order page by page and compares every field except the
//! volatile timestamps. It stops at the first difference.

mod types;

pub use types::{Discrepancy, TableVerifyResult, VerifyResult};

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::core::entity::{Entity, Genre, GenreLink, Movie, Person, PersonLink};
use crate::core::schema::{EntityKind, RenameMap};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::orchestrator::Orchestrator;

/// Compares source and target content for the registered entity types.
pub struct Verifier<'a, S, T> {
    source: &'a S,
    target: &'a T,
    renames: &'a RenameMap,
    page_size: usize,
}

impl<'a, S: SourceReader, T: TargetWriter> Verifier<'a, S, T> {
    pub fn new(source: &'a S, target: &'a T, renames: &'a RenameMap, page_size: usize) -> Self {
        Self {
            source,
            target,
            renames,
            page_size,
        }
    }

    /// Verify every entity type in dependency order.
    pub async fn verify_all(&self) -> Result<VerifyResult> {
        let started = Instant::now();
        let mut result = VerifyResult::new();

        for kind in EntityKind::ALL {
            result.add_table(self.verify(kind).await?);
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Verification complete: {} in sync, {} with differences",
            result.tables_in_sync, result.tables_with_differences
        );
        Ok(result)
    }

    /// Verify one entity type.
    pub async fn verify(&self, kind: EntityKind) -> Result<TableVerifyResult> {
        if self.page_size == 0 {
            return Err(MigrateError::Config("page_size must be at least 1".into()));
        }
        match kind {
            EntityKind::Movie => self.verify_entity::<Movie>().await,
            EntityKind::Genre => self.verify_entity::<Genre>().await,
            EntityKind::Person => self.verify_entity::<Person>().await,
            EntityKind::GenreLink => self.verify_entity::<GenreLink>().await,
            EntityKind::PersonLink => self.verify_entity::<PersonLink>().await,
        }
    }

    async fn verify_entity<E: Entity>(&self) -> Result<TableVerifyResult> {
        let started = Instant::now();
        let source_rows = self.source.row_count(E::KIND).await?;
        let target_rows = self.target.row_count(E::KIND).await?;

        let mut result = TableVerifyResult {
            entity: E::KIND,
            source_row_count: source_rows,
            target_row_count: target_rows,
            rows_compared: 0,
            pages: 0,
            discrepancy: None,
            duration_ms: 0,
        };

        if source_rows != target_rows {
            result.discrepancy = Some(Discrepancy::Count {
                source_rows,
                target_rows,
            });
        } else {
            result.discrepancy = self.compare_content::<E>(&mut result).await?;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        match &result.discrepancy {
            None => info!(
                "{}: {} rows match ({} compared)",
                E::KIND,
                source_rows,
                result.rows_compared
            ),
            Some(d) => warn!("{}: {}", E::KIND, d),
        }
        Ok(result)
    }

    /// Walk both sides in id order and return the first difference.
    async fn compare_content<E: Entity>(
        &self,
        result: &mut TableVerifyResult,
    ) -> Result<Option<Discrepancy>> {
        let mut after = None;

        loop {
            let source_page: Vec<E> = self
                .source
                .read_page(self.renames, after, self.page_size)
                .await?;
            let target_page: Vec<E> = self.target.read_page(after, self.page_size).await?;
            result.pages += 1;
            debug!(
                "{}: page {} ({} source rows, {} target rows)",
                E::KIND,
                result.pages,
                source_page.len(),
                target_page.len()
            );

            let longest = source_page.len().max(target_page.len());
            for i in 0..longest {
                let position = result.rows_compared;
                let (source, target) = match (source_page.get(i), target_page.get(i)) {
                    (Some(s), Some(t)) if s.id() == t.id() => (s, t),
                    (s, t) => {
                        return Ok(Some(Discrepancy::Id {
                            position,
                            source_id: s.map(Entity::id),
                            target_id: t.map(Entity::id),
                        }));
                    }
                };

                if let Some(d) = compare_record(position, source, target) {
                    return Ok(Some(d));
                }
                result.rows_compared += 1;
            }

            match source_page.last() {
                Some(last) if source_page.len() == self.page_size => after = Some(last.id()),
                _ => return Ok(None),
            }
        }
    }
}

/// Compare the non-volatile fields of two records with the same id.
fn compare_record<E: Entity>(position: u64, source: &E, target: &E) -> Option<Discrepancy> {
    source
        .comparable_values()
        .into_iter()
        .zip(target.comparable_values())
        .find(|((_, s), (_, t))| s != t)
        .map(|((field, s), (_, t))| Discrepancy::Field {
            position,
            id: source.id(),
            field: field.to_string(),
            source_value: s.to_string(),
            target_value: t.to_string(),
        })
}

impl<S: SourceReader, T: TargetWriter> Orchestrator<S, T> {
    /// Run the consistency verifier over both stores.
    pub async fn verify(&self, page_size: usize) -> Result<VerifyResult> {
        Verifier::new(
            self.source(),
            self.target(),
            &self.config().migration.field_renames,
            page_size,
        )
        .verify_all()
        .await
    }
}
