//! Migration orchestrator - main workflow coordinator.
//!
//! One pass per run: truncate every destination table, then stream each
//! entity type from the source into the destination in dependency order,
//! one batch at a time.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::entity::{Entity, Genre, GenreLink, Movie, Person, PersonLink};
use crate::core::schema::EntityKind;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::source::SqliteReader;
use crate::target::PgWriter;

/// Migration orchestrator.
pub struct Orchestrator<S = SqliteReader, T = PgWriter> {
    config: Config,
    source: S,
    target: T,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status ("completed" or "dry_run").
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Rows per batch used for the run.
    pub batch_size: usize,

    /// Per-entity outcome in processing order.
    pub entities: Vec<EntityResult>,

    /// Total rows read from the source.
    pub rows_read: i64,

    /// Total rows newly inserted into the target.
    pub rows_inserted: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,
}

/// Outcome for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResult {
    pub entity: EntityKind,
    pub rows_read: i64,
    pub rows_inserted: i64,
    pub batches: usize,
    pub duration_seconds: f64,
}

/// Row counts on both sides for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCheck {
    pub entity: EntityKind,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Result of probing both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create a new orchestrator connected to both stores.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = SqliteReader::new(&config.source).await?;
        let target = PgWriter::new(&config.target).await?;

        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// Open each store independently and time the round trip.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let started = Instant::now();
        let source = SqliteReader::new(&config.source).await;
        let source_latency_ms = started.elapsed().as_millis() as u64;
        let source_error = match source {
            Ok(reader) => {
                reader.close().await;
                None
            }
            Err(e) => Some(e.to_string()),
        };

        let started = Instant::now();
        let target = PgWriter::new(&config.target).await;
        let target_latency_ms = started.elapsed().as_millis() as u64;
        let target_error = match target {
            Ok(writer) => {
                writer.close().await;
                None
            }
            Err(e) => Some(e.to_string()),
        };

        HealthCheckResult {
            source_connected: source_error.is_none(),
            source_latency_ms,
            target_connected: target_error.is_none(),
            target_latency_ms,
            healthy: source_error.is_none() && target_error.is_none(),
            source_error,
            target_error,
        }
    }
}

impl<S: SourceReader, T: TargetWriter> Orchestrator<S, T> {
    /// Build an orchestrator over already-open stores.
    pub fn with_stores(config: Config, source: S, target: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            target,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Run the migration.
    ///
    /// A dry run only counts source rows and leaves the target untouched.
    pub async fn run(&self, dry_run: bool) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let batch_size = self.config.migration.batch_size;

        info!(
            "Starting migration run: {} ({} -> {}, batch size {})",
            run_id,
            self.source.db_type(),
            self.target.db_type(),
            batch_size
        );

        let mut entities = Vec::with_capacity(EntityKind::ALL.len());

        if dry_run {
            info!("Dry run: counting source rows only");
            for kind in EntityKind::ALL {
                let rows = self.source.row_count(kind).await?;
                info!("{}: {} rows would be migrated", kind, rows);
                entities.push(EntityResult {
                    entity: kind,
                    rows_read: rows,
                    rows_inserted: 0,
                    batches: (rows as usize).div_ceil(batch_size),
                    duration_seconds: 0.0,
                });
            }
        } else {
            // Phase 1: Clear every destination table before any insert
            info!("Phase 1: Truncating destination tables");
            self.target.truncate(&EntityKind::ALL).await?;

            // Phase 2: Transfer in dependency order
            info!("Phase 2: Transferring data");
            for kind in EntityKind::ALL {
                let result = self.migrate_kind(kind).await.inspect_err(|e| {
                    error!("{}: migration aborted: {}", kind, e);
                })?;
                entities.push(result);
            }
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_read: i64 = entities.iter().map(|e| e.rows_read).sum();
        let rows_inserted: i64 = entities.iter().map(|e| e.rows_inserted).sum();
        let rows_per_second = if duration > 0.0 && !dry_run {
            (rows_read as f64 / duration) as i64
        } else {
            0
        };

        let result = MigrationResult {
            run_id,
            status: if dry_run { "dry_run" } else { "completed" }.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            batch_size,
            entities,
            rows_read,
            rows_inserted,
            rows_per_second,
        };

        info!(
            "Migration {}: {} entity types, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.entities.len(),
            result.rows_read,
            result.duration_seconds,
            result.rows_per_second
        );

        Ok(result)
    }

    async fn migrate_kind(&self, kind: EntityKind) -> Result<EntityResult> {
        match kind {
            EntityKind::Movie => self.migrate_entity::<Movie>().await,
            EntityKind::Genre => self.migrate_entity::<Genre>().await,
            EntityKind::Person => self.migrate_entity::<Person>().await,
            EntityKind::GenreLink => self.migrate_entity::<GenreLink>().await,
            EntityKind::PersonLink => self.migrate_entity::<PersonLink>().await,
        }
    }

    /// Stream one entity type from source to target, batch by batch.
    async fn migrate_entity<E: Entity>(&self) -> Result<EntityResult> {
        let started = Instant::now();
        let mut batches = self.source.read::<E>(
            &self.config.migration.field_renames,
            self.config.migration.batch_size,
        );

        let mut batch_idx = 0usize;
        let mut rows_read = 0i64;
        let mut rows_inserted = 0i64;

        while let Some(batch) = batches.recv().await {
            let batch = batch?;
            let inserted = self
                .target
                .upsert(&batch)
                .await
                .map_err(|e| e.at_batch(E::KIND, batch_idx))?;

            debug!(
                "{}: batch {} wrote {} of {} rows",
                E::KIND,
                batch_idx,
                inserted,
                batch.len()
            );
            rows_read += batch.len() as i64;
            rows_inserted += inserted as i64;
            batch_idx += 1;
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        info!(
            "{}: completed ({} rows, {} batches)",
            E::KIND,
            rows_read,
            batch_idx
        );

        Ok(EntityResult {
            entity: E::KIND,
            rows_read,
            rows_inserted,
            batches: batch_idx,
            duration_seconds,
        })
    }

    /// Validate row counts between source and target.
    pub async fn validate(&self) -> Result<Vec<CountCheck>> {
        let mut results = Vec::with_capacity(EntityKind::ALL.len());

        for kind in EntityKind::ALL {
            let source_rows = self.source.row_count(kind).await?;
            let target_rows = self.target.row_count(kind).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", kind, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    kind, source_rows, target_rows
                );
            }

            results.push(CountCheck {
                entity: kind,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Release both stores.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Outcome for one entity type.
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityResult> {
        self.entities.iter().find(|e| e.entity == kind)
    }
}

impl From<&CountCheck> for MigrateError {
    fn from(check: &CountCheck) -> Self {
        MigrateError::Discrepancy {
            entity: check.entity,
            detail: format!(
                "row count differs: source={} target={}",
                check.source_rows, check.target_rows
            ),
        }
    }
}
