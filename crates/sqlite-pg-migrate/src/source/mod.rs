//! SQLite source reader.
//!
//! Uses SQLx for connection pooling and async query execution. The source
//! is opened read-only; the engine only issues projection and count queries.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::core::entity::Entity;
use crate::core::schema::{quote_ident, EntityKind, EntitySchema, RenameMap, ID};
use crate::core::traits::SourceReader;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::typemap::decode_sqlite;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on rows reserved up front for a batch buffer.
const MAX_BATCH_PREALLOC: usize = 1024;

/// SQLite source reader implementation.
pub struct SqliteReader {
    pool: SqlitePool,
}

impl SqliteReader {
    /// Open the SQLite database named in the configuration.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        if !config.path.exists() {
            return Err(MigrateError::connection(
                "source",
                format!("SQLite database not found: {}", config.path.display()),
            ));
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection("source", e))?;

        let reader = Self::from_pool(pool);
        reader.test_connection().await?;

        info!("Connected to SQLite source: {}", config.path.display());
        Ok(reader)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run a trivial query to prove the source is readable.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection("source", e))?;
        Ok(())
    }

    /// SELECT statement for an entity, renames applied.
    fn select_sql(schema: &EntitySchema, renames: &RenameMap) -> String {
        format!(
            "SELECT {} FROM {}",
            renames.projection(schema),
            quote_ident(schema.source_table)
        )
    }

    /// Keyset page query ordered by id.
    fn page_sql(schema: &EntitySchema, renames: &RenameMap, keyed: bool) -> String {
        let id = quote_ident(renames.source_column(ID));
        let filter = if keyed {
            format!(" WHERE lower({}) > ?", id)
        } else {
            String::new()
        };
        format!(
            "{}{} ORDER BY lower({}) LIMIT ?",
            Self::select_sql(schema, renames),
            filter,
            id
        )
    }

    /// Decode a row into values in field-list order.
    fn row_to_values(row: &SqliteRow, schema: &EntitySchema) -> std::result::Result<Vec<SqlValue>, String> {
        if row.len() != schema.fields.len() {
            return Err(format!(
                "expected {} columns, got {}",
                schema.fields.len(),
                row.len()
            ));
        }
        schema
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| decode_sqlite(row, idx, field))
            .collect()
    }

    fn decode_row<E: Entity>(row: &SqliteRow) -> std::result::Result<E, String> {
        E::from_values(Self::row_to_values(row, E::schema())?)
    }

    async fn read_impl<E: Entity>(
        pool: SqlitePool,
        sql: String,
        batch_size: usize,
        tx: mpsc::Sender<Result<Vec<E>>>,
    ) -> Result<()> {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        let capacity = batch_size.min(MAX_BATCH_PREALLOC);
        let mut batch: Vec<E> = Vec::with_capacity(capacity);
        let mut batch_idx = 0usize;

        while let Some(row) = rows.try_next().await? {
            let record = Self::decode_row::<E>(&row)
                .map_err(|msg| MigrateError::decode(E::KIND, batch_idx, msg))?;
            batch.push(record);

            if batch.len() == batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(capacity));
                debug!("{}: read batch {} ({} rows)", E::KIND, batch_idx, full.len());
                if tx.send(Ok(full)).await.is_err() {
                    debug!("{}: reader abandoned after batch {}", E::KIND, batch_idx);
                    return Ok(()); // Receiver dropped
                }
                batch_idx += 1;
            }
        }

        if !batch.is_empty() {
            debug!("{}: read batch {} ({} rows)", E::KIND, batch_idx, batch.len());
            let _ = tx.send(Ok(batch)).await;
        }

        Ok(())
    }
}

/// Report an abnormal end of the producer task as the stream's final item.
///
/// Without this a panicking producer just closes the channel, which the
/// consumer cannot tell apart from a fully read table.
async fn forward_panic<E: Send + 'static>(
    kind: EntityKind,
    producer: JoinHandle<()>,
    tx: mpsc::Sender<Result<Vec<E>>>,
) {
    if let Err(e) = producer.await {
        let message = if e.is_panic() {
            format!("reader task panicked: {}", e)
        } else {
            format!("reader task stopped: {}", e)
        };
        let _ = tx.send(Err(MigrateError::Transfer { entity: kind, message })).await;
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    fn read<E: Entity>(
        &self,
        renames: &RenameMap,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Vec<E>>> {
        // Capacity 1: at most one finished batch waits while the next is assembled.
        let (tx, rx) = mpsc::channel(1);
        if batch_size == 0 {
            let _ = tx.try_send(Err(MigrateError::Config(
                "batch_size must be at least 1".into(),
            )));
            return rx;
        }

        let pool = self.pool.clone();
        let sql = Self::select_sql(E::schema(), renames);
        debug!("{}: {}", E::KIND, sql);

        let producer_tx = tx.clone();
        let producer = tokio::spawn(async move {
            let result = Self::read_impl::<E>(pool, sql, batch_size, producer_tx.clone()).await;
            if let Err(e) = result {
                let _ = producer_tx.send(Err(e)).await;
            }
        });
        tokio::spawn(forward_panic(E::KIND, producer, tx));

        rx
    }

    async fn row_count(&self, kind: EntityKind) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM {}",
            quote_ident(kind.schema().source_table)
        );

        let row: SqliteRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("cnt"))
    }

    async fn read_page<E: Entity>(
        &self,
        renames: &RenameMap,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<E>> {
        let sql = Self::page_sql(E::schema(), renames, after.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(after) = after {
            query = query.bind(after.hyphenated().to_string());
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Self::decode_row::<E>(row).map_err(|msg| MigrateError::decode(E::KIND, 0, msg))
            })
            .collect()
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Genre, Movie, PersonLink, RoleType};
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::TempDir;

    const GENRE_DDL: &str = "CREATE TABLE genre (
        id TEXT PRIMARY KEY, name TEXT NOT NULL, description TEXT,
        created_at TIMESTAMP WITH TIME ZONE, updated_at TIMESTAMP WITH TIME ZONE)";

    const FILM_WORK_DDL: &str = "CREATE TABLE film_work (
        id TEXT PRIMARY KEY, title TEXT NOT NULL, description TEXT, creation_date DATE,
        file_path TEXT, rating FLOAT, type TEXT NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE, updated_at TIMESTAMP WITH TIME ZONE)";

    const PERSON_FILM_WORK_DDL: &str = "CREATE TABLE person_film_work (
        id TEXT PRIMARY KEY, film_work_id TEXT NOT NULL, person_id TEXT NOT NULL,
        role TEXT, created_at TIMESTAMP WITH TIME ZONE)";

    /// Build a SQLite file with the given statements and open a reader on it.
    async fn fixture(statements: &[&str]) -> (TempDir, SqliteReader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");

        let setup = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
        for stmt in statements {
            sqlx::query(stmt).execute(&setup).await.unwrap();
        }
        setup.close().await;

        let config = SourceConfig {
            path: path.clone(),
            max_connections: 1,
        };
        let reader = SqliteReader::new(&config).await.unwrap();
        (dir, reader)
    }

    fn genre_insert(n: usize) -> String {
        format!(
            "INSERT INTO genre VALUES ('{}', 'Genre {}', NULL, \
             '2021-06-16 20:14:09.221838+00', '2021-06-16 20:14:09.221855+00')",
            Uuid::new_v4(),
            n
        )
    }

    async fn collect<E: Entity>(mut rx: mpsc::Receiver<Result<Vec<E>>>) -> Vec<Result<Vec<E>>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_three_genres_batch_of_two() {
        let inserts: Vec<String> = (0..3).map(genre_insert).collect();
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(inserts.iter().map(String::as_str));
        let (_dir, reader) = fixture(&stmts).await;

        let batches = collect(reader.read::<Genre>(&RenameMap::default(), 2)).await;
        let sizes: Vec<usize> = batches
            .iter()
            .map(|b| b.as_ref().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_batches_cover_unbatched_read() {
        let inserts: Vec<String> = (0..10).map(genre_insert).collect();
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(inserts.iter().map(String::as_str));
        let (_dir, reader) = fixture(&stmts).await;
        let renames = RenameMap::default();

        let all: Vec<Genre> = collect(reader.read::<Genre>(&renames, 100))
            .await
            .into_iter()
            .flat_map(|b| b.unwrap())
            .collect();
        assert_eq!(all.len(), 10);

        for batch_size in [1usize, 3, 5, 10] {
            let batches: Vec<Vec<Genre>> = collect(reader.read::<Genre>(&renames, batch_size))
                .await
                .into_iter()
                .map(|b| b.unwrap())
                .collect();
            assert_eq!(batches.len(), 10usize.div_ceil(batch_size));
            let expected_last = if 10 % batch_size == 0 { batch_size } else { 10 % batch_size };
            assert_eq!(batches.last().unwrap().len(), expected_last);
            let flat: Vec<Genre> = batches.into_iter().flatten().collect();
            assert_eq!(flat, all);
        }
    }

    #[tokio::test]
    async fn test_empty_table_yields_no_batches() {
        let (_dir, reader) = fixture(&[GENRE_DDL]).await;
        let batches = collect(reader.read::<Genre>(&RenameMap::default(), 500)).await;
        assert!(batches.is_empty());
        assert_eq!(reader.row_count(EntityKind::Genre).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rename_populates_created_from_created_at() {
        let id = Uuid::new_v4();
        let insert = format!(
            "INSERT INTO person_film_work VALUES ('{}', '{}', '{}', 'director', '2020-01-02 03:04:05+00')",
            id,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let (_dir, reader) = fixture(&[PERSON_FILM_WORK_DDL, &insert]).await;

        let renames = RenameMap::from_pairs([("created", "created_at")]);
        let batches = collect(reader.read::<PersonLink>(&renames, 10)).await;
        let link = &batches[0].as_ref().unwrap()[0];
        assert_eq!(link.id, id);
        assert_eq!(link.role, Some(RoleType::Director));
        assert_eq!(link.created.to_rfc3339(), "2020-01-02T03:04:05+00:00");
    }

    #[tokio::test]
    async fn test_missing_rename_fails() {
        let insert = genre_insert(1);
        let (_dir, reader) = fixture(&[GENRE_DDL, &insert]).await;

        // No column named "created" exists in the source.
        let batches = collect(reader.read::<Genre>(&RenameMap::empty(), 10)).await;
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_err());
    }

    #[tokio::test]
    async fn test_decode_error_keeps_earlier_batches() {
        let good: Vec<String> = (0..2).map(genre_insert).collect();
        let bad = "INSERT INTO genre VALUES ('not-a-uuid', 'Broken', NULL, \
                   '2021-06-16 20:14:09+00', '2021-06-16 20:14:09+00')";
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(good.iter().map(String::as_str));
        stmts.push(bad);
        let (_dir, reader) = fixture(&stmts).await;

        let batches = collect(reader.read::<Genre>(&RenameMap::default(), 2)).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].as_ref().unwrap().len(), 2);
        match &batches[1] {
            Err(MigrateError::Decode { entity, batch, .. }) => {
                assert_eq!(*entity, EntityKind::Genre);
                assert_eq!(*batch, 1);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_movie_with_integer_rating_and_nulls() {
        let insert = format!(
            "INSERT INTO film_work VALUES ('{}', 'Star Wars', NULL, '1977-05-25', NULL, 9, 'movie', \
             '2021-06-16 20:14:09+00', '2021-06-16 20:14:09+00')",
            Uuid::new_v4()
        );
        let null_rating = format!(
            "INSERT INTO film_work VALUES ('{}', 'Pilot', 'desc', NULL, NULL, NULL, 'tv_show', \
             '2021-06-16 20:14:09+00', '2021-06-16 20:14:09+00')",
            Uuid::new_v4()
        );
        let (_dir, reader) = fixture(&[FILM_WORK_DDL, &insert, &null_rating]).await;

        let movies: Vec<Movie> = collect(reader.read::<Movie>(&RenameMap::default(), 10))
            .await
            .into_iter()
            .flat_map(|b| b.unwrap())
            .collect();
        assert_eq!(movies.len(), 2);
        let star_wars = movies.iter().find(|m| m.title == "Star Wars").unwrap();
        assert_eq!(star_wars.rating, Some(9.0));
        assert!(star_wars.description.is_none());
        let pilot = movies.iter().find(|m| m.title == "Pilot").unwrap();
        assert_eq!(pilot.rating, None);
        assert_eq!(pilot.creation_date, None);
    }

    #[tokio::test]
    async fn test_read_page_keyset() {
        let inserts: Vec<String> = (0..5).map(genre_insert).collect();
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(inserts.iter().map(String::as_str));
        let (_dir, reader) = fixture(&stmts).await;
        let renames = RenameMap::default();

        let first: Vec<Genre> = reader.read_page(&renames, None, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.windows(2).all(|w| w[0].id < w[1].id));

        let rest: Vec<Genre> = reader
            .read_page(&renames, Some(first[2].id), 3)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].id > first[2].id);
    }

    #[tokio::test]
    async fn test_oversized_batch_reads_whole_table() {
        let inserts: Vec<String> = (0..3).map(genre_insert).collect();
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(inserts.iter().map(String::as_str));
        let (_dir, reader) = fixture(&stmts).await;

        let batches = collect(reader.read::<Genre>(&RenameMap::default(), 1 << 61)).await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].as_ref().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_an_error() {
        let insert = genre_insert(1);
        let (_dir, reader) = fixture(&[GENRE_DDL, &insert]).await;

        let batches = collect(reader.read::<Genre>(&RenameMap::default(), 0)).await;
        assert_eq!(batches.len(), 1);
        assert!(matches!(batches[0], Err(MigrateError::Config(_))));
    }

    #[tokio::test]
    async fn test_producer_panic_becomes_final_error() {
        let (tx, rx) = mpsc::channel::<Result<Vec<Genre>>>(1);
        let producer_tx = tx.clone();
        let producer = tokio::spawn(async move {
            let _keep = producer_tx;
            panic!("row buffer exhausted");
        });
        tokio::spawn(forward_panic(EntityKind::Genre, producer, tx));

        let items = collect(rx).await;
        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(MigrateError::Transfer { entity, message }) => {
                assert_eq!(*entity, EntityKind::Genre);
                assert!(message.contains("panicked"));
            }
            other => panic!("expected transfer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abandoned_read_releases_cursor() {
        let inserts: Vec<String> = (0..6).map(genre_insert).collect();
        let mut stmts = vec![GENRE_DDL];
        stmts.extend(inserts.iter().map(String::as_str));
        let (_dir, reader) = fixture(&stmts).await;

        let mut rx = reader.read::<Genre>(&RenameMap::default(), 1);
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);

        // Single-connection pool: this only succeeds once the cursor is gone.
        let count = tokio::time::timeout(
            Duration::from_secs(10),
            reader.row_count(EntityKind::Genre),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(count, 6);
    }
}
