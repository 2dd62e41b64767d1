//! PostgreSQL target writer.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::core::entity::Entity;
use crate::core::schema::{quote_ident, EntityKind, EntitySchema, ID};
use crate::core::traits::TargetWriter;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::typemap::{decode_pg, pg_cast, pg_param};

/// Boxed bind parameter, owned by the statement builder.
pub type PgParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL target writer implementation.
pub struct PgWriter {
    pool: Pool,
    schema: String,
}

impl PgWriter {
    /// Create a new PostgreSQL target writer.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(config.pg_config(), NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

        let writer = Self {
            pool,
            schema: config.schema.clone(),
        };

        // Test connection
        writer.test_connection().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(writer)
    }

    /// Target schema name.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connection("target", e))
    }

    /// Run a trivial query to prove the target is reachable.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("target", e))?;
        Ok(())
    }

    /// Server version string.
    pub async fn server_version(&self) -> Result<String> {
        let client = self.client().await?;
        let row = client.query_one("SELECT version()", &[]).await?;
        Ok(row.get::<_, String>(0))
    }
}

#[async_trait]
impl TargetWriter for PgWriter {
    async fn truncate(&self, kinds: &[EntityKind]) -> Result<()> {
        if kinds.is_empty() {
            return Ok(());
        }

        let sql = build_truncate_sql(&self.schema, kinds);
        debug!("{}", sql);

        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        tx.batch_execute(&sql).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn upsert<E: Entity>(&self, batch: &[E]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Vec<SqlValue>> = batch.iter().map(Entity::to_values).collect();
        let (sql, params) = build_upsert_sql(&self.schema, E::schema(), &rows);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let inserted = match tx.execute(sql.as_str(), &param_refs).await {
            Ok(n) => n,
            Err(e) => {
                if let Some(first) = batch.first() {
                    error!(
                        "Insert into {} failed: {} - first id in batch: {}",
                        E::schema().qualified_target(&self.schema),
                        e,
                        first.id()
                    );
                }
                // Dropping the transaction rolls it back.
                return Err(MigrateError::Target(e));
            }
        };
        tx.commit().await?;

        debug!(
            "{}: inserted {} of {} rows",
            E::KIND,
            inserted,
            batch.len()
        );
        Ok(inserted)
    }

    async fn row_count(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            kind.schema().qualified_target(&self.schema)
        );
        let client = self.client().await?;
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn read_page<E: Entity>(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<E>> {
        let schema = E::schema();
        let sql = build_page_sql(&self.schema, schema, after.is_some());
        let limit = limit as i64;

        let client = self.client().await?;
        let rows = match after {
            Some(after) => client.query(sql.as_str(), &[&after, &limit]).await?,
            None => client.query(sql.as_str(), &[&limit]).await?,
        };

        rows.iter()
            .map(|row| {
                let values = schema
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(idx, field)| decode_pg(row, idx, field))
                    .collect::<std::result::Result<Vec<_>, String>>()
                    .and_then(E::from_values);
                values.map_err(|msg| MigrateError::decode(E::KIND, 0, msg))
            })
            .collect()
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Build a single TRUNCATE covering every listed table.
///
/// Listing all tables in one statement lets PostgreSQL accept foreign keys
/// between them without CASCADE.
pub fn build_truncate_sql(schema: &str, kinds: &[EntityKind]) -> String {
    let tables: Vec<String> = kinds
        .iter()
        .map(|k| k.schema().qualified_target(schema))
        .collect();
    format!("TRUNCATE TABLE {}", tables.join(", "))
}

/// Build a multi-row INSERT that skips rows whose id already exists.
pub fn build_upsert_sql(
    schema: &str,
    entity: &EntitySchema,
    rows: &[Vec<SqlValue>],
) -> (String, Vec<PgParam>) {
    let col_list: String = entity
        .fields
        .iter()
        .map(|f| quote_ident(f.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params: Vec<PgParam> = Vec::with_capacity(rows.len() * entity.fields.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = entity
            .fields
            .iter()
            .map(|field| {
                let p = format!("${}{}", idx, pg_cast(field.ty));
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));

        for value in row {
            params.push(pg_param(value));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
        entity.qualified_target(schema),
        col_list,
        placeholders.join(", "),
        quote_ident(ID)
    );

    (sql, params)
}

/// Keyset page query ordered by id.
pub fn build_page_sql(schema: &str, entity: &EntitySchema, keyed: bool) -> String {
    let col_list: String = entity
        .fields
        .iter()
        .map(|f| quote_ident(f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let id = quote_ident(ID);

    if keyed {
        format!(
            "SELECT {} FROM {} WHERE {} > $1::uuid ORDER BY {} LIMIT $2",
            col_list,
            entity.qualified_target(schema),
            id,
            id
        )
    } else {
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT $1",
            col_list,
            entity.qualified_target(schema),
            id
        )
    }
}
