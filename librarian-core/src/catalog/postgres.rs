//! Postgres-backed [`CatalogBackend`] (§3, §4.1). Pool setup and preflight
//! checks follow the teacher's `PostgresDatabase` (`postgres_ref.rs`); query
//! bodies use `sqlx::query_as`/`QueryBuilder` rather than the `query!` macro
//! so the crate builds without a live database at compile time.

use super::{CatalogBackend, MissingEventFile};
use crate::error::{LibrarianError, Result};
use crate::search::{to_sql, Clause};
use async_trait::async_trait;
use librarian_model::{
    DeletionPolicy, File, FileEvent, FileInstance, FileName, FileRecInfo, ObsId, Observation,
    ObservingSession, SessionId, StandingOrder, Store, StoreId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, QueryBuilder, Row};
use std::fmt;
use std::time::Duration;

/// Connection-pool occupancy, surfaced by `ping`/health endpoints.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
    max_connections: u32,
    min_connections: u32,
}

impl fmt::Debug for PostgresCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresCatalog")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl PostgresCatalog {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(1800))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| LibrarianError::Internal(format!("database connection failed: {e}")))?;

        Ok(Self {
            pool,
            max_connections,
            min_connections,
        })
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.max_connections,
            min_idle: self.min_connections,
        }
    }

    /// Surface actionable errors for missing schema privileges/extensions
    /// instead of a generic permission-denied during migrations (§6
    /// "Persisted state").
    pub async fn preflight_check(&self) -> Result<()> {
        let has_usage: bool = sqlx::query_scalar(
            "SELECT has_schema_privilege(current_user, 'public', 'USAGE')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibrarianError::Internal(format!("privilege preflight failed: {e}")))?;
        let has_create: bool = sqlx::query_scalar(
            "SELECT has_schema_privilege(current_user, 'public', 'CREATE')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibrarianError::Internal(format!("privilege preflight failed: {e}")))?;
        if !has_usage || !has_create {
            return Err(LibrarianError::Internal(
                "current role lacks USAGE/CREATE on schema public".into(),
            ));
        }

        let has_citext: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'citext')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibrarianError::Internal(format!("extension check failed: {e}")))?;
        let has_trgm: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'pg_trgm')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibrarianError::Internal(format!("extension check failed: {e}")))?;
        if !has_citext || !has_trgm {
            tracing::warn!(
                has_citext,
                has_trgm,
                "citext/pg_trgm not installed; migrations will attempt CREATE EXTENSION"
            );
        }
        Ok(())
    }

    /// Run forward-only migrations after the preflight check (§6 "Persisted
    /// state"). Safe to call on every boot; `sqlx::migrate!` is idempotent.
    pub async fn initialize_schema(&self) -> Result<()> {
        self.preflight_check().await?;

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LibrarianError::Internal(format!("migration failed: {e}")))?;

        Ok(())
    }
}

fn file_from_row(row: &PgRow) -> std::result::Result<File, sqlx::Error> {
    Ok(File {
        name: FileName::new(row.try_get::<String, _>("name")?)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        file_type: row.try_get("type")?,
        source: row.try_get("source")?,
        size: row.try_get("size")?,
        digest: librarian_model::Digest::new(row.try_get::<String, _>("digest")?)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        create_time: row.try_get("create_time")?,
        obsid: row.try_get::<Option<i64>, _>("obsid")?.map(ObsId),
    })
}

const FILE_COLUMNS: &str = "name, type, source, size, obsid, digest, create_time";

#[async_trait]
impl CatalogBackend for PostgresCatalog {
    async fn create_file(&self, file: &File) -> Result<()> {
        sqlx::query(
            "INSERT INTO files (name, type, source, size, obsid, digest, create_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(file.name.as_str())
        .bind(&file.file_type)
        .bind(&file.source)
        .bind(file.size)
        .bind(file.obsid.map(|o| o.0))
        .bind(file.digest.as_str())
        .bind(file.create_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_file(&self, name: &FileName) -> Result<File> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE name = $1"))
            .bind(name.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(file_from_row(&row)?)
    }

    async fn file_exists(&self, name: &FileName) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE name = $1)")
                .bind(name.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn append_event(&self, event: &FileEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_events (name, time, event_type, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.name.as_str())
        .bind(event.time)
        .bind(&event.event_type)
        .bind(&event.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_event(&self, name: &FileName, event_type: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM file_events WHERE name = $1 AND event_type = $2)",
        )
        .bind(name.as_str())
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn register_instance(&self, instance: &FileInstance) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO file_instances (store_id, parent_dirs, name, deletion_policy) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (store_id, parent_dirs, name) DO NOTHING",
        )
        .bind(instance.store_id.0)
        .bind(&instance.parent_dirs)
        .bind(instance.name.as_str())
        .bind(instance.deletion_policy)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_instances(&self, name: &FileName) -> Result<Vec<FileInstance>> {
        let rows = sqlx::query_as::<_, FileInstance>(
            "SELECT store_id, parent_dirs, name, deletion_policy FROM file_instances WHERE name = $1",
        )
        .bind(name.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn first_instance(&self, name: &FileName) -> Result<Option<FileInstance>> {
        let row = sqlx::query_as::<_, FileInstance>(
            "SELECT store_id, parent_dirs, name, deletion_policy FROM file_instances \
             WHERE name = $1 ORDER BY store_id LIMIT 1",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_deletion_policy(
        &self,
        name: &FileName,
        restrict_to_store: Option<StoreId>,
        policy: DeletionPolicy,
    ) -> Result<u64> {
        let result = match restrict_to_store {
            Some(store) => {
                sqlx::query(
                    "UPDATE file_instances SET deletion_policy = $1 WHERE name = $2 AND store_id = $3",
                )
                .bind(policy)
                .bind(name.as_str())
                .bind(store.0)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE file_instances SET deletion_policy = $1 WHERE name = $2")
                    .bind(policy)
                    .bind(name.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn remove_instances(&self, name: &FileName, store_ids: &[StoreId]) -> Result<u64> {
        let ids: Vec<i64> = store_ids.iter().map(|s| s.0).collect();
        let result =
            sqlx::query("DELETE FROM file_instances WHERE name = $1 AND store_id = ANY($2)")
                .bind(name.as_str())
                .bind(&ids)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn create_or_update_observation(&self, obs: &Observation) -> Result<()> {
        sqlx::query(
            "INSERT INTO observations (obsid, start_time_jd, stop_time_jd, start_lst_hr, session_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (obsid) DO UPDATE SET \
               start_time_jd = EXCLUDED.start_time_jd, \
               stop_time_jd = EXCLUDED.stop_time_jd, \
               start_lst_hr = EXCLUDED.start_lst_hr",
        )
        .bind(obs.obsid.0)
        .bind(obs.start_time_jd)
        .bind(obs.stop_time_jd)
        .bind(obs.start_lst_hr)
        .bind(obs.session_id.map(|s| s.0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_observation(&self, obsid: ObsId) -> Result<Option<Observation>> {
        let row = sqlx::query_as::<_, Observation>(
            "SELECT obsid, start_time_jd, stop_time_jd, start_lst_hr, session_id \
             FROM observations WHERE obsid = $1",
        )
        .bind(obsid.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn unassigned_observations(
        &self,
        min_start_jd: Option<f64>,
        max_start_jd: Option<f64>,
    ) -> Result<Vec<Observation>> {
        let rows = sqlx::query_as::<_, Observation>(
            "SELECT obsid, start_time_jd, stop_time_jd, start_lst_hr, session_id \
             FROM observations \
             WHERE session_id IS NULL \
               AND ($1::double precision IS NULL OR start_time_jd >= $1) \
               AND ($2::double precision IS NULL OR start_time_jd <= $2) \
             ORDER BY start_time_jd",
        )
        .bind(min_start_jd)
        .bind(max_start_jd)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn sessions_in_range(
        &self,
        min_start_jd: Option<f64>,
        max_start_jd: Option<f64>,
    ) -> Result<Vec<ObservingSession>> {
        let rows = sqlx::query_as::<_, ObservingSession>(
            "SELECT id, start_jd, stop_jd FROM observing_sessions \
             WHERE ($1::double precision IS NULL OR stop_jd >= $1) \
               AND ($2::double precision IS NULL OR start_jd <= $2)",
        )
        .bind(min_start_jd)
        .bind(max_start_jd)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_session(&self, session: &ObservingSession) -> Result<()> {
        sqlx::query("INSERT INTO observing_sessions (id, start_jd, stop_jd) VALUES ($1, $2, $3)")
            .bind(session.id.0)
            .bind(session.start_jd)
            .bind(session.stop_jd)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_observation_session(&self, obsid: ObsId, session_id: SessionId) -> Result<()> {
        sqlx::query("UPDATE observations SET session_id = $1 WHERE obsid = $2")
            .bind(session_id.0)
            .bind(obsid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn gather_rec_info(&self, name: &FileName) -> Result<FileRecInfo> {
        let row = sqlx::query(
            "SELECT f.name, f.type, f.source, f.size, f.digest, f.create_time, f.obsid, \
                    o.session_id, o.start_time_jd, o.stop_time_jd \
             FROM files f LEFT JOIN observations o ON o.obsid = f.obsid \
             WHERE f.name = $1",
        )
        .bind(name.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(FileRecInfo {
            name: row.try_get("name")?,
            file_type: row.try_get("type")?,
            source: row.try_get("source")?,
            size: row.try_get("size")?,
            digest: row.try_get("digest")?,
            create_time: row.try_get("create_time")?,
            obsid: row.try_get("obsid")?,
            session_id: row.try_get("session_id")?,
            start_time_jd: row.try_get("start_time_jd")?,
            stop_time_jd: row.try_get("stop_time_jd")?,
        })
    }

    async fn search_files(&self, clause: &Clause) -> Result<Vec<File>> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files WHERE "));
        to_sql(clause, &mut qb);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(|r| Ok(file_from_row(r)?)).collect()
    }

    async fn search_file_names(&self, clause: &Clause) -> Result<Vec<FileName>> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("SELECT name FROM files WHERE ");
        to_sql(clause, &mut qb);
        let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(n,)| FileName::new(n).map_err(LibrarianError::from))
            .collect()
    }

    async fn describe_session_without_event(
        &self,
        source: &str,
        event_type: &str,
    ) -> Result<Vec<MissingEventFile>> {
        let rows = sqlx::query(&format!(
            "SELECT f.obsid AS obsid, {cols} FROM files f \
             WHERE f.source = $1 AND f.obsid IS NOT NULL \
               AND NOT EXISTS ( \
                 SELECT 1 FROM file_events fe WHERE fe.name = f.name AND fe.event_type = $2)",
            cols = FILE_COLUMNS
                .split(", ")
                .map(|c| format!("f.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(source)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let file = file_from_row(row)?;
                let obsid = file.obsid.ok_or_else(|| {
                    LibrarianError::Internal("query guaranteed obsid is not null".into())
                })?;
                Ok(MissingEventFile { file, obsid })
            })
            .collect()
    }

    async fn list_standing_orders(&self) -> Result<Vec<StandingOrder>> {
        let rows = sqlx::query_as::<_, StandingOrder>(
            "SELECT id, name, search, conn_name, mode FROM standing_orders",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn offloadable_instances(&self, store_id: StoreId, limit: i64) -> Result<Vec<FileInstance>> {
        let rows = sqlx::query_as::<_, FileInstance>(
            "SELECT i.store_id, i.parent_dirs, i.name, i.deletion_policy \
             FROM file_instances i \
             WHERE i.store_id = $1 \
               AND (SELECT count(*) FROM file_instances other WHERE other.name = i.name) = 1 \
             LIMIT $2",
        )
        .bind(store_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_store(&self, id: StoreId) -> Result<Store> {
        let row = sqlx::query_as::<_, Store>(
            "SELECT id, name, ssh_host, path_prefix, http_prefix, available FROM stores WHERE id = $1",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_store_by_name(&self, name: &str) -> Result<Store> {
        let row = sqlx::query_as::<_, Store>(
            "SELECT id, name, ssh_host, path_prefix, http_prefix, available FROM stores WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_stores(&self) -> Result<Vec<Store>> {
        let rows = sqlx::query_as::<_, Store>(
            "SELECT id, name, ssh_host, path_prefix, http_prefix, available FROM stores",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_store_available(&self, id: StoreId, available: bool) -> Result<()> {
        sqlx::query("UPDATE stores SET available = $1 WHERE id = $2")
            .bind(available)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_store(&self, store: &Store) -> Result<Store> {
        let row = sqlx::query_as::<_, Store>(
            "INSERT INTO stores (name, ssh_host, path_prefix, http_prefix, available) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name) DO UPDATE SET \
               ssh_host = excluded.ssh_host, \
               path_prefix = excluded.path_prefix, \
               http_prefix = excluded.http_prefix \
             RETURNING id, name, ssh_host, path_prefix, http_prefix, available",
        )
        .bind(&store.name)
        .bind(&store.ssh_host)
        .bind(&store.path_prefix)
        .bind(&store.http_prefix)
        .bind(store.available)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
