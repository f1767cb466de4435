//! SQLite Backend Store
//!
//! Implements BackendStore using SQLite for persistent storage.
//! Every call runs on the blocking pool.

use crate::domain::entities::BackendConfig;
use crate::domain::ports::{BackendStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS gateway_backend (
    name TEXT PRIMARY KEY,
    routing_group TEXT NOT NULL,
    backend_url TEXT NOT NULL,
    external_url TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)";

const SELECT_COLUMNS: &str =
    "SELECT name, routing_group, backend_url, external_url, active FROM gateway_backend";

/// SQLite-backed backend store.
pub struct SqliteBackendStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackendStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).map_err(unavailable)?;
        conn.execute(SCHEMA, []).map_err(unavailable)?;
        tracing::info!(db_path, "backend store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking error: {}", e)))?
    }

    fn query(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<BackendConfig>, StoreError> {
        let mut stmt = conn.prepare(sql).map_err(unavailable)?;
        let backends = stmt
            .query_map(args, |row| Self::row_to_backend(row))
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        Ok(backends)
    }

    /// Convert a SQLite row to a BackendConfig.
    fn row_to_backend(row: &Row) -> rusqlite::Result<BackendConfig> {
        Ok(BackendConfig {
            name: row.get(0)?,
            routing_group: row.get(1)?,
            proxy_to: row.get(2)?,
            external_url: row.get(3)?,
            active: row.get::<_, i64>(4)? != 0,
        })
    }
}

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl BackendStore for SqliteBackendStore {
    async fn list_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        self.with_conn(|conn| Self::query(conn, &format!("{} ORDER BY name", SELECT_COLUMNS), &[]))
            .await
    }

    async fn list_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        self.with_conn(|conn| {
            Self::query(
                conn,
                &format!("{} WHERE active = 1 ORDER BY name", SELECT_COLUMNS),
                &[],
            )
        })
        .await
    }

    async fn list_active_backends_by_group(
        &self,
        routing_group: &str,
    ) -> Result<Vec<BackendConfig>, StoreError> {
        let group = routing_group.to_string();
        self.with_conn(move |conn| {
            Self::query(
                conn,
                &format!(
                    "{} WHERE active = 1 AND routing_group = ?1 ORDER BY name",
                    SELECT_COLUMNS
                ),
                &[&group],
            )
        })
        .await
    }

    async fn get_backend(&self, name: &str) -> Result<Option<BackendConfig>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{} WHERE name = ?1", SELECT_COLUMNS),
                [&name],
                |row| Self::row_to_backend(row),
            )
            .optional()
            .map_err(unavailable)
        })
        .await
    }

    async fn create_backend(&self, backend: &BackendConfig) -> Result<BackendConfig, StoreError> {
        let backend = backend.normalized();
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO gateway_backend (name, routing_group, backend_url, external_url, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    backend.name,
                    backend.routing_group,
                    backend.proxy_to,
                    backend.external_url,
                    backend.active as i64
                ],
            );
            match result {
                Ok(_) => Ok(backend),
                Err(e) if is_constraint_violation(&e) => {
                    Err(StoreError::AlreadyExists(backend.name))
                }
                Err(e) => Err(unavailable(e)),
            }
        })
        .await
    }

    async fn update_backend(
        &self,
        backend: &BackendConfig,
    ) -> Result<(BackendConfig, bool), StoreError> {
        let backend = backend.normalized();
        self.with_conn(move |conn| {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM gateway_backend WHERE name = ?1",
                    [&backend.name],
                    |_| Ok(()),
                )
                .optional()
                .map_err(unavailable)?
                .is_some();

            let sql = if exists {
                "UPDATE gateway_backend
                 SET routing_group = ?2, backend_url = ?3, external_url = ?4, active = ?5
                 WHERE name = ?1"
            } else {
                "INSERT INTO gateway_backend (name, routing_group, backend_url, external_url, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            };
            conn.execute(
                sql,
                params![
                    backend.name,
                    backend.routing_group,
                    backend.proxy_to,
                    backend.external_url,
                    backend.active as i64
                ],
            )
            .map_err(unavailable)?;
            Ok((backend, !exists))
        })
        .await
    }

    async fn delete_backend(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM gateway_backend WHERE name = ?1", [&name])
                .map_err(unavailable)?;
            Ok(())
        })
        .await
    }

    async fn set_active(&self, name: &str, active: bool) -> Result<bool, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let previous: Option<i64> = conn
                .query_row(
                    "SELECT active FROM gateway_backend WHERE name = ?1",
                    [&name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;
            let Some(previous) = previous else {
                return Err(StoreError::NotFound(name));
            };
            conn.execute(
                "UPDATE gateway_backend SET active = ?2 WHERE name = ?1",
                params![name, active as i64],
            )
            .map_err(unavailable)?;
            Ok(previous != 0)
        })
        .await
    }
}
