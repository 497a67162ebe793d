/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Connection pools with runtime backend selection.

#[cfg(feature = "postgres")]
use deadpool_diesel::postgres::{Manager as PgManager, Pool as PgPool, Runtime as PgRuntime};
#[cfg(feature = "sqlite")]
use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};
#[cfg(feature = "sqlite")]
use deadpool::managed::{Hook, HookError};
use tracing::info;

use crate::error::DatabaseError;

/// Milliseconds a SQLite connection waits on a lock held by another process.
#[cfg(feature = "sqlite")]
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 30_000;

/// Per-connection SQLite settings. `busy_timeout` goes first so that switching
/// the journal mode already waits on a lock held by another process.
#[cfg(feature = "sqlite")]
fn apply_sqlite_pragmas(conn: &mut diesel::SqliteConnection) -> diesel::QueryResult<()> {
    use diesel::RunQueryDsl;

    diesel::sql_query(format!("PRAGMA busy_timeout={};", SQLITE_BUSY_TIMEOUT_MS)).execute(conn)?;
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    Ok(())
}

/// Database backend, detected from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendType {
    /// Detects the backend from a connection URL.
    ///
    /// Returns [`DatabaseError::UnsupportedUrl`] when the URL does not match a
    /// backend compiled into this build.
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            #[cfg(feature = "postgres")]
            return Ok(BackendType::Postgres);
        }

        // sqlite:// prefix, file: URIs, plain paths and :memory:
        let looks_sqlite = url.starts_with("sqlite://")
            || url.starts_with("file:")
            || url.starts_with('/')
            || url.starts_with("./")
            || url.starts_with("../")
            || url == ":memory:"
            || url.ends_with(".db")
            || url.ends_with(".sqlite")
            || url.ends_with(".sqlite3");
        if looks_sqlite {
            #[cfg(feature = "sqlite")]
            return Ok(BackendType::Sqlite);
        }

        Err(DatabaseError::UnsupportedUrl(url.to_string()))
    }
}

/// Connection pool for whichever backend was selected.
#[derive(Clone)]
pub enum AnyPool {
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for AnyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(_) => write!(f, "AnyPool::Postgres(...)"),
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(_) => write!(f, "AnyPool::Sqlite(...)"),
        }
    }
}

/// Shared handle to the Lens database.
///
/// `Database` is `Clone`; every clone references the same pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: AnyPool,
    backend: BackendType,
}

impl Database {
    /// Creates a connection pool, detecting the backend from `connection_string`.
    ///
    /// `max_size` bounds the PostgreSQL pool. SQLite always uses a single
    /// connection, since concurrent writers only produce "database is locked"
    /// errors.
    pub fn new(connection_string: &str, max_size: u32) -> Result<Self, DatabaseError> {
        let backend = BackendType::from_url(connection_string)?;

        match backend {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => {
                let manager = PgManager::new(connection_string.to_string(), PgRuntime::Tokio1);
                let pool = PgPool::builder(manager)
                    .max_size(max_size as usize)
                    .build()
                    .map_err(|e| DatabaseError::PoolBuild(e.to_string()))?;

                // Log the host only; the URL may carry credentials.
                let host = url::Url::parse(connection_string)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default();
                info!(max_size, host = %host, "PostgreSQL connection pool initialized");

                Ok(Self {
                    pool: AnyPool::Postgres(pool),
                    backend,
                })
            }
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => {
                let _ = max_size;
                let connection_url = Self::build_sqlite_url(connection_string);
                let manager = SqliteManager::new(connection_url, SqliteRuntime::Tokio1);
                let sqlite_pool_size = 1;
                let pool = SqlitePool::builder(manager)
                    .max_size(sqlite_pool_size)
                    .post_create(Hook::async_fn(|conn: &mut deadpool_diesel::Connection<diesel::SqliteConnection>, _| {
                        Box::pin(async move {
                            conn.interact(apply_sqlite_pragmas)
                                .await
                                .map_err(|e| HookError::Message(e.to_string().into()))?
                                .map_err(|e| HookError::Message(e.to_string().into()))
                        })
                    }))
                    .build()
                    .map_err(|e| DatabaseError::PoolBuild(e.to_string()))?;

                info!(
                    "SQLite connection pool initialized (size: {})",
                    sqlite_pool_size
                );

                Ok(Self {
                    pool: AnyPool::Sqlite(pool),
                    backend,
                })
            }
        }
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    #[cfg(feature = "sqlite")]
    fn build_sqlite_url(connection_string: &str) -> String {
        connection_string
            .strip_prefix("sqlite://")
            .unwrap_or(connection_string)
            .to_string()
    }

    /// Runs pending migrations for the selected backend.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        use diesel_migrations::MigrationHarness;

        match &self.pool {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;
                conn.interact(|conn| {
                    conn.run_pending_migrations(crate::database::POSTGRES_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?;
            }
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;
                conn.interact(|conn| {
                    conn.run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?;
            }
        }

        info!("Database migrations applied");
        Ok(())
    }

    /// Number of embedded migrations not yet applied to this database.
    pub async fn pending_migrations(&self) -> Result<usize, DatabaseError> {
        use diesel_migrations::MigrationHarness;

        let pending = match &self.pool {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;
                conn.interact(|conn| {
                    conn.pending_migrations(crate::database::POSTGRES_MIGRATIONS)
                        .map(|pending| pending.len())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?
            }
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;
                conn.interact(|conn| {
                    conn.pending_migrations(crate::database::SQLITE_MIGRATIONS)
                        .map(|pending| pending.len())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?
            }
        };
        Ok(pending)
    }

    #[cfg(feature = "postgres")]
    pub async fn get_postgres_connection(
        &self,
    ) -> Result<deadpool::managed::Object<PgManager>, DatabaseError> {
        match &self.pool {
            AnyPool::Postgres(pool) => pool
                .get()
                .await
                .map_err(|e| DatabaseError::ConnectionPool(e.to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(DatabaseError::ConnectionPool(
                "PostgreSQL connection requested from a non-PostgreSQL pool".to_string(),
            )),
        }
    }

    #[cfg(feature = "sqlite")]
    pub async fn get_sqlite_connection(
        &self,
    ) -> Result<deadpool::managed::Object<SqliteManager>, DatabaseError> {
        match &self.pool {
            AnyPool::Sqlite(pool) => pool
                .get()
                .await
                .map_err(|e| DatabaseError::ConnectionPool(e.to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(DatabaseError::ConnectionPool(
                "SQLite connection requested from a non-SQLite pool".to_string(),
            )),
        }
    }
}
