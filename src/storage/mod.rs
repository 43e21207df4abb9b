//! Persistence layer: a connection pool over either Postgres+pgvector
//! (primary) or SQLite (legacy, in-process similarity), plus idempotent
//! schema bootstrap and a transactional-scope helper. Both backends always
//! ship in the binary; which one a given process talks to is a runtime
//! choice (`Config::is_postgres`), not a compile-time one.

pub mod edges;
pub mod handoff;
pub mod memories;
pub mod schema;

use sqlx::{PgPool, SqlitePool};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

/// Either backend behind one handle. Cloning is cheap — both pool types are
/// internally reference-counted.
#[derive(Clone)]
pub enum Storage {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// A begun transaction on whichever backend `Storage` wraps. Row-level
/// helpers offer a `_tx` counterpart (e.g. `edges::insert_tx`) that takes one
/// of these by value and hands it back alongside the result, so a caller can
/// thread several writes through the same transaction before committing.
pub enum Transaction<'a> {
    Postgres(sqlx::Transaction<'a, sqlx::Postgres>),
    Sqlite(sqlx::Transaction<'a, sqlx::Sqlite>),
}

impl<'a> Transaction<'a> {
    pub async fn commit(self) -> Result<()> {
        match self {
            Transaction::Postgres(tx) => tx.commit().await?,
            Transaction::Sqlite(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        match self {
            Transaction::Postgres(tx) => tx.rollback().await?,
            Transaction::Sqlite(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

impl Storage {
    pub async fn begin(&self) -> Result<Transaction<'_>> {
        match self {
            Storage::Postgres(pool) => Ok(Transaction::Postgres(pool.begin().await?)),
            Storage::Sqlite(pool) => Ok(Transaction::Sqlite(pool.begin().await?)),
        }
    }

    /// Run `f` in a transactional scope: commits on success, rolls back on
    /// any raised failure. `f` takes ownership of the open transaction and
    /// must return it alongside its result — row-level `_tx` helpers do this
    /// for you, so callers just thread the handle through each call in turn.
    ///
    /// Used wherever a write spans more than one statement that must land
    /// together: `graph::supersede_memory`'s edge-insert-plus-archive, and
    /// `graph::auto_link`'s batch of auto-tier edge inserts.
    pub async fn transaction<'s, F, Fut, T>(&'s self, f: F) -> Result<T>
    where
        F: FnOnce(Transaction<'s>) -> Fut,
        Fut: std::future::Future<Output = (Result<T>, Transaction<'s>)>,
    {
        let tx = self.begin().await?;
        let (result, tx) = f(tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn connect(config: &Config, data_dir: &std::path::Path) -> Result<Self> {
        let url = config.database_url(data_dir);
        if config.is_postgres() {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .test_before_acquire(true)
                .connect(&url)
                .await?;
            Ok(Storage::Postgres(pool))
        } else {
            if let Some(parent) = data_dir_parent(&url) {
                std::fs::create_dir_all(parent)?;
            }
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&format!("{url}?mode=rwc"))
                .await?;
            sqlx::query("PRAGMA journal_mode=WAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
            Ok(Storage::Sqlite(pool))
        }
    }

    pub async fn connect_in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        Ok(Storage::Sqlite(pool))
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, Storage::Postgres(_))
    }

    /// Create tables and indexes if they don't already exist. Safe to call
    /// on every process start.
    pub async fn bootstrap(&self, embedding_dim: usize) -> Result<()> {
        match self {
            Storage::Postgres(pool) => {
                for stmt in schema::postgres_schema(embedding_dim) {
                    sqlx::query(&stmt).execute(pool).await?;
                }
                if let Err(e) = sqlx::query(schema::postgres_hnsw_index()).execute(pool).await {
                    warn!(error = %e, "HNSW index creation failed, falling back to sequential scan");
                }
            }
            Storage::Sqlite(pool) => {
                for stmt in schema::sqlite_schema() {
                    sqlx::query(&stmt).execute(pool).await?;
                }
            }
        }
        info!("schema bootstrap complete");
        Ok(())
    }

    pub async fn check_connection(&self) -> bool {
        match self {
            Storage::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            Storage::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        }
    }
}

fn data_dir_parent(sqlite_url: &str) -> Option<std::path::PathBuf> {
    let path = sqlite_url.trim_start_matches("sqlite://");
    std::path::Path::new(path).parent().map(|p| p.to_path_buf())
}
