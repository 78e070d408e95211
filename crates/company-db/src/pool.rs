//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::time::Duration;
use thiserror::Error;

/// Connection tunables, normally taken from the `[database]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections.
    pub pool_max_size: u32,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 25,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database connection pool: {0}")]
    Init(#[from] r2d2::Error),

    #[error("database did not answer a ping within {0:?}")]
    Ping(Duration),
}

/// Opens a pool on `db_path` and verifies that a connection can be handed out.
///
/// Each connection runs in WAL mode with foreign keys on. `:memory:` works but
/// gives every pooled connection its own private database, so tests should
/// use a file under a temporary directory instead.
///
/// # Errors
///
/// Returns `PoolError::Init` if the pool cannot be built and
/// `PoolError::Ping` if no connection becomes available in time.
pub fn create_pool(db_path: &str, settings: DbSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let busy_timeout_ms = settings.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                tracing::warn!(journal_mode, "sqlite refused WAL journal mode");
            }
            conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

    let ping = Duration::from_secs(5);
    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(ping)
        .build(manager)?;

    pool.get_timeout(ping).map_err(|_| PoolError::Ping(ping))?;
    tracing::info!(path = db_path, max_size = settings.pool_max_size, "database connection pool established");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pool_applies_settings() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("companies.db");
        let settings = DbSettings {
            busy_timeout_ms: 1_500,
            pool_max_size: 2,
        };

        let pool = create_pool(path.to_str().unwrap(), settings).expect("pool should open");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);

        let busy: i64 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy, 1_500);
        assert_eq!(pool.max_size(), 2);
    }

    #[test]
    fn connections_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let pool = create_pool(path.to_str().unwrap(), DbSettings::default()).unwrap();

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        a.execute_batch("CREATE TABLE probe (x INTEGER); INSERT INTO probe VALUES (7);")
            .unwrap();
        let x: i64 = b.query_row("SELECT x FROM probe", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 7);
    }
}
