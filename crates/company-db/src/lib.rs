//! Database layer for the company service.
//!
//! Provides SQLite connection pooling (via `r2d2`) with WAL mode, and the
//! embedded SQL migrations that create the `companies` table. Every table is
//! created through a versioned migration managed by this crate.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbSettings, PoolError};
