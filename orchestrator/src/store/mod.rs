//! SQLite persistence layer. Every table listed in the specification's
//! persistence section lives here; every operation opens its own
//! short-lived connection in WAL mode with a busy timeout, and every query
//! is parameterized. Grounded on `rand-loop/rlm-core`'s `rusqlite` usage
//! pattern (bundled SQLite, per-operation connections, `sha2` alongside it).

mod schema;

pub use schema::init_schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("row not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Open a short-lived connection to `path`, in WAL mode with a busy
/// timeout. Callers open one of these per operation rather than holding a
/// connection across awaits — SQLite serializes writers itself.
pub fn open(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(conn)
}

/// In-memory connection for tests: same pragmas minus WAL, which SQLite
/// does not support for `:memory:` databases.
#[cfg(test)]
pub fn open_in_memory() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    schema::init_schema(&conn)?;
    Ok(conn)
}
