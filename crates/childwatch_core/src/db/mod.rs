//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for childwatch core.
//! - Apply schema migrations in deterministic order.
//! - Hand out the shared connection repositories lock per unit of work.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write case data before migrations succeed.
//! - A blank database location is rejected before any I/O.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

mod busy;
pub mod migrations;
mod open;

pub(crate) use busy::BusyScope;

pub use open::{open_db, open_db_from_url, open_db_in_memory, MEMORY_DATABASE_URL};

pub type DbResult<T> = Result<T, DbError>;

/// Connection shared by every repository handle of one process.
///
/// Repositories hold the lock for exactly one operation.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Wraps a bootstrapped connection for sharing across repository handles.
pub fn into_shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    MissingDatabaseUrl,
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingDatabaseUrl => write!(f, "database location is not configured"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingDatabaseUrl | Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
