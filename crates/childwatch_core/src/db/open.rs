//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas and SQL functions required by core queries.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Lock waits on returned connections stop once the running operation's
//!   context is done.
//! - Returned connections have the `casefold` SQL function registered.
//! - Returned connections have migrations fully applied.

use super::busy::wait_while_busy;
use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Location value selecting a private in-memory database.
pub const MEMORY_DATABASE_URL: &str = ":memory:";

const SQLITE_URL_SCHEME: &str = "sqlite://";

/// Opens the database named by a configuration value.
///
/// Accepts a plain file path, a `sqlite://` prefixed path, or `:memory:`.
///
/// # Errors
/// - `DbError::MissingDatabaseUrl` when `database_url` is blank.
/// - Any open/bootstrap failure from [`open_db`] / [`open_db_in_memory`].
pub fn open_db_from_url(database_url: &str) -> DbResult<Connection> {
    let trimmed = database_url.trim();
    let location = trimmed.strip_prefix(SQLITE_URL_SCHEME).unwrap_or(trimmed);
    if location.is_empty() {
        error!("event=db_open module=db status=error error_code=missing_database_url");
        return Err(DbError::MissingDatabaseUrl);
    }
    if location == MEMORY_DATABASE_URL {
        return open_db_in_memory();
    }
    open_db(location)
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        error!("event=db_open module=db status=error mode=file error_code=missing_database_url");
        return Err(DbError::MissingDatabaseUrl);
    }
    open_with("file", || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_handler(Some(wait_while_busy))?;
    register_casefold(conn)?;
    apply_migrations(conn)?;
    Ok(())
}

/// Registers `casefold(text)`, a Unicode-aware lowercase used by
/// case-insensitive filters. SQLite's built-in `lower()` only folds ASCII.
fn register_casefold(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value = ctx.get::<Option<String>>(0)?;
            Ok(value.map(|text| text.to_lowercase()))
        },
    )?;
    Ok(())
}
