//! Child case repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the five storage operations every backend must provide.
//! - Keep SQL, encoding and row decoding inside the persistence boundary.
//! - Honor caller cancellation at the point of blocking I/O.
//!
//! # Invariants
//! - Filter values are always bound as parameters, never formatted into SQL.
//! - Read paths rebuild records through `Child::new`; rows that would break a
//!   record invariant surface as `InvalidData`, never as partial records.
//! - `update` on a missing row is `NotFound`; `remove` on a missing row is a
//!   successful no-op.
//! - The connection lock is held for one operation and the progress handler
//!   is cleared before the lock is released.
//! - Waiting for the connection lock or a database lock ends once the
//!   caller's context is done.
//! - `updated_at` strictly increases on every successful `update`.
//!
//! # Concurrency
//! Updates are plain overwrites keyed by id. Two callers doing
//! get → mutate → update on the same id race and the last write wins.

use crate::context::{CallContext, CancelReason};
use crate::db::migrations::latest_version;
use crate::db::{BusyScope, DbError, SharedConnection};
use crate::model::child::{Child, ChildId, ChildInput, ChildStatus, Gender};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

const CHILD_SELECT_SQL: &str = "SELECT
    id,
    full_name,
    age,
    birth_date,
    gender,
    description,
    location,
    photos,
    phone,
    email,
    status
FROM children";

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "full_name",
    "age",
    "birth_date",
    "gender",
    "description",
    "location",
    "photos",
    "phone",
    "email",
    "status",
    "updated_at",
];

/// SQLite VM instructions between two cancellation checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

/// Pause between attempts to take a connection held by another caller.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(2);

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for child persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(ChildId),
    InvalidData(String),
    Cancelled(CancelReason),
    ConnectionPoisoned,
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Coarse error class callers map to user-facing outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Storage,
    Cancelled,
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Db(_)
            | Self::InvalidData(_)
            | Self::ConnectionPoisoned
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => ErrorKind::Storage,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "child not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted child data: {message}"),
            Self::Cancelled(reason) => write!(f, "{reason}"),
            Self::ConnectionPoisoned => {
                write!(f, "database connection is unusable after a panic")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "database schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Optional search filters. Blank values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildFilter {
    /// Case-insensitive substring of `full_name`.
    pub name: String,
    /// Exact status match.
    pub status: String,
    /// Case-insensitive substring of `location`.
    pub location: String,
}

impl ChildFilter {
    pub fn new(
        name: impl Into<String>,
        status: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            location: location.into(),
        }
    }
}

/// Storage contract for child case records.
///
/// Every call takes the caller's [`CallContext`]; a done context aborts the
/// call with [`RepoError::Cancelled`].
pub trait ChildRepository {
    /// Persists a new record keyed by its id and returns it.
    fn add(&self, ctx: &CallContext, child: &Child) -> RepoResult<Child>;
    /// Returns the record for `id`, or `None` when no row matches.
    fn get(&self, ctx: &CallContext, id: &str) -> RepoResult<Option<Child>>;
    /// Returns all records matching every non-blank filter.
    fn find(&self, ctx: &CallContext, filter: &ChildFilter) -> RepoResult<Vec<Child>>;
    /// Overwrites the stored row keyed by `child.id()`.
    fn update(&self, ctx: &CallContext, child: &Child) -> RepoResult<()>;
    /// Deletes the row keyed by `child.id()`. Missing rows are not an error.
    fn remove(&self, ctx: &CallContext, child: &Child) -> RepoResult<()>;
}

/// SQLite-backed child repository.
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SqliteChildRepository {
    conn: SharedConnection,
}

impl SqliteChildRepository {
    /// Constructs a repository from a migrated/ready shared connection.
    pub fn try_new(conn: SharedConnection) -> RepoResult<Self> {
        {
            let guard = conn.lock().map_err(|_| RepoError::ConnectionPoisoned)?;
            ensure_child_connection_ready(&guard)?;
        }
        Ok(Self { conn })
    }

    /// Runs one unit of work on the locked connection.
    ///
    /// Stops waiting for the lock once `ctx` is done, interrupts running
    /// statements once `ctx` is done, and emits one `event=<event>` line.
    fn with_conn<T>(
        &self,
        ctx: &CallContext,
        event: &str,
        child_id: &str,
        work: impl FnOnce(&Connection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let result = self.run_unit(ctx, work);

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => debug!(
                "event={event} module=repo status=ok child_id={child_id} duration_ms={duration_ms}"
            ),
            Err(RepoError::NotFound(_)) => info!(
                "event={event} module=repo status=not_found child_id={child_id} duration_ms={duration_ms}"
            ),
            Err(RepoError::Cancelled(reason)) => warn!(
                "event={event} module=repo status=cancelled child_id={child_id} duration_ms={duration_ms} reason={reason:?}"
            ),
            Err(err) => error!(
                "event={event} module=repo status=error child_id={child_id} duration_ms={duration_ms} error={err}"
            ),
        }
        result
    }

    fn run_unit<T>(
        &self,
        ctx: &CallContext,
        work: impl FnOnce(&Connection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let conn = self.lock_conn(ctx)?;
        ctx.check().map_err(RepoError::Cancelled)?;

        let _interrupt = InterruptGuard::install(&conn, ctx);
        work(&conn).map_err(|err| translate_interrupt(err, ctx))
    }

    fn lock_conn(&self, ctx: &CallContext) -> RepoResult<MutexGuard<'_, Connection>> {
        loop {
            ctx.check().map_err(RepoError::Cancelled)?;
            match self.conn.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => return Err(RepoError::ConnectionPoisoned),
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY_INTERVAL),
            }
        }
    }
}

impl ChildRepository for SqliteChildRepository {
    fn add(&self, ctx: &CallContext, child: &Child) -> RepoResult<Child> {
        let photos = encode_photos(child.photos())?;
        self.with_conn(ctx, "child_add", child.id(), |conn| {
            conn.execute(
                "INSERT INTO children (
                    id,
                    full_name,
                    age,
                    birth_date,
                    gender,
                    description,
                    location,
                    photos,
                    phone,
                    email,
                    status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    child.id(),
                    child.full_name(),
                    child.age(),
                    child.birth_date(),
                    child.gender().as_str(),
                    child.description(),
                    child.location(),
                    photos,
                    child.phone(),
                    child.email(),
                    child.status().as_str(),
                ],
            )?;
            Ok(child.clone())
        })
    }

    fn get(&self, ctx: &CallContext, id: &str) -> RepoResult<Option<Child>> {
        self.with_conn(ctx, "child_get", id, |conn| {
            let mut stmt = conn.prepare(&format!("{CHILD_SELECT_SQL} WHERE id = ?1;"))?;
            let mut rows = stmt.query([id])?;
            if let Some(row) = rows.next()? {
                return Ok(Some(parse_child_row(row)?));
            }
            Ok(None)
        })
    }

    fn find(&self, ctx: &CallContext, filter: &ChildFilter) -> RepoResult<Vec<Child>> {
        let query = FindQuery::build(filter);
        self.with_conn(ctx, "child_find", "-", |conn| {
            let mut stmt = conn.prepare(&query.sql)?;
            let mut rows = stmt.query(params_from_iter(query.params.iter()))?;
            let mut children = Vec::new();
            while let Some(row) = rows.next()? {
                children.push(parse_child_row(row)?);
            }
            Ok(children)
        })
    }

    fn update(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        let photos = encode_photos(child.photos())?;
        self.with_conn(ctx, "child_update", child.id(), |conn| {
            let changed = conn.execute(
                "UPDATE children
                 SET
                    full_name = ?1,
                    age = ?2,
                    birth_date = ?3,
                    gender = ?4,
                    description = ?5,
                    location = ?6,
                    photos = ?7,
                    phone = ?8,
                    email = ?9,
                    status = ?10,
                    updated_at = MAX(
                        updated_at + 1,
                        CAST(unixepoch('subsec') * 1000 AS INTEGER)
                    )
                 WHERE id = ?11;",
                params![
                    child.full_name(),
                    child.age(),
                    child.birth_date(),
                    child.gender().as_str(),
                    child.description(),
                    child.location(),
                    photos,
                    child.phone(),
                    child.email(),
                    child.status().as_str(),
                    child.id(),
                ],
            )?;

            if changed == 0 {
                return Err(RepoError::NotFound(child.id().to_string()));
            }
            Ok(())
        })
    }

    fn remove(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        self.with_conn(ctx, "child_remove", child.id(), |conn| {
            conn.execute("DELETE FROM children WHERE id = ?1;", [child.id()])?;
            Ok(())
        })
    }
}

/// `find` statement with its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FindQuery {
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
}

impl FindQuery {
    /// Builds the filter query: a `1 = 1` base plus one predicate per
    /// non-blank filter, numbered `?1..?n` in name, status, location order.
    pub(crate) fn build(filter: &ChildFilter) -> Self {
        let mut query = Self {
            sql: format!("{CHILD_SELECT_SQL} WHERE 1 = 1"),
            params: Vec::new(),
        };

        if !filter.name.is_empty() {
            let slot = query.bind(filter.name.as_str());
            query.sql.push_str(&format!(
                " AND instr(casefold(full_name), casefold(?{slot})) > 0"
            ));
        }
        if !filter.status.is_empty() {
            let slot = query.bind(filter.status.as_str());
            query.sql.push_str(&format!(" AND status = ?{slot}"));
        }
        if !filter.location.is_empty() {
            let slot = query.bind(filter.location.as_str());
            query.sql.push_str(&format!(
                " AND instr(casefold(location), casefold(?{slot})) > 0"
            ));
        }

        query.sql.push(';');
        query
    }

    fn bind(&mut self, value: &str) -> usize {
        self.params.push(Value::Text(value.to_string()));
        self.params.len()
    }
}

/// Aborts statements on the guarded connection once the context is done.
///
/// Clearing happens on drop, so every exit path uninstalls the handler.
struct InterruptGuard<'conn> {
    conn: &'conn Connection,
    _busy: BusyScope,
}

impl<'conn> InterruptGuard<'conn> {
    fn install(conn: &'conn Connection, ctx: &CallContext) -> Self {
        let ctx = ctx.clone();
        let busy = BusyScope::enter(&ctx);
        conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || ctx.done().is_some()));
        Self { conn, _busy: busy }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

fn translate_interrupt(err: RepoError, ctx: &CallContext) -> RepoError {
    match err {
        RepoError::Db(DbError::Sqlite(sqlite_err))
            if sqlite_err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) =>
        {
            RepoError::Cancelled(ctx.done().unwrap_or(CancelReason::Cancelled))
        }
        // The busy handler gave up because the context finished.
        RepoError::Db(DbError::Sqlite(sqlite_err))
            if sqlite_err.sqlite_error_code() == Some(ErrorCode::DatabaseBusy) =>
        {
            match ctx.done() {
                Some(reason) => RepoError::Cancelled(reason),
                None => RepoError::Db(DbError::Sqlite(sqlite_err)),
            }
        }
        other => other,
    }
}

fn parse_child_row(row: &Row<'_>) -> RepoResult<Child> {
    let id: String = row.get("id")?;
    if id.is_empty() {
        return Err(RepoError::InvalidData(
            "empty id value in children.id".to_string(),
        ));
    }

    let birth_date: NaiveDate = row.get("birth_date").map_err(|err| {
        RepoError::InvalidData(format!("invalid birth_date for child `{id}`: {err}"))
    })?;

    let photos_text: String = row.get("photos")?;
    let photos = decode_photos(&photos_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid photos for child `{id}`: {err}"))
    })?;

    let input = ChildInput {
        id: id.clone(),
        full_name: row.get("full_name")?,
        age: row.get("age")?,
        birth_date,
        gender: Gender::from(row.get::<_, String>("gender")?),
        description: row.get("description")?,
        location: row.get("location")?,
        photos,
        phone: row.get("phone")?,
        email: row.get("email")?,
        status: ChildStatus::from(row.get::<_, String>("status")?),
    };

    Child::new(input).map_err(|err| {
        RepoError::InvalidData(format!("child `{id}` violates record invariant: {err}"))
    })
}

fn encode_photos(photos: &[String]) -> RepoResult<String> {
    serde_json::to_string(photos)
        .map_err(|err| RepoError::InvalidData(format!("photos are not encodable: {err}")))
}

fn decode_photos(value: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(value)
}

fn ensure_child_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "children")? {
        return Err(RepoError::MissingRequiredTable("children"));
    }

    for &column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "children", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "children",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{
        decode_photos, translate_interrupt, ChildFilter, FindQuery, InterruptGuard, RepoError,
    };
    use crate::context::{CallContext, CancelReason};
    use rusqlite::types::Value;
    use rusqlite::Connection;

    const LONG_QUERY: &str = "WITH RECURSIVE cnt(x) AS (
            SELECT 1 UNION ALL SELECT x + 1 FROM cnt WHERE x < 1000000
        )
        SELECT COUNT(*) FROM cnt;";

    fn run_long_query(conn: &Connection) -> Result<i64, RepoError> {
        conn.query_row(LONG_QUERY, [], |row| row.get(0))
            .map_err(RepoError::from)
    }

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    #[test]
    fn empty_filter_has_no_predicates() {
        let query = FindQuery::build(&ChildFilter::default());
        assert!(query.sql.ends_with("WHERE 1 = 1;"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn all_filters_are_numbered_in_order() {
        let query = FindQuery::build(&ChildFilter::new("ana", "urgente", "Rosario"));
        assert!(query.sql.contains("casefold(?1)"));
        assert!(query.sql.contains("status = ?2"));
        assert!(query.sql.contains("casefold(?3)"));
        assert_eq!(
            query.params,
            vec![text("ana"), text("urgente"), text("Rosario")]
        );
    }

    #[test]
    fn numbering_stays_sequential_when_filters_are_skipped() {
        let query = FindQuery::build(&ChildFilter::new("", "urgente", "Rosario"));
        assert!(query.sql.contains("status = ?1"));
        assert!(query.sql.contains("instr(casefold(location), casefold(?2))"));
        assert!(!query.sql.contains("?3"));
        assert!(!query.sql.contains("full_name), casefold"));

        let query = FindQuery::build(&ChildFilter::new("ana", "", "Rosario"));
        assert!(query.sql.contains("instr(casefold(full_name), casefold(?1))"));
        assert!(query.sql.contains("instr(casefold(location), casefold(?2))"));
        assert!(!query.sql.contains("status ="));
    }

    #[test]
    fn filter_values_never_appear_in_sql_text() {
        let hostile = "x' OR '1' = '1";
        let query = FindQuery::build(&ChildFilter::new(hostile, hostile, hostile));
        assert!(!query.sql.contains(hostile));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn decode_photos_rejects_non_array_json() {
        assert!(decode_photos("{\"a\":1}").is_err());
        assert_eq!(
            decode_photos("[\"a.jpg\",\"b.jpg\"]").unwrap(),
            vec!["a.jpg".to_string(), "b.jpg".to_string()]
        );
    }

    #[test]
    fn interrupt_guard_aborts_running_statement_once_context_is_done() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = CallContext::background();
        ctx.cancel_handle().cancel();

        let err = {
            let _guard = InterruptGuard::install(&conn, &ctx);
            run_long_query(&conn).unwrap_err()
        };
        assert!(matches!(
            translate_interrupt(err, &ctx),
            RepoError::Cancelled(CancelReason::Cancelled)
        ));

        // Guard dropped: the same connection runs long statements again.
        assert_eq!(run_long_query(&conn).unwrap(), 1_000_000);
    }

    #[test]
    fn interrupt_guard_lets_live_context_finish() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = CallContext::background();
        let _guard = InterruptGuard::install(&conn, &ctx);
        assert_eq!(run_long_query(&conn).unwrap(), 1_000_000);
    }

    #[test]
    fn busy_error_is_cancellation_only_once_context_is_done() {
        let busy = || {
            RepoError::from(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                None,
            ))
        };

        let ctx = CallContext::background();
        assert!(matches!(translate_interrupt(busy(), &ctx), RepoError::Db(_)));

        ctx.cancel_handle().cancel();
        assert!(matches!(
            translate_interrupt(busy(), &ctx),
            RepoError::Cancelled(CancelReason::Cancelled)
        ));
    }

    #[test]
    fn non_interrupt_errors_pass_through_translation() {
        let ctx = CallContext::background();
        let err = translate_interrupt(RepoError::InvalidData("x".to_string()), &ctx);
        assert!(matches!(err, RepoError::InvalidData(_)));
    }
}
