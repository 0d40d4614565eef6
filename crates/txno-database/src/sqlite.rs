//! SQLite transaction manager.
//!
//! Connections come from an r2d2 pool in WAL mode. Each transaction owns one
//! pooled connection between `BEGIN` and `COMMIT`/`ROLLBACK`. SQLite has a
//! single writer, so row-level lock timeouts are emulated with the
//! connection's busy timeout: a write that cannot obtain the database write
//! lock in time surfaces as `DatabaseError::LockTimeout`.

use crate::{
    BatchedStatements, DatabaseError, DatabaseResult, PostCommitHook, SqlRow, SqlValue,
    Transaction, TransactionManager, TIMESTAMP_FORMAT,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, ErrorCode, ToSql};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the database pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections in the pool.
    pub max_size: u32,
    /// Minimum idle connections to maintain.
    pub min_idle: Option<u32>,
    /// Connection acquisition timeout.
    pub connection_timeout: Duration,
    /// How long an ordinary statement waits for the write lock.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: Some(2),
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Total connections (active + idle).
    pub connections: u32,
    /// Currently idle connections.
    pub idle_connections: u32,
}

/// Transaction manager backed by a pooled SQLite database file.
pub struct SqliteTransactionManager {
    pool: Pool<SqliteConnectionManager>,
    path: String,
    busy_timeout: Duration,
}

impl SqliteTransactionManager {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Schema migration is separate; see `Persistor::migrate`.
    pub fn open(path: &Path, config: PoolConfig) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        let busy_timeout = config.busy_timeout;

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA cache_size = -64000;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
            conn.busy_timeout(busy_timeout)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!(
            path = %path_str,
            max_size = config.max_size,
            "Database pool created"
        );

        Ok(Self {
            pool,
            path: path_str,
            busy_timeout,
        })
    }

    /// Get pool statistics for monitoring.
    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the pool is healthy by acquiring and releasing a connection.
    pub fn health_check(&self) -> DatabaseResult<()> {
        let conn = self.connection()?;
        conn.execute_batch("SELECT 1").map_err(classify)?;
        debug!("Database pool health check passed");
        Ok(())
    }

    fn connection(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))
    }
}

impl SqliteTransactionManager {
    fn start(&self, begin: &str) -> DatabaseResult<Box<dyn Transaction>> {
        let conn = self.connection()?;
        conn.execute_batch(begin).map_err(classify)?;
        Ok(Box::new(SqliteTransaction {
            conn,
            batch: RefCell::new(BatchedStatements::new()),
            hooks: RefCell::new(Vec::new()),
            busy_timeout: self.busy_timeout,
            finished: Cell::new(false),
        }))
    }
}

impl TransactionManager for SqliteTransactionManager {
    fn begin(&self) -> DatabaseResult<Box<dyn Transaction>> {
        self.start("BEGIN")
    }

    /// `BEGIN IMMEDIATE`: takes the write lock up front, waiting at most the
    /// busy timeout. A deferred transaction that reads first can otherwise
    /// fail its first write with `SQLITE_BUSY_SNAPSHOT`.
    fn begin_write(&self) -> DatabaseResult<Box<dyn Transaction>> {
        self.start("BEGIN IMMEDIATE")
    }
}

struct SqliteTransaction {
    conn: PooledConnection<SqliteConnectionManager>,
    batch: RefCell<BatchedStatements>,
    hooks: RefCell<Vec<PostCommitHook>>,
    busy_timeout: Duration,
    finished: Cell<bool>,
}

impl SqliteTransaction {
    fn ensure_active(&self) -> DatabaseResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DatabaseError::TransactionClosed)
        }
    }

    fn flush_batch(&self) -> DatabaseResult<()> {
        let groups = self.batch.borrow_mut().take();
        for (sql, rows) in groups {
            let mut stmt = self.conn.prepare_cached(&sql).map_err(classify)?;
            let count = rows.len();
            for params in rows {
                stmt.execute(params_from_iter(params.iter()))
                    .map_err(classify)?;
            }
            debug!(statements = count, "Flushed statement batch");
        }
        Ok(())
    }

    fn run_execute(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<usize> {
        self.ensure_active()?;
        self.flush_batch()?;
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        stmt.execute(params_from_iter(params.iter()))
            .map_err(classify)
    }

    fn run_query(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<Vec<SqlRow>> {
        self.ensure_active()?;
        self.flush_batch()?;
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(classify)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i).map_err(classify)?));
            }
            result.push(SqlRow::new(columns.clone(), values));
        }
        Ok(result)
    }

    /// Run `op` with a temporary busy timeout, restoring the default after.
    fn with_busy_timeout<T>(
        &self,
        timeout: Duration,
        op: impl FnOnce() -> DatabaseResult<T>,
    ) -> DatabaseResult<T> {
        self.conn.busy_timeout(timeout).map_err(classify)?;
        let result = op();
        if let Err(e) = self.conn.busy_timeout(self.busy_timeout) {
            warn!(error = %e, "Failed to restore busy timeout");
        }
        result
    }
}

impl Transaction for SqliteTransaction {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<usize> {
        self.run_execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<Vec<SqlRow>> {
        self.run_query(sql, params)
    }

    fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
    ) -> DatabaseResult<usize> {
        self.with_busy_timeout(timeout, || self.run_execute(sql, params))
    }

    fn query_with_timeout(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
    ) -> DatabaseResult<Vec<SqlRow>> {
        self.with_busy_timeout(timeout, || self.run_query(sql, params))
    }

    fn add_batch(&self, sql: &str, params: Vec<SqlValue>) -> DatabaseResult<()> {
        self.ensure_active()?;
        self.batch.borrow_mut().push(sql, params);
        Ok(())
    }

    fn add_post_commit_hook(&self, hook: PostCommitHook) {
        self.hooks.borrow_mut().push(hook);
    }

    fn is_active(&self) -> bool {
        !self.finished.get() && !self.conn.is_autocommit()
    }

    fn commit(self: Box<Self>) -> DatabaseResult<()> {
        self.ensure_active()?;
        self.flush_batch()?;
        self.conn.execute_batch("COMMIT").map_err(classify)?;
        self.finished.set(true);

        let hooks = std::mem::take(&mut *self.hooks.borrow_mut());
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        self.finished.set(true);
        self.hooks.borrow_mut().clear();
        self.batch.borrow_mut().take();
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK").map_err(classify)?;
        }
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished.get() && !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(*b as i64)),
            SqlValue::Timestamp(t) => {
                ToSqlOutput::Owned(Value::Text(t.format(TIMESTAMP_FORMAT).to_string()))
            }
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            SqlValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

/// Map SQLite failures onto the backend-neutral error kinds.
fn classify(err: rusqlite::Error) -> DatabaseError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let unique = failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
        if failure.code == ErrorCode::ConstraintViolation && unique {
            return DatabaseError::UniqueViolation(
                message.clone().unwrap_or_else(|| failure.to_string()),
            );
        }
        if matches!(
            failure.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ) {
            return DatabaseError::LockTimeout;
        }
    }
    DatabaseError::Sqlite(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn open() -> (tempfile::TempDir, SqliteTransactionManager) {
        // r2d2_sqlite doesn't support :memory: across connections, use temp file
        let temp_dir = tempfile::tempdir().unwrap();
        let manager =
            SqliteTransactionManager::open(&temp_dir.path().join("test.db"), PoolConfig::default())
                .unwrap();
        let tx = manager.begin().unwrap();
        tx.execute(
            "CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER, at TEXT)",
            &[],
        )
        .unwrap();
        tx.commit().unwrap();
        (temp_dir, manager)
    }

    fn count(manager: &SqliteTransactionManager) -> i64 {
        let tx = manager.begin().unwrap();
        let rows = tx.query("SELECT COUNT(*) AS c FROM t", &[]).unwrap();
        rows[0].get_i64("c").unwrap()
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.min_idle, Some(2));
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_health_check() {
        let (_dir, manager) = open();
        assert!(manager.health_check().is_ok());
        assert!(manager.state().connections >= 1);
        assert!(manager.path().ends_with("test.db"));
    }

    #[test]
    fn test_commit_makes_rows_visible() {
        let (_dir, manager) = open();
        let tx = manager.begin().unwrap();
        assert!(tx.is_active());
        tx.execute("INSERT INTO t (id, n) VALUES (?, ?)", &["a".into(), 1i64.into()])
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&manager), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, manager) = open();
        {
            let tx = manager.begin().unwrap();
            tx.execute("INSERT INTO t (id, n) VALUES ('a', 1)", &[])
                .unwrap();
        }
        assert_eq!(count(&manager), 0);
    }

    #[test]
    fn test_post_commit_hooks_run_only_on_commit() {
        let (_dir, manager) = open();
        let calls = Arc::new(AtomicUsize::new(0));

        let tx = manager.begin().unwrap();
        let c = Arc::clone(&calls);
        tx.add_post_commit_hook(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tx.rollback().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let tx = manager.begin().unwrap();
        let c = Arc::clone(&calls);
        tx.add_post_commit_hook(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tx.commit().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_flushed_before_query() {
        let (_dir, manager) = open();
        let tx = manager.begin().unwrap();
        for i in 0..3i64 {
            tx.add_batch(
                "INSERT INTO t (id, n) VALUES (?, ?)",
                vec![format!("id-{}", i).into(), i.into()],
            )
            .unwrap();
        }
        let rows = tx.query("SELECT COUNT(*) AS c FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_i64("c").unwrap(), 3);
        tx.commit().unwrap();
    }

    #[test]
    fn test_batch_flushed_at_commit() {
        let (_dir, manager) = open();
        let tx = manager.begin().unwrap();
        tx.add_batch("INSERT INTO t (id, n) VALUES ('x', 1)", vec![])
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&manager), 1);
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let (_dir, manager) = open();
        let tx = manager.begin().unwrap();
        tx.execute("INSERT INTO t (id, n) VALUES ('a', 1)", &[])
            .unwrap();
        let err = tx
            .execute("INSERT INTO t (id, n) VALUES ('a', 2)", &[])
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }

    #[test]
    fn test_contended_write_times_out() {
        let (_dir, manager) = open();

        let holder = manager.begin().unwrap();
        holder
            .execute("INSERT INTO t (id, n) VALUES ('a', 1)", &[])
            .unwrap();

        let waiter = manager.begin().unwrap();
        let err = waiter
            .execute_with_timeout(
                "INSERT INTO t (id, n) VALUES ('b', 1)",
                &[],
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(matches!(err, DatabaseError::LockTimeout));

        drop(waiter);
        holder.commit().unwrap();
        assert_eq!(count(&manager), 1);
    }

    #[test]
    fn test_write_transaction_holds_the_lock_from_begin() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = SqliteTransactionManager::open(
            &temp_dir.path().join("test.db"),
            PoolConfig {
                busy_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .unwrap();
        let tx = manager.begin().unwrap();
        tx.execute("CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER, at TEXT)", &[])
            .unwrap();
        tx.commit().unwrap();

        let writer = manager.begin_write().unwrap();
        assert_eq!(count(&manager), 0);

        // Nothing written yet, but other writers already wait.
        let other = manager.begin().unwrap();
        let err = other
            .execute("INSERT INTO t (id, n) VALUES ('b', 1)", &[])
            .unwrap_err();
        assert!(matches!(err, DatabaseError::LockTimeout));
        drop(other);

        assert!(matches!(
            manager.begin_write().map(|_| ()),
            Err(DatabaseError::LockTimeout)
        ));

        writer
            .execute("INSERT INTO t (id, n) VALUES ('a', 1)", &[])
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(count(&manager), 1);
    }

    #[test]
    fn test_timestamps_and_booleans_bind_as_text_and_integers() {
        let (_dir, manager) = open();
        let now = chrono::Utc::now();
        let tx = manager.begin().unwrap();
        tx.execute(
            "INSERT INTO t (id, n, at) VALUES (?, ?, ?)",
            &["a".into(), true.into(), now.into()],
        )
        .unwrap();
        let rows = tx.query("SELECT n, at FROM t", &[]).unwrap();
        assert!(rows[0].get_bool("n").unwrap());
        assert_eq!(
            rows[0].get_string("at").unwrap(),
            now.format(TIMESTAMP_FORMAT).to_string()
        );
    }
}
