//! Unit-of-work abstraction.
//!
//! A transaction is passed explicitly to every persistence call. The outbox
//! never looks for an ambient transaction; callers hand it the one their own
//! business writes go through, and the outbox row commits or rolls back with
//! them.

use crate::{DatabaseError, DatabaseResult, SqlRow, SqlValue};
use std::time::Duration;
use tracing::warn;

/// Work deferred until the owning transaction has committed.
pub type PostCommitHook = Box<dyn FnOnce() + Send + 'static>;

/// An open unit of work on one connection.
///
/// Dropping a transaction without calling `commit` rolls it back and
/// discards its post-commit hooks.
pub trait Transaction {
    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<usize>;

    /// Run a query and collect every row.
    fn query(&self, sql: &str, params: &[SqlValue]) -> DatabaseResult<Vec<SqlRow>>;

    /// Like `execute`, but waits at most `timeout` for row or table locks.
    ///
    /// A lock that cannot be obtained in time surfaces as
    /// `DatabaseError::LockTimeout`.
    fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
    ) -> DatabaseResult<usize>;

    /// Like `query`, but waits at most `timeout` for row or table locks.
    fn query_with_timeout(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
    ) -> DatabaseResult<Vec<SqlRow>>;

    /// Queue a statement for batched execution.
    ///
    /// Queued statements run before the next non-batched statement and at
    /// commit, in the order they were added.
    fn add_batch(&self, sql: &str, params: Vec<SqlValue>) -> DatabaseResult<()>;

    /// Register work to run after this transaction commits.
    ///
    /// Hooks run in registration order, once, and only on commit.
    fn add_post_commit_hook(&self, hook: PostCommitHook);

    /// Whether the unit of work is still open.
    fn is_active(&self) -> bool;

    /// Commit, then run post-commit hooks.
    fn commit(self: Box<Self>) -> DatabaseResult<()>;

    /// Roll back and drop post-commit hooks.
    fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}

/// Opens transactions.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> DatabaseResult<Box<dyn Transaction>>;

    /// Open a transaction that reads and then writes.
    ///
    /// Engines with a database-wide write lock take it here instead of at
    /// the first write, so a concurrent commit cannot invalidate what was
    /// read. A lock that cannot be taken in time is `LockTimeout`.
    fn begin_write(&self) -> DatabaseResult<Box<dyn Transaction>> {
        self.begin()
    }
}

/// Run `work` in a fresh transaction.
///
/// Commits when `work` returns `Ok`, rolls back otherwise.
pub fn in_transaction<T, E, F>(manager: &dyn TransactionManager, work: F) -> Result<T, E>
where
    F: FnOnce(&dyn Transaction) -> Result<T, E>,
    E: From<DatabaseError>,
{
    run(manager.begin()?, work)
}

/// Like [`in_transaction`], but opened with [`TransactionManager::begin_write`].
pub fn in_write_transaction<T, E, F>(manager: &dyn TransactionManager, work: F) -> Result<T, E>
where
    F: FnOnce(&dyn Transaction) -> Result<T, E>,
    E: From<DatabaseError>,
{
    run(manager.begin_write()?, work)
}

fn run<T, E, F>(tx: Box<dyn Transaction>, work: F) -> Result<T, E>
where
    F: FnOnce(&dyn Transaction) -> Result<T, E>,
    E: From<DatabaseError>,
{
    match work(tx.as_ref()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
