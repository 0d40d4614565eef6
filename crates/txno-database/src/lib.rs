//! Storage layer for the transactional outbox.
//!
//! This crate provides:
//! - A `Transaction`/`TransactionManager` abstraction with post-commit hooks
//!   and statement batching
//! - A SQLite-backed transaction manager over an r2d2 pool
//! - SQL dialects for each supported database
//! - The numbered schema migration log
//! - The `Persistor`, which runs every outbox query inside a caller's
//!   transaction

mod batch;
mod dialect;
mod error;
mod migrations;
mod persistor;
mod sqlite;
mod transaction;
mod value;

pub use batch::BatchedStatements;
pub use dialect::{Dialect, DialectKind, LockStrategy, SequenceSource};
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{migrate, migrations_for, write_schema, Migration, VERSION_TABLE};
pub use persistor::{Persistor, ALL_FIELDS};
pub use sqlite::{PoolConfig, PoolState, SqliteTransactionManager};
pub use transaction::{
    in_transaction, in_write_transaction, PostCommitHook, Transaction, TransactionManager,
};
pub use value::{SqlRow, SqlValue, TIMESTAMP_FORMAT};
