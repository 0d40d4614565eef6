//! Outbox persistence.
//!
//! Every operation runs inside the transaction it is handed. Templates are
//! rendered once, when the persistor is built; only the per-call row limit
//! is substituted afterwards.

use crate::{
    migrations, DatabaseError, DatabaseResult, Dialect, SequenceSource, SqlRow, SqlValue,
    Transaction, TransactionManager,
};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};
use txno_core::{Entry, Invocation, NO_TOPIC};

/// Every column of the outbox table, in the order inserts bind them.
pub const ALL_FIELDS: &str = "id, uniqueRequestId, invocation, topic, seq, lastAttemptTime, \
    nextAttemptTime, attempts, blocked, processed, version, orderedTakeLast";

const INSERT: &str = "INSERT INTO {{table}} (id, uniqueRequestId, invocation, topic, seq, \
    lastAttemptTime, nextAttemptTime, attempts, blocked, processed, version, orderedTakeLast) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const INSERT_NO_TOPIC: &str = "INSERT INTO {{table}} (id, uniqueRequestId, invocation, \
    lastAttemptTime, nextAttemptTime, attempts, blocked, processed, version, orderedTakeLast) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_BY_ID: &str = "SELECT {{allFields}} FROM {{table}} WHERE id = ?";

const SEQUENCE_INCREMENT: &str = "UPDATE TXNO_SEQUENCE SET seq = seq + 1 WHERE topic = ?";
const SEQUENCE_INSERT: &str = "INSERT INTO TXNO_SEQUENCE (topic, seq) VALUES (?, 1)";
const SEQUENCE_SELECT: &str = "SELECT seq FROM TXNO_SEQUENCE WHERE topic = ?";

struct Statements {
    insert: String,
    insert_no_topic: String,
    select_by_id: String,
    select_batch: String,
    lock: String,
    delete: String,
    update: String,
    unblock: String,
    delete_expired: String,
    fetch_next_in_all_topics: String,
    delete_outdated_in_all_topics: String,
    next_sequence: Option<String>,
    clear: String,
}

/// Runs outbox queries for one dialect and table.
pub struct Persistor {
    dialect: Dialect,
    table: String,
    write_lock_timeout: Duration,
    sql: Statements,
}

impl Persistor {
    /// Build a persistor, rendering every template for `table`.
    ///
    /// The table name is spliced into SQL text, so it must be a plain
    /// identifier (optionally schema-qualified).
    pub fn new(
        dialect: Dialect,
        table: impl Into<String>,
        write_lock_timeout: Duration,
    ) -> DatabaseResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        let render = |template: &str| {
            template
                .replace("{{table}}", &table)
                .replace("{{allFields}}", ALL_FIELDS)
                .replace("{{true}}", dialect.true_literal)
                .replace("{{false}}", dialect.false_literal)
        };
        let sql = Statements {
            insert: render(INSERT),
            insert_no_topic: render(INSERT_NO_TOPIC),
            select_by_id: render(SELECT_BY_ID),
            select_batch: render(dialect.select_batch),
            lock: render(dialect.lock),
            delete: render(dialect.delete),
            update: render(dialect.update),
            unblock: render(dialect.unblock),
            delete_expired: render(dialect.delete_expired),
            fetch_next_in_all_topics: render(dialect.fetch_next_in_all_topics),
            delete_outdated_in_all_topics: render(dialect.delete_outdated_in_all_topics),
            next_sequence: match dialect.sequence {
                SequenceSource::Native(sql) => Some(render(sql)),
                SequenceSource::Table => None,
            },
            clear: render("DELETE FROM {{table}}"),
        };

        debug!(
            dialect = %dialect.kind,
            table = %table,
            lock_strategy = ?dialect.lock_strategy,
            "Persistor configured"
        );

        Ok(Self {
            dialect,
            table,
            write_lock_timeout,
            sql,
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Apply pending schema migrations.
    pub fn migrate(&self, manager: &dyn TransactionManager) -> DatabaseResult<()> {
        migrations::migrate(manager, &self.dialect, &self.table)
    }

    /// Write the full schema script for this dialect and table.
    pub fn write_schema(&self, out: &mut dyn Write) -> DatabaseResult<()> {
        migrations::write_schema(&self.dialect, &self.table, out)
    }

    /// Insert a new entry, assigning its topic sequence when ordered.
    ///
    /// Entries without a unique request id are queued on the transaction's
    /// batch. Entries with one are written immediately so a duplicate key is
    /// reported as `DatabaseError::AlreadyScheduled` right here. Any other
    /// uniqueness failure, such as a reused `id`, stays a `UniqueViolation`.
    pub fn save(&self, tx: &dyn Transaction, entry: &mut Entry) -> DatabaseResult<()> {
        entry.validate()?;

        if let Some(topic) = entry.topic().map(str::to_string) {
            let sequence = self.next_sequence(tx, &topic)?;
            entry.set_sequence(sequence);
        }

        let invocation = entry.invocation().to_json()?;
        let (sql, params) = match entry.topic() {
            Some(topic) => (
                &self.sql.insert,
                vec![
                    entry.id().into(),
                    entry.unique_request_id().into(),
                    invocation.into(),
                    topic.into(),
                    entry.sequence().into(),
                    entry.last_attempt_time.into(),
                    entry.next_attempt_time.into(),
                    entry.attempts.into(),
                    entry.blocked.into(),
                    entry.processed.into(),
                    entry.version.into(),
                    entry.ordered_take_last().into(),
                ],
            ),
            None => (
                &self.sql.insert_no_topic,
                vec![
                    entry.id().into(),
                    entry.unique_request_id().into(),
                    invocation.into(),
                    entry.last_attempt_time.into(),
                    entry.next_attempt_time.into(),
                    entry.attempts.into(),
                    entry.blocked.into(),
                    entry.processed.into(),
                    entry.version.into(),
                    entry.ordered_take_last().into(),
                ],
            ),
        };

        if entry.unique_request_id().is_none() {
            tx.add_batch(sql, params)?;
            debug!(entry = %entry.description(), "Queued insert");
            return Ok(());
        }

        match tx.execute(sql, &params) {
            Ok(_) => {
                debug!(entry = %entry.description(), "Inserted");
                Ok(())
            }
            Err(DatabaseError::UniqueViolation(message)) if names_request_key(&message) => Err(
                DatabaseError::AlreadyScheduled(entry.description().to_string()),
            ),
            Err(e) => Err(e),
        }
    }

    /// Claim `entry` at its current version for the rest of `tx`.
    ///
    /// Returns `false` when the row is gone, has moved to another version,
    /// or is held by someone else past the write-lock timeout. On success
    /// the invocation is refreshed from storage.
    pub fn lock(&self, tx: &dyn Transaction, entry: &mut Entry) -> DatabaseResult<bool> {
        let rows = match tx.query_with_timeout(
            &self.sql.lock,
            &[entry.id().into(), entry.version.into()],
            self.write_lock_timeout,
        ) {
            Ok(rows) => rows,
            Err(DatabaseError::LockTimeout) => {
                debug!(entry = %entry.description(), "Lock wait timed out");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let Some(row) = rows.first() else {
            return Ok(false);
        };
        let invocation = Invocation::from_json(&row.get_string("invocation")?)?;
        entry.set_invocation(invocation);
        Ok(true)
    }

    /// Persist mutable state, bumping the version.
    ///
    /// Fails with `OptimisticLock` unless exactly one row matched the
    /// entry's id at its current version.
    pub fn update(&self, tx: &dyn Transaction, entry: &mut Entry) -> DatabaseResult<()> {
        let count = tx.execute(
            &self.sql.update,
            &[
                entry.last_attempt_time.into(),
                entry.next_attempt_time.into(),
                entry.attempts.into(),
                entry.blocked.into(),
                entry.processed.into(),
                (entry.version + 1).into(),
                entry.id().into(),
                entry.version.into(),
            ],
        )?;
        if count != 1 {
            return Err(DatabaseError::OptimisticLock(entry.description().to_string()));
        }
        entry.version += 1;
        Ok(())
    }

    /// Remove `entry` at its current version.
    pub fn delete(&self, tx: &dyn Transaction, entry: &Entry) -> DatabaseResult<()> {
        let count = tx.execute(
            &self.sql.delete,
            &[entry.id().into(), entry.version.into()],
        )?;
        if count != 1 {
            return Err(DatabaseError::OptimisticLock(entry.description().to_string()));
        }
        Ok(())
    }

    /// Reset a blocked, unprocessed entry so a flush at `now` selects it.
    ///
    /// Selection requires `nextAttemptTime < now`, so the row is stamped one
    /// microsecond earlier. Returns whether a row was reset.
    pub fn unblock(&self, tx: &dyn Transaction, id: &str, now: DateTime<Utc>) -> DatabaseResult<bool> {
        let due = now
            .checked_sub_signed(chrono::Duration::microseconds(1))
            .unwrap_or(now);
        let count = tx.execute(&self.sql.unblock, &[due.into(), id.into()])?;
        Ok(count == 1)
    }

    /// Due, unblocked, unprocessed entries without a topic.
    ///
    /// Rows that cannot be decoded are logged and left out, so they never
    /// hold back the rest of the batch.
    pub fn select_batch(
        &self,
        tx: &dyn Transaction,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Entry>> {
        let rows = tx.query(&with_limit(&self.sql.select_batch, limit), &[now.into()])?;
        Ok(map_decodable(&rows))
    }

    /// The head of each topic, when it is unblocked and due.
    ///
    /// A topic whose head is blocked or not yet due contributes nothing,
    /// even if later entries in it are ready.
    pub fn select_next_in_topics(
        &self,
        tx: &dyn Transaction,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Entry>> {
        let rows = tx.query(
            &with_limit(&self.sql.fetch_next_in_all_topics, limit),
            &[now.into()],
        )?;
        Ok(map_decodable(&rows))
    }

    /// Delete up to `limit` processed entries whose retention ended before `now`.
    pub fn delete_processed_and_expired(
        &self,
        tx: &dyn Transaction,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DatabaseResult<usize> {
        tx.execute(&with_limit(&self.sql.delete_expired, limit), &[now.into()])
    }

    /// Drop superseded ordered-take-last entries, keeping the newest per topic.
    pub fn delete_outdated_in_all_topics(&self, tx: &dyn Transaction) -> DatabaseResult<usize> {
        tx.execute(&self.sql.delete_outdated_in_all_topics, &[])
    }

    pub fn select_by_id(&self, tx: &dyn Transaction, id: &str) -> DatabaseResult<Option<Entry>> {
        let rows = tx.query(&self.sql.select_by_id, &[id.into()])?;
        rows.first().map(map_entry).transpose()
    }

    /// Check the database with the dialect's trivial query.
    pub fn check_connection(&self, tx: &dyn Transaction) -> DatabaseResult<bool> {
        let rows = tx.query(self.dialect.check, &[])?;
        match rows.first() {
            Some(row) => Ok(matches!(row.get_index(0)?, SqlValue::Integer(1))),
            None => Ok(false),
        }
    }

    /// Delete every entry and sequence counter.
    pub fn clear(&self, tx: &dyn Transaction) -> DatabaseResult<()> {
        let removed = tx.execute(&self.sql.clear, &[])?;
        if self.sql.next_sequence.is_none() {
            tx.execute("DELETE FROM TXNO_SEQUENCE", &[])?;
        }
        info!(table = %self.table, removed, "Outbox cleared");
        Ok(())
    }

    fn next_sequence(&self, tx: &dyn Transaction, topic: &str) -> DatabaseResult<i64> {
        if let Some(sql) = &self.sql.next_sequence {
            let rows = tx.query(sql, &[])?;
            let row = rows
                .first()
                .ok_or_else(|| DatabaseError::InvalidData("sequence returned no row".into()))?;
            return crate::value::as_opt_i64("nextval", row.get_index(0)?)?
                .ok_or_else(|| DatabaseError::InvalidData("sequence returned null".into()));
        }

        if tx.execute(SEQUENCE_INCREMENT, &[topic.into()])? == 0 {
            tx.execute(SEQUENCE_INSERT, &[topic.into()])?;
        }
        let rows = tx.query(SEQUENCE_SELECT, &[topic.into()])?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseError::InvalidData(format!("no sequence for {}", topic)))?;
        row.get_i64("seq")
    }
}

fn with_limit(sql: &str, limit: usize) -> String {
    sql.replace("{{batchSize}}", &limit.to_string())
}

fn validate_table_name(table: &str) -> DatabaseResult<()> {
    let valid = !table.is_empty()
        && !table.starts_with('.')
        && !table.ends_with('.')
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidData(format!(
            "invalid table name: {:?}",
            table
        )))
    }
}

/// Whether a unique-constraint message is about the idempotency key rather
/// than the primary key. Engines name either the column or a constraint
/// derived from it.
fn names_request_key(message: &str) -> bool {
    message.to_ascii_lowercase().contains("uniquerequestid")
}

fn map_decodable(rows: &[SqlRow]) -> Vec<Entry> {
    rows.iter()
        .filter_map(|row| match map_entry(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    entry_id = ?row.get_string("id").ok(),
                    error = %e,
                    "Skipping undecodable outbox row"
                );
                None
            }
        })
        .collect()
}

fn map_entry(row: &SqlRow) -> DatabaseResult<Entry> {
    let invocation = Invocation::from_json(&row.get_string("invocation")?)?;
    let topic = row.get_opt_string("topic")?.filter(|t| t != NO_TOPIC);

    let mut entry = Entry::new(
        row.get_string("id")?,
        invocation,
        row.get_timestamp("nextAttemptTime")?,
    )
    .with_unique_request_id(row.get_opt_string("uniqueRequestId")?)
    .with_topic(topic, row.get_bool("orderedTakeLast")?)
    .with_sequence(row.get_opt_i64("seq")?);

    entry.last_attempt_time = row.get_opt_timestamp("lastAttemptTime")?;
    entry.attempts = row.get_opt_i64("attempts")?.unwrap_or(0) as i32;
    entry.blocked = row.get_bool("blocked")?;
    entry.processed = row.get_bool("processed")?;
    entry.version = row.get_opt_i64("version")?.unwrap_or(0) as i32;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DialectKind;

    fn persistor(kind: DialectKind) -> Persistor {
        Persistor::new(Dialect::new(kind), "TXNO_OUTBOX", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn templates_are_fully_rendered() {
        for kind in DialectKind::ALL {
            let p = persistor(kind);
            for sql in [
                &p.sql.select_batch,
                &p.sql.lock,
                &p.sql.update,
                &p.sql.unblock,
                &p.sql.delete_outdated_in_all_topics,
            ] {
                assert!(!sql.contains("{{table}}"), "{}: {}", kind, sql);
                assert!(!sql.contains("{{true}}"), "{}: {}", kind, sql);
                assert!(!sql.contains("{{false}}"), "{}: {}", kind, sql);
            }
        }
    }

    #[test]
    fn batch_size_substituted_per_call() {
        let p = persistor(DialectKind::MySql8);
        let sql = with_limit(&p.sql.select_batch, 25);
        assert!(sql.contains("LIMIT 25"));
    }

    #[test]
    fn request_key_violations_are_told_apart_from_primary_key() {
        assert!(names_request_key(
            "UNIQUE constraint failed: TXNO_OUTBOX.uniqueRequestId"
        ));
        assert!(names_request_key(
            "duplicate key value violates unique constraint \"ux_txno_outbox_uniquerequestid\""
        ));
        assert!(!names_request_key("UNIQUE constraint failed: TXNO_OUTBOX.id"));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        for bad in ["", "x; DROP TABLE y", "a b", "t'", ".x"] {
            assert!(
                Persistor::new(Dialect::new(DialectKind::Sqlite), bad, Duration::ZERO).is_err(),
                "{:?}",
                bad
            );
        }
        assert!(
            Persistor::new(Dialect::new(DialectKind::Sqlite), "app.OUTBOX_2", Duration::ZERO)
                .is_ok()
        );
    }
}
