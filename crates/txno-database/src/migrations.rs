//! Outbox schema migrations.
//!
//! The schema evolves through a fixed, numbered list of steps. A dialect may
//! replace the SQL of any step or disable it. Applied steps are tracked in a
//! single-row version table; each step and its version advance commit
//! together, under a lock on the version row so that concurrent migrators
//! serialize.

use crate::{in_transaction, DatabaseError, DatabaseResult, Dialect, SqlValue, TransactionManager};
use std::io::Write;
use tracing::{debug, info};

/// Name of the schema version table.
pub const VERSION_TABLE: &str = "TXNO_VERSION";

/// One numbered schema step, rendered for a dialect and table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: String,
}

const STEPS: &[(u32, &str, &str)] = &[
    (
        1,
        "Create outbox table",
        "CREATE TABLE {{table}} (\n    id VARCHAR(36) PRIMARY KEY,\n    invocation TEXT,\n    \
         nextAttemptTime TIMESTAMP(6),\n    attempts INT,\n    blacklisted BOOLEAN,\n    \
         version INT\n)",
    ),
    (
        2,
        "Add unique request id",
        "ALTER TABLE {{table}} ADD COLUMN uniqueRequestId VARCHAR(100) NULL UNIQUE",
    ),
    (
        3,
        "Add processed flag",
        "ALTER TABLE {{table}} ADD COLUMN processed BOOLEAN",
    ),
    (
        4,
        "Add flush index",
        "CREATE INDEX IX_TXNO_OUTBOX_1 ON {{table}} (processed, blacklisted, nextAttemptTime)",
    ),
    (
        5,
        "Increase size of uniqueRequestId",
        "ALTER TABLE {{table}} MODIFY COLUMN uniqueRequestId VARCHAR(250)",
    ),
    (
        6,
        "Rename column blacklisted to blocked",
        "ALTER TABLE {{table}} CHANGE COLUMN blacklisted blocked BOOLEAN",
    ),
    (
        7,
        "Add lastAttemptTime column",
        "ALTER TABLE {{table}} ADD COLUMN lastAttemptTime TIMESTAMP(6) NULL AFTER invocation",
    ),
    (
        8,
        "Update length of invocation column",
        "ALTER TABLE {{table}} MODIFY COLUMN invocation MEDIUMTEXT",
    ),
    (
        9,
        "Add topic",
        "ALTER TABLE {{table}} ADD COLUMN topic VARCHAR(250) NOT NULL DEFAULT '*'",
    ),
    (
        10,
        "Add sequence",
        "ALTER TABLE {{table}} ADD COLUMN seq INT NULL",
    ),
    (
        11,
        "Add sequence table",
        "CREATE TABLE TXNO_SEQUENCE (topic VARCHAR(250) NOT NULL, seq INT NOT NULL, \
         CONSTRAINT PK_TXNO_SEQUENCE PRIMARY KEY (topic, seq))",
    ),
    (
        12,
        "Add topic index",
        "CREATE INDEX IX_TXNO_OUTBOX_2 ON {{table}} (topic, processed, seq)",
    ),
    (
        13,
        "Add orderedTakeLast",
        "ALTER TABLE {{table}} ADD COLUMN orderedTakeLast BOOLEAN NOT NULL DEFAULT FALSE",
    ),
];

/// The enabled steps for `dialect`, in order, rendered for `table`.
pub fn migrations_for(dialect: &Dialect, table: &str) -> Vec<Migration> {
    STEPS
        .iter()
        .filter_map(|(version, name, default_sql)| {
            let sql = match dialect.migration_override(*version) {
                Some(Some(sql)) => sql,
                Some(None) => return None,
                None => default_sql,
            };
            Some(Migration {
                version: *version,
                name,
                sql: sql.replace("{{table}}", table),
            })
        })
        .collect()
}

/// Bring the schema up to date.
pub fn migrate(
    manager: &dyn TransactionManager,
    dialect: &Dialect,
    table: &str,
) -> DatabaseResult<()> {
    apply(manager, dialect, &migrations_for(dialect, table))
}

/// Create the version table if needed, then run every step of `migrations`
/// that is newer than the recorded version. A failing step stops the run
/// and leaves the version at the last step that succeeded.
fn apply(
    manager: &dyn TransactionManager,
    dialect: &Dialect,
    migrations: &[Migration],
) -> DatabaseResult<()> {
    create_version_table(manager, dialect)?;

    let target = migrations.last().map(|m| m.version).unwrap_or(0);
    info!(dialect = %dialect.kind, target_version = target, "Running migrations");

    for migration in migrations {
        in_transaction(manager, |tx| -> DatabaseResult<()> {
            let current = current_version(tx, dialect)?;
            if current >= migration.version as i64 {
                debug!(version = migration.version, current, "Migration already applied");
                return Ok(());
            }
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            tx.execute(&migration.sql, &[]).map_err(|e| {
                DatabaseError::Migration(format!(
                    "step {} ({}) failed: {}",
                    migration.version, migration.name, e
                ))
            })?;
            tx.execute(
                "UPDATE TXNO_VERSION SET version = ?",
                &[SqlValue::Integer(migration.version as i64)],
            )?;
            Ok(())
        })?;
    }

    info!("Migrations complete");
    Ok(())
}

/// Write the full schema script for `dialect` to `out`.
pub fn write_schema(dialect: &Dialect, table: &str, out: &mut dyn Write) -> DatabaseResult<()> {
    for migration in migrations_for(dialect, table) {
        writeln!(out, "-- {}: {}", migration.version, migration.name)?;
        writeln!(out, "{};", migration.sql)?;
        writeln!(out)?;
    }
    Ok(())
}

fn create_version_table(manager: &dyn TransactionManager, dialect: &Dialect) -> DatabaseResult<()> {
    let result = in_transaction(manager, |tx| tx.execute(dialect.create_version_table, &[]));
    match (result, dialect.version_table_exists_error) {
        (Ok(_), _) => Ok(()),
        (Err(e), Some(marker)) if e.to_string().contains(marker) => {
            debug!("Version table already exists");
            Ok(())
        }
        (Err(e), _) => Err(e),
    }
}

/// Read the schema version, inserting version 0 when the table is empty.
fn current_version(tx: &dyn crate::Transaction, dialect: &Dialect) -> DatabaseResult<i64> {
    let rows = tx.query(dialect.fetch_current_version, &[])?;
    match rows.first() {
        Some(row) => Ok(crate::value::as_opt_i64("version", row.get_index(0)?)?.unwrap_or(0)),
        None => {
            tx.execute("INSERT INTO TXNO_VERSION (version) VALUES (0)", &[])?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DialectKind, PoolConfig, SqliteTransactionManager};

    #[test]
    fn default_log_has_thirteen_steps() {
        let steps = migrations_for(&Dialect::new(DialectKind::MySql8), "TXNO_OUTBOX");
        assert_eq!(steps.len(), 13);
        let versions: Vec<u32> = steps.iter().map(|m| m.version).collect();
        assert_eq!(versions, (1..=13).collect::<Vec<_>>());
    }

    #[test]
    fn disabled_steps_are_skipped() {
        let pg = migrations_for(&Dialect::new(DialectKind::Postgresql9), "TXNO_OUTBOX");
        assert!(pg.iter().all(|m| m.version != 8));

        let seq = migrations_for(&Dialect::new(DialectKind::PostgresqlSeq), "TXNO_OUTBOX");
        assert!(seq.iter().all(|m| m.version != 11));
        assert!(seq
            .iter()
            .any(|m| m.version == 10 && m.sql.contains("BIGSERIAL")));
    }

    #[test]
    fn table_name_is_substituted() {
        let steps = migrations_for(&Dialect::new(DialectKind::Sqlite), "MY_OUTBOX");
        assert!(steps[0].sql.starts_with("CREATE TABLE MY_OUTBOX"));
        assert!(steps.iter().all(|m| !m.sql.contains("{{table}}")));
    }

    fn open() -> (tempfile::TempDir, SqliteTransactionManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            SqliteTransactionManager::open(&dir.path().join("migrate.db"), PoolConfig::default())
                .unwrap();
        (dir, manager)
    }

    fn step(version: u32, sql: &str) -> Migration {
        Migration {
            version,
            name: "test step",
            sql: sql.to_string(),
        }
    }

    fn version(manager: &SqliteTransactionManager) -> i64 {
        in_transaction(manager, |tx| {
            let rows = tx.query("SELECT version FROM TXNO_VERSION", &[])?;
            rows[0].get_i64("version")
        })
        .unwrap()
    }

    #[test]
    fn failing_step_stops_the_run_at_the_last_good_version() {
        let (_dir, manager) = open();
        let sqlite = Dialect::new(DialectKind::Sqlite);
        let steps = [
            step(1, "CREATE TABLE A (x INT)"),
            step(2, "CREATE TABLE B (x INT"),
            step(3, "CREATE TABLE C (x INT)"),
        ];

        let err = apply(&manager, &sqlite, &steps).unwrap_err();
        assert!(matches!(err, DatabaseError::Migration(ref m) if m.starts_with("step 2")));
        assert_eq!(version(&manager), 1);

        let fixed = [
            step(1, "CREATE TABLE A (x INT)"),
            step(2, "CREATE TABLE B (x INT)"),
            step(3, "CREATE TABLE C (x INT)"),
        ];
        apply(&manager, &sqlite, &fixed).unwrap();
        assert_eq!(version(&manager), 3);
    }

    #[test]
    fn existing_version_table_is_tolerated() {
        let (_dir, manager) = open();
        let plain = Dialect {
            create_version_table: "CREATE TABLE TXNO_VERSION (version INT)",
            version_table_exists_error: Some("already exists"),
            ..Dialect::new(DialectKind::Sqlite)
        };
        create_version_table(&manager, &plain).unwrap();
        create_version_table(&manager, &plain).unwrap();

        let strict = Dialect {
            version_table_exists_error: None,
            ..plain
        };
        assert!(create_version_table(&manager, &strict).is_err());
    }

    #[test]
    fn concurrent_migrators_apply_each_step_once() {
        let (_dir, manager) = open();
        let manager = std::sync::Arc::new(manager);
        let sqlite = Dialect::new(DialectKind::Sqlite);

        let runs: Vec<_> = (0..3)
            .map(|_| {
                let manager = manager.clone();
                let sqlite = sqlite.clone();
                std::thread::spawn(move || {
                    migrate(manager.as_ref(), &sqlite, "TXNO_OUTBOX")
                })
            })
            .collect();
        for run in runs {
            run.join().unwrap().unwrap();
        }
        assert_eq!(version(&manager), 13);
    }

    #[test]
    fn schema_script_lists_steps_in_order() {
        let mut out = Vec::new();
        write_schema(&Dialect::new(DialectKind::Sqlite), "TXNO_OUTBOX", &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();
        let first = script.find("-- 1: Create outbox table").unwrap();
        let last = script.find("-- 13: Add orderedTakeLast").unwrap();
        assert!(first < last);
        assert!(!script.contains("-- 5:"));
    }
}
