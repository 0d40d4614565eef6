//! Command implementations.

use std::io::Write;
use std::sync::Arc;

use tracing::info;
use txno_config_and_utils::{Config, OutboxSettings, Paths};
use txno_core::{Clock, SystemClock};
use txno_database::{
    in_transaction, DatabaseResult, Dialect, DialectKind, Persistor, PoolConfig,
    SqliteTransactionManager, VERSION_TABLE,
};
use txno_outbox::OutboxConfig;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Map on-disk settings to the outbox's runtime configuration.
pub fn outbox_config(settings: &OutboxSettings) -> OutboxConfig {
    OutboxConfig {
        attempt_frequency: settings.attempt_frequency(),
        block_after_attempts: settings.block_after_attempts,
        flush_batch_size: settings.flush_batch_size,
        retention_threshold: settings.retention(),
        write_lock_timeout: settings.write_lock_timeout(),
        table_name: settings.table_name.clone(),
        migrate: settings.migrate,
        flush_interval: settings.flush_interval(),
    }
}

fn dialect(config: &Config, requested: Option<&str>) -> AppResult<Dialect> {
    let name = requested.unwrap_or(&config.dialect);
    let kind: DialectKind = name.parse()?;
    Ok(Dialect::new(kind))
}

/// Open the configured database. Only SQLite files can be opened directly.
fn open(config: &Config, paths: &Paths) -> AppResult<(Arc<SqliteTransactionManager>, Dialect)> {
    let dialect = dialect(config, None)?;
    if dialect.kind != DialectKind::Sqlite {
        return Err(format!(
            "dialect {} cannot be opened by this tool; use `txno schema` to get its DDL",
            dialect.kind
        )
        .into());
    }
    let path = config.database_file(paths);
    let manager = SqliteTransactionManager::open(&path, PoolConfig::default())?;
    Ok((Arc::new(manager), dialect))
}

fn persistor(config: &Config, dialect: Dialect) -> AppResult<Persistor> {
    Ok(Persistor::new(
        dialect,
        config.outbox.table_name.clone(),
        config.outbox.write_lock_timeout(),
    )?)
}

pub fn migrate(config: &Config, paths: &Paths) -> AppResult<()> {
    let (manager, dialect) = open(config, paths)?;
    let persistor = persistor(config, dialect)?;
    persistor.migrate(manager.as_ref())?;

    let version = schema_version(&manager)?;
    info!(path = %manager.path(), version, "Migration complete");
    println!("Schema at version {} in {}", version, manager.path());
    Ok(())
}

pub fn print_schema(config: &Config, requested: Option<&str>, out: &mut dyn Write) -> AppResult<()> {
    let persistor = persistor(config, dialect(config, requested)?)?;
    persistor.write_schema(out)?;
    Ok(())
}

/// Reset a blocked entry so the next flush of a running outbox retries it.
pub fn unblock(config: &Config, paths: &Paths, id: &str) -> AppResult<bool> {
    let (manager, dialect) = open(config, paths)?;
    let persistor = persistor(config, dialect)?;
    let found = in_transaction(manager.as_ref(), |tx| {
        persistor.unblock(tx, id, SystemClock.now())
    })?;

    if found {
        info!(entry_id = %id, "Unblocked");
        println!("Unblocked {}", id);
    } else {
        println!("No blocked entry with id {}", id);
    }
    Ok(found)
}

pub fn status(config: &Config, paths: &Paths) -> AppResult<()> {
    let (manager, _) = open(config, paths)?;
    manager.health_check()?;

    let version = schema_version(&manager)?;
    let pool = manager.state();
    println!("Database:       {}", manager.path());
    println!("Dialect:        {}", config.dialect);
    println!("Table:          {}", config.outbox.table_name);
    println!("Schema version: {}", version);
    println!(
        "Connections:    {} ({} idle)",
        pool.connections, pool.idle_connections
    );
    Ok(())
}

/// Current schema version, or 0 before the first migration.
fn schema_version(manager: &SqliteTransactionManager) -> DatabaseResult<i64> {
    in_transaction(manager, |tx| {
        let exists = tx.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[VERSION_TABLE.into()],
        )?;
        if exists.is_empty() {
            return Ok(0);
        }
        let rows = tx.query(&format!("SELECT version FROM {}", VERSION_TABLE), &[])?;
        match rows.first() {
            Some(row) => row.get_i64("version"),
            None => Ok(0),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use txno_core::{Entry, Invocation};

    fn config_in(dir: &tempfile::TempDir) -> (Config, Paths) {
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        (Config::default(), paths)
    }

    #[test]
    fn test_outbox_config_mapping() {
        let settings = OutboxSettings {
            attempt_frequency_secs: 30,
            block_after_attempts: 2,
            table_name: "JOBS".into(),
            ..Default::default()
        };
        let config = outbox_config(&settings);
        assert_eq!(config.attempt_frequency, Duration::from_secs(30));
        assert_eq!(config.block_after_attempts, 2);
        assert_eq!(config.table_name, "JOBS");
        assert_eq!(config.retention_threshold, settings.retention());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_migrate_then_version() {
        let dir = tempdir().unwrap();
        let (config, paths) = config_in(&dir);

        migrate(&config, &paths).unwrap();
        migrate(&config, &paths).unwrap();

        let (manager, _) = open(&config, &paths).unwrap();
        assert_eq!(schema_version(&manager).unwrap(), 13);
        assert!(status(&config, &paths).is_ok());
    }

    #[test]
    fn test_version_is_zero_before_migration() {
        let dir = tempdir().unwrap();
        let (config, paths) = config_in(&dir);
        let (manager, _) = open(&config, &paths).unwrap();
        assert_eq!(schema_version(&manager).unwrap(), 0);
    }

    #[test]
    fn test_schema_for_other_dialect() {
        let dir = tempdir().unwrap();
        let (config, _) = config_in(&dir);
        let mut out = Vec::new();

        print_schema(&config, Some("POSTGRESQL_9"), &mut out).unwrap();

        let ddl = String::from_utf8(out).unwrap();
        assert!(ddl.starts_with("-- 1: "));
        assert!(ddl.contains("CREATE TABLE TXNO_OUTBOX"));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let dir = tempdir().unwrap();
        let (config, _) = config_in(&dir);
        let mut out = Vec::new();
        assert!(print_schema(&config, Some("DB2"), &mut out).is_err());
    }

    #[test]
    fn test_server_dialect_cannot_be_opened() {
        let dir = tempdir().unwrap();
        let (mut config, paths) = config_in(&dir);
        config.dialect = "MY_SQL_8".into();
        assert!(migrate(&config, &paths).is_err());
    }

    #[test]
    fn test_unblock_missing_entry() {
        let dir = tempdir().unwrap();
        let (config, paths) = config_in(&dir);
        migrate(&config, &paths).unwrap();

        assert!(!unblock(&config, &paths, "nope").unwrap());
    }

    #[test]
    fn test_unblock_blocked_entry() {
        let dir = tempdir().unwrap();
        let (config, paths) = config_in(&dir);
        migrate(&config, &paths).unwrap();

        let (manager, dialect) = open(&config, &paths).unwrap();
        let persistor = persistor(&config, dialect).unwrap();
        let mut entry = Entry::new("stuck-1", Invocation::new("mailer", "send"), SystemClock.now());
        entry.blocked = true;
        entry.attempts = 5;
        in_transaction(manager.as_ref(), |tx| persistor.save(tx, &mut entry)).unwrap();

        assert!(unblock(&config, &paths, "stuck-1").unwrap());

        let stored = in_transaction(manager.as_ref(), |tx| persistor.select_by_id(tx, "stuck-1"))
            .unwrap()
            .unwrap();
        assert!(!stored.blocked);
        assert_eq!(stored.attempts, 0);
        assert!(!unblock(&config, &paths, "stuck-1").unwrap());
    }
}
