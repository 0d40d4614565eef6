//! SQL dialects.
//!
//! A dialect is data: a set of statement templates plus a few capability
//! flags. Templates may contain these placeholders, substituted by the
//! persistor:
//! - `{{table}}` outbox table name
//! - `{{allFields}}` the full column list
//! - `{{batchSize}}` the row limit of the call
//! - `{{true}}` / `{{false}}` the engine's boolean literals

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectKind {
    #[serde(rename = "MY_SQL_5")]
    MySql5,
    #[serde(rename = "MY_SQL_8")]
    MySql8,
    #[serde(rename = "POSTGRESQL_9")]
    Postgresql9,
    /// PostgreSQL with a native sequence generating topic order.
    #[serde(rename = "POSTGRESQL_SEQ")]
    PostgresqlSeq,
    #[serde(rename = "ORACLE")]
    Oracle,
    #[serde(rename = "MS_SQL_SERVER")]
    MsSqlServer,
    #[serde(rename = "SQLITE")]
    Sqlite,
}

impl DialectKind {
    pub const ALL: [DialectKind; 7] = [
        DialectKind::MySql5,
        DialectKind::MySql8,
        DialectKind::Postgresql9,
        DialectKind::PostgresqlSeq,
        DialectKind::Oracle,
        DialectKind::MsSqlServer,
        DialectKind::Sqlite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::MySql5 => "MY_SQL_5",
            DialectKind::MySql8 => "MY_SQL_8",
            DialectKind::Postgresql9 => "POSTGRESQL_9",
            DialectKind::PostgresqlSeq => "POSTGRESQL_SEQ",
            DialectKind::Oracle => "ORACLE",
            DialectKind::MsSqlServer => "MS_SQL_SERVER",
            DialectKind::Sqlite => "SQLITE",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        DialectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "").to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("Unknown dialect: {}", s))
    }
}

/// How a dialect avoids blocking on rows another worker has claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    /// `FOR UPDATE SKIP LOCKED`.
    SkipLocked,
    /// SQL Server `READPAST` hint.
    ReadPast,
    /// Plain `FOR UPDATE` bounded by a statement timeout.
    BlockingWithTimeout,
    /// Database-wide write lock bounded by the busy timeout.
    WriteLockWithTimeout,
}

/// Where per-topic sequence numbers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceSource {
    /// Read-modify-write on the `TXNO_SEQUENCE` table under a row lock.
    Table,
    /// A native sequence; the SQL returns the next value in its first column.
    Native(&'static str),
}

/// Statement templates and capabilities for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    pub kind: DialectKind,
    pub lock_strategy: LockStrategy,
    /// Unordered, due, unblocked, unprocessed entries.
    pub select_batch: &'static str,
    /// Re-read `id, invocation` for one id at one version, claiming the row.
    pub lock: &'static str,
    pub delete: &'static str,
    pub update: &'static str,
    pub unblock: &'static str,
    /// Processed entries past their retention.
    pub delete_expired: &'static str,
    /// The head of every topic, when unblocked and due.
    pub fetch_next_in_all_topics: &'static str,
    /// Superseded ordered-take-last entries.
    pub delete_outdated_in_all_topics: &'static str,
    pub sequence: SequenceSource,
    pub check: &'static str,
    pub create_version_table: &'static str,
    /// Error text that means the version table already exists.
    pub version_table_exists_error: Option<&'static str>,
    /// Read the schema version, locking the row against concurrent migrators.
    pub fetch_current_version: &'static str,
    pub true_literal: &'static str,
    pub false_literal: &'static str,
    /// Replacement SQL per migration step. `None` disables the step.
    pub migration_overrides: &'static [(u32, Option<&'static str>)],
}

const SELECT_BATCH: &str = "SELECT {{allFields}} FROM {{table}} \
    WHERE nextAttemptTime < ? AND topic = '*' AND blocked = {{false}} AND processed = {{false}} \
    LIMIT {{batchSize}}";

const SELECT_BATCH_SKIP_LOCKED: &str = "SELECT {{allFields}} FROM {{table}} \
    WHERE nextAttemptTime < ? AND topic = '*' AND blocked = {{false}} AND processed = {{false}} \
    LIMIT {{batchSize}} FOR UPDATE SKIP LOCKED";

const LOCK: &str = "SELECT id, invocation FROM {{table}} WHERE id = ? AND version = ? FOR UPDATE";

const LOCK_SKIP_LOCKED: &str =
    "SELECT id, invocation FROM {{table}} WHERE id = ? AND version = ? FOR UPDATE SKIP LOCKED";

const DELETE: &str = "DELETE FROM {{table}} WHERE id = ? AND version = ?";

const UPDATE: &str = "UPDATE {{table}} SET lastAttemptTime = ?, nextAttemptTime = ?, \
    attempts = ?, blocked = ?, processed = ?, version = ? WHERE id = ? AND version = ?";

const UNBLOCK: &str = "UPDATE {{table}} SET attempts = 0, blocked = {{false}}, nextAttemptTime = ? \
    WHERE blocked = {{true}} AND processed = {{false}} AND id = ?";

const DELETE_EXPIRED_LIMIT: &str = "DELETE FROM {{table}} \
    WHERE nextAttemptTime < ? AND processed = {{true}} AND blocked = {{false}} \
    LIMIT {{batchSize}}";

const DELETE_EXPIRED_SUBQUERY: &str = "DELETE FROM {{table}} WHERE id IN (\
    SELECT id FROM {{table}} \
    WHERE nextAttemptTime < ? AND processed = {{true}} AND blocked = {{false}} \
    LIMIT {{batchSize}})";

const FETCH_NEXT_CORRELATED: &str = "SELECT {{allFields}} FROM {{table}} a \
    WHERE a.topic <> '*' AND a.processed = {{false}} AND a.blocked = {{false}} \
    AND a.nextAttemptTime < ? \
    AND a.seq = (SELECT MIN(b.seq) FROM {{table}} b \
    WHERE b.topic = a.topic AND b.processed = {{false}}) \
    LIMIT {{batchSize}}";

const FETCH_NEXT_WINDOW: &str = "WITH raw AS (\
    SELECT {{allFields}}, ROW_NUMBER() OVER (PARTITION BY topic ORDER BY seq) AS rn \
    FROM {{table}} WHERE processed = {{false}} AND topic <> '*') \
    SELECT * FROM raw WHERE rn = 1 AND blocked = {{false}} AND nextAttemptTime < ? \
    LIMIT {{batchSize}}";

const DELETE_OUTDATED_WINDOW: &str = "DELETE FROM {{table}} WHERE id IN (\
    SELECT id FROM (\
    SELECT id, ROW_NUMBER() OVER (PARTITION BY topic ORDER BY seq DESC) AS rn \
    FROM {{table}} \
    WHERE orderedTakeLast = {{true}} AND processed = {{false}} AND topic <> '*') ranked \
    WHERE rn > 1)";

const DELETE_OUTDATED_SELF_JOIN: &str = "DELETE a FROM {{table}} a JOIN {{table}} b \
    ON b.topic = a.topic AND b.seq > a.seq \
    AND b.orderedTakeLast = {{true}} AND b.processed = {{false}} \
    WHERE a.orderedTakeLast = {{true}} AND a.processed = {{false}} AND a.topic <> '*'";

const CREATE_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS TXNO_VERSION (version INT)";

const FETCH_VERSION_FOR_UPDATE: &str = "SELECT version FROM TXNO_VERSION FOR UPDATE";

const POSTGRES_MIGRATIONS: &[(u32, Option<&str>)] = &[
    (
        1,
        Some(
            "CREATE TABLE {{table}} (\n    id VARCHAR(36) PRIMARY KEY,\n    invocation TEXT,\n    \
             nextAttemptTime TIMESTAMP(6),\n    attempts INT,\n    blacklisted BOOLEAN,\n    \
             version INT\n)",
        ),
    ),
    (
        5,
        Some("ALTER TABLE {{table}} ALTER COLUMN uniqueRequestId TYPE VARCHAR(250)"),
    ),
    (
        6,
        Some("ALTER TABLE {{table}} RENAME COLUMN blacklisted TO blocked"),
    ),
    (
        7,
        Some("ALTER TABLE {{table}} ADD COLUMN lastAttemptTime TIMESTAMP(6)"),
    ),
    (8, None),
];

const POSTGRES_SEQ_MIGRATIONS: &[(u32, Option<&str>)] = &[
    (
        1,
        Some(
            "CREATE TABLE {{table}} (\n    id VARCHAR(36) PRIMARY KEY,\n    invocation TEXT,\n    \
             nextAttemptTime TIMESTAMP(6),\n    attempts INT,\n    blacklisted BOOLEAN,\n    \
             version INT\n)",
        ),
    ),
    (
        5,
        Some("ALTER TABLE {{table}} ALTER COLUMN uniqueRequestId TYPE VARCHAR(250)"),
    ),
    (
        6,
        Some("ALTER TABLE {{table}} RENAME COLUMN blacklisted TO blocked"),
    ),
    (
        7,
        Some("ALTER TABLE {{table}} ADD COLUMN lastAttemptTime TIMESTAMP(6)"),
    ),
    (8, None),
    (10, Some("ALTER TABLE {{table}} ADD COLUMN seq BIGSERIAL NOT NULL")),
    (11, None),
];

const ORACLE_MIGRATIONS: &[(u32, Option<&str>)] = &[
    (
        1,
        Some(
            "CREATE TABLE {{table}} (\n    id VARCHAR2(36) PRIMARY KEY,\n    invocation CLOB,\n    \
             nextAttemptTime TIMESTAMP(6),\n    attempts NUMBER,\n    blacklisted NUMBER(1),\n    \
             version NUMBER\n)",
        ),
    ),
    (
        2,
        Some("ALTER TABLE {{table}} ADD uniqueRequestId VARCHAR2(100) NULL UNIQUE"),
    ),
    (3, Some("ALTER TABLE {{table}} ADD processed NUMBER(1)")),
    (
        5,
        Some("ALTER TABLE {{table}} MODIFY uniqueRequestId VARCHAR2(250)"),
    ),
    (
        6,
        Some("ALTER TABLE {{table}} RENAME COLUMN blacklisted TO blocked"),
    ),
    (
        7,
        Some("ALTER TABLE {{table}} ADD lastAttemptTime TIMESTAMP(6)"),
    ),
    (8, None),
    (
        9,
        Some("ALTER TABLE {{table}} ADD topic VARCHAR2(250) DEFAULT '*' NOT NULL"),
    ),
    (10, Some("ALTER TABLE {{table}} ADD seq NUMBER")),
    (
        11,
        Some(
            "CREATE TABLE TXNO_SEQUENCE (topic VARCHAR2(250) NOT NULL, seq NUMBER NOT NULL, \
             CONSTRAINT PK_TXNO_SEQUENCE PRIMARY KEY (topic, seq))",
        ),
    ),
    (
        13,
        Some("ALTER TABLE {{table}} ADD orderedTakeLast NUMBER(1) DEFAULT 0 NOT NULL"),
    ),
];

const MSSQL_MIGRATIONS: &[(u32, Option<&str>)] = &[
    (
        1,
        Some(
            "CREATE TABLE {{table}} (\n    id VARCHAR(36) PRIMARY KEY,\n    \
             invocation NVARCHAR(MAX),\n    nextAttemptTime DATETIME2(6),\n    attempts INT,\n    \
             blacklisted BIT,\n    version INT\n)",
        ),
    ),
    (
        2,
        Some("ALTER TABLE {{table}} ADD uniqueRequestId VARCHAR(250)"),
    ),
    (3, Some("ALTER TABLE {{table}} ADD processed BIT")),
    (5, None),
    (
        6,
        Some("EXEC sp_rename '{{table}}.blacklisted', 'blocked', 'COLUMN'"),
    ),
    (
        7,
        Some("ALTER TABLE {{table}} ADD lastAttemptTime DATETIME2(6)"),
    ),
    (
        8,
        Some(
            "CREATE UNIQUE INDEX UX_TXNO_OUTBOX_uniqueRequestId ON {{table}} (uniqueRequestId) \
             WHERE uniqueRequestId IS NOT NULL",
        ),
    ),
    (
        9,
        Some("ALTER TABLE {{table}} ADD topic VARCHAR(250) NOT NULL DEFAULT '*'"),
    ),
    (10, Some("ALTER TABLE {{table}} ADD seq INT")),
    (
        13,
        Some("ALTER TABLE {{table}} ADD orderedTakeLast BIT NOT NULL DEFAULT 0"),
    ),
];

const SQLITE_MIGRATIONS: &[(u32, Option<&str>)] = &[
    (
        2,
        Some("ALTER TABLE {{table}} ADD COLUMN uniqueRequestId VARCHAR(250) NULL"),
    ),
    (5, None),
    (
        6,
        Some("ALTER TABLE {{table}} RENAME COLUMN blacklisted TO blocked"),
    ),
    (
        7,
        Some("ALTER TABLE {{table}} ADD COLUMN lastAttemptTime TIMESTAMP(6) NULL"),
    ),
    (
        8,
        Some(
            "CREATE UNIQUE INDEX UX_TXNO_OUTBOX_uniqueRequestId ON {{table}} (uniqueRequestId)",
        ),
    ),
    (10, Some("ALTER TABLE {{table}} ADD COLUMN seq INTEGER NULL")),
    (
        13,
        Some("ALTER TABLE {{table}} ADD COLUMN orderedTakeLast BOOLEAN NOT NULL DEFAULT 0"),
    ),
];

impl Dialect {
    /// The dialect for `kind`.
    pub fn new(kind: DialectKind) -> Self {
        let base = Self::base(kind);
        match kind {
            DialectKind::MySql5 => base,
            DialectKind::MySql8 => Self {
                lock_strategy: LockStrategy::SkipLocked,
                select_batch: SELECT_BATCH_SKIP_LOCKED,
                lock: LOCK_SKIP_LOCKED,
                fetch_next_in_all_topics: FETCH_NEXT_WINDOW,
                delete_outdated_in_all_topics: DELETE_OUTDATED_WINDOW,
                ..base
            },
            DialectKind::Postgresql9 => Self {
                lock_strategy: LockStrategy::SkipLocked,
                select_batch: SELECT_BATCH_SKIP_LOCKED,
                lock: LOCK_SKIP_LOCKED,
                delete_expired: DELETE_EXPIRED_SUBQUERY,
                fetch_next_in_all_topics: FETCH_NEXT_WINDOW,
                delete_outdated_in_all_topics: DELETE_OUTDATED_WINDOW,
                migration_overrides: POSTGRES_MIGRATIONS,
                ..base
            },
            DialectKind::PostgresqlSeq => Self {
                lock_strategy: LockStrategy::SkipLocked,
                select_batch: "SELECT {{allFields}} FROM {{table}} \
                    WHERE nextAttemptTime < ? AND topic = '*' AND blocked = {{false}} \
                    AND processed = {{false}} ORDER BY seq LIMIT {{batchSize}} \
                    FOR UPDATE SKIP LOCKED",
                lock: LOCK_SKIP_LOCKED,
                delete_expired: DELETE_EXPIRED_SUBQUERY,
                fetch_next_in_all_topics: FETCH_NEXT_WINDOW,
                delete_outdated_in_all_topics: DELETE_OUTDATED_WINDOW,
                sequence: SequenceSource::Native(
                    "SELECT nextval(pg_get_serial_sequence('{{table}}', 'seq'))",
                ),
                migration_overrides: POSTGRES_SEQ_MIGRATIONS,
                ..base
            },
            DialectKind::Oracle => Self {
                lock_strategy: LockStrategy::SkipLocked,
                select_batch: "SELECT {{allFields}} FROM {{table}} \
                    WHERE nextAttemptTime < ? AND topic = '*' AND blocked = {{false}} \
                    AND processed = {{false}} AND ROWNUM <= {{batchSize}} \
                    FOR UPDATE SKIP LOCKED",
                lock: LOCK_SKIP_LOCKED,
                delete_expired: "DELETE FROM {{table}} \
                    WHERE nextAttemptTime < ? AND processed = {{true}} AND blocked = {{false}} \
                    AND ROWNUM <= {{batchSize}}",
                fetch_next_in_all_topics: "WITH raw AS (\
                    SELECT {{allFields}}, ROW_NUMBER() OVER (PARTITION BY topic ORDER BY seq) AS rn \
                    FROM {{table}} WHERE processed = {{false}} AND topic <> '*') \
                    SELECT * FROM raw WHERE rn = 1 AND blocked = {{false}} \
                    AND nextAttemptTime < ? AND ROWNUM <= {{batchSize}}",
                delete_outdated_in_all_topics: DELETE_OUTDATED_WINDOW,
                check: "SELECT 1 FROM DUAL",
                create_version_table: "CREATE TABLE TXNO_VERSION (version NUMBER)",
                version_table_exists_error: Some("ORA-00955"),
                true_literal: "1",
                false_literal: "0",
                migration_overrides: ORACLE_MIGRATIONS,
                ..base
            },
            DialectKind::MsSqlServer => Self {
                lock_strategy: LockStrategy::ReadPast,
                select_batch: "SELECT TOP ({{batchSize}}) {{allFields}} FROM {{table}} \
                    WITH (UPDLOCK, ROWLOCK, READPAST) \
                    WHERE nextAttemptTime < ? AND topic = '*' AND blocked = {{false}} \
                    AND processed = {{false}}",
                lock: "SELECT id, invocation FROM {{table}} WITH (UPDLOCK, ROWLOCK, READPAST) \
                    WHERE id = ? AND version = ?",
                delete_expired: "DELETE TOP ({{batchSize}}) FROM {{table}} \
                    WHERE nextAttemptTime < ? AND processed = {{true}} AND blocked = {{false}}",
                fetch_next_in_all_topics: "SELECT TOP ({{batchSize}}) {{allFields}} \
                    FROM {{table}} a \
                    WHERE a.topic <> '*' AND a.processed = {{false}} AND a.blocked = {{false}} \
                    AND a.nextAttemptTime < ? \
                    AND a.seq = (SELECT MIN(b.seq) FROM {{table}} b \
                    WHERE b.topic = a.topic AND b.processed = {{false}})",
                create_version_table: "IF NOT EXISTS (SELECT * FROM sys.tables \
                    WHERE name = 'TXNO_VERSION') CREATE TABLE TXNO_VERSION (version INT)",
                fetch_current_version: "SELECT version FROM TXNO_VERSION WITH (UPDLOCK, ROWLOCK)",
                true_literal: "1",
                false_literal: "0",
                migration_overrides: MSSQL_MIGRATIONS,
                ..base
            },
            DialectKind::Sqlite => Self {
                lock_strategy: LockStrategy::WriteLockWithTimeout,
                lock: "UPDATE {{table}} SET version = version WHERE id = ? AND version = ? \
                    RETURNING id, invocation",
                delete_expired: DELETE_EXPIRED_SUBQUERY,
                fetch_next_in_all_topics: FETCH_NEXT_WINDOW,
                delete_outdated_in_all_topics: DELETE_OUTDATED_WINDOW,
                fetch_current_version: "UPDATE TXNO_VERSION SET version = version RETURNING version",
                true_literal: "1",
                false_literal: "0",
                migration_overrides: SQLITE_MIGRATIONS,
                ..base
            },
        }
    }

    /// Templates shared by most engines; written for MySQL 5.
    fn base(kind: DialectKind) -> Self {
        Self {
            kind,
            lock_strategy: LockStrategy::BlockingWithTimeout,
            select_batch: SELECT_BATCH,
            lock: LOCK,
            delete: DELETE,
            update: UPDATE,
            unblock: UNBLOCK,
            delete_expired: DELETE_EXPIRED_LIMIT,
            fetch_next_in_all_topics: FETCH_NEXT_CORRELATED,
            delete_outdated_in_all_topics: DELETE_OUTDATED_SELF_JOIN,
            sequence: SequenceSource::Table,
            check: "SELECT 1",
            create_version_table: CREATE_VERSION_TABLE,
            version_table_exists_error: None,
            fetch_current_version: FETCH_VERSION_FOR_UPDATE,
            true_literal: "true",
            false_literal: "false",
            migration_overrides: &[],
        }
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            self.true_literal
        } else {
            self.false_literal
        }
    }

    /// The override for migration step `version`, if this dialect has one.
    ///
    /// `Some(None)` means the step is disabled.
    pub fn migration_override(&self, version: u32) -> Option<Option<&'static str>> {
        self.migration_overrides
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, sql)| *sql)
    }
}

impl From<DialectKind> for Dialect {
    fn from(kind: DialectKind) -> Self {
        Dialect::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_loosely() {
        assert_eq!("SQLITE".parse::<DialectKind>().unwrap(), DialectKind::Sqlite);
        assert_eq!("my_sql_8".parse::<DialectKind>().unwrap(), DialectKind::MySql8);
        assert_eq!(
            "postgresql-seq".parse::<DialectKind>().unwrap(),
            DialectKind::PostgresqlSeq
        );
        assert_eq!(
            "MsSqlServer".parse::<DialectKind>().unwrap(),
            DialectKind::MsSqlServer
        );
        assert!("h2".parse::<DialectKind>().is_err());
    }

    #[test]
    fn serde_uses_screaming_names() {
        let json = serde_json::to_string(&DialectKind::Postgresql9).unwrap();
        assert_eq!(json, "\"POSTGRESQL_9\"");
        let kind: DialectKind = serde_json::from_str("\"MY_SQL_5\"").unwrap();
        assert_eq!(kind, DialectKind::MySql5);
    }

    #[test]
    fn every_kind_builds_with_its_own_tag() {
        for kind in DialectKind::ALL {
            assert_eq!(Dialect::new(kind).kind, kind);
        }
    }

    #[test]
    fn skip_locked_where_supported() {
        assert!(Dialect::new(DialectKind::MySql8)
            .lock
            .contains("SKIP LOCKED"));
        assert!(Dialect::new(DialectKind::Postgresql9)
            .select_batch
            .contains("SKIP LOCKED"));
        assert!(!Dialect::new(DialectKind::MySql5)
            .lock
            .contains("SKIP LOCKED"));
        assert!(Dialect::new(DialectKind::MsSqlServer)
            .lock
            .contains("READPAST"));
    }

    #[test]
    fn multi_table_delete_only_where_the_engine_accepts_it() {
        for kind in DialectKind::ALL {
            let sql = Dialect::new(kind).delete_outdated_in_all_topics;
            let self_join = matches!(kind, DialectKind::MySql5 | DialectKind::MsSqlServer);
            assert_eq!(sql.starts_with("DELETE a FROM"), self_join, "{}: {}", kind, sql);
            if !self_join {
                assert!(sql.starts_with("DELETE FROM {{table}} WHERE id IN ("), "{}", kind);
                assert!(sql.contains("ROW_NUMBER() OVER"), "{}", kind);
            }
        }
    }

    #[test]
    fn oracle_limits_rows_with_rownum() {
        let oracle = Dialect::new(DialectKind::Oracle);
        for sql in [
            oracle.select_batch,
            oracle.delete_expired,
            oracle.fetch_next_in_all_topics,
        ] {
            assert!(sql.contains("ROWNUM <= {{batchSize}}"), "{}", sql);
            assert!(!sql.contains("LIMIT"), "{}", sql);
        }
    }

    #[test]
    fn only_postgres_seq_uses_a_native_sequence() {
        for kind in DialectKind::ALL {
            let native = matches!(Dialect::new(kind).sequence, SequenceSource::Native(_));
            assert_eq!(native, kind == DialectKind::PostgresqlSeq);
        }
    }

    #[test]
    fn boolean_literals() {
        assert_eq!(Dialect::new(DialectKind::Oracle).boolean_literal(true), "1");
        assert_eq!(
            Dialect::new(DialectKind::Postgresql9).boolean_literal(false),
            "false"
        );
    }

    #[test]
    fn migration_overrides_distinguish_disabled_from_absent() {
        let sqlite = Dialect::new(DialectKind::Sqlite);
        assert_eq!(sqlite.migration_override(5), Some(None));
        assert!(sqlite.migration_override(8).unwrap().is_some());
        assert_eq!(sqlite.migration_override(1), None);
    }
}
