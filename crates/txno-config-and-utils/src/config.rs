//! Configuration management.
//!
//! Settings come from `config.json` under the base directory, then a few
//! environment variables override them.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default database dialect.
pub const DEFAULT_DIALECT: &str = "SQLITE";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// SQLite database file. Defaults to `outbox.sqlite` in the base directory.
    pub database_path: Option<PathBuf>,
    /// Dialect name, e.g. `SQLITE` or `POSTGRESQL_9`.
    pub dialect: String,
    pub outbox: OutboxSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            dialect: DEFAULT_DIALECT.to_string(),
            outbox: OutboxSettings::default(),
        }
    }
}

/// Outbox tuning as stored on disk. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub attempt_frequency_secs: u64,
    pub block_after_attempts: i32,
    pub flush_batch_size: usize,
    pub retention_secs: u64,
    pub write_lock_timeout_secs: u64,
    pub table_name: String,
    pub migrate: bool,
    pub flush_interval_secs: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            attempt_frequency_secs: 120,
            block_after_attempts: 5,
            flush_batch_size: 4096,
            retention_secs: 7 * 24 * 60 * 60,
            write_lock_timeout_secs: 2,
            table_name: "TXNO_OUTBOX".to_string(),
            migrate: true,
            flush_interval_secs: 10,
        }
    }
}

impl OutboxSettings {
    pub fn attempt_frequency(&self) -> Duration {
        Duration::from_secs(self.attempt_frequency_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn write_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.write_lock_timeout_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// The database file, resolved against `paths` when not configured.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Reject settings the outbox cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.dialect.trim().is_empty() {
            return Err(CoreError::Config("dialect is required".into()));
        }
        if self.outbox.attempt_frequency_secs == 0 {
            return Err(CoreError::Config(
                "outbox.attempt_frequency_secs must be positive".into(),
            ));
        }
        if self.outbox.block_after_attempts < 1 {
            return Err(CoreError::Config(
                "outbox.block_after_attempts must be at least 1".into(),
            ));
        }
        if self.outbox.flush_batch_size == 0 {
            return Err(CoreError::Config(
                "outbox.flush_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(log_level) = non_empty("TXNO_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(path) = non_empty("TXNO_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(dialect) = non_empty("TXNO_DIALECT") {
            self.dialect = dialect;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.dialect, DEFAULT_DIALECT);
        assert!(config.database_path.is_none());
        assert_eq!(config.outbox.attempt_frequency(), Duration::from_secs(120));
        assert_eq!(config.outbox.block_after_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{
                "log_level": "debug",
                "outbox": { "block_after_attempts": 9 }
            }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.outbox.block_after_attempts, 9);
        assert_eq!(config.outbox.flush_batch_size, 4096);
        assert_eq!(config.dialect, DEFAULT_DIALECT);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.dialect = "POSTGRESQL_9".to_string();
        config.outbox.table_name = "EVENTS_OUTBOX".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.dialect, "POSTGRESQL_9");
        assert_eq!(loaded.outbox, config.outbox);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.outbox, OutboxSettings::default());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from_file(&config_path),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TXNO_LOG_LEVEL", "warn"),
            ("TXNO_DATABASE_PATH", "/var/lib/txno/outbox.db"),
            ("TXNO_DIALECT", " "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/txno/outbox.db"))
        );
        // Blank values are ignored.
        assert_eq!(config.dialect, DEFAULT_DIALECT);
    }

    #[test]
    fn test_database_file_defaults_to_paths() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/txno"));
        let mut config = Config::default();
        assert_eq!(config.database_file(&paths), paths.database_file());

        config.database_path = Some(PathBuf::from("/data/o.db"));
        assert_eq!(config.database_file(&paths), PathBuf::from("/data/o.db"));
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = Config::default();
        config.outbox.block_after_attempts = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }
}
