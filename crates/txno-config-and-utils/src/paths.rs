//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".txno";
const DATABASE_FILE_NAME: &str = "outbox.sqlite";

/// Manages file system paths for txno.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.txno)
    base_dir: PathBuf,
}

impl Paths {
    /// Resolve paths under `~/.txno`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.txno/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the default database file path (~/.txno/outbox.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE_NAME)
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/txno-test"));
        assert_eq!(paths.base_dir(), &PathBuf::from("/tmp/txno-test"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/txno-test/config.json")
        );
        assert_eq!(
            paths.database_file(),
            PathBuf::from("/tmp/txno-test/outbox.sqlite")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_base() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nested").join("txno");
        let paths = Paths::with_base_dir(base.clone());

        paths.ensure_dirs().unwrap();
        assert!(base.is_dir());

        // Idempotent.
        paths.ensure_dirs().unwrap();
    }

    #[test]
    fn test_default_paths_live_under_home() {
        if let Ok(paths) = Paths::new() {
            assert!(paths.base_dir().ends_with(".txno"));
        }
    }
}
