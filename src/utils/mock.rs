use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{
    config::StorageConfig,
    database::catalog::Database,
    types::error::Result,
};

/// Scratch directory for tests and benchmarks, removed on drop.
pub struct TempDatabase {
    dir: TempDir,
}

impl TempDatabase {
    pub fn new() -> Result<Self> {
        Self::with_prefix("lumbung_test")
    }

    pub fn with_prefix(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn open_database(&self, config: StorageConfig) -> Result<Database> {
        Database::open(self.dir.path().join("db"), config)
    }
}
