//! Tables and the database catalog that owns them.

pub mod catalog;
pub mod table;

use std::{fs, path::Path};

use serde::{Serialize, de::DeserializeOwned};

use crate::types::error::{DatabaseError, Result};

pub use catalog::Database;
pub use table::Table;

/// Writes `value` with bincode's standard config, replacing `path` atomically.
pub(crate) fn save_encoded<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| DatabaseError::serialization(format!("{}: {}", path.display(), e)))?;
    let staging = path.with_extension("tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

pub(crate) fn load_encoded<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| DatabaseError::serialization(format!("{}: {}", path.display(), e)))?;
    Ok(value)
}
