//! Secondary indexes. Every kind stores `(key, Rid)` entries in its own
//! page file and is reached through the [`IndexStore`] trait.

pub mod balanced_tree;
pub mod directory_hash;
pub mod file;
pub mod header;
pub mod ordered_tree;
pub mod rid_list;
pub mod spatial_tree;
pub mod staged_tree;

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    config::StorageConfig,
    types::{
        error::{DatabaseError, Result},
        rid::Rid,
        value::{DataType, Value},
    },
};

pub use balanced_tree::BalancedTreeIndex;
pub use directory_hash::DirectoryHashIndex;
pub use ordered_tree::OrderedTreeIndex;
pub use spatial_tree::SpatialTreeIndex;
pub use staged_tree::StagedTreeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// B+ tree
    Ordered,
    /// Static ISAM tree with overflow chains
    Staged,
    /// AVL tree
    Balanced,
    /// Extensible hashing
    Hash,
    /// 2-D R-tree
    Spatial,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Ordered,
        IndexKind::Staged,
        IndexKind::Balanced,
        IndexKind::Hash,
        IndexKind::Spatial,
    ];

    pub fn as_u8(&self) -> u8 {
        match self {
            IndexKind::Ordered => 1,
            IndexKind::Staged => 2,
            IndexKind::Balanced => 3,
            IndexKind::Hash => 4,
            IndexKind::Spatial => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(IndexKind::Ordered),
            2 => Ok(IndexKind::Staged),
            3 => Ok(IndexKind::Balanced),
            4 => Ok(IndexKind::Hash),
            5 => Ok(IndexKind::Spatial),
            _ => Err(DatabaseError::corrupt(format!("Unknown index kind {}", tag))),
        }
    }

    /// Suffix used in index file names.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            IndexKind::Ordered => "ordered",
            IndexKind::Staged => "staged",
            IndexKind::Balanced => "balanced",
            IndexKind::Hash => "hash",
            IndexKind::Spatial => "spatial",
        }
    }

    /// Spatial indexes take points and nothing else takes points.
    pub fn supports(&self, data_type: &DataType) -> bool {
        match self {
            IndexKind::Spatial => data_type.is_spatial(),
            _ => !data_type.is_spatial(),
        }
    }

    /// Preference when a point lookup can use several indexes.
    pub fn point_lookup_rank(&self) -> u8 {
        match self {
            IndexKind::Hash => 0,
            IndexKind::Ordered => 1,
            IndexKind::Balanced => 2,
            IndexKind::Staged => 3,
            IndexKind::Spatial => 4,
        }
    }

    pub fn supports_range(&self) -> bool {
        !matches!(self, IndexKind::Hash)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Ordered => "ordered tree",
            IndexKind::Staged => "staged tree",
            IndexKind::Balanced => "balanced tree",
            IndexKind::Hash => "directory hash",
            IndexKind::Spatial => "spatial tree",
        };
        write!(f, "{}", name)
    }
}

/// Structural summary of one index. Fields that do not apply to a kind are 0.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub kind: IndexKind,
    pub entries: u64,
    pub pages: u32,
    pub free_pages: u32,
    /// Tree height, or staged-tree levels including the leaf level.
    pub height: u32,
    pub splits: u64,
    pub rotations: u64,
    pub global_depth: u32,
    pub buckets: u32,
    pub overflow_pages: u32,
    pub tombstones: u64,
}

impl IndexStats {
    pub fn new(kind: IndexKind) -> Self {
        Self {
            kind,
            entries: 0,
            pages: 0,
            free_pages: 0,
            height: 0,
            splits: 0,
            rotations: 0,
            global_depth: 0,
            buckets: 0,
            overflow_pages: 0,
            tombstones: 0,
        }
    }
}

pub trait IndexStore {
    fn kind(&self) -> IndexKind;

    fn key_type(&self) -> &DataType;

    fn is_unique(&self) -> bool;

    /// Adds `(key, rid)`. Unique indexes fail with `DuplicateKey` when the
    /// key is already present.
    fn insert(&mut self, key: &Value, rid: Rid) -> Result<()>;

    /// All locators stored under `key`, in insertion order. Empty if absent.
    fn search(&mut self, key: &Value) -> Result<Vec<Rid>>;

    /// Locators of keys in `[low, high]`. Empty when `low > high`.
    fn range(&mut self, low: &Value, high: &Value) -> Result<Vec<Rid>>;

    /// Removes every entry for `key`, returning how many locators went away.
    fn remove(&mut self, key: &Value) -> Result<usize>;

    /// Removes the single entry `(key, rid)`.
    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&mut self) -> Result<IndexStats>;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn as_spatial_mut(&mut self) -> Option<&mut SpatialTreeIndex> {
        None
    }
}

/// Creates an empty index of `kind` at `path`, replacing any file there.
pub fn create_index(
    kind: IndexKind,
    path: &Path,
    key_type: DataType,
    unique: bool,
    config: &StorageConfig,
) -> Result<Box<dyn IndexStore>> {
    if !kind.supports(&key_type) {
        return Err(DatabaseError::TypeMismatch {
            expected: format!("a key type supported by the {} index", kind),
            actual: key_type.to_string(),
        });
    }
    let index: Box<dyn IndexStore> = match kind {
        IndexKind::Ordered => Box::new(OrderedTreeIndex::create(path, key_type, unique, config)?),
        IndexKind::Staged => Box::new(StagedTreeIndex::create(path, key_type, unique, config)?),
        IndexKind::Balanced => Box::new(BalancedTreeIndex::create(path, key_type, unique, config)?),
        IndexKind::Hash => Box::new(DirectoryHashIndex::create(path, key_type, unique, config)?),
        IndexKind::Spatial => Box::new(SpatialTreeIndex::create(path, unique, config)?),
    };
    Ok(index)
}

/// Opens an existing index file, checking that it holds an index of `kind`.
pub fn open_index(kind: IndexKind, path: &Path, config: &StorageConfig) -> Result<Box<dyn IndexStore>> {
    let index: Box<dyn IndexStore> = match kind {
        IndexKind::Ordered => Box::new(OrderedTreeIndex::open(path, config)?),
        IndexKind::Staged => Box::new(StagedTreeIndex::open(path, config)?),
        IndexKind::Balanced => Box::new(BalancedTreeIndex::open(path, config)?),
        IndexKind::Hash => Box::new(DirectoryHashIndex::open(path, config)?),
        IndexKind::Spatial => Box::new(SpatialTreeIndex::open(path, config)?),
    };
    Ok(index)
}

/// Builds an index of `kind` over `entries` in one go.
pub fn build_index(
    kind: IndexKind,
    path: &Path,
    key_type: DataType,
    unique: bool,
    config: &StorageConfig,
    entries: Vec<(Value, Rid)>,
) -> Result<Box<dyn IndexStore>> {
    if kind == IndexKind::Staged {
        if !kind.supports(&key_type) {
            return Err(DatabaseError::TypeMismatch {
                expected: format!("a key type supported by the {} index", kind),
                actual: key_type.to_string(),
            });
        }
        return Ok(Box::new(StagedTreeIndex::build(
            path, key_type, unique, config, entries,
        )?));
    }
    let mut index = create_index(kind, path, key_type, unique, config)?;
    for (key, rid) in entries {
        index.insert(&key, rid)?;
    }
    Ok(index)
}

/// Shared key check for every kind: no NULLs, right type.
pub(crate) fn check_key(key_type: &DataType, key: &Value) -> Result<()> {
    if key.is_null() {
        return Err(DatabaseError::TypeMismatch {
            expected: key_type.to_string(),
            actual: key.type_name(),
        });
    }
    key_type.check_key(key)
}

pub(crate) fn duplicate_key(key: &Value) -> DatabaseError {
    DatabaseError::DuplicateKey {
        key: key.to_string(),
    }
}
