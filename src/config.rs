//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::types::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
    error::{DatabaseError, Result},
};

/// What `TableSchema::suggest_indexes` does for columns that look like
/// natural index candidates (primary key, unique, INTEGER, REAL, DATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultIndexPolicy {
    /// Never add indexes implicitly.
    Off,
    /// Add an ordered tree only to candidate columns with no declared index.
    FillMissing,
    /// Add an ordered tree to every candidate column, even one that already
    /// declares a different index kind.
    Always,
}

/// Storage configuration shared by a database and its tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Page size in bytes for new heap and index files (default: 4096).
    pub page_size: usize,

    /// Pages kept in each store's write-through cache (default: 64, 0 disables).
    pub page_cache_pages: usize,

    /// Maximum children per ordered-tree node, capped by what fits a page (default: 64).
    pub ordered_tree_order: usize,

    /// Global depth of a freshly created hash directory (default: 2).
    pub hash_initial_global_depth: u32,

    /// Directory stops doubling at this depth; full buckets then chain overflow pages (default: 16).
    pub hash_max_global_depth: u32,

    /// Maximum entries per spatial tree node, capped by what fits a page (default: 32).
    pub spatial_max_entries: usize,

    /// Implicit index policy applied when a table is created (default: FillMissing).
    pub default_index_policy: DefaultIndexPolicy,

    /// Compact a table automatically after a delete pushes its tombstone
    /// ratio past `compaction_threshold` (default: false).
    pub auto_compact: bool,

    /// Tombstone fraction of all stored heap records that triggers compaction (default: 0.5).
    pub compaction_threshold: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_cache_pages: 64,
            ordered_tree_order: 64,
            hash_initial_global_depth: 2,
            hash_max_global_depth: 16,
            spatial_max_entries: 32,
            default_index_policy: DefaultIndexPolicy::FillMissing,
            auto_compact: false,
            compaction_threshold: 0.5,
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set page size for new files
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set page cache capacity
    pub fn page_cache_pages(mut self, pages: usize) -> Self {
        self.page_cache_pages = pages;
        self
    }

    /// Set ordered tree order
    pub fn ordered_tree_order(mut self, order: usize) -> Self {
        self.ordered_tree_order = order;
        self
    }

    /// Set initial hash directory depth
    pub fn hash_initial_global_depth(mut self, depth: u32) -> Self {
        self.hash_initial_global_depth = depth;
        self
    }

    /// Set maximum hash directory depth
    pub fn hash_max_global_depth(mut self, depth: u32) -> Self {
        self.hash_max_global_depth = depth;
        self
    }

    /// Set spatial node fan-out
    pub fn spatial_max_entries(mut self, entries: usize) -> Self {
        self.spatial_max_entries = entries;
        self
    }

    /// Set implicit index policy
    pub fn default_index_policy(mut self, policy: DefaultIndexPolicy) -> Self {
        self.default_index_policy = policy;
        self
    }

    /// Enable automatic compaction
    pub fn auto_compact(mut self, enabled: bool) -> Self {
        self.auto_compact = enabled;
        self
    }

    /// Set compaction threshold
    pub fn compaction_threshold(mut self, threshold: f64) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "page_size {} outside [{}, {}]",
                    self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
                ),
            });
        }
        if self.ordered_tree_order < 3 {
            return Err(DatabaseError::InvalidConfig {
                details: format!("ordered_tree_order must be >= 3, got {}", self.ordered_tree_order),
            });
        }
        if self.spatial_max_entries < 2 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "spatial_max_entries must be >= 2, got {}",
                    self.spatial_max_entries
                ),
            });
        }
        if self.hash_initial_global_depth > self.hash_max_global_depth
            || self.hash_max_global_depth > 24
        {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "hash depths must satisfy initial <= max <= 24, got {} / {}",
                    self.hash_initial_global_depth, self.hash_max_global_depth
                ),
            });
        }
        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "compaction_threshold must be in (0, 1], got {}",
                    self.compaction_threshold
                ),
            });
        }
        Ok(())
    }
}
