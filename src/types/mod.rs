pub mod error;
pub mod rid;
pub mod row;
pub mod value;

// Common type aliases
pub type PageId = u32;
pub type SlotId = u32;

/// Sentinel stored on disk where a page pointer is absent.
pub const NO_PAGE: PageId = u32::MAX;

// Page size limits
pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const MIN_PAGE_SIZE: usize = 64;
pub const MAX_PAGE_SIZE: usize = 65536;

pub const LENGTH_PREFIX_SIZE: usize = 4; // u32 little-endian frame length
pub const RID_SIZE: usize = 8; // page(4) + slot(4)
