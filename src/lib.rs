//! Paged storage engine: a fixed-size page file manager, an append-only heap
//! for table rows, and five pluggable secondary indexes behind one
//! `IndexStore` contract.

pub mod config;
pub mod database;
pub mod index;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::{DefaultIndexPolicy, StorageConfig};
pub use database::{Database, Table};
pub use index::{IndexKind, IndexStats, IndexStore};
pub use types::{
    error::{DatabaseError, Result},
    rid::Rid,
    row::Row,
    value::{DataType, Point, Value},
};
