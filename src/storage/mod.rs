pub mod heap_file;
pub mod page_store;
pub mod record_codec;
pub mod schema;

pub use heap_file::{HeapFile, HeapStats};
pub use page_store::PageStore;
pub use record_codec::{Record, RecordCodec};
