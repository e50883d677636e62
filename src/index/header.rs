use std::{fs::File, io::Read, path::Path};

use crate::{
    index::IndexKind,
    types::{
        NO_PAGE, PageId,
        error::{DatabaseError, Result},
        value::DataType,
    },
    utils::hash::{calculate_page_checksum, verify_page_checksum},
};

pub const INDEX_MAGIC: &[u8; 8] = b"LMBGIDX\0";
pub const INDEX_FORMAT_VERSION: u8 = 1;
pub const INDEX_HEADER_SIZE: usize = 62;

const CHECKSUM_OFFSET: usize = INDEX_HEADER_SIZE - 4;
const PAGE_SIZE_OFFSET: usize = 14;

/// Page 0 of every index file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHeader {
    pub version: u8,
    pub kind: IndexKind,
    pub unique: bool,
    pub key_type: DataType,
    pub page_size: u32,
    pub page_count: u32,
    pub entry_count: u64,
    /// Root node, first leaf, or first directory page depending on kind.
    pub root_page: PageId,
    pub free_head: PageId,
    /// Order, leaf capacity, global depth or max entries.
    pub param_order: u32,
    pub param_aux: u32,
    pub param_extra: u32,
    pub next_sequence: u64,
}

impl IndexHeader {
    pub fn new(kind: IndexKind, key_type: DataType, unique: bool, page_size: usize) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            kind,
            unique,
            key_type,
            page_size: page_size as u32,
            page_count: 1,
            entry_count: 0,
            root_page: NO_PAGE,
            free_head: NO_PAGE,
            param_order: 0,
            param_aux: 0,
            param_extra: 0,
            next_sequence: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(INDEX_HEADER_SIZE);

        buffer.extend_from_slice(INDEX_MAGIC);
        buffer.push(self.version);
        buffer.push(self.kind.as_u8());
        buffer.push(self.unique as u8);
        buffer.push(self.key_type.as_u8());
        buffer.extend_from_slice(&self.key_type.length().to_le_bytes());
        buffer.extend_from_slice(&self.page_size.to_le_bytes());
        buffer.extend_from_slice(&self.page_count.to_le_bytes());
        buffer.extend_from_slice(&self.entry_count.to_le_bytes());
        buffer.extend_from_slice(&self.root_page.to_le_bytes());
        buffer.extend_from_slice(&self.free_head.to_le_bytes());
        buffer.extend_from_slice(&self.param_order.to_le_bytes());
        buffer.extend_from_slice(&self.param_aux.to_le_bytes());
        buffer.extend_from_slice(&self.param_extra.to_le_bytes());
        buffer.extend_from_slice(&self.next_sequence.to_le_bytes());

        let checksum = calculate_page_checksum(0, &buffer[..CHECKSUM_OFFSET]);
        buffer.extend_from_slice(&checksum.to_le_bytes());
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INDEX_HEADER_SIZE {
            return Err(DatabaseError::corrupt("Index header too short"));
        }
        if &bytes[0..8] != INDEX_MAGIC {
            return Err(DatabaseError::corrupt("Invalid index magic number"));
        }
        let stored = read_u32(bytes, CHECKSUM_OFFSET);
        if !verify_page_checksum(0, &bytes[..CHECKSUM_OFFSET], stored) {
            return Err(DatabaseError::corrupt("Index header checksum mismatch"));
        }

        let version = bytes[8];
        if version != INDEX_FORMAT_VERSION {
            return Err(DatabaseError::corrupt(format!(
                "Unsupported index format version {}",
                version
            )));
        }
        let kind = IndexKind::from_u8(bytes[9])?;
        let unique = bytes[10] != 0;
        let key_len = u16::from_le_bytes([bytes[12], bytes[13]]);
        let key_type = DataType::from_tag(bytes[11], key_len)?;

        Ok(Self {
            version,
            kind,
            unique,
            key_type,
            page_size: read_u32(bytes, PAGE_SIZE_OFFSET),
            page_count: read_u32(bytes, 18),
            entry_count: read_u64(bytes, 22),
            root_page: read_u32(bytes, 30),
            free_head: read_u32(bytes, 34),
            param_order: read_u32(bytes, 38),
            param_aux: read_u32(bytes, 42),
            param_extra: read_u32(bytes, 46),
            next_sequence: read_u64(bytes, 50),
        })
    }

    /// Reads just enough of `path` to learn its page size.
    pub fn peek(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; INDEX_HEADER_SIZE];
        file.read_exact(&mut buffer).map_err(|_| {
            DatabaseError::corrupt(format!("{} is too short for an index header", path.display()))
        })?;
        Self::from_bytes(&buffer)
    }
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(out)
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}
