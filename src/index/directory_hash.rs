use std::{cmp::Ordering, collections::HashSet, path::Path};

use log::{debug, info};

use crate::{
    config::StorageConfig,
    index::{
        IndexKind, IndexStats, IndexStore, check_key, duplicate_key,
        file::IndexFile,
        header::{IndexHeader, read_u16, read_u32},
    },
    types::{
        NO_PAGE, PageId, RID_SIZE,
        error::{DatabaseError, Result},
        rid::Rid,
        value::{DataType, Value},
    },
    utils::hash::hash_key_bytes,
};

const DIRECTORY_TAG: u8 = 0x41;
const BUCKET_TAG: u8 = 0x42;
const OVERFLOW_TAG: u8 = 0x43;

const DIRECTORY_HEADER_SIZE: usize = 9;
const BUCKET_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone)]
struct Entry {
    key: Value,
    rid: Rid,
    hash: u32,
}

/// A primary bucket or one of its overflow pages.
#[derive(Debug, Clone)]
struct BucketPage {
    tag: u8,
    local_depth: u8,
    entries: Vec<Entry>,
    overflow: PageId,
}

/// Extensible hashing over CRC32 of the fixed-width key encoding. The
/// directory lives in memory while open and in a page chain on disk.
pub struct DirectoryHashIndex {
    file: IndexFile,
    directory: Vec<PageId>,
    directory_pages: Vec<PageId>,
}

impl DirectoryHashIndex {
    fn entry_size(key_type: &DataType) -> usize {
        key_type.key_width() + RID_SIZE
    }

    fn slots_per_directory_page(&self) -> usize {
        (self.file.page_size() - DIRECTORY_HEADER_SIZE) / 4
    }

    pub fn create(
        path: &Path,
        key_type: DataType,
        unique: bool,
        config: &StorageConfig,
    ) -> Result<Self> {
        let capacity = (config.page_size - BUCKET_HEADER_SIZE) / Self::entry_size(&key_type);
        if capacity < 2 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "{}-byte pages hold fewer than two {} hash entries",
                    config.page_size, key_type
                ),
            });
        }
        let initial_depth = config.hash_initial_global_depth;
        let max_depth = config.hash_max_global_depth;
        if initial_depth > max_depth || max_depth > 24 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "hash depths must satisfy initial <= max <= 24, got {} / {}",
                    initial_depth, max_depth
                ),
            });
        }

        let mut header = IndexHeader::new(IndexKind::Hash, key_type, unique, config.page_size);
        header.param_order = initial_depth;
        header.param_aux = max_depth;
        header.param_extra = capacity as u32;
        let file = IndexFile::create(path, header, config.page_cache_pages)?;
        let mut index = Self {
            file,
            directory: Vec::new(),
            directory_pages: Vec::new(),
        };

        for _ in 0..(1u32 << initial_depth) {
            let bucket = BucketPage {
                tag: BUCKET_TAG,
                local_depth: initial_depth as u8,
                entries: Vec::new(),
                overflow: NO_PAGE,
            };
            let bytes = index.encode_bucket(&bucket)?;
            let page_id = index.file.allocate(&bytes)?;
            index.directory.push(page_id);
        }
        index.write_directory()?;
        index.file.sync_header()?;
        info!(
            "Created directory hash index {} (global depth {}, bucket capacity {})",
            path.display(),
            initial_depth,
            capacity
        );
        Ok(index)
    }

    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = IndexFile::open(path, IndexKind::Hash, config.page_cache_pages)?;
        let mut index = Self {
            file,
            directory: Vec::new(),
            directory_pages: Vec::new(),
        };
        index.load_directory()?;
        Ok(index)
    }

    pub fn global_depth(&self) -> u32 {
        self.file.header.param_order
    }

    pub fn max_global_depth(&self) -> u32 {
        self.file.header.param_aux
    }

    pub fn bucket_capacity(&self) -> usize {
        self.file.header.param_extra as usize
    }

    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    fn hash_of(&self, key: &Value) -> Result<u32> {
        let bytes = self.file.header.key_type.encode_key_to_vec(key)?;
        Ok(hash_key_bytes(&bytes))
    }

    fn slot_of(&self, hash: u32) -> usize {
        (hash & ((1u32 << self.global_depth()) - 1)) as usize
    }

    fn load_directory(&mut self) -> Result<()> {
        let expected = 1usize << self.global_depth();
        let mut next = self.file.header.root_page;
        let mut directory = Vec::with_capacity(expected);
        let mut pages = Vec::new();
        while next != NO_PAGE {
            if pages.len() > self.file.page_count() as usize {
                return Err(DatabaseError::corrupt("Directory chain has a cycle"));
            }
            let bytes = self.file.read(next)?;
            if bytes[0] != DIRECTORY_TAG {
                return Err(DatabaseError::corrupt(format!(
                    "Page {} is not a directory page",
                    next
                )));
            }
            let count = read_u32(&bytes, 5) as usize;
            if DIRECTORY_HEADER_SIZE + count * 4 > bytes.len() {
                return Err(DatabaseError::corrupt(format!(
                    "Directory page {} claims {} slots",
                    next, count
                )));
            }
            directory.extend((0..count).map(|i| read_u32(&bytes, DIRECTORY_HEADER_SIZE + i * 4)));
            pages.push(next);
            next = read_u32(&bytes, 1);
        }
        if directory.len() != expected {
            return Err(DatabaseError::corrupt(format!(
                "Directory has {} slots, global depth {} needs {}",
                directory.len(),
                self.global_depth(),
                expected
            )));
        }
        self.directory = directory;
        self.directory_pages = pages;
        Ok(())
    }

    fn write_directory(&mut self) -> Result<()> {
        let per_page = self.slots_per_directory_page();
        let needed = self.directory.len().div_ceil(per_page);
        while self.directory_pages.len() < needed {
            let mut placeholder = self.file.blank_page();
            placeholder[0] = DIRECTORY_TAG;
            let page_id = self.file.allocate(&placeholder)?;
            self.directory_pages.push(page_id);
        }
        for (i, chunk) in self.directory.chunks(per_page).enumerate() {
            let mut page = self.file.blank_page();
            page[0] = DIRECTORY_TAG;
            let next = self.directory_pages.get(i + 1).copied().unwrap_or(NO_PAGE);
            page[1..5].copy_from_slice(&next.to_le_bytes());
            page[5..9].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
            for (j, bucket) in chunk.iter().enumerate() {
                let at = DIRECTORY_HEADER_SIZE + j * 4;
                page[at..at + 4].copy_from_slice(&bucket.to_le_bytes());
            }
            self.file.write(self.directory_pages[i], &page)?;
        }
        self.file.header.root_page = self.directory_pages[0];
        Ok(())
    }

    fn encode_bucket(&self, bucket: &BucketPage) -> Result<Vec<u8>> {
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let entry_size = Self::entry_size(key_type);
        let mut page = self.file.blank_page();
        page[0] = bucket.tag;
        page[1] = bucket.local_depth;
        page[2..4].copy_from_slice(&(bucket.entries.len() as u16).to_le_bytes());
        page[4..8].copy_from_slice(&bucket.overflow.to_le_bytes());
        for (i, entry) in bucket.entries.iter().enumerate() {
            let at = BUCKET_HEADER_SIZE + i * entry_size;
            key_type.encode_key(&entry.key, &mut page[at..at + key_width])?;
            page[at + key_width..at + entry_size].copy_from_slice(&entry.rid.to_bytes());
        }
        Ok(page)
    }

    fn load_bucket(&mut self, page_id: PageId) -> Result<BucketPage> {
        let bytes = self.file.read(page_id)?;
        if bytes[0] != BUCKET_TAG && bytes[0] != OVERFLOW_TAG {
            return Err(DatabaseError::corrupt(format!(
                "Page {} is not a hash bucket",
                page_id
            )));
        }
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let entry_size = Self::entry_size(key_type);
        let count = read_u16(&bytes, 2) as usize;
        if BUCKET_HEADER_SIZE + count * entry_size > bytes.len() {
            return Err(DatabaseError::corrupt(format!(
                "Bucket {} claims {} entries",
                page_id, count
            )));
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = BUCKET_HEADER_SIZE + i * entry_size;
            let key_bytes = &bytes[at..at + key_width];
            entries.push(Entry {
                key: key_type.decode_key(key_bytes)?,
                rid: Rid::from_bytes(&bytes[at + key_width..])?,
                hash: hash_key_bytes(key_bytes),
            });
        }
        Ok(BucketPage {
            tag: bytes[0],
            local_depth: bytes[1],
            entries,
            overflow: read_u32(&bytes, 4),
        })
    }

    fn store_bucket(&mut self, page_id: PageId, bucket: &BucketPage) -> Result<()> {
        let bytes = self.encode_bucket(bucket)?;
        self.file.write(page_id, &bytes)
    }

    /// Primary bucket followed by its overflow pages.
    fn load_chain(&mut self, bucket_id: PageId) -> Result<Vec<(PageId, BucketPage)>> {
        let mut chain = Vec::new();
        let mut next = bucket_id;
        while next != NO_PAGE {
            if chain.len() > self.file.page_count() as usize {
                return Err(DatabaseError::corrupt("Overflow chain has a cycle"));
            }
            let page = self.load_bucket(next)?;
            let following = page.overflow;
            chain.push((next, page));
            next = following;
        }
        Ok(chain)
    }

    /// Writes `entries` to the primary bucket at `bucket_id`, spilling the
    /// excess into fresh overflow pages.
    fn write_bucket_with_overflow(
        &mut self,
        bucket_id: PageId,
        local_depth: u8,
        mut entries: Vec<Entry>,
    ) -> Result<()> {
        let capacity = self.bucket_capacity();
        let spill = if entries.len() > capacity {
            entries.split_off(capacity)
        } else {
            Vec::new()
        };
        let mut next = NO_PAGE;
        let chunks: Vec<Vec<Entry>> = spill.chunks(capacity).map(|c| c.to_vec()).collect();
        for chunk in chunks.into_iter().rev() {
            let page = BucketPage {
                tag: OVERFLOW_TAG,
                local_depth,
                entries: chunk,
                overflow: next,
            };
            let bytes = self.encode_bucket(&page)?;
            next = self.file.allocate(&bytes)?;
        }
        let primary = BucketPage {
            tag: BUCKET_TAG,
            local_depth,
            entries,
            overflow: next,
        };
        self.store_bucket(bucket_id, &primary)
    }

    fn double_directory(&mut self) {
        let copy = self.directory.clone();
        self.directory.extend(copy);
        self.file.header.param_order += 1;
        debug!(
            "Directory doubled to global depth {} ({} slots)",
            self.global_depth(),
            self.directory.len()
        );
    }

    /// Splits the bucket at `slot`, doubling the directory first when the
    /// bucket is already at global depth.
    fn split_bucket(&mut self, slot: usize) -> Result<()> {
        let bucket_id = self.directory[slot];
        let chain = self.load_chain(bucket_id)?;
        let local_depth = chain[0].1.local_depth as u32;
        if local_depth == self.global_depth() {
            self.double_directory();
        }

        let mut entries = Vec::new();
        for (page_id, page) in chain {
            if page_id != bucket_id {
                self.file.free(page_id)?;
            }
            entries.extend(page.entries);
        }

        let bit = 1u32 << local_depth;
        let (moved, kept): (Vec<Entry>, Vec<Entry>) =
            entries.into_iter().partition(|e| e.hash & bit != 0);

        let new_depth = (local_depth + 1) as u8;
        let placeholder = self.file.blank_page();
        let sibling_id = self.file.allocate(&placeholder)?;
        self.write_bucket_with_overflow(bucket_id, new_depth, kept)?;
        self.write_bucket_with_overflow(sibling_id, new_depth, moved)?;

        for (i, target) in self.directory.iter_mut().enumerate() {
            if *target == bucket_id && (i as u32) & bit != 0 {
                *target = sibling_id;
            }
        }
        self.write_directory()?;
        debug!(
            "Split bucket {} into {} at local depth {}",
            bucket_id, sibling_id, new_depth
        );
        Ok(())
    }

    /// Appends to the last page of the chain, growing it when full.
    fn append_overflow(&mut self, chain: Vec<(PageId, BucketPage)>, entry: Entry) -> Result<()> {
        let capacity = self.bucket_capacity();
        let local_depth = chain[0].1.local_depth;
        let Some((tail_id, mut tail)) = chain.into_iter().last() else {
            return Err(DatabaseError::corrupt("Empty bucket chain"));
        };
        if tail.entries.len() < capacity {
            tail.entries.push(entry);
            return self.store_bucket(tail_id, &tail);
        }
        let page = BucketPage {
            tag: OVERFLOW_TAG,
            local_depth,
            entries: vec![entry],
            overflow: NO_PAGE,
        };
        let bytes = self.encode_bucket(&page)?;
        let overflow_id = self.file.allocate(&bytes)?;
        tail.overflow = overflow_id;
        self.store_bucket(tail_id, &tail)?;
        debug!("Bucket chain grew overflow page {}", overflow_id);
        Ok(())
    }

    fn remove_matching(&mut self, key: &Value, rid: Option<Rid>, limit: usize) -> Result<usize> {
        let hash = self.hash_of(key)?;
        let bucket_id = self.directory[self.slot_of(hash)];
        let mut removed = 0;
        for (page_id, mut page) in self.load_chain(bucket_id)? {
            let before = page.entries.len();
            page.entries.retain(|e| {
                let hit = removed < limit
                    && e.key.key_cmp(key) == Ordering::Equal
                    && rid.is_none_or(|r| r == e.rid);
                if hit {
                    removed += 1;
                }
                !hit
            });
            if page.entries.len() != before {
                self.store_bucket(page_id, &page)?;
            }
        }
        self.file.header.entry_count -= removed as u64;
        Ok(removed)
    }
}

impl IndexStore for DirectoryHashIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hash
    }

    fn key_type(&self) -> &DataType {
        &self.file.header.key_type
    }

    fn is_unique(&self) -> bool {
        self.file.header.unique
    }

    fn insert(&mut self, key: &Value, rid: Rid) -> Result<()> {
        check_key(&self.file.header.key_type, key)?;
        if self.file.header.unique && !self.search(key)?.is_empty() {
            return Err(duplicate_key(key));
        }
        let entry = Entry {
            key: key.clone(),
            rid,
            hash: self.hash_of(key)?,
        };
        loop {
            let slot = self.slot_of(entry.hash);
            let bucket_id = self.directory[slot];
            let mut chain = self.load_chain(bucket_id)?;
            if chain[0].1.entries.len() < self.bucket_capacity() {
                let (_, mut primary) = chain.swap_remove(0);
                primary.entries.push(entry);
                self.store_bucket(bucket_id, &primary)?;
                break;
            }

            let local_depth = chain[0].1.local_depth as u32;
            let max_depth = self.max_global_depth();
            let depth_exhausted = local_depth >= max_depth;
            let max_mask = if max_depth == 0 {
                0
            } else {
                u32::MAX >> (32 - max_depth)
            };
            let separable = chain
                .iter()
                .flat_map(|(_, page)| page.entries.iter())
                .any(|e| e.hash & max_mask != entry.hash & max_mask);
            if depth_exhausted || !separable {
                self.append_overflow(chain, entry)?;
                break;
            }
            self.split_bucket(slot)?;
        }
        self.file.header.entry_count += 1;
        Ok(())
    }

    fn search(&mut self, key: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, key)?;
        let hash = self.hash_of(key)?;
        let bucket_id = self.directory[self.slot_of(hash)];
        let mut rids = Vec::new();
        for (_, page) in self.load_chain(bucket_id)? {
            rids.extend(
                page.entries
                    .iter()
                    .filter(|e| e.hash == hash && e.key.key_cmp(key) == Ordering::Equal)
                    .map(|e| e.rid),
            );
        }
        Ok(rids)
    }

    fn range(&mut self, _low: &Value, _high: &Value) -> Result<Vec<Rid>> {
        Err(DatabaseError::UnsupportedOperation {
            operation: "range".to_string(),
            index: IndexKind::Hash.to_string(),
        })
    }

    fn remove(&mut self, key: &Value) -> Result<usize> {
        check_key(&self.file.header.key_type, key)?;
        self.remove_matching(key, None, usize::MAX)
    }

    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool> {
        check_key(&self.file.header.key_type, key)?;
        Ok(self.remove_matching(key, Some(rid), 1)? == 1)
    }

    fn len(&self) -> u64 {
        self.file.header.entry_count
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::new(IndexKind::Hash);
        stats.entries = self.file.header.entry_count;
        stats.pages = self.file.page_count();
        stats.free_pages = self.file.free_page_count()?;
        stats.global_depth = self.global_depth();
        let buckets: HashSet<PageId> = self.directory.iter().copied().collect();
        stats.buckets = buckets.len() as u32;
        for bucket_id in buckets {
            stats.overflow_pages += (self.load_chain(bucket_id)?.len() - 1) as u32;
        }
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.file.close()
    }
}
