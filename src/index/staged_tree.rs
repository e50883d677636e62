use std::{cmp::Ordering, path::Path};

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
};

const LEAF_TAG: u8 = 0x21;
const OVERFLOW_TAG: u8 = 0x22;
const INDEX_TAG: u8 = 0x23;
const PAGE_HEADER_SIZE: usize = 7;

const STATUS_LIVE: u8 = 0;
const STATUS_DELETED: u8 = 1;

#[derive(Debug, Clone)]
struct Slot {
    key: Value,
    rid: Rid,
    live: bool,
}

/// A leaf (sorted, linked to its overflow chain) or an overflow page
/// (unsorted, linked to the next overflow page).
#[derive(Debug, Clone)]
struct RunPage {
    tag: u8,
    slots: Vec<Slot>,
    link: PageId,
}

/// Static ISAM tree. Leaves are contiguous from page 1 and never split;
/// inserts that do not fit go to the leaf's overflow chain.
pub struct StagedTreeIndex {
    file: IndexFile,
    cache_pages: usize,
}

impl StagedTreeIndex {
    fn slot_size(key_type: &DataType) -> usize {
        key_type.key_width() + RID_SIZE + 1
    }

    fn leaf_capacity(page_size: usize, key_type: &DataType) -> usize {
        (page_size - PAGE_HEADER_SIZE) / Self::slot_size(key_type)
    }

    fn index_fanout(page_size: usize, key_type: &DataType) -> usize {
        (page_size - PAGE_HEADER_SIZE) / (key_type.key_width() + 4)
    }

    pub fn create(
        path: &Path,
        key_type: DataType,
        unique: bool,
        config: &StorageConfig,
    ) -> Result<Self> {
        Self::build(path, key_type, unique, config, Vec::new())
    }

    /// Builds the static layout from `entries` in one pass. Equal keys keep
    /// their input order.
    pub fn build(
        path: &Path,
        key_type: DataType,
        unique: bool,
        config: &StorageConfig,
        entries: Vec<(Value, Rid)>,
    ) -> Result<Self> {
        Self::build_with(
            path,
            key_type,
            unique,
            config.page_size,
            config.page_cache_pages,
            entries,
        )
    }

    fn build_with(
        path: &Path,
        key_type: DataType,
        unique: bool,
        page_size: usize,
        cache_pages: usize,
        mut entries: Vec<(Value, Rid)>,
    ) -> Result<Self> {
        let capacity = Self::leaf_capacity(page_size, &key_type);
        let fanout = Self::index_fanout(page_size, &key_type);
        if capacity < 1 || fanout < 2 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "{}-byte pages are too small for a staged tree over {} keys",
                    page_size, key_type
                ),
            });
        }
        for (key, _) in &entries {
            check_key(&key_type, key)?;
        }
        entries.sort_by(|a, b| a.0.key_cmp(&b.0));
        if unique {
            if let Some(pair) = entries
                .windows(2)
                .find(|pair| pair[0].0.key_cmp(&pair[1].0) == Ordering::Equal)
            {
                return Err(duplicate_key(&pair[0].0));
            }
        }

        let mut header = IndexHeader::new(IndexKind::Staged, key_type, unique, page_size);
        header.param_order = capacity as u32;
        header.entry_count = entries.len() as u64;
        let file = IndexFile::create(path, header, cache_pages)?;
        let mut index = Self { file, cache_pages };

        // Leaves first so they occupy pages 1..=leaf_count.
        let mut level: Vec<(Option<Value>, PageId)> = Vec::new();
        let chunks: Vec<&[(Value, Rid)]> = if entries.is_empty() {
            vec![&entries[..]]
        } else {
            entries.chunks(capacity).collect()
        };
        for chunk in chunks {
            let leaf = RunPage {
                tag: LEAF_TAG,
                slots: chunk
                    .iter()
                    .map(|(key, rid)| Slot {
                        key: key.clone(),
                        rid: *rid,
                        live: true,
                    })
                    .collect(),
                link: NO_PAGE,
            };
            let bytes = index.encode_run(&leaf)?;
            let page_id = index.file.allocate(&bytes)?;
            level.push((chunk.first().map(|(key, _)| key.clone()), page_id));
        }
        index.file.header.param_extra = level.len() as u32;

        let mut levels = 1;
        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len() / fanout + 1);
            for group in level.chunks(fanout) {
                let separators = group
                    .iter()
                    .map(|(key, child)| {
                        key.clone()
                            .map(|k| (k, *child))
                            .ok_or_else(|| DatabaseError::corrupt("Empty leaf below an index page"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let bytes = index.encode_index_page(&separators)?;
                let page_id = index.file.allocate(&bytes)?;
                parents.push((group[0].0.clone(), page_id));
            }
            level = parents;
            levels += 1;
        }

        index.file.header.root_page = level[0].1;
        index.file.header.param_aux = levels;
        index.file.sync_header()?;
        info!(
            "Built staged tree {} with {} entries, {} leaves, {} levels",
            path.display(),
            index.file.header.entry_count,
            index.file.header.param_extra,
            levels
        );
        Ok(index)
    }

    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = IndexFile::open(path, IndexKind::Staged, config.page_cache_pages)?;
        if file.header.param_extra == 0 || file.header.root_page == NO_PAGE {
            return Err(DatabaseError::corrupt(format!(
                "{}: staged tree header is incomplete",
                path.display()
            )));
        }
        Ok(Self {
            file,
            cache_pages: config.page_cache_pages,
        })
    }

    pub fn levels(&self) -> u32 {
        self.file.header.param_aux
    }

    pub fn leaf_count(&self) -> u32 {
        self.file.header.param_extra
    }

    fn encode_run(&self, run: &RunPage) -> Result<Vec<u8>> {
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let slot_size = Self::slot_size(key_type);
        let mut page = self.file.blank_page();
        page[0] = run.tag;
        page[1..3].copy_from_slice(&(run.slots.len() as u16).to_le_bytes());
        page[3..7].copy_from_slice(&run.link.to_le_bytes());
        for (i, slot) in run.slots.iter().enumerate() {
            let at = PAGE_HEADER_SIZE + i * slot_size;
            key_type.encode_key(&slot.key, &mut page[at..at + key_width])?;
            page[at + key_width..at + key_width + RID_SIZE].copy_from_slice(&slot.rid.to_bytes());
            page[at + key_width + RID_SIZE] = if slot.live {
                STATUS_LIVE
            } else {
                STATUS_DELETED
            };
        }
        Ok(page)
    }

    fn load_run(&mut self, page_id: PageId, expected_tag: u8) -> Result<RunPage> {
        let bytes = self.file.read(page_id)?;
        if bytes[0] != expected_tag {
            return Err(DatabaseError::corrupt(format!(
                "Page {} has tag {:#x}, expected {:#x}",
                page_id, bytes[0], expected_tag
            )));
        }
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let slot_size = Self::slot_size(key_type);
        let count = read_u16(&bytes, 1) as usize;
        if PAGE_HEADER_SIZE + count * slot_size > bytes.len() {
            return Err(DatabaseError::corrupt(format!(
                "Staged tree page {} claims {} entries",
                page_id, count
            )));
        }
        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            let at = PAGE_HEADER_SIZE + i * slot_size;
            slots.push(Slot {
                key: key_type.decode_key(&bytes[at..at + key_width])?,
                rid: Rid::from_bytes(&bytes[at + key_width..])?,
                live: bytes[at + key_width + RID_SIZE] == STATUS_LIVE,
            });
        }
        Ok(RunPage {
            tag: bytes[0],
            slots,
            link: read_u32(&bytes, 3),
        })
    }

    fn write_run(&mut self, page_id: PageId, run: &RunPage) -> Result<()> {
        let bytes = self.encode_run(run)?;
        self.file.write(page_id, &bytes)
    }

    fn encode_index_page(&self, separators: &[(Value, PageId)]) -> Result<Vec<u8>> {
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let mut page = self.file.blank_page();
        page[0] = INDEX_TAG;
        page[1..3].copy_from_slice(&(separators.len() as u16).to_le_bytes());
        for (i, (key, child)) in separators.iter().enumerate() {
            let at = PAGE_HEADER_SIZE + i * (key_width + 4);
            key_type.encode_key(key, &mut page[at..at + key_width])?;
            page[at + key_width..at + key_width + 4].copy_from_slice(&child.to_le_bytes());
        }
        Ok(page)
    }

    fn load_index_page(&mut self, page_id: PageId) -> Result<Vec<(Value, PageId)>> {
        let bytes = self.file.read(page_id)?;
        if bytes[0] != INDEX_TAG {
            return Err(DatabaseError::corrupt(format!(
                "Page {} should be an index page",
                page_id
            )));
        }
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let count = read_u16(&bytes, 1) as usize;
        if count == 0 || PAGE_HEADER_SIZE + count * (key_width + 4) > bytes.len() {
            return Err(DatabaseError::corrupt(format!(
                "Index page {} claims {} separators",
                page_id, count
            )));
        }
        (0..count)
            .map(|i| {
                let at = PAGE_HEADER_SIZE + i * (key_width + 4);
                Ok((
                    key_type.decode_key(&bytes[at..at + key_width])?,
                    read_u32(&bytes, at + key_width),
                ))
            })
            .collect()
    }

    /// Leftmost leaf that can hold `key`: at every level follow the last
    /// separator strictly below `key`, so runs of equal keys that started in
    /// an earlier leaf are not skipped.
    fn find_leaf(&mut self, key: &Value) -> Result<PageId> {
        let mut page_id = self.file.header.root_page;
        for _ in 1..self.levels() {
            let separators = self.load_index_page(page_id)?;
            let below = separators.partition_point(|(sep, _)| sep.key_cmp(key) == Ordering::Less);
            page_id = separators[below.saturating_sub(1)].1;
        }
        Ok(page_id)
    }

    /// Leaf plus its overflow pages, as `(page_id, run)` pairs.
    fn load_bucket(&mut self, leaf_id: PageId) -> Result<Vec<(PageId, RunPage)>> {
        let leaf = self.load_run(leaf_id, LEAF_TAG)?;
        let mut next = leaf.link;
        let mut bucket = vec![(leaf_id, leaf)];
        while next != NO_PAGE {
            if bucket.len() > self.file.page_count() as usize {
                return Err(DatabaseError::corrupt("Overflow chain has a cycle"));
            }
            let run = self.load_run(next, OVERFLOW_TAG)?;
            let following = run.link;
            bucket.push((next, run));
            next = following;
        }
        Ok(bucket)
    }

    /// Whether the scan for keys up to `upper` must continue into `leaf_id`.
    fn leaf_may_hold(&mut self, leaf_id: PageId, upper: &Value) -> Result<bool> {
        if leaf_id > self.leaf_count() {
            return Ok(false);
        }
        let leaf = self.load_run(leaf_id, LEAF_TAG)?;
        Ok(leaf
            .slots
            .first()
            .is_some_and(|slot| slot.key.key_cmp(upper) != Ordering::Greater))
    }

    /// Visits each bucket from the leaf of `low` while it may hold keys `<= high`.
    fn for_each_bucket<F>(&mut self, low: &Value, high: &Value, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut Self, Vec<(PageId, RunPage)>) -> Result<()>,
    {
        let mut leaf_id = self.find_leaf(low)?;
        loop {
            let bucket = self.load_bucket(leaf_id)?;
            visit(self, bucket)?;
            leaf_id += 1;
            if !self.leaf_may_hold(leaf_id, high)? {
                return Ok(());
            }
        }
    }

    fn collect_range(&mut self, low: &Value, high: &Value) -> Result<Vec<(Value, Rid)>> {
        let mut found = Vec::new();
        self.for_each_bucket(low, high, |_, bucket| {
            for (_, run) in bucket {
                for slot in run.slots {
                    if slot.live
                        && slot.key.key_cmp(low) != Ordering::Less
                        && slot.key.key_cmp(high) != Ordering::Greater
                    {
                        found.push((slot.key, slot.rid));
                    }
                }
            }
            Ok(())
        })?;
        found.sort_by(|a, b| a.0.key_cmp(&b.0));
        Ok(found)
    }

    /// Tombstones live entries equal to `key` (and to `rid` when given),
    /// at most `limit` of them.
    fn mark_deleted(&mut self, key: &Value, rid: Option<Rid>, limit: usize) -> Result<usize> {
        let mut marked = 0;
        self.for_each_bucket(key, key, |index, bucket| {
            for (page_id, mut run) in bucket {
                let mut changed = false;
                for slot in run.slots.iter_mut() {
                    if marked == limit {
                        break;
                    }
                    if slot.live
                        && slot.key.key_cmp(key) == Ordering::Equal
                        && rid.is_none_or(|r| r == slot.rid)
                    {
                        slot.live = false;
                        marked += 1;
                        changed = true;
                    }
                }
                if changed {
                    index.write_run(page_id, &run)?;
                }
            }
            Ok(())
        })?;
        self.file.header.entry_count -= marked as u64;
        Ok(marked)
    }

    /// Every live entry in key order.
    pub fn live_entries(&mut self) -> Result<Vec<(Value, Rid)>> {
        let mut entries = Vec::with_capacity(self.file.header.entry_count as usize);
        for leaf_id in 1..=self.leaf_count() {
            for (_, run) in self.load_bucket(leaf_id)? {
                entries.extend(
                    run.slots
                        .into_iter()
                        .filter(|slot| slot.live)
                        .map(|slot| (slot.key, slot.rid)),
                );
            }
        }
        entries.sort_by(|a, b| a.0.key_cmp(&b.0));
        Ok(entries)
    }

    /// Rewrites the file from its live entries, folding overflow chains
    /// into the leaves and dropping tombstones.
    pub fn rebuild(&mut self) -> Result<()> {
        let entries = self.live_entries()?;
        let path = self.file.path().to_path_buf();
        let key_type = self.file.header.key_type.clone();
        let unique = self.file.header.unique;
        let page_size = self.file.page_size();
        self.file.close()?;
        debug!("Rebuilding staged tree {}", path.display());
        *self = Self::build_with(&path, key_type, unique, page_size, self.cache_pages, entries)?;
        Ok(())
    }
}

impl IndexStore for StagedTreeIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Staged
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
        let slot = Slot {
            key: key.clone(),
            rid,
            live: true,
        };
        let leaf_id = self.find_leaf(key)?;
        let mut leaf = self.load_run(leaf_id, LEAF_TAG)?;
        if leaf.slots.len() < self.file.header.param_order as usize {
            let position = leaf
                .slots
                .partition_point(|s| s.key.key_cmp(key) != Ordering::Greater);
            leaf.slots.insert(position, slot);
            self.write_run(leaf_id, &leaf)?;
        } else {
            let capacity = self.file.header.param_order as usize;
            let bucket = self.load_bucket(leaf_id)?;
            let (tail_id, mut tail) = bucket
                .into_iter()
                .last()
                .ok_or_else(|| DatabaseError::corrupt("Empty overflow bucket"))?;
            if tail.tag == OVERFLOW_TAG && tail.slots.len() < capacity {
                tail.slots.push(slot);
                self.write_run(tail_id, &tail)?;
            } else {
                let overflow = RunPage {
                    tag: OVERFLOW_TAG,
                    slots: vec![slot],
                    link: NO_PAGE,
                };
                let bytes = self.encode_run(&overflow)?;
                let overflow_id = self.file.allocate(&bytes)?;
                tail.link = overflow_id;
                self.write_run(tail_id, &tail)?;
                debug!("Leaf {} chained overflow page {}", leaf_id, overflow_id);
            }
        }
        self.file.header.entry_count += 1;
        Ok(())
    }

    fn search(&mut self, key: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, key)?;
        let mut rids = Vec::new();
        self.for_each_bucket(key, key, |_, bucket| {
            for (_, run) in bucket {
                rids.extend(
                    run.slots
                        .iter()
                        .filter(|slot| slot.live && slot.key.key_cmp(key) == Ordering::Equal)
                        .map(|slot| slot.rid),
                );
            }
            Ok(())
        })?;
        Ok(rids)
    }

    fn range(&mut self, low: &Value, high: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, low)?;
        check_key(&self.file.header.key_type, high)?;
        if low.key_cmp(high) == Ordering::Greater {
            return Ok(Vec::new());
        }
        Ok(self
            .collect_range(low, high)?
            .into_iter()
            .map(|(_, rid)| rid)
            .collect())
    }

    fn remove(&mut self, key: &Value) -> Result<usize> {
        check_key(&self.file.header.key_type, key)?;
        self.mark_deleted(key, None, usize::MAX)
    }

    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool> {
        check_key(&self.file.header.key_type, key)?;
        Ok(self.mark_deleted(key, Some(rid), 1)? == 1)
    }

    fn len(&self) -> u64 {
        self.file.header.entry_count
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::new(IndexKind::Staged);
        stats.entries = self.file.header.entry_count;
        stats.pages = self.file.page_count();
        stats.free_pages = self.file.free_page_count()?;
        stats.height = self.levels();
        for leaf_id in 1..=self.leaf_count() {
            for (_, run) in self.load_bucket(leaf_id)? {
                if run.tag == OVERFLOW_TAG {
                    stats.overflow_pages += 1;
                }
                stats.tombstones += run.slots.iter().filter(|slot| !slot.live).count() as u64;
            }
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
