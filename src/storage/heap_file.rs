use std::path::Path;

use log::{debug, warn};

use crate::{
    storage::{page_store::PageStore, record_codec::RecordCodec},
    types::{
        LENGTH_PREFIX_SIZE, PageId, SlotId,
        error::{DatabaseError, Result},
        rid::Rid,
        row::Row,
    },
    utils::hash::calculate_page_checksum,
};

pub const HEAP_HEADER_SIZE: usize = 12;

const STATUS_LIVE: u8 = 0;
const STATUS_TOMBSTONE: u8 = 1;

/// One heap page: `[used u32][records u16][tombstones u16][crc32 u32]`
/// followed by `[len][status][row]` frames. Slots are record ordinals.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pub page_id: PageId,
    data: Vec<u8>,
}

impl HeapPage {
    pub fn new(page_id: PageId, page_size: usize) -> Self {
        let mut page = Self {
            page_id,
            data: vec![0u8; page_size],
        };
        page.seal();
        page
    }

    pub fn from_bytes(page_id: PageId, data: Vec<u8>) -> Result<Self> {
        if data.len() < HEAP_HEADER_SIZE {
            return Err(DatabaseError::corrupt(format!(
                "Heap page {} is shorter than its header",
                page_id
            )));
        }
        let page = Self { page_id, data };
        if HEAP_HEADER_SIZE + page.used_bytes() > page.data.len() {
            return Err(DatabaseError::corrupt(format!(
                "Heap page {} claims {} used bytes",
                page_id,
                page.used_bytes()
            )));
        }
        let stored = u32::from_le_bytes([page.data[8], page.data[9], page.data[10], page.data[11]]);
        if stored != page.checksum() {
            warn!("Checksum mismatch on heap page {}", page_id);
            return Err(DatabaseError::corrupt(format!(
                "Checksum mismatch on heap page {}",
                page_id
            )));
        }
        Ok(page)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn used_bytes(&self) -> usize {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]) as usize
    }

    pub fn record_count(&self) -> u16 {
        u16::from_le_bytes([self.data[4], self.data[5]])
    }

    pub fn tombstone_count(&self) -> u16 {
        u16::from_le_bytes([self.data[6], self.data[7]])
    }

    pub fn live_count(&self) -> u16 {
        self.record_count() - self.tombstone_count()
    }

    pub fn free_space(&self) -> usize {
        self.data.len() - HEAP_HEADER_SIZE - self.used_bytes()
    }

    fn body(&self) -> &[u8] {
        &self.data[HEAP_HEADER_SIZE..HEAP_HEADER_SIZE + self.used_bytes()]
    }

    fn checksum(&self) -> u32 {
        let mut region = Vec::with_capacity(8 + self.used_bytes());
        region.extend_from_slice(&self.data[0..8]);
        region.extend_from_slice(self.body());
        calculate_page_checksum(self.page_id, &region)
    }

    fn seal(&mut self) {
        let checksum = self.checksum();
        self.data[8..12].copy_from_slice(&checksum.to_le_bytes());
    }

    fn set_counts(&mut self, used: usize, records: u16, tombstones: u16) {
        self.data[0..4].copy_from_slice(&(used as u32).to_le_bytes());
        self.data[4..6].copy_from_slice(&records.to_le_bytes());
        self.data[6..8].copy_from_slice(&tombstones.to_le_bytes());
    }

    /// Appends a heap payload if its frame fits, returning the new slot.
    pub fn try_append(&mut self, payload: &[u8]) -> Option<SlotId> {
        let framed = LENGTH_PREFIX_SIZE + payload.len();
        if framed > self.free_space() || self.record_count() == u16::MAX {
            return None;
        }
        let start = HEAP_HEADER_SIZE + self.used_bytes();
        self.data[start..start + framed].copy_from_slice(&RecordCodec::frame(payload));
        let slot = self.record_count();
        self.set_counts(self.used_bytes() + framed, slot + 1, self.tombstone_count());
        self.seal();
        Some(slot as SlotId)
    }

    /// Returns the status byte, the row bytes and the body offset of `slot`.
    fn locate(&self, slot: SlotId) -> Option<(u8, &[u8], usize)> {
        RecordCodec::frames(self.body())
            .nth(slot as usize)
            .and_then(|frame| {
                let (status, row) = frame.payload.split_first()?;
                Some((*status, row, frame.offset))
            })
    }

    pub fn read(&self, slot: SlotId) -> Result<Option<Row>> {
        match self.locate(slot) {
            Some((STATUS_LIVE, row, _)) => Ok(Some(Row::from_bytes(row)?)),
            _ => Ok(None),
        }
    }

    /// Marks `slot` dead. Returns false when it is absent or already dead.
    pub fn mark_tombstone(&mut self, slot: SlotId) -> bool {
        let offset = match self.locate(slot) {
            Some((STATUS_LIVE, _, offset)) => offset,
            _ => return false,
        };
        self.data[HEAP_HEADER_SIZE + offset + LENGTH_PREFIX_SIZE] = STATUS_TOMBSTONE;
        self.set_counts(self.used_bytes(), self.record_count(), self.tombstone_count() + 1);
        self.seal();
        true
    }

    /// Live records of this page in slot order.
    pub fn live_records(&self) -> Result<Vec<(SlotId, Row)>> {
        let mut rows = Vec::with_capacity(self.live_count() as usize);
        for (slot, frame) in RecordCodec::frames(self.body()).enumerate() {
            match frame.payload.split_first() {
                Some((&STATUS_LIVE, row)) => rows.push((slot as SlotId, Row::from_bytes(row)?)),
                Some((&STATUS_TOMBSTONE, _)) => {}
                _ => {
                    return Err(DatabaseError::corrupt(format!(
                        "Bad record status in heap page {} slot {}",
                        self.page_id, slot
                    )));
                }
            }
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub pages: u32,
    pub live_records: u64,
    pub tombstones: u64,
}

impl HeapStats {
    /// Fraction of stored records that are tombstones.
    pub fn tombstone_ratio(&self) -> f64 {
        let total = self.live_records + self.tombstones;
        if total == 0 {
            0.0
        } else {
            self.tombstones as f64 / total as f64
        }
    }
}

/// Append-only row file. Rows keep their `(page, slot)` locator for life.
pub struct HeapFile {
    store: PageStore,
    stats: HeapStats,
}

impl HeapFile {
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        Self::open_with_cache(path, page_size, 0)
    }

    pub fn open_with_cache<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        let store = PageStore::open_with_cache(path, page_size, cache_pages)?;
        Self::from_store(store)
    }

    /// Creates an empty heap at `path`, replacing any existing file.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize, cache_pages: usize) -> Result<Self> {
        let store = PageStore::create_truncated(path, page_size, cache_pages)?;
        Self::from_store(store)
    }

    fn from_store(mut store: PageStore) -> Result<Self> {
        let mut stats = HeapStats {
            pages: store.page_count(),
            ..HeapStats::default()
        };
        for page_id in 0..store.page_count() {
            let page = HeapPage::from_bytes(page_id, store.read_page(page_id)?)?;
            stats.live_records += page.live_count() as u64;
            stats.tombstones += page.tombstone_count() as u64;
        }
        debug!(
            "Heap {} has {} pages, {} live rows, {} tombstones",
            store.path().display(),
            stats.pages,
            stats.live_records,
            stats.tombstones
        );
        Ok(Self { store, stats })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    pub fn page_count(&self) -> u32 {
        self.store.page_count()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    fn read_heap_page(&mut self, page_id: PageId) -> Result<HeapPage> {
        HeapPage::from_bytes(page_id, self.store.read_page(page_id)?)
    }

    pub fn append(&mut self, row: &Row) -> Result<Rid> {
        let mut payload = Vec::with_capacity(1 + row.size());
        payload.push(STATUS_LIVE);
        payload.extend_from_slice(&row.to_bytes());

        let capacity = self.store.page_size() - HEAP_HEADER_SIZE;
        let framed = LENGTH_PREFIX_SIZE + payload.len();
        if framed > capacity {
            return Err(DatabaseError::RecordTooLarge {
                size: framed,
                capacity,
            });
        }

        let page_count = self.store.page_count();
        if page_count > 0 {
            let mut tail = self.read_heap_page(page_count - 1)?;
            if let Some(slot) = tail.try_append(&payload) {
                self.store.write_page(tail.page_id, tail.as_bytes())?;
                self.stats.live_records += 1;
                return Ok(Rid::new(tail.page_id, slot));
            }
        }

        let mut page = HeapPage::new(page_count, self.store.page_size());
        let slot = page.try_append(&payload).ok_or(DatabaseError::RecordTooLarge {
            size: framed,
            capacity,
        })?;
        let page_id = self.store.append_page(page.as_bytes())?;
        debug!("Heap {} grew to {} pages", self.path().display(), page_id + 1);
        self.stats.pages = self.store.page_count();
        self.stats.live_records += 1;
        Ok(Rid::new(page_id, slot))
    }

    pub fn read(&mut self, rid: Rid) -> Result<Row> {
        let page = self.read_heap_page(rid.page_id)?;
        page.read(rid.slot)?.ok_or_else(|| DatabaseError::NotFound {
            what: format!("row {}", rid),
        })
    }

    pub fn delete(&mut self, rid: Rid) -> Result<()> {
        let mut page = self.read_heap_page(rid.page_id)?;
        if !page.mark_tombstone(rid.slot) {
            return Err(DatabaseError::NotFound {
                what: format!("row {}", rid),
            });
        }
        self.store.write_page(rid.page_id, page.as_bytes())?;
        self.stats.live_records -= 1;
        self.stats.tombstones += 1;
        Ok(())
    }

    /// Lazily walks live rows in page/slot order. Each call starts over.
    pub fn scan(&mut self) -> HeapScan<'_> {
        HeapScan {
            heap: self,
            next_page: 0,
            buffered: Vec::new().into_iter(),
            done: false,
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }
}

pub struct HeapScan<'a> {
    heap: &'a mut HeapFile,
    next_page: PageId,
    buffered: std::vec::IntoIter<(SlotId, Row)>,
    done: bool,
}

impl HeapScan<'_> {
    fn current_page(&self) -> PageId {
        self.next_page.saturating_sub(1)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<(Rid, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some((slot, row)) = self.buffered.next() {
                return Some(Ok((Rid::new(self.current_page(), slot), row)));
            }
            if self.next_page >= self.heap.page_count() {
                self.done = true;
                return None;
            }
            let page_id = self.next_page;
            self.next_page += 1;
            match self
                .heap
                .read_heap_page(page_id)
                .and_then(|page| page.live_records())
            {
                Ok(rows) => self.buffered = rows.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
