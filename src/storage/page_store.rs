use std::{
    collections::{HashMap, VecDeque},
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::types::{
    MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageId,
    error::{DatabaseError, Result},
};

/// Bounded write-through cache. Entries are evicted in insertion order.
#[derive(Debug, Default)]
struct PageCache {
    capacity: usize,
    pages: HashMap<PageId, Vec<u8>>,
    order: VecDeque<PageId>,
}

impl PageCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pages: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, page_id: PageId) -> Option<&Vec<u8>> {
        self.pages.get(&page_id)
    }

    fn put(&mut self, page_id: PageId, data: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.pages.insert(page_id, data).is_none() {
            self.order.push_back(page_id);
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.pages.remove(&evicted);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.pages.clear();
        self.order.clear();
    }
}

/// Owns one file of fixed-size pages addressed by zero-based page number.
pub struct PageStore {
    path: PathBuf,
    file: Option<File>,
    page_size: usize,
    page_count: u32,
    cache: PageCache,
}

impl PageStore {
    pub fn open_or_create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        Self::open_with_cache(path, page_size, 0)
    }

    pub fn open_with_cache<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        Self::open_inner(path.as_ref(), page_size, cache_pages, false)
    }

    /// Opens `path` discarding any existing content.
    pub fn create_truncated<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        Self::open_inner(path.as_ref(), page_size, cache_pages, true)
    }

    fn open_inner(path: &Path, page_size: usize, cache_pages: usize, truncate: bool) -> Result<Self> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "page size {} outside [{}, {}]",
                    page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
                ),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(truncate)
            .open(path)?;
        let file_size = file.metadata()?.len();
        if file_size % page_size as u64 != 0 {
            warn!(
                "{} is {} bytes, not a multiple of page size {}",
                path.display(),
                file_size,
                page_size
            );
            return Err(DatabaseError::corrupt(format!(
                "{}: length {} is not a multiple of page size {}",
                path.display(),
                file_size,
                page_size
            )));
        }
        let page_count = (file_size / page_size as u64) as u32;
        debug!(
            "Opened page store {} ({} pages of {} bytes)",
            path.display(),
            page_count,
            page_size
        );
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            page_size,
            page_count,
            cache: PageCache::new(cache_pages),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn file_size(&self) -> u64 {
        self.page_count as u64 * self.page_size as u64
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id as u64 * self.page_size as u64
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(DatabaseError::StoreClosed)
    }

    pub fn read_page(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        if self.file.is_none() {
            return Err(DatabaseError::StoreClosed);
        }
        if page_id >= self.page_count {
            return Err(DatabaseError::InvalidPage {
                page_id,
                page_count: self.page_count,
            });
        }
        if let Some(cached) = self.cache.get(page_id) {
            return Ok(cached.clone());
        }
        let offset = self.page_offset(page_id);
        let mut buffer = vec![0u8; self.page_size];
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        self.cache.put(page_id, buffer.clone());
        Ok(buffer)
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if self.file.is_none() {
            return Err(DatabaseError::StoreClosed);
        }
        if data.len() != self.page_size {
            return Err(DatabaseError::SizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        if page_id >= self.page_count {
            return Err(DatabaseError::InvalidPage {
                page_id,
                page_count: self.page_count,
            });
        }
        let offset = self.page_offset(page_id);
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.cache.put(page_id, data.to_vec());
        Ok(())
    }

    /// Appends one page, zero-padding `data` up to the page size.
    pub fn append_page(&mut self, data: &[u8]) -> Result<PageId> {
        if self.file.is_none() {
            return Err(DatabaseError::StoreClosed);
        }
        if data.len() > self.page_size {
            return Err(DatabaseError::SizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        let mut page = vec![0u8; self.page_size];
        page[..data.len()].copy_from_slice(data);

        let new_page_id = self.page_count;
        let offset = self.page_offset(new_page_id);
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page)?;
        self.page_count += 1;
        self.cache.put(new_page_id, page);
        Ok(new_page_id)
    }

    /// Forces written pages to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        let file = self.file_mut()?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.flush();
        self.file = None;
        self.cache.clear();
        result
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}
