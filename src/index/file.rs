use std::path::Path;

use log::{debug, warn};

use crate::{
    index::{
        IndexKind,
        header::{INDEX_HEADER_SIZE, IndexHeader, read_u32},
    },
    storage::page_store::PageStore,
    types::{
        NO_PAGE, PageId,
        error::{DatabaseError, Result},
    },
};

/// Tag byte of a page sitting on the free list.
pub const FREE_PAGE_TAG: u8 = 0xFF;

/// An index's page file plus its header page. Pages released with
/// [`IndexFile::free`] are reused by later allocations.
pub struct IndexFile {
    store: PageStore,
    pub header: IndexHeader,
}

impl IndexFile {
    pub fn create(path: &Path, header: IndexHeader, cache_pages: usize) -> Result<Self> {
        if (header.page_size as usize) < INDEX_HEADER_SIZE {
            return Err(DatabaseError::InvalidConfig {
                details: format!("page size {} cannot hold the index header", header.page_size),
            });
        }
        let mut store = PageStore::create_truncated(path, header.page_size as usize, cache_pages)?;
        let mut header = header;
        header.page_count = 1;
        store.append_page(&header.to_bytes())?;
        debug!("Created {} index file {}", header.kind, path.display());
        Ok(Self { store, header })
    }

    pub fn open(path: &Path, kind: IndexKind, cache_pages: usize) -> Result<Self> {
        let header = IndexHeader::peek(path)?;
        if header.kind != kind {
            return Err(DatabaseError::corrupt(format!(
                "{} holds a {} index, expected {}",
                path.display(),
                header.kind,
                kind
            )));
        }
        let store = PageStore::open_with_cache(path, header.page_size as usize, cache_pages)?;
        if store.page_count() != header.page_count {
            warn!(
                "{}: header records {} pages but file has {}",
                path.display(),
                header.page_count,
                store.page_count()
            );
            return Err(DatabaseError::corrupt(format!(
                "{}: header records {} pages but file has {}",
                path.display(),
                header.page_count,
                store.page_count()
            )));
        }
        Ok(Self { store, header })
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

    pub fn blank_page(&self) -> Vec<u8> {
        vec![0u8; self.page_size()]
    }

    pub fn read(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        if page_id == 0 || page_id == NO_PAGE {
            return Err(DatabaseError::InvalidPage {
                page_id,
                page_count: self.store.page_count(),
            });
        }
        let page = self.store.read_page(page_id)?;
        if page[0] == FREE_PAGE_TAG {
            return Err(DatabaseError::corrupt(format!(
                "{}: page {} is on the free list",
                self.path().display(),
                page_id
            )));
        }
        Ok(page)
    }

    pub fn write(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if page_id == 0 {
            return Err(DatabaseError::InvalidPage {
                page_id,
                page_count: self.store.page_count(),
            });
        }
        self.store.write_page(page_id, data)
    }

    /// Stores `data` in a recycled page if one is free, else in a new one.
    pub fn allocate(&mut self, data: &[u8]) -> Result<PageId> {
        if data.len() > self.page_size() {
            return Err(DatabaseError::SizeMismatch {
                expected: self.page_size(),
                actual: data.len(),
            });
        }
        let page_id = if self.header.free_head != NO_PAGE {
            let page_id = self.header.free_head;
            let free = self.store.read_page(page_id)?;
            if free[0] != FREE_PAGE_TAG {
                return Err(DatabaseError::corrupt(format!(
                    "{}: free list points at live page {}",
                    self.path().display(),
                    page_id
                )));
            }
            self.header.free_head = read_u32(&free, 1);
            let mut page = self.blank_page();
            page[..data.len()].copy_from_slice(data);
            self.store.write_page(page_id, &page)?;
            page_id
        } else {
            self.store.append_page(data)?
        };
        self.header.page_count = self.store.page_count();
        Ok(page_id)
    }

    pub fn free(&mut self, page_id: PageId) -> Result<()> {
        let mut page = self.blank_page();
        page[0] = FREE_PAGE_TAG;
        page[1..5].copy_from_slice(&self.header.free_head.to_le_bytes());
        self.store.write_page(page_id, &page)?;
        self.header.free_head = page_id;
        Ok(())
    }

    pub fn free_page_count(&mut self) -> Result<u32> {
        let mut count = 0;
        let mut next = self.header.free_head;
        while next != NO_PAGE {
            if count > self.store.page_count() {
                return Err(DatabaseError::corrupt("Free list has a cycle"));
            }
            let page = self.store.read_page(next)?;
            next = read_u32(&page, 1);
            count += 1;
        }
        Ok(count)
    }

    /// Writes the in-memory header back to page 0.
    pub fn sync_header(&mut self) -> Result<()> {
        self.header.page_count = self.store.page_count();
        let mut page = self.blank_page();
        let bytes = self.header.to_bytes();
        page[..bytes.len()].copy_from_slice(&bytes);
        self.store.write_page(0, &page)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sync_header()?;
        self.store.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.store.is_closed() {
            return Ok(());
        }
        self.sync_header()?;
        self.store.close()
    }
}

impl Drop for IndexFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close index file {}: {}", self.path().display(), e);
        }
    }
}
