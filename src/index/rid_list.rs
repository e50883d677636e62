//! Chains of pages holding the extra locators of a duplicated key:
//! `[tag u8][next u32][count u16][rid...]`.

use crate::{
    index::{
        file::IndexFile,
        header::{read_u16, read_u32},
    },
    types::{
        NO_PAGE, PageId, RID_SIZE,
        error::{DatabaseError, Result},
        rid::Rid,
    },
};

pub const RID_LIST_TAG: u8 = 0x10;
const LIST_HEADER_SIZE: usize = 7;

fn capacity(page_size: usize) -> usize {
    (page_size - LIST_HEADER_SIZE) / RID_SIZE
}

struct ListPage {
    next: PageId,
    rids: Vec<Rid>,
}

impl ListPage {
    fn from_bytes(page_id: PageId, bytes: &[u8]) -> Result<Self> {
        if bytes[0] != RID_LIST_TAG {
            return Err(DatabaseError::corrupt(format!(
                "Page {} is not a duplicate list page",
                page_id
            )));
        }
        let next = read_u32(bytes, 1);
        let count = read_u16(bytes, 5) as usize;
        if LIST_HEADER_SIZE + count * RID_SIZE > bytes.len() {
            return Err(DatabaseError::corrupt(format!(
                "Duplicate list page {} claims {} entries",
                page_id, count
            )));
        }
        let rids = (0..count)
            .map(|i| Rid::from_bytes(&bytes[LIST_HEADER_SIZE + i * RID_SIZE..]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { next, rids })
    }

    fn to_bytes(&self, page_size: usize) -> Vec<u8> {
        let mut page = vec![0u8; page_size];
        page[0] = RID_LIST_TAG;
        page[1..5].copy_from_slice(&self.next.to_le_bytes());
        page[5..7].copy_from_slice(&(self.rids.len() as u16).to_le_bytes());
        for (i, rid) in self.rids.iter().enumerate() {
            let at = LIST_HEADER_SIZE + i * RID_SIZE;
            page[at..at + RID_SIZE].copy_from_slice(&rid.to_bytes());
        }
        page
    }
}

/// Every locator in the chain starting at `head`, oldest first.
pub fn collect(file: &mut IndexFile, head: PageId) -> Result<Vec<Rid>> {
    let mut rids = Vec::new();
    let mut next = head;
    let mut hops = 0;
    while next != NO_PAGE {
        hops += 1;
        if hops > file.page_count() {
            return Err(DatabaseError::corrupt("Duplicate list has a cycle"));
        }
        let page = ListPage::from_bytes(next, &file.read(next)?)?;
        rids.extend(page.rids);
        next = page.next;
    }
    Ok(rids)
}

#[cfg(test)]
pub fn page_count(file: &mut IndexFile, head: PageId) -> Result<u32> {
    let mut count = 0;
    let mut next = head;
    while next != NO_PAGE {
        count += 1;
        if count > file.page_count() {
            return Err(DatabaseError::corrupt("Duplicate list has a cycle"));
        }
        next = ListPage::from_bytes(next, &file.read(next)?)?.next;
    }
    Ok(count)
}

/// Appends `rid` at the tail of the chain, returning the (possibly new) head.
pub fn append(file: &mut IndexFile, head: PageId, rid: Rid) -> Result<PageId> {
    let page_size = file.page_size();
    if head == NO_PAGE {
        let page = ListPage {
            next: NO_PAGE,
            rids: vec![rid],
        };
        return file.allocate(&page.to_bytes(page_size));
    }

    let mut current = head;
    loop {
        let mut page = ListPage::from_bytes(current, &file.read(current)?)?;
        if page.next != NO_PAGE {
            current = page.next;
            continue;
        }
        if page.rids.len() < capacity(page_size) {
            page.rids.push(rid);
            file.write(current, &page.to_bytes(page_size))?;
        } else {
            let tail = ListPage {
                next: NO_PAGE,
                rids: vec![rid],
            };
            let tail_id = file.allocate(&tail.to_bytes(page_size))?;
            page.next = tail_id;
            file.write(current, &page.to_bytes(page_size))?;
        }
        return Ok(head);
    }
}

/// Writes `rids` as a fresh chain. Returns `NO_PAGE` for an empty slice.
pub fn write_chain(file: &mut IndexFile, rids: &[Rid]) -> Result<PageId> {
    let page_size = file.page_size();
    let mut next = NO_PAGE;
    // Build back to front so each page knows its successor.
    let chunks: Vec<&[Rid]> = rids.chunks(capacity(page_size)).collect();
    for chunk in chunks.into_iter().rev() {
        let page = ListPage {
            next,
            rids: chunk.to_vec(),
        };
        next = file.allocate(&page.to_bytes(page_size))?;
    }
    Ok(next)
}

pub fn free_chain(file: &mut IndexFile, head: PageId) -> Result<()> {
    let mut next = head;
    let mut hops = 0;
    while next != NO_PAGE {
        hops += 1;
        if hops > file.page_count() {
            return Err(DatabaseError::corrupt("Duplicate list has a cycle"));
        }
        let page = ListPage::from_bytes(next, &file.read(next)?)?;
        file.free(next)?;
        next = page.next;
    }
    Ok(())
}

/// Drops the first occurrence of `rid`. Returns the new head and whether
/// anything was removed.
pub fn remove(file: &mut IndexFile, head: PageId, rid: Rid) -> Result<(PageId, bool)> {
    let mut rids = collect(file, head)?;
    let Some(position) = rids.iter().position(|r| *r == rid) else {
        return Ok((head, false));
    };
    rids.remove(position);
    free_chain(file, head)?;
    Ok((write_chain(file, &rids)?, true))
}

/// Takes the oldest locator off the chain.
pub fn pop_front(file: &mut IndexFile, head: PageId) -> Result<(Option<Rid>, PageId)> {
    let mut rids = collect(file, head)?;
    if rids.is_empty() {
        return Ok((None, head));
    }
    let first = rids.remove(0);
    free_chain(file, head)?;
    Ok((Some(first), write_chain(file, &rids)?))
}
