use std::{cmp::Ordering, path::Path};

use log::{debug, info};

use crate::{
    config::StorageConfig,
    index::{
        IndexKind, IndexStats, IndexStore, check_key, duplicate_key,
        file::IndexFile,
        header::{IndexHeader, read_u32},
        rid_list,
    },
    types::{
        NO_PAGE, PageId, RID_SIZE,
        error::{DatabaseError, Result},
        rid::Rid,
        value::{DataType, Value},
    },
};

const NODE_TAG: u8 = 0x31;
// tag, height, left, right, dup_head, rid
const KEY_OFFSET: usize = 1 + 1 + 4 + 4 + 4 + RID_SIZE;

#[derive(Debug, Clone)]
struct AvlNode {
    height: u8,
    left: PageId,
    right: PageId,
    dup_head: PageId,
    rid: Rid,
    key: Value,
}

/// AVL tree with one key per page. Removed nodes go back to the free list.
pub struct BalancedTreeIndex {
    file: IndexFile,
}

impl BalancedTreeIndex {
    pub fn create(
        path: &Path,
        key_type: DataType,
        unique: bool,
        config: &StorageConfig,
    ) -> Result<Self> {
        if KEY_OFFSET + key_type.key_width() > config.page_size {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "{} keys do not fit {}-byte balanced tree pages",
                    key_type, config.page_size
                ),
            });
        }
        let header = IndexHeader::new(IndexKind::Balanced, key_type, unique, config.page_size);
        let file = IndexFile::create(path, header, config.page_cache_pages)?;
        info!("Created balanced tree index {}", path.display());
        Ok(Self { file })
    }

    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = IndexFile::open(path, IndexKind::Balanced, config.page_cache_pages)?;
        Ok(Self { file })
    }

    pub fn rotation_count(&self) -> u32 {
        self.file.header.param_aux
    }

    pub fn height(&mut self) -> Result<u32> {
        let root = self.file.header.root_page;
        Ok(self.height_of(root)? as u32)
    }

    fn load(&mut self, page_id: PageId) -> Result<AvlNode> {
        let bytes = self.file.read(page_id)?;
        if bytes[0] != NODE_TAG {
            return Err(DatabaseError::corrupt(format!(
                "Page {} is not a balanced tree node",
                page_id
            )));
        }
        let key_type = &self.file.header.key_type;
        Ok(AvlNode {
            height: bytes[1],
            left: read_u32(&bytes, 2),
            right: read_u32(&bytes, 6),
            dup_head: read_u32(&bytes, 10),
            rid: Rid::from_bytes(&bytes[14..])?,
            key: key_type.decode_key(&bytes[KEY_OFFSET..])?,
        })
    }

    fn encode(&self, node: &AvlNode) -> Result<Vec<u8>> {
        let mut page = self.file.blank_page();
        page[0] = NODE_TAG;
        page[1] = node.height;
        page[2..6].copy_from_slice(&node.left.to_le_bytes());
        page[6..10].copy_from_slice(&node.right.to_le_bytes());
        page[10..14].copy_from_slice(&node.dup_head.to_le_bytes());
        page[14..22].copy_from_slice(&node.rid.to_bytes());
        self.file
            .header
            .key_type
            .encode_key(&node.key, &mut page[KEY_OFFSET..])?;
        Ok(page)
    }

    fn store(&mut self, page_id: PageId, node: &AvlNode) -> Result<()> {
        let bytes = self.encode(node)?;
        self.file.write(page_id, &bytes)
    }

    fn height_of(&mut self, page_id: PageId) -> Result<u8> {
        if page_id == NO_PAGE {
            Ok(0)
        } else {
            Ok(self.load(page_id)?.height)
        }
    }

    fn refresh_height(&mut self, node: &mut AvlNode) -> Result<()> {
        node.height = 1 + self.height_of(node.left)?.max(self.height_of(node.right)?);
        Ok(())
    }

    fn rotate_right(&mut self, y_id: PageId) -> Result<PageId> {
        let mut y = self.load(y_id)?;
        let x_id = y.left;
        let mut x = self.load(x_id)?;
        y.left = x.right;
        self.refresh_height(&mut y)?;
        self.store(y_id, &y)?;
        x.right = y_id;
        self.refresh_height(&mut x)?;
        self.store(x_id, &x)?;
        self.file.header.param_aux += 1;
        Ok(x_id)
    }

    fn rotate_left(&mut self, x_id: PageId) -> Result<PageId> {
        let mut x = self.load(x_id)?;
        let y_id = x.right;
        let mut y = self.load(y_id)?;
        x.right = y.left;
        self.refresh_height(&mut x)?;
        self.store(x_id, &x)?;
        y.left = x_id;
        self.refresh_height(&mut y)?;
        self.store(y_id, &y)?;
        self.file.header.param_aux += 1;
        Ok(y_id)
    }

    /// Stores `node` at `page_id` with a fresh height and restores the AVL
    /// invariant there, returning the subtree's new root.
    fn rebalance(&mut self, page_id: PageId, mut node: AvlNode) -> Result<PageId> {
        self.refresh_height(&mut node)?;
        self.store(page_id, &node)?;

        let balance = self.height_of(node.left)? as i32 - self.height_of(node.right)? as i32;
        if balance > 1 {
            let left = self.load(node.left)?;
            if self.height_of(left.left)? < self.height_of(left.right)? {
                node.left = self.rotate_left(node.left)?;
                self.store(page_id, &node)?;
                debug!("Left-right rotation at page {}", page_id);
            }
            return self.rotate_right(page_id);
        }
        if balance < -1 {
            let right = self.load(node.right)?;
            if self.height_of(right.right)? < self.height_of(right.left)? {
                node.right = self.rotate_right(node.right)?;
                self.store(page_id, &node)?;
                debug!("Right-left rotation at page {}", page_id);
            }
            return self.rotate_left(page_id);
        }
        Ok(page_id)
    }

    fn insert_at(&mut self, page_id: PageId, key: &Value, rid: Rid) -> Result<PageId> {
        if page_id == NO_PAGE {
            let node = AvlNode {
                height: 1,
                left: NO_PAGE,
                right: NO_PAGE,
                dup_head: NO_PAGE,
                rid,
                key: key.clone(),
            };
            let bytes = self.encode(&node)?;
            return self.file.allocate(&bytes);
        }
        let mut node = self.load(page_id)?;
        match key.key_cmp(&node.key) {
            Ordering::Less => node.left = self.insert_at(node.left, key, rid)?,
            Ordering::Greater => node.right = self.insert_at(node.right, key, rid)?,
            Ordering::Equal => {
                if self.file.header.unique {
                    return Err(duplicate_key(key));
                }
                node.dup_head = rid_list::append(&mut self.file, node.dup_head, rid)?;
                self.store(page_id, &node)?;
                return Ok(page_id);
            }
        }
        self.rebalance(page_id, node)
    }

    /// Unlinks the leftmost node of the subtree, returning the new subtree
    /// root and the detached node. Its page is freed.
    fn detach_min(&mut self, page_id: PageId) -> Result<(PageId, AvlNode)> {
        let mut node = self.load(page_id)?;
        if node.left == NO_PAGE {
            self.file.free(page_id)?;
            return Ok((node.right, node));
        }
        let (new_left, min) = self.detach_min(node.left)?;
        node.left = new_left;
        Ok((self.rebalance(page_id, node)?, min))
    }

    /// Removes the node holding `key`, returning the new subtree root and the
    /// number of locators that went with it.
    fn remove_at(&mut self, page_id: PageId, key: &Value) -> Result<(PageId, usize)> {
        if page_id == NO_PAGE {
            return Ok((NO_PAGE, 0));
        }
        let mut node = self.load(page_id)?;
        let removed = match key.key_cmp(&node.key) {
            Ordering::Less => {
                let (new_left, removed) = self.remove_at(node.left, key)?;
                node.left = new_left;
                removed
            }
            Ordering::Greater => {
                let (new_right, removed) = self.remove_at(node.right, key)?;
                node.right = new_right;
                removed
            }
            Ordering::Equal => {
                let removed = 1 + rid_list::collect(&mut self.file, node.dup_head)?.len();
                rid_list::free_chain(&mut self.file, node.dup_head)?;
                if node.left == NO_PAGE || node.right == NO_PAGE {
                    let child = if node.left == NO_PAGE {
                        node.right
                    } else {
                        node.left
                    };
                    self.file.free(page_id)?;
                    return Ok((child, removed));
                }
                let (new_right, successor) = self.detach_min(node.right)?;
                node.right = new_right;
                node.key = successor.key;
                node.rid = successor.rid;
                node.dup_head = successor.dup_head;
                removed
            }
        };
        if removed == 0 {
            return Ok((page_id, 0));
        }
        Ok((self.rebalance(page_id, node)?, removed))
    }

    fn find(&mut self, key: &Value) -> Result<Option<(PageId, AvlNode)>> {
        let mut page_id = self.file.header.root_page;
        while page_id != NO_PAGE {
            let node = self.load(page_id)?;
            match key.key_cmp(&node.key) {
                Ordering::Less => page_id = node.left,
                Ordering::Greater => page_id = node.right,
                Ordering::Equal => return Ok(Some((page_id, node))),
            }
        }
        Ok(None)
    }

    fn collect_range(
        &mut self,
        page_id: PageId,
        low: &Value,
        high: &Value,
        out: &mut Vec<Rid>,
    ) -> Result<()> {
        if page_id == NO_PAGE {
            return Ok(());
        }
        let node = self.load(page_id)?;
        let above_low = node.key.key_cmp(low) == Ordering::Greater;
        let below_high = node.key.key_cmp(high) == Ordering::Less;
        if above_low {
            self.collect_range(node.left, low, high, out)?;
        }
        if node.key.key_cmp(low) != Ordering::Less && node.key.key_cmp(high) != Ordering::Greater {
            out.push(node.rid);
            out.extend(rid_list::collect(&mut self.file, node.dup_head)?);
        }
        if below_high {
            self.collect_range(node.right, low, high, out)?;
        }
        Ok(())
    }

    /// Checks ordering and balance of every node, returning the tree height.
    pub fn verify(&mut self) -> Result<u32> {
        let root = self.file.header.root_page;
        self.verify_at(root, None, None).map(|h| h as u32)
    }

    fn verify_at(&mut self, page_id: PageId, low: Option<&Value>, high: Option<&Value>) -> Result<u8> {
        if page_id == NO_PAGE {
            return Ok(0);
        }
        let node = self.load(page_id)?;
        if low.is_some_and(|l| node.key.key_cmp(l) != Ordering::Greater)
            || high.is_some_and(|h| node.key.key_cmp(h) != Ordering::Less)
        {
            return Err(DatabaseError::corrupt(format!(
                "Node {} key {} is out of order",
                page_id, node.key
            )));
        }
        let left = self.verify_at(node.left, low, Some(&node.key))?;
        let right = self.verify_at(node.right, Some(&node.key), high)?;
        if left.abs_diff(right) > 1 || node.height != 1 + left.max(right) {
            return Err(DatabaseError::corrupt(format!(
                "Node {} is unbalanced or has a stale height",
                page_id
            )));
        }
        Ok(node.height)
    }
}

impl IndexStore for BalancedTreeIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Balanced
    }

    fn key_type(&self) -> &DataType {
        &self.file.header.key_type
    }

    fn is_unique(&self) -> bool {
        self.file.header.unique
    }

    fn insert(&mut self, key: &Value, rid: Rid) -> Result<()> {
        check_key(&self.file.header.key_type, key)?;
        let root = self.file.header.root_page;
        self.file.header.root_page = self.insert_at(root, key, rid)?;
        self.file.header.entry_count += 1;
        Ok(())
    }

    fn search(&mut self, key: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, key)?;
        match self.find(key)? {
            Some((_, node)) => {
                let mut rids = vec![node.rid];
                rids.extend(rid_list::collect(&mut self.file, node.dup_head)?);
                Ok(rids)
            }
            None => Ok(Vec::new()),
        }
    }

    fn range(&mut self, low: &Value, high: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, low)?;
        check_key(&self.file.header.key_type, high)?;
        let mut rids = Vec::new();
        if low.key_cmp(high) == Ordering::Greater {
            return Ok(rids);
        }
        let root = self.file.header.root_page;
        self.collect_range(root, low, high, &mut rids)?;
        Ok(rids)
    }

    fn remove(&mut self, key: &Value) -> Result<usize> {
        check_key(&self.file.header.key_type, key)?;
        let root = self.file.header.root_page;
        let (new_root, removed) = self.remove_at(root, key)?;
        self.file.header.root_page = new_root;
        self.file.header.entry_count -= removed as u64;
        Ok(removed)
    }

    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool> {
        check_key(&self.file.header.key_type, key)?;
        let Some((page_id, mut node)) = self.find(key)? else {
            return Ok(false);
        };
        if node.rid == rid {
            match rid_list::pop_front(&mut self.file, node.dup_head)? {
                (Some(promoted), new_head) => {
                    node.rid = promoted;
                    node.dup_head = new_head;
                    self.store(page_id, &node)?;
                    self.file.header.entry_count -= 1;
                    Ok(true)
                }
                (None, _) => Ok(self.remove(key)? == 1),
            }
        } else {
            let (new_head, removed) = rid_list::remove(&mut self.file, node.dup_head, rid)?;
            if removed {
                node.dup_head = new_head;
                self.store(page_id, &node)?;
                self.file.header.entry_count -= 1;
            }
            Ok(removed)
        }
    }

    fn len(&self) -> u64 {
        self.file.header.entry_count
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::new(IndexKind::Balanced);
        stats.entries = self.file.header.entry_count;
        stats.pages = self.file.page_count();
        stats.free_pages = self.file.free_page_count()?;
        stats.height = self.height()?;
        stats.rotations = self.rotation_count() as u64;
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.file.close()
    }
}
