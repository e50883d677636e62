use std::{cmp::Ordering, path::Path};

use log::{debug, info};

use crate::{
    config::StorageConfig,
    index::{
        IndexKind, IndexStats, IndexStore, check_key, duplicate_key,
        file::IndexFile,
        header::{IndexHeader, read_u16, read_u32},
        rid_list,
    },
    types::{
        NO_PAGE, PageId, RID_SIZE,
        error::{DatabaseError, Result},
        rid::Rid,
        value::{DataType, Value},
    },
};

const LEAF_TAG: u8 = 0x01;
const INTERNAL_TAG: u8 = 0x02;
const NODE_HEADER_SIZE: usize = 7;

#[derive(Debug, Clone)]
struct LeafEntry {
    key: Value,
    rid: Rid,
    /// Extra locators for the key, oldest first.
    dup_head: PageId,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        entries: Vec<LeafEntry>,
        next: PageId,
    },
    Internal {
        keys: Vec<Value>,
        children: Vec<PageId>,
    },
}

/// Separator and new right sibling produced by a split.
#[derive(Debug)]
struct SplitResult {
    separator_key: Value,
    right_page_id: PageId,
}

/// B+ tree with one node per page. Leaves are linked left to right.
pub struct OrderedTreeIndex {
    file: IndexFile,
}

impl OrderedTreeIndex {
    /// Largest order whose full leaf and internal nodes fit one page.
    pub fn max_order_for(page_size: usize, key_type: &DataType) -> usize {
        let key_width = key_type.key_width();
        let leaf_fit = (page_size - NODE_HEADER_SIZE) / (key_width + RID_SIZE + 4) + 1;
        let internal_fit = (page_size - NODE_HEADER_SIZE - 4) / (key_width + 4) + 1;
        leaf_fit.min(internal_fit)
    }

    pub fn create(
        path: &Path,
        key_type: DataType,
        unique: bool,
        config: &StorageConfig,
    ) -> Result<Self> {
        let order = config
            .ordered_tree_order
            .min(Self::max_order_for(config.page_size, &key_type));
        if order < 3 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "ordered tree order {} is below 3 for {} keys in {}-byte pages",
                    order, key_type, config.page_size
                ),
            });
        }

        let mut header = IndexHeader::new(IndexKind::Ordered, key_type, unique, config.page_size);
        header.param_order = order as u32;
        header.param_aux = 1; // height
        let file = IndexFile::create(path, header, config.page_cache_pages)?;

        let mut tree = Self { file };
        let root = Node::Leaf {
            entries: Vec::new(),
            next: NO_PAGE,
        };
        let root_id = tree.allocate_node(&root)?;
        tree.file.header.root_page = root_id;
        tree.file.sync_header()?;
        info!(
            "Created ordered tree index {} (order {})",
            path.display(),
            order
        );
        Ok(tree)
    }

    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = IndexFile::open(path, IndexKind::Ordered, config.page_cache_pages)?;
        if file.header.param_order < 3 || file.header.root_page == NO_PAGE {
            return Err(DatabaseError::corrupt(format!(
                "{}: ordered tree header is incomplete",
                path.display()
            )));
        }
        Ok(Self { file })
    }

    pub fn order(&self) -> usize {
        self.file.header.param_order as usize
    }

    pub fn height(&self) -> u32 {
        self.file.header.param_aux
    }

    pub fn split_count(&self) -> u32 {
        self.file.header.param_extra
    }

    fn max_keys(&self) -> usize {
        self.order() - 1
    }

    fn load_node(&mut self, page_id: PageId) -> Result<Node> {
        let bytes = self.file.read(page_id)?;
        let key_type = self.file.header.key_type.clone();
        let key_width = key_type.key_width();
        let count = read_u16(&bytes, 1) as usize;
        match bytes[0] {
            LEAF_TAG => {
                let entry_size = key_width + RID_SIZE + 4;
                if NODE_HEADER_SIZE + count * entry_size > bytes.len() {
                    return Err(DatabaseError::corrupt(format!(
                        "Leaf {} claims {} entries",
                        page_id, count
                    )));
                }
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    let at = NODE_HEADER_SIZE + i * entry_size;
                    entries.push(LeafEntry {
                        key: key_type.decode_key(&bytes[at..at + key_width])?,
                        rid: Rid::from_bytes(&bytes[at + key_width..])?,
                        dup_head: read_u32(&bytes, at + key_width + RID_SIZE),
                    });
                }
                Ok(Node::Leaf {
                    entries,
                    next: read_u32(&bytes, 3),
                })
            }
            INTERNAL_TAG => {
                let entry_size = key_width + 4;
                if NODE_HEADER_SIZE + 4 + count * entry_size > bytes.len() {
                    return Err(DatabaseError::corrupt(format!(
                        "Internal node {} claims {} keys",
                        page_id, count
                    )));
                }
                let mut keys = Vec::with_capacity(count);
                let mut children = Vec::with_capacity(count + 1);
                children.push(read_u32(&bytes, 3));
                for i in 0..count {
                    let at = NODE_HEADER_SIZE + i * entry_size;
                    keys.push(key_type.decode_key(&bytes[at..at + key_width])?);
                    children.push(read_u32(&bytes, at + key_width));
                }
                Ok(Node::Internal { keys, children })
            }
            tag => Err(DatabaseError::corrupt(format!(
                "Page {} has tag {:#x}, not an ordered tree node",
                page_id, tag
            ))),
        }
    }

    fn encode_node(&self, node: &Node) -> Result<Vec<u8>> {
        let key_type = &self.file.header.key_type;
        let key_width = key_type.key_width();
        let mut page = self.file.blank_page();
        match node {
            Node::Leaf { entries, next } => {
                page[0] = LEAF_TAG;
                page[1..3].copy_from_slice(&(entries.len() as u16).to_le_bytes());
                page[3..7].copy_from_slice(&next.to_le_bytes());
                let entry_size = key_width + RID_SIZE + 4;
                for (i, entry) in entries.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * entry_size;
                    key_type.encode_key(&entry.key, &mut page[at..at + key_width])?;
                    page[at + key_width..at + key_width + RID_SIZE]
                        .copy_from_slice(&entry.rid.to_bytes());
                    page[at + key_width + RID_SIZE..at + entry_size]
                        .copy_from_slice(&entry.dup_head.to_le_bytes());
                }
            }
            Node::Internal { keys, children } => {
                page[0] = INTERNAL_TAG;
                page[1..3].copy_from_slice(&(keys.len() as u16).to_le_bytes());
                page[3..7].copy_from_slice(&children[0].to_le_bytes());
                let entry_size = key_width + 4;
                for (i, key) in keys.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * entry_size;
                    key_type.encode_key(key, &mut page[at..at + key_width])?;
                    page[at + key_width..at + entry_size]
                        .copy_from_slice(&children[i + 1].to_le_bytes());
                }
            }
        }
        Ok(page)
    }

    fn write_node(&mut self, page_id: PageId, node: &Node) -> Result<()> {
        let bytes = self.encode_node(node)?;
        self.file.write(page_id, &bytes)
    }

    fn allocate_node(&mut self, node: &Node) -> Result<PageId> {
        let bytes = self.encode_node(node)?;
        self.file.allocate(&bytes)
    }

    /// Index of the child to follow: the number of separators `<= key`.
    fn find_child_index(keys: &[Value], key: &Value) -> usize {
        keys.partition_point(|sep| sep.key_cmp(key) != Ordering::Greater)
    }

    fn find_leaf(&mut self, key: &Value) -> Result<(PageId, Vec<LeafEntry>, PageId)> {
        let mut page_id = self.file.header.root_page;
        for _ in 0..=self.height() {
            match self.load_node(page_id)? {
                Node::Leaf { entries, next } => return Ok((page_id, entries, next)),
                Node::Internal { keys, children } => {
                    page_id = children[Self::find_child_index(&keys, key)];
                }
            }
        }
        Err(DatabaseError::corrupt(
            "Ordered tree is deeper than its recorded height",
        ))
    }

    fn insert_recursive(
        &mut self,
        page_id: PageId,
        key: &Value,
        rid: Rid,
    ) -> Result<Option<SplitResult>> {
        match self.load_node(page_id)? {
            Node::Leaf {
                mut entries,
                next,
            } => {
                match entries.binary_search_by(|e| e.key.key_cmp(key)) {
                    Ok(position) => {
                        if self.file.header.unique {
                            return Err(duplicate_key(key));
                        }
                        let head = entries[position].dup_head;
                        entries[position].dup_head = rid_list::append(&mut self.file, head, rid)?;
                        self.write_node(page_id, &Node::Leaf { entries, next })?;
                        Ok(None)
                    }
                    Err(position) => {
                        entries.insert(
                            position,
                            LeafEntry {
                                key: key.clone(),
                                rid,
                                dup_head: NO_PAGE,
                            },
                        );
                        if entries.len() <= self.max_keys() {
                            self.write_node(page_id, &Node::Leaf { entries, next })?;
                            return Ok(None);
                        }
                        self.split_leaf(page_id, entries, next).map(Some)
                    }
                }
            }
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let child_index = Self::find_child_index(&keys, key);
                let split = self.insert_recursive(children[child_index], key, rid)?;
                let Some(split) = split else {
                    return Ok(None);
                };
                keys.insert(child_index, split.separator_key);
                children.insert(child_index + 1, split.right_page_id);
                if keys.len() <= self.max_keys() {
                    self.write_node(page_id, &Node::Internal { keys, children })?;
                    return Ok(None);
                }
                self.split_internal(page_id, keys, children).map(Some)
            }
        }
    }

    fn split_leaf(
        &mut self,
        page_id: PageId,
        mut entries: Vec<LeafEntry>,
        next: PageId,
    ) -> Result<SplitResult> {
        let split_point = entries.len() / 2;
        let right_entries = entries.split_off(split_point);
        let separator_key = right_entries[0].key.clone();
        let right_page_id = self.allocate_node(&Node::Leaf {
            entries: right_entries,
            next,
        })?;
        self.write_node(
            page_id,
            &Node::Leaf {
                entries,
                next: right_page_id,
            },
        )?;
        self.file.header.param_extra += 1;
        debug!(
            "Split leaf {} into {} at {}",
            page_id, right_page_id, separator_key
        );
        Ok(SplitResult {
            separator_key,
            right_page_id,
        })
    }

    fn split_internal(
        &mut self,
        page_id: PageId,
        mut keys: Vec<Value>,
        mut children: Vec<PageId>,
    ) -> Result<SplitResult> {
        let split_point = keys.len() / 2;
        let right_keys = keys.split_off(split_point + 1);
        let separator_key = keys.pop().ok_or_else(|| {
            DatabaseError::corrupt(format!("Internal node {} split with no keys", page_id))
        })?;
        let right_children = children.split_off(split_point + 1);
        let right_page_id = self.allocate_node(&Node::Internal {
            keys: right_keys,
            children: right_children,
        })?;
        self.write_node(page_id, &Node::Internal { keys, children })?;
        self.file.header.param_extra += 1;
        debug!(
            "Split internal node {} into {}, promoting {}",
            page_id, right_page_id, separator_key
        );
        Ok(SplitResult {
            separator_key,
            right_page_id,
        })
    }

    /// Every `(key, rid)` pair in key order, duplicates in insertion order.
    pub fn entries(&mut self) -> Result<Vec<(Value, Rid)>> {
        let mut page_id = self.file.header.root_page;
        loop {
            match self.load_node(page_id)? {
                Node::Leaf { .. } => break,
                Node::Internal { children, .. } => page_id = children[0],
            }
        }
        let mut out = Vec::with_capacity(self.file.header.entry_count as usize);
        while page_id != NO_PAGE {
            let Node::Leaf { entries, next } = self.load_node(page_id)? else {
                return Err(DatabaseError::corrupt("Leaf chain reaches an internal node"));
            };
            for entry in entries {
                out.push((entry.key.clone(), entry.rid));
                for rid in rid_list::collect(&mut self.file, entry.dup_head)? {
                    out.push((entry.key.clone(), rid));
                }
            }
            page_id = next;
        }
        Ok(out)
    }
}

impl IndexStore for OrderedTreeIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ordered
    }

    fn key_type(&self) -> &DataType {
        &self.file.header.key_type
    }

    fn is_unique(&self) -> bool {
        self.file.header.unique
    }

    fn insert(&mut self, key: &Value, rid: Rid) -> Result<()> {
        check_key(&self.file.header.key_type, key)?;
        let root_page_id = self.file.header.root_page;
        if let Some(split) = self.insert_recursive(root_page_id, key, rid)? {
            let new_root = Node::Internal {
                keys: vec![split.separator_key],
                children: vec![root_page_id, split.right_page_id],
            };
            let new_root_id = self.allocate_node(&new_root)?;
            self.file.header.root_page = new_root_id;
            self.file.header.param_aux += 1;
            debug!(
                "Root split: new root {} height {}",
                new_root_id, self.file.header.param_aux
            );
        }
        self.file.header.entry_count += 1;
        Ok(())
    }

    fn search(&mut self, key: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, key)?;
        let (_, entries, _) = self.find_leaf(key)?;
        match entries.binary_search_by(|e| e.key.key_cmp(key)) {
            Ok(position) => {
                let entry = &entries[position];
                let mut rids = vec![entry.rid];
                rids.extend(rid_list::collect(&mut self.file, entry.dup_head)?);
                Ok(rids)
            }
            Err(_) => Ok(Vec::new()),
        }
    }

    fn range(&mut self, low: &Value, high: &Value) -> Result<Vec<Rid>> {
        check_key(&self.file.header.key_type, low)?;
        check_key(&self.file.header.key_type, high)?;
        if low.key_cmp(high) == Ordering::Greater {
            return Ok(Vec::new());
        }
        let (_, mut entries, mut next) = self.find_leaf(low)?;
        let mut rids = Vec::new();
        loop {
            for entry in &entries {
                if entry.key.key_cmp(low) == Ordering::Less {
                    continue;
                }
                if entry.key.key_cmp(high) == Ordering::Greater {
                    return Ok(rids);
                }
                rids.push(entry.rid);
                rids.extend(rid_list::collect(&mut self.file, entry.dup_head)?);
            }
            if next == NO_PAGE {
                return Ok(rids);
            }
            match self.load_node(next)? {
                Node::Leaf {
                    entries: next_entries,
                    next: following,
                } => {
                    entries = next_entries;
                    next = following;
                }
                Node::Internal { .. } => {
                    return Err(DatabaseError::corrupt("Leaf chain reaches an internal node"));
                }
            }
        }
    }

    fn remove(&mut self, key: &Value) -> Result<usize> {
        check_key(&self.file.header.key_type, key)?;
        let (page_id, mut entries, next) = self.find_leaf(key)?;
        let Ok(position) = entries.binary_search_by(|e| e.key.key_cmp(key)) else {
            return Ok(0);
        };
        let entry = entries.remove(position);
        let removed = 1 + rid_list::collect(&mut self.file, entry.dup_head)?.len();
        rid_list::free_chain(&mut self.file, entry.dup_head)?;
        self.write_node(page_id, &Node::Leaf { entries, next })?;
        self.file.header.entry_count -= removed as u64;
        Ok(removed)
    }

    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool> {
        check_key(&self.file.header.key_type, key)?;
        let (page_id, mut entries, next) = self.find_leaf(key)?;
        let Ok(position) = entries.binary_search_by(|e| e.key.key_cmp(key)) else {
            return Ok(false);
        };
        let head = entries[position].dup_head;
        if entries[position].rid == rid {
            match rid_list::pop_front(&mut self.file, head)? {
                (Some(promoted), new_head) => {
                    entries[position].rid = promoted;
                    entries[position].dup_head = new_head;
                }
                (None, _) => {
                    entries.remove(position);
                }
            }
        } else {
            let (new_head, removed) = rid_list::remove(&mut self.file, head, rid)?;
            if !removed {
                return Ok(false);
            }
            entries[position].dup_head = new_head;
        }
        self.write_node(page_id, &Node::Leaf { entries, next })?;
        self.file.header.entry_count -= 1;
        Ok(true)
    }

    fn len(&self) -> u64 {
        self.file.header.entry_count
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::new(IndexKind::Ordered);
        stats.entries = self.file.header.entry_count;
        stats.pages = self.file.page_count();
        stats.free_pages = self.file.free_page_count()?;
        stats.height = self.height();
        stats.splits = self.split_count() as u64;
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.file.close()
    }
}
