use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    path::Path,
};

use log::{debug, info};

use crate::{
    config::StorageConfig,
    index::{
        IndexKind, IndexStats, IndexStore, check_key, duplicate_key,
        file::IndexFile,
        header::{IndexHeader, read_u16, read_u32, read_u64},
    },
    types::{
        NO_PAGE, PageId, RID_SIZE,
        error::{DatabaseError, Result},
        rid::Rid,
        value::{DataType, Point, Value},
    },
};

const LEAF_TAG: u8 = 0x51;
const INTERNAL_TAG: u8 = 0x52;
const NODE_HEADER_SIZE: usize = 7;
const LEAF_ENTRY_SIZE: usize = 16 + RID_SIZE + 8;
const CHILD_ENTRY_SIZE: usize = 32 + 4;

/// Axis-aligned minimum bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_point(point: Point) -> Self {
        Self::new(point.x, point.y, point.x, point.y)
    }

    pub fn area(&self) -> f64 {
        (self.max_x - self.min_x) * (self.max_y - self.min_y)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn enlargement(&self, other: &Rect) -> f64 {
        self.union(other).area() - self.area()
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// MINDIST: distance from `point` to the nearest point of the rectangle.
    pub fn min_dist(&self, point: &Point) -> f64 {
        let dx = (self.min_x - point.x).max(0.0).max(point.x - self.max_x);
        let dy = (self.min_y - point.y).max(0.0).max(point.y - self.max_y);
        (dx * dx + dy * dy).sqrt()
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.min_x.to_le_bytes());
        buf[8..16].copy_from_slice(&self.min_y.to_le_bytes());
        buf[16..24].copy_from_slice(&self.max_x.to_le_bytes());
        buf[24..32].copy_from_slice(&self.max_y.to_le_bytes());
    }

    fn read(buf: &[u8]) -> Self {
        Rect::new(read_f64(buf, 0), read_f64(buf, 8), read_f64(buf, 16), read_f64(buf, 24))
    }
}

fn read_f64(buf: &[u8], at: usize) -> f64 {
    f64::from_bits(read_u64(buf, at))
}

/// One result of a spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMatch {
    pub rid: Rid,
    pub point: Point,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct LeafEntry {
    point: Point,
    rid: Rid,
    sequence: u64,
}

#[derive(Debug, Clone, Copy)]
struct ChildEntry {
    mbr: Rect,
    child: PageId,
}

#[derive(Debug, Clone)]
enum SpatialNode {
    Leaf(Vec<LeafEntry>),
    Internal(Vec<ChildEntry>),
}

impl SpatialNode {
    fn len(&self) -> usize {
        match self {
            SpatialNode::Leaf(entries) => entries.len(),
            SpatialNode::Internal(children) => children.len(),
        }
    }

    fn mbr(&self) -> Option<Rect> {
        match self {
            SpatialNode::Leaf(entries) => entries
                .iter()
                .map(|e| Rect::from_point(e.point))
                .reduce(|a, b| a.union(&b)),
            SpatialNode::Internal(children) => {
                children.iter().map(|c| c.mbr).reduce(|a, b| a.union(&b))
            }
        }
    }
}

/// Outcome of inserting below a node: its new MBR and, after a split, the
/// new sibling with its MBR.
struct InsertOutcome {
    mbr: Rect,
    split: Option<ChildEntry>,
}

/// Best-first queue item for k-nearest-neighbour search.
#[derive(Debug)]
struct QueueItem {
    distance: f64,
    /// Nodes (0) expand before entries (1) at equal distance.
    rank: u8,
    sequence: u64,
    target: QueueTarget,
}

#[derive(Debug)]
enum QueueTarget {
    Node(PageId),
    Entry(Rid, Point),
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    // Reversed so the max-heap pops the closest item first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.rank.cmp(&other.rank))
            .then(self.sequence.cmp(&other.sequence))
            .reverse()
    }
}

/// Splits `items` into two groups with Guttman's quadratic heuristic.
fn quadratic_split<T: Copy>(
    items: Vec<T>,
    rect_of: impl Fn(&T) -> Rect,
    min_fill: usize,
) -> (Vec<T>, Vec<T>) {
    let rects: Vec<Rect> = items.iter().map(&rect_of).collect();

    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            let waste = rects[i].union(&rects[j]).area() - rects[i].area() - rects[j].area();
            if waste > worst {
                worst = waste;
                seeds = (i, j);
            }
        }
    }

    let mut left = vec![items[seeds.0]];
    let mut right = vec![items[seeds.1]];
    let mut left_mbr = rects[seeds.0];
    let mut right_mbr = rects[seeds.1];
    let mut remaining: Vec<usize> = (0..items.len())
        .filter(|&i| i != seeds.0 && i != seeds.1)
        .collect();

    while !remaining.is_empty() {
        if left.len() + remaining.len() <= min_fill {
            left.extend(remaining.iter().map(|&i| items[i]));
            break;
        }
        if right.len() + remaining.len() <= min_fill {
            right.extend(remaining.iter().map(|&i| items[i]));
            break;
        }

        // Next: the entry with the strongest preference for one group.
        let (position, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let d1 = left_mbr.enlargement(&rects[i]);
                let d2 = right_mbr.enlargement(&rects[i]);
                (pos, (d1 - d2).abs())
            })
            .fold((0, f64::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });
        let i = remaining.remove(position);

        let d1 = left_mbr.enlargement(&rects[i]);
        let d2 = right_mbr.enlargement(&rects[i]);
        let to_left = match d1.total_cmp(&d2) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => match left_mbr.area().total_cmp(&right_mbr.area()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => left.len() <= right.len(),
            },
        };
        if to_left {
            left.push(items[i]);
            left_mbr = left_mbr.union(&rects[i]);
        } else {
            right.push(items[i]);
            right_mbr = right_mbr.union(&rects[i]);
        }
    }
    (left, right)
}

/// 2-D R-tree over point keys.
pub struct SpatialTreeIndex {
    file: IndexFile,
}

impl SpatialTreeIndex {
    pub fn max_entries_for(page_size: usize) -> usize {
        (page_size - NODE_HEADER_SIZE) / LEAF_ENTRY_SIZE.max(CHILD_ENTRY_SIZE)
    }

    pub fn create(path: &Path, unique: bool, config: &StorageConfig) -> Result<Self> {
        let max_entries = config
            .spatial_max_entries
            .min(Self::max_entries_for(config.page_size));
        if max_entries < 2 {
            return Err(DatabaseError::InvalidConfig {
                details: format!(
                    "{}-byte pages hold fewer than two spatial entries",
                    config.page_size
                ),
            });
        }
        let mut header = IndexHeader::new(IndexKind::Spatial, DataType::Point, unique, config.page_size);
        header.param_order = max_entries as u32;
        header.param_aux = 1; // height
        let file = IndexFile::create(path, header, config.page_cache_pages)?;
        let mut tree = Self { file };
        let root = tree.encode(&SpatialNode::Leaf(Vec::new()))?;
        tree.file.header.root_page = tree.file.allocate(&root)?;
        tree.file.sync_header()?;
        info!(
            "Created spatial tree index {} (max entries {})",
            path.display(),
            max_entries
        );
        Ok(tree)
    }

    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = IndexFile::open(path, IndexKind::Spatial, config.page_cache_pages)?;
        if file.header.param_order < 2 || file.header.root_page == NO_PAGE {
            return Err(DatabaseError::corrupt(format!(
                "{}: spatial tree header is incomplete",
                path.display()
            )));
        }
        Ok(Self { file })
    }

    pub fn max_entries(&self) -> usize {
        self.file.header.param_order as usize
    }

    pub fn min_fill(&self) -> usize {
        (self.max_entries() * 2 / 5).max(1)
    }

    pub fn height(&self) -> u32 {
        self.file.header.param_aux
    }

    fn encode(&self, node: &SpatialNode) -> Result<Vec<u8>> {
        let mut page = self.file.blank_page();
        page[1..3].copy_from_slice(&(node.len() as u16).to_le_bytes());
        match node {
            SpatialNode::Leaf(entries) => {
                page[0] = LEAF_TAG;
                for (i, entry) in entries.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * LEAF_ENTRY_SIZE;
                    page[at..at + 8].copy_from_slice(&entry.point.x.to_le_bytes());
                    page[at + 8..at + 16].copy_from_slice(&entry.point.y.to_le_bytes());
                    page[at + 16..at + 24].copy_from_slice(&entry.rid.to_bytes());
                    page[at + 24..at + 32].copy_from_slice(&entry.sequence.to_le_bytes());
                }
            }
            SpatialNode::Internal(children) => {
                page[0] = INTERNAL_TAG;
                for (i, child) in children.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * CHILD_ENTRY_SIZE;
                    child.mbr.write(&mut page[at..at + 32]);
                    page[at + 32..at + 36].copy_from_slice(&child.child.to_le_bytes());
                }
            }
        }
        Ok(page)
    }

    fn load(&mut self, page_id: PageId) -> Result<SpatialNode> {
        let bytes = self.file.read(page_id)?;
        let count = read_u16(&bytes, 1) as usize;
        match bytes[0] {
            LEAF_TAG => {
                if NODE_HEADER_SIZE + count * LEAF_ENTRY_SIZE > bytes.len() {
                    return Err(DatabaseError::corrupt(format!(
                        "Spatial leaf {} claims {} entries",
                        page_id, count
                    )));
                }
                let entries = (0..count)
                    .map(|i| {
                        let at = NODE_HEADER_SIZE + i * LEAF_ENTRY_SIZE;
                        Ok(LeafEntry {
                            point: Point::new(read_f64(&bytes, at), read_f64(&bytes, at + 8)),
                            rid: Rid::from_bytes(&bytes[at + 16..])?,
                            sequence: read_u64(&bytes, at + 24),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SpatialNode::Leaf(entries))
            }
            INTERNAL_TAG => {
                if NODE_HEADER_SIZE + count * CHILD_ENTRY_SIZE > bytes.len() {
                    return Err(DatabaseError::corrupt(format!(
                        "Spatial node {} claims {} children",
                        page_id, count
                    )));
                }
                let children = (0..count)
                    .map(|i| {
                        let at = NODE_HEADER_SIZE + i * CHILD_ENTRY_SIZE;
                        ChildEntry {
                            mbr: Rect::read(&bytes[at..at + 32]),
                            child: read_u32(&bytes, at + 32),
                        }
                    })
                    .collect();
                Ok(SpatialNode::Internal(children))
            }
            tag => Err(DatabaseError::corrupt(format!(
                "Page {} has tag {:#x}, not a spatial tree node",
                page_id, tag
            ))),
        }
    }

    fn store(&mut self, page_id: PageId, node: &SpatialNode) -> Result<()> {
        let bytes = self.encode(node)?;
        self.file.write(page_id, &bytes)
    }

    fn allocate(&mut self, node: &SpatialNode) -> Result<PageId> {
        let bytes = self.encode(node)?;
        self.file.allocate(&bytes)
    }

    /// Child needing the least enlargement; ties go to the smaller area,
    /// then the lower page number.
    fn choose_subtree(children: &[ChildEntry], rect: &Rect) -> usize {
        let mut best = 0;
        for (i, candidate) in children.iter().enumerate().skip(1) {
            let current = &children[best];
            let ordering = candidate
                .mbr
                .enlargement(rect)
                .total_cmp(&current.mbr.enlargement(rect))
                .then(candidate.mbr.area().total_cmp(&current.mbr.area()))
                .then(candidate.child.cmp(&current.child));
            if ordering == Ordering::Less {
                best = i;
            }
        }
        best
    }

    fn split_node(&mut self, page_id: PageId, node: SpatialNode) -> Result<InsertOutcome> {
        let min_fill = self.min_fill();
        let (left, right) = match node {
            SpatialNode::Leaf(entries) => {
                let (l, r) = quadratic_split(entries, |e| Rect::from_point(e.point), min_fill);
                (SpatialNode::Leaf(l), SpatialNode::Leaf(r))
            }
            SpatialNode::Internal(children) => {
                let (l, r) = quadratic_split(children, |c| c.mbr, min_fill);
                (SpatialNode::Internal(l), SpatialNode::Internal(r))
            }
        };
        let (Some(left_mbr), Some(right_mbr)) = (left.mbr(), right.mbr()) else {
            return Err(DatabaseError::corrupt("Spatial split produced an empty group"));
        };
        self.store(page_id, &left)?;
        let sibling = self.allocate(&right)?;
        self.file.header.param_extra += 1;
        debug!(
            "Split spatial node {} ({} + {} entries) into {}",
            page_id,
            left.len(),
            right.len(),
            sibling
        );
        Ok(InsertOutcome {
            mbr: left_mbr,
            split: Some(ChildEntry {
                mbr: right_mbr,
                child: sibling,
            }),
        })
    }

    fn insert_at(&mut self, page_id: PageId, entry: LeafEntry) -> Result<InsertOutcome> {
        let mut node = self.load(page_id)?;
        match &mut node {
            SpatialNode::Leaf(entries) => entries.push(entry),
            SpatialNode::Internal(children) => {
                let rect = Rect::from_point(entry.point);
                let index = Self::choose_subtree(children, &rect);
                let outcome = self.insert_at(children[index].child, entry)?;
                children[index].mbr = outcome.mbr;
                if let Some(sibling) = outcome.split {
                    children.push(sibling);
                }
            }
        }
        if node.len() > self.max_entries() {
            return self.split_node(page_id, node);
        }
        self.store(page_id, &node)?;
        let mbr = node
            .mbr()
            .ok_or_else(|| DatabaseError::corrupt("Spatial insert left an empty node"))?;
        Ok(InsertOutcome { mbr, split: None })
    }

    fn insert_point(&mut self, point: Point, rid: Rid) -> Result<()> {
        let entry = LeafEntry {
            point,
            rid,
            sequence: self.file.header.next_sequence,
        };
        let root = self.file.header.root_page;
        let outcome = self.insert_at(root, entry)?;
        if let Some(sibling) = outcome.split {
            let new_root = SpatialNode::Internal(vec![
                ChildEntry {
                    mbr: outcome.mbr,
                    child: root,
                },
                sibling,
            ]);
            self.file.header.root_page = self.allocate(&new_root)?;
            self.file.header.param_aux += 1;
            debug!(
                "Spatial root split: new root {} height {}",
                self.file.header.root_page, self.file.header.param_aux
            );
        }
        self.file.header.next_sequence += 1;
        self.file.header.entry_count += 1;
        Ok(())
    }

    /// Entries within `radius` of `center`, nearest first; equal distances
    /// keep insertion order.
    pub fn range_search(&mut self, center: Point, radius: f64) -> Result<Vec<SpatialMatch>> {
        if radius.is_nan() || radius < 0.0 {
            return Ok(Vec::new());
        }
        let mut found: Vec<(SpatialMatch, u64)> = Vec::new();
        let mut pending = vec![self.file.header.root_page];
        while let Some(page_id) = pending.pop() {
            match self.load(page_id)? {
                SpatialNode::Leaf(entries) => {
                    for entry in entries {
                        let distance = entry.point.distance(&center);
                        if distance <= radius {
                            found.push((
                                SpatialMatch {
                                    rid: entry.rid,
                                    point: entry.point,
                                    distance,
                                },
                                entry.sequence,
                            ));
                        }
                    }
                }
                SpatialNode::Internal(children) => pending.extend(
                    children
                        .iter()
                        .filter(|c| c.mbr.min_dist(&center) <= radius)
                        .map(|c| c.child),
                ),
            }
        }
        found.sort_by(|a, b| a.0.distance.total_cmp(&b.0.distance).then(a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(m, _)| m).collect())
    }

    /// The `k` entries nearest to `center` by best-first search.
    pub fn knn(&mut self, center: Point, k: usize) -> Result<Vec<SpatialMatch>> {
        let mut results = Vec::with_capacity(k.min(self.file.header.entry_count as usize));
        if k == 0 {
            return Ok(results);
        }
        let mut queue = BinaryHeap::new();
        queue.push(QueueItem {
            distance: 0.0,
            rank: 0,
            sequence: 0,
            target: QueueTarget::Node(self.file.header.root_page),
        });
        while let Some(item) = queue.pop() {
            match item.target {
                QueueTarget::Entry(rid, point) => {
                    results.push(SpatialMatch {
                        rid,
                        point,
                        distance: item.distance,
                    });
                    if results.len() == k {
                        break;
                    }
                }
                QueueTarget::Node(page_id) => match self.load(page_id)? {
                    SpatialNode::Leaf(entries) => {
                        for entry in entries {
                            queue.push(QueueItem {
                                distance: entry.point.distance(&center),
                                rank: 1,
                                sequence: entry.sequence,
                                target: QueueTarget::Entry(entry.rid, entry.point),
                            });
                        }
                    }
                    SpatialNode::Internal(children) => {
                        for child in children {
                            queue.push(QueueItem {
                                distance: child.mbr.min_dist(&center),
                                rank: 0,
                                sequence: child.child as u64,
                                target: QueueTarget::Node(child.child),
                            });
                        }
                    }
                },
            }
        }
        Ok(results)
    }

    /// Entries inside the rectangle, in insertion order.
    pub fn window(&mut self, window: Rect) -> Result<Vec<SpatialMatch>> {
        self.collect_where(|rect| rect.intersects(&window), |p| window.contains_point(p))
    }

    fn collect_where(
        &mut self,
        visit: impl Fn(&Rect) -> bool,
        accept: impl Fn(&Point) -> bool,
    ) -> Result<Vec<SpatialMatch>> {
        let mut found = Vec::new();
        let mut pending = vec![self.file.header.root_page];
        while let Some(page_id) = pending.pop() {
            match self.load(page_id)? {
                SpatialNode::Leaf(entries) => found.extend(
                    entries
                        .into_iter()
                        .filter(|e| accept(&e.point))
                        .map(|e| (e.sequence, e.rid, e.point)),
                ),
                SpatialNode::Internal(children) => pending.extend(
                    children
                        .iter()
                        .filter(|c| visit(&c.mbr))
                        .map(|c| c.child),
                ),
            }
        }
        found.sort_by_key(|(sequence, _, _)| *sequence);
        Ok(found
            .into_iter()
            .map(|(_, rid, point)| SpatialMatch {
                rid,
                point,
                distance: 0.0,
            })
            .collect())
    }

    /// Removes up to `limit` entries at exactly `point` (and `rid` when
    /// given). Returns the count and the node's new MBR, `None` if emptied.
    fn remove_at(
        &mut self,
        page_id: PageId,
        point: &Point,
        rid: Option<Rid>,
        limit: usize,
    ) -> Result<(usize, Option<Rect>)> {
        let mut node = self.load(page_id)?;
        let mut removed = 0;
        match &mut node {
            SpatialNode::Leaf(entries) => {
                entries.retain(|e| {
                    let hit = removed < limit
                        && e.point == *point
                        && rid.is_none_or(|r| r == e.rid);
                    if hit {
                        removed += 1;
                    }
                    !hit
                });
            }
            SpatialNode::Internal(children) => {
                let mut i = 0;
                while i < children.len() && removed < limit {
                    if !children[i].mbr.contains_point(point) {
                        i += 1;
                        continue;
                    }
                    let (count, mbr) =
                        self.remove_at(children[i].child, point, rid, limit - removed)?;
                    removed += count;
                    match mbr {
                        Some(mbr) => {
                            children[i].mbr = mbr;
                            i += 1;
                        }
                        None => {
                            self.file.free(children[i].child)?;
                            children.remove(i);
                        }
                    }
                }
            }
        }
        if removed > 0 {
            self.store(page_id, &node)?;
        }
        Ok((removed, node.mbr()))
    }

    fn remove_point(&mut self, point: &Point, rid: Option<Rid>, limit: usize) -> Result<usize> {
        let root = self.file.header.root_page;
        let (removed, mbr) = self.remove_at(root, point, rid, limit)?;
        if removed == 0 {
            return Ok(0);
        }
        self.file.header.entry_count -= removed as u64;

        if mbr.is_none() && self.height() > 1 {
            // Everything is gone: restart from an empty leaf root.
            self.store(root, &SpatialNode::Leaf(Vec::new()))?;
            self.file.header.param_aux = 1;
        }
        loop {
            let root = self.file.header.root_page;
            match self.load(root)? {
                SpatialNode::Internal(children) if children.len() == 1 => {
                    self.file.header.root_page = children[0].child;
                    self.file.header.param_aux -= 1;
                    self.file.free(root)?;
                    debug!("Collapsed spatial root {} into {}", root, children[0].child);
                }
                _ => break,
            }
        }
        Ok(removed)
    }

    fn point_key(key: &Value) -> Result<Point> {
        check_key(&DataType::Point, key)?;
        key.as_point().ok_or_else(|| DatabaseError::TypeMismatch {
            expected: DataType::Point.to_string(),
            actual: key.type_name(),
        })
    }
}

impl IndexStore for SpatialTreeIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Spatial
    }

    fn key_type(&self) -> &DataType {
        &self.file.header.key_type
    }

    fn is_unique(&self) -> bool {
        self.file.header.unique
    }

    fn insert(&mut self, key: &Value, rid: Rid) -> Result<()> {
        let point = Self::point_key(key)?;
        if self.file.header.unique && !self.search(key)?.is_empty() {
            return Err(duplicate_key(key));
        }
        self.insert_point(point, rid)
    }

    fn search(&mut self, key: &Value) -> Result<Vec<Rid>> {
        let point = Self::point_key(key)?;
        Ok(self
            .collect_where(|rect| rect.contains_point(&point), |p| *p == point)?
            .into_iter()
            .map(|m| m.rid)
            .collect())
    }

    fn range(&mut self, low: &Value, high: &Value) -> Result<Vec<Rid>> {
        let low = Self::point_key(low)?;
        let high = Self::point_key(high)?;
        if low.x > high.x || low.y > high.y {
            return Ok(Vec::new());
        }
        Ok(self
            .window(Rect::new(low.x, low.y, high.x, high.y))?
            .into_iter()
            .map(|m| m.rid)
            .collect())
    }

    fn remove(&mut self, key: &Value) -> Result<usize> {
        let point = Self::point_key(key)?;
        self.remove_point(&point, None, usize::MAX)
    }

    fn remove_entry(&mut self, key: &Value, rid: Rid) -> Result<bool> {
        let point = Self::point_key(key)?;
        Ok(self.remove_point(&point, Some(rid), 1)? == 1)
    }

    fn len(&self) -> u64 {
        self.file.header.entry_count
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::new(IndexKind::Spatial);
        stats.entries = self.file.header.entry_count;
        stats.pages = self.file.page_count();
        stats.free_pages = self.file.free_page_count()?;
        stats.height = self.height();
        stats.splits = self.file.header.param_extra as u64;
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.file.close()
    }

    fn as_spatial_mut(&mut self) -> Option<&mut SpatialTreeIndex> {
        Some(self)
    }
}
