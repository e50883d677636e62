use std::{
    cmp::Ordering,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    config::StorageConfig,
    database::{load_encoded, save_encoded},
    index::{
        IndexKind, IndexStats, IndexStore, build_index, create_index, open_index,
        spatial_tree::SpatialTreeIndex,
    },
    storage::{
        heap_file::{HeapFile, HeapScan, HeapStats},
        schema::{ColumnSchema, TableSchema},
    },
    types::{
        error::{DatabaseError, Result},
        rid::Rid,
        row::Row,
        value::{Point, Value},
    },
};

pub const SCHEMA_FILE: &str = "schema.bin";
pub const HEAP_FILE: &str = "data.heap";
pub const INDEX_DIR: &str = "indexes";
const COMPACT_FILE: &str = "data.heap.compact";

/// `<table>/indexes/<column>.<kind>.idx`
pub fn index_path(dir: &Path, column: &str, kind: IndexKind) -> PathBuf {
    dir.join(INDEX_DIR)
        .join(format!("{}.{}.idx", column, kind.file_suffix()))
}

struct ColumnIndex {
    column: String,
    position: usize,
    store: Box<dyn IndexStore>,
}

/// One heap file plus the indexes declared on its columns.
pub struct Table {
    dir: PathBuf,
    schema: TableSchema,
    config: StorageConfig,
    heap: HeapFile,
    indexes: Vec<ColumnIndex>,
}

impl Table {
    /// Creates the table directory, an empty heap and every declared index.
    pub fn create<P: AsRef<Path>>(dir: P, schema: TableSchema, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        schema.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(INDEX_DIR))?;

        let heap = HeapFile::create(dir.join(HEAP_FILE), schema.page_size, config.page_cache_pages)?;
        let mut indexes = Vec::new();
        for column in &schema.columns {
            for kind in &column.indexes {
                let store = create_index(
                    *kind,
                    &index_path(&dir, &column.name, *kind),
                    column.data_type.clone(),
                    column.is_unique(),
                    config,
                )?;
                indexes.push(ColumnIndex {
                    column: column.name.clone(),
                    position: column.position,
                    store,
                });
            }
        }
        save_encoded(&dir.join(SCHEMA_FILE), &schema)?;
        info!(
            "Created table '{}' with {} columns and {} indexes",
            schema.table_name,
            schema.columns.len(),
            indexes.len()
        );
        Ok(Self {
            dir,
            schema,
            config: config.clone(),
            heap,
            indexes,
        })
    }

    pub fn open<P: AsRef<Path>>(dir: P, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        let schema: TableSchema = load_encoded(&dir.join(SCHEMA_FILE))?;
        schema.validate()?;

        let heap = HeapFile::open_with_cache(dir.join(HEAP_FILE), schema.page_size, config.page_cache_pages)?;
        let mut indexes = Vec::new();
        for column in &schema.columns {
            for kind in &column.indexes {
                let path = index_path(&dir, &column.name, *kind);
                let store = open_index(*kind, &path, config)?;
                if *store.key_type() != column.data_type {
                    warn!("Index {} key type disagrees with its column", path.display());
                    return Err(DatabaseError::corrupt(format!(
                        "{} indexes {} keys but column '{}' is {}",
                        path.display(),
                        store.key_type(),
                        column.name,
                        column.data_type
                    )));
                }
                indexes.push(ColumnIndex {
                    column: column.name.clone(),
                    position: column.position,
                    store,
                });
            }
        }
        debug!(
            "Opened table '{}' ({} live rows)",
            schema.table_name,
            heap.stats().live_records
        );
        Ok(Self {
            dir,
            schema,
            config: config.clone(),
            heap,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.table_name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn len(&self) -> u64 {
        self.heap.stats().live_records
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index kinds on `column`, in declaration order.
    pub fn index_kinds(&self, column: &str) -> Vec<IndexKind> {
        self.indexes
            .iter()
            .filter(|ix| ix.column == column)
            .map(|ix| ix.store.kind())
            .collect()
    }

    fn column(&self, name: &str) -> Result<&ColumnSchema> {
        self.schema
            .get_column(name)
            .ok_or_else(|| DatabaseError::ColumnNotFound {
                name: name.to_string(),
                table: self.schema.table_name.clone(),
            })
    }

    fn save_schema(&self) -> Result<()> {
        save_encoded(&self.dir.join(SCHEMA_FILE), &self.schema)
    }

    /// Best index on `column` among the kinds `accept` allows.
    fn pick_index(&self, column: &str, accept: impl Fn(IndexKind) -> bool) -> Option<usize> {
        self.indexes
            .iter()
            .enumerate()
            .filter(|(_, ix)| ix.column == column && accept(ix.store.kind()))
            .min_by_key(|(_, ix)| ix.store.kind().point_lookup_rank())
            .map(|(i, _)| i)
    }

    fn spatial_index(&mut self, column: &str) -> Option<&mut SpatialTreeIndex> {
        self.indexes
            .iter_mut()
            .filter(|ix| ix.column == column)
            .find_map(|ix| ix.store.as_spatial_mut())
    }

    /// Declares a new index on `column` and loads it from the current rows.
    pub fn create_index(&mut self, column: &str, kind: IndexKind) -> Result<()> {
        let col = self.column(column)?.clone();
        if col.indexes.contains(&kind) {
            return Err(DatabaseError::IndexAlreadyExists {
                column: column.to_string(),
                kind: kind.to_string(),
            });
        }
        if !kind.supports(&col.data_type) {
            return Err(DatabaseError::TypeMismatch {
                expected: format!("a key type supported by the {} index", kind),
                actual: col.data_type.to_string(),
            });
        }

        let mut entries = Vec::new();
        for item in self.heap.scan() {
            let (rid, row) = item?;
            if let Some(value) = row.get_value(col.position).filter(|v| !v.is_null()) {
                entries.push((value.clone(), rid));
            }
        }
        let loaded = entries.len();
        let path = index_path(&self.dir, column, kind);
        let store = match build_index(
            kind,
            &path,
            col.data_type.clone(),
            col.is_unique(),
            &self.config,
            entries,
        ) {
            Ok(store) => store,
            Err(e) => {
                match fs::remove_file(&path) {
                    Err(rm) if rm.kind() != ErrorKind::NotFound => {
                        warn!("Could not remove {} after failed build: {}", path.display(), e);
                        return Err(rm.into());
                    }
                    _ => return Err(e),
                }
            }
        };

        self.indexes.push(ColumnIndex {
            column: column.to_string(),
            position: col.position,
            store,
        });
        if let Some(schema_column) = self.schema.get_column_mut(column) {
            schema_column.indexes.push(kind);
        }
        self.save_schema()?;
        info!(
            "Created {} index on {}.{} ({} entries)",
            kind, self.schema.table_name, column, loaded
        );
        Ok(())
    }

    pub fn drop_index(&mut self, column: &str, kind: IndexKind) -> Result<()> {
        self.column(column)?;
        let position = self
            .indexes
            .iter()
            .position(|ix| ix.column == column && ix.store.kind() == kind)
            .ok_or_else(|| DatabaseError::IndexNotFound {
                column: column.to_string(),
                kind: kind.to_string(),
            })?;
        let mut dropped = self.indexes.remove(position);
        dropped.store.close()?;
        fs::remove_file(index_path(&self.dir, column, kind))?;
        if let Some(schema_column) = self.schema.get_column_mut(column) {
            schema_column.indexes.retain(|k| *k != kind);
        }
        self.save_schema()?;
        info!("Dropped {} index on {}.{}", kind, self.schema.table_name, column);
        Ok(())
    }

    /// Appends a row and indexes it. Unique columns are checked first, so a
    /// duplicate leaves the table untouched.
    pub fn insert(&mut self, mut row: Row) -> Result<Rid> {
        self.schema.apply_defaults(&mut row);
        self.schema.validate_row(&row)?;
        self.check_unique(&row)?;

        let rid = self.heap.append(&row)?;
        for ix in &mut self.indexes {
            if let Some(key) = row.get_value(ix.position).filter(|v| !v.is_null()) {
                ix.store.insert(key, rid)?;
            }
        }
        Ok(rid)
    }

    fn check_unique(&mut self, row: &Row) -> Result<()> {
        let unique: Vec<(String, usize)> = self
            .schema
            .columns
            .iter()
            .filter(|c| c.is_unique())
            .map(|c| (c.name.clone(), c.position))
            .collect();
        for (name, position) in unique {
            let Some(key) = row.get_value(position).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = match self.pick_index(&name, |_| true) {
                Some(i) => !self.indexes[i].store.search(key)?.is_empty(),
                None => !self
                    .scan_where(position, |v| v.key_cmp(key) == Ordering::Equal)?
                    .is_empty(),
            };
            if taken {
                return Err(DatabaseError::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&mut self, rid: Rid) -> Result<Row> {
        self.heap.read(rid)
    }

    /// Live rows in storage order.
    pub fn scan(&mut self) -> HeapScan<'_> {
        self.heap.scan()
    }

    fn scan_where(
        &mut self,
        position: usize,
        accept: impl Fn(&Value) -> bool,
    ) -> Result<Vec<(Rid, Row)>> {
        let mut found = Vec::new();
        for item in self.heap.scan() {
            let (rid, row) = item?;
            if row
                .get_value(position)
                .is_some_and(|v| !v.is_null() && accept(v))
            {
                found.push((rid, row));
            }
        }
        Ok(found)
    }

    /// Reads the rows behind index hits. A locator whose row is already
    /// tombstoned counts as absent.
    fn fetch(&mut self, rids: Vec<Rid>) -> Result<Vec<(Rid, Row)>> {
        let mut rows = Vec::with_capacity(rids.len());
        for rid in rids {
            match self.heap.read(rid) {
                Ok(row) => rows.push((rid, row)),
                Err(DatabaseError::NotFound { .. }) => {
                    debug!(
                        "Skipping stale index entry {} in '{}'",
                        rid, self.schema.table_name
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(rows)
    }

    fn check_probe(column: &ColumnSchema, key: &Value) -> Result<()> {
        if key.is_null() || !key.is_compatible_with_type(&column.data_type) {
            return Err(DatabaseError::TypeMismatch {
                expected: format!("{} for column '{}'", column.data_type, column.name),
                actual: key.type_name(),
            });
        }
        Ok(())
    }

    fn matching(&mut self, column: &str, key: &Value) -> Result<Vec<(Rid, Row)>> {
        let col = self.column(column)?.clone();
        Self::check_probe(&col, key)?;
        match self.pick_index(column, |_| true) {
            Some(i) => {
                let rids = self.indexes[i].store.search(key)?;
                self.fetch(rids)
            }
            None => self.scan_where(col.position, |v| v.key_cmp(key) == Ordering::Equal),
        }
    }

    /// Rows whose `column` equals `key`. Uses the cheapest index on the
    /// column, or a heap scan when there is none.
    pub fn point_query(&mut self, column: &str, key: &Value) -> Result<Vec<Row>> {
        Ok(self
            .matching(column, key)?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    /// Rows with `low <= column <= high` in key order. Point columns take
    /// the rectangle with corners `low` and `high`.
    pub fn range_query(&mut self, column: &str, low: &Value, high: &Value) -> Result<Vec<Row>> {
        let col = self.column(column)?.clone();
        Self::check_probe(&col, low)?;
        Self::check_probe(&col, high)?;
        let spatial = col.data_type.is_spatial();
        let indexed = self.indexes.iter().any(|ix| ix.column == column);

        let mut found = match self.pick_index(column, |k| k.supports_range()) {
            Some(i) => {
                let rids = self.indexes[i].store.range(low, high)?;
                self.fetch(rids)?
            }
            None if indexed => {
                return Err(DatabaseError::UnsupportedOperation {
                    operation: "range".to_string(),
                    index: IndexKind::Hash.to_string(),
                });
            }
            None if spatial => {
                let (Some(lo), Some(hi)) = (low.as_point(), high.as_point()) else {
                    return Ok(Vec::new());
                };
                self.scan_where(col.position, |v| {
                    v.as_point().is_some_and(|p| {
                        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y
                    })
                })?
            }
            None => {
                if low.key_cmp(high) == Ordering::Greater {
                    return Ok(Vec::new());
                }
                self.scan_where(col.position, |v| {
                    v.key_cmp(low) != Ordering::Less && v.key_cmp(high) != Ordering::Greater
                })?
            }
        };
        if !spatial {
            let position = col.position;
            found.sort_by(|(_, a), (_, b)| a.values[position].key_cmp(&b.values[position]));
        }
        Ok(found.into_iter().map(|(_, row)| row).collect())
    }

    fn spatial_column(&self, column: &str) -> Result<ColumnSchema> {
        let col = self.column(column)?.clone();
        if !col.data_type.is_spatial() {
            return Err(DatabaseError::TypeMismatch {
                expected: format!("POINT column, but '{}' is", column),
                actual: col.data_type.to_string(),
            });
        }
        Ok(col)
    }

    /// Every point in the column with its distance to `center`, in storage order.
    fn distances(&mut self, position: usize, center: Point) -> Result<Vec<(f64, Rid, Row)>> {
        let mut found = Vec::new();
        for item in self.heap.scan() {
            let (rid, row) = item?;
            if let Some(point) = row.get_value(position).and_then(Value::as_point) {
                found.push((point.distance(&center), rid, row));
            }
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(found)
    }

    /// Rows within `radius` of `center`, nearest first.
    pub fn spatial_radius(&mut self, column: &str, center: Point, radius: f64) -> Result<Vec<Row>> {
        let col = self.spatial_column(column)?;
        if let Some(tree) = self.spatial_index(column) {
            let rids = tree
                .range_search(center, radius)?
                .into_iter()
                .map(|m| m.rid)
                .collect();
            return Ok(self.fetch(rids)?.into_iter().map(|(_, row)| row).collect());
        }
        Ok(self
            .distances(col.position, center)?
            .into_iter()
            .take_while(|(distance, _, _)| *distance <= radius)
            .map(|(_, _, row)| row)
            .collect())
    }

    /// The `k` rows nearest to `center`, nearest first.
    pub fn spatial_knn(&mut self, column: &str, center: Point, k: usize) -> Result<Vec<Row>> {
        let col = self.spatial_column(column)?;
        if let Some(tree) = self.spatial_index(column) {
            let rids = tree.knn(center, k)?.into_iter().map(|m| m.rid).collect();
            return Ok(self.fetch(rids)?.into_iter().map(|(_, row)| row).collect());
        }
        Ok(self
            .distances(col.position, center)?
            .into_iter()
            .take(k)
            .map(|(_, _, row)| row)
            .collect())
    }

    /// Tombstones every row whose `column` equals `key` and drops their
    /// index entries. Returns how many rows went away.
    pub fn delete(&mut self, column: &str, key: &Value) -> Result<usize> {
        let victims = self.matching(column, key)?;
        for (rid, row) in &victims {
            self.heap.delete(*rid)?;
            for ix in &mut self.indexes {
                if let Some(value) = row.get_value(ix.position).filter(|v| !v.is_null()) {
                    ix.store.remove_entry(value, *rid)?;
                }
            }
        }
        if !victims.is_empty() {
            debug!(
                "Deleted {} rows from '{}' where {} = {}",
                victims.len(),
                self.schema.table_name,
                column,
                key
            );
            self.maybe_compact()?;
        }
        Ok(victims.len())
    }

    fn maybe_compact(&mut self) -> Result<()> {
        let stats = self.heap.stats();
        if self.config.auto_compact && stats.tombstone_ratio() >= self.config.compaction_threshold {
            warn!(
                "Table '{}' tombstone ratio {:.2} reached {:.2}, compacting",
                self.schema.table_name,
                stats.tombstone_ratio(),
                self.config.compaction_threshold
            );
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrites the heap without tombstones and rebuilds every index over
    /// the new locators. Returns the number of tombstones reclaimed.
    pub fn compact(&mut self) -> Result<u64> {
        let reclaimed = self.heap.stats().tombstones;
        let rows = self
            .heap
            .scan()
            .map(|item| item.map(|(_, row)| row))
            .collect::<Result<Vec<Row>>>()?;

        let staging = self.dir.join(COMPACT_FILE);
        let mut fresh = HeapFile::create(&staging, self.schema.page_size, self.config.page_cache_pages)?;
        let mut rids = Vec::with_capacity(rows.len());
        for row in &rows {
            rids.push(fresh.append(row)?);
        }
        fresh.close()?;
        self.heap.close()?;
        fs::rename(&staging, self.dir.join(HEAP_FILE))?;
        self.heap = HeapFile::open_with_cache(
            self.dir.join(HEAP_FILE),
            self.schema.page_size,
            self.config.page_cache_pages,
        )?;

        for ix in &mut self.indexes {
            let kind = ix.store.kind();
            let key_type = ix.store.key_type().clone();
            let unique = ix.store.is_unique();
            ix.store.close()?;
            let entries = rows
                .iter()
                .zip(&rids)
                .filter_map(|(row, rid)| {
                    row.get_value(ix.position)
                        .filter(|v| !v.is_null())
                        .map(|v| (v.clone(), *rid))
                })
                .collect();
            ix.store = build_index(
                kind,
                &index_path(&self.dir, &ix.column, kind),
                key_type,
                unique,
                &self.config,
                entries,
            )?;
        }
        info!(
            "Compacted table '{}': {} rows kept, {} tombstones reclaimed",
            self.schema.table_name,
            rows.len(),
            reclaimed
        );
        Ok(reclaimed)
    }

    /// `(column, stats)` for every index, in declaration order.
    pub fn index_stats(&mut self) -> Result<Vec<(String, IndexStats)>> {
        self.indexes
            .iter_mut()
            .map(|ix| -> Result<(String, IndexStats)> { Ok((ix.column.clone(), ix.store.stats()?)) })
            .collect()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.heap.flush()?;
        for ix in &mut self.indexes {
            ix.store.flush()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.heap.close()?;
        for ix in &mut self.indexes {
            ix.store.close()?;
        }
        Ok(())
    }
}
