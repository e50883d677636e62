use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    config::StorageConfig,
    database::{load_encoded, save_encoded, table::Table},
    storage::schema::TableSchema,
    types::error::{DatabaseError, Result},
};

pub const CATALOG_FILE: &str = "catalog.bin";

/// Table names in creation order, persisted as `catalog.bin`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Catalog {
    tables: Vec<String>,
}

/// A directory of tables. Every table lives in `<root>/<table name>/`.
pub struct Database {
    root: PathBuf,
    config: StorageConfig,
    catalog: Catalog,
    tables: HashMap<String, Table>,
}

impl Database {
    /// Opens the database at `root`, creating an empty one if needed, and
    /// opens every cataloged table.
    pub fn open<P: AsRef<Path>>(root: P, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let catalog_path = root.join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            load_encoded(&catalog_path)?
        } else {
            let catalog = Catalog::default();
            save_encoded(&catalog_path, &catalog)?;
            catalog
        };

        let mut tables = HashMap::new();
        for name in &catalog.tables {
            let table = Table::open(root.join(name), &config)?;
            tables.insert(name.clone(), table);
        }
        info!(
            "Opened database {} with {} tables",
            root.display(),
            tables.len()
        );
        Ok(Self {
            root,
            config,
            catalog,
            tables,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn save_catalog(&self) -> Result<()> {
        save_encoded(&self.root.join(CATALOG_FILE), &self.catalog)
    }

    /// Creates a table. The heap takes the database page size and the
    /// configured default-index policy adds its indexes to the schema.
    pub fn create_table(&mut self, mut schema: TableSchema) -> Result<&mut Table> {
        let name = schema.table_name.clone();
        if self.tables.contains_key(&name) {
            return Err(DatabaseError::TableAlreadyExists { name });
        }
        schema.page_size = self.config.page_size;
        schema.apply_index_policy(self.config.default_index_policy);
        schema.validate()?;

        let table = Table::create(self.root.join(&name), schema, &self.config)?;
        self.catalog.tables.push(name.clone());
        self.save_catalog()?;
        Ok(self.tables.entry(name).or_insert(table))
    }

    pub fn get_table(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Closes the table and deletes its directory.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let mut table = self
            .tables
            .remove(name)
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })?;
        table.close()?;
        let dir = table.dir().to_path_buf();
        drop(table);
        fs::remove_dir_all(&dir)?;
        self.catalog.tables.retain(|t| t != name);
        self.save_catalog()?;
        info!("Dropped table '{}'", name);
        Ok(())
    }

    /// Table names in creation order.
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.tables.clone()
    }

    pub fn flush(&mut self) -> Result<()> {
        for name in &self.catalog.tables {
            if let Some(table) = self.tables.get_mut(name) {
                table.flush()?;
            }
        }
        debug!("Flushed database {}", self.root.display());
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        for table in self.tables.values_mut() {
            table.close()?;
        }
        Ok(())
    }
}
