/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! The catalog facade pins the on-disk meta layout: a reserved logical
//! page (id fixed at build time, `CATALOG_ROOT_ID`) holding `table_id` and
//! `index_id` maps to their own meta pages. It isn't part of the core
//! algorithmically, but the table heap needs a schema to serialize rows,
//! and that schema lives here; the cyclic dependency is broken by
//! loading schemas eagerly into `TableInfo` at startup so the heap only
//! ever consumes an immutable borrow.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::{write_frame, BufferPoolManager};
use crate::constants::{PageIdT, CATALOG_MAGIC_NUM, CATALOG_ROOT_ID};
use crate::error::{DbError, DbResult};
use crate::io::{read_i32, read_str, read_u32, str_serialized_size, write_i32, write_str, write_u32};
use crate::record::Schema;
use crate::table::TableHeap;

#[derive(Debug, Clone, Default)]
struct CatalogMeta {
    table_meta_pages: Vec<(u32, PageIdT)>,
    index_meta_pages: Vec<(u32, PageIdT)>,
}

impl CatalogMeta {
    fn serialize_to(&self, buf: &mut [u8]) -> DbResult<()> {
        let mut off = 0usize;
        write_u32(&mut buf[off..], CATALOG_MAGIC_NUM);
        off += 4;
        write_u32(&mut buf[off..], self.table_meta_pages.len() as u32);
        off += 4;
        write_u32(&mut buf[off..], self.index_meta_pages.len() as u32);
        off += 4;
        for &(id, page) in &self.table_meta_pages {
            write_u32(&mut buf[off..], id);
            off += 4;
            write_i32(&mut buf[off..], page);
            off += 4;
        }
        for &(id, page) in &self.index_meta_pages {
            write_u32(&mut buf[off..], id);
            off += 4;
            write_i32(&mut buf[off..], page);
            off += 4;
        }
        Ok(())
    }

    fn deserialize_from(buf: &[u8]) -> DbResult<Self> {
        let mut off = 0usize;
        let magic = read_u32(&buf[off..])?;
        off += 4;
        if magic != CATALOG_MAGIC_NUM {
            return Err(DbError::Corrupt(format!(
                "catalog deserialize error: bad magic {magic:#x}"
            )));
        }
        let num_tables = read_u32(&buf[off..])?;
        off += 4;
        let num_indexes = read_u32(&buf[off..])?;
        off += 4;
        let mut table_meta_pages = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let id = read_u32(&buf[off..])?;
            off += 4;
            let page = read_i32(&buf[off..])?;
            off += 4;
            table_meta_pages.push((id, page));
        }
        let mut index_meta_pages = Vec::with_capacity(num_indexes as usize);
        for _ in 0..num_indexes {
            let id = read_u32(&buf[off..])?;
            off += 4;
            let page = read_i32(&buf[off..])?;
            off += 4;
            index_meta_pages.push((id, page));
        }
        Ok(CatalogMeta {
            table_meta_pages,
            index_meta_pages,
        })
    }
}

fn serialize_table_meta(buf: &mut [u8], name: &str, first_page_id: PageIdT, schema: &Schema) -> DbResult<()> {
    let mut off = 0usize;
    write_str(&mut buf[off..], name);
    off += str_serialized_size(name);
    write_i32(&mut buf[off..], first_page_id);
    off += 4;
    schema.serialize_to(&mut buf[off..])?;
    Ok(())
}

fn deserialize_table_meta(buf: &[u8]) -> DbResult<(String, PageIdT, Schema)> {
    let mut off = 0usize;
    let (name, n) = read_str(&buf[off..])?;
    off += n;
    let first_page_id = read_i32(&buf[off..])?;
    off += 4;
    let (schema, _) = Schema::deserialize_from(&buf[off..])?;
    Ok((name, first_page_id, schema))
}

fn serialize_index_meta(buf: &mut [u8], name: &str, table_name: &str, key_schema: &Schema) -> DbResult<()> {
    let mut off = 0usize;
    write_str(&mut buf[off..], name);
    off += str_serialized_size(name);
    write_str(&mut buf[off..], table_name);
    off += str_serialized_size(table_name);
    key_schema.serialize_to(&mut buf[off..])?;
    Ok(())
}

fn deserialize_index_meta(buf: &[u8]) -> DbResult<(String, String, Schema)> {
    let mut off = 0usize;
    let (name, n) = read_str(&buf[off..])?;
    off += n;
    let (table_name, n) = read_str(&buf[off..])?;
    off += n;
    let (key_schema, _) = Schema::deserialize_from(&buf[off..])?;
    Ok((name, table_name, key_schema))
}

pub struct TableInfo {
    pub table_id: u32,
    pub name: String,
    pub schema: Arc<Schema>,
    pub heap: TableHeap,
    meta_page_id: PageIdT,
}

pub struct IndexInfo {
    pub index_id: u32,
    pub name: String,
    pub table_name: String,
    pub key_schema: Arc<Schema>,
    meta_page_id: PageIdT,
}

pub struct CatalogManager {
    bpm: Arc<BufferPoolManager>,
    next_table_id: u32,
    next_index_id: u32,
    tables: HashMap<u32, TableInfo>,
    table_name_to_id: HashMap<String, u32>,
    indexes: HashMap<u32, IndexInfo>,
    index_name_to_id: HashMap<(String, String), u32>,
}

impl CatalogManager {
    /// `init = true` creates a brand new, empty catalog on the reserved
    /// page. `init = false` reloads an existing one, rebuilding every
    /// `TableInfo`/`IndexInfo` and re-opening a table heap on each table's
    /// stored first-page id.
    pub fn new(bpm: Arc<BufferPoolManager>, init: bool) -> DbResult<Self> {
        let mut mgr = CatalogManager {
            bpm: bpm.clone(),
            next_table_id: 0,
            next_index_id: 0,
            tables: HashMap::new(),
            table_name_to_id: HashMap::new(),
            indexes: HashMap::new(),
            index_name_to_id: HashMap::new(),
        };

        if init {
            let (page_id, handle) = bpm.new_page()?.ok_or(DbError::BufferPoolFull)?;
            if page_id != CATALOG_ROOT_ID {
                return Err(DbError::Corrupt(format!(
                    "catalog page must be the first page allocated (expected {CATALOG_ROOT_ID}, got {page_id})"
                )));
            }
            {
                let mut frame = write_frame(&handle);
                CatalogMeta::default().serialize_to(frame.data_mut())?;
            }
            bpm.unpin_page(page_id, true);
            return Ok(mgr);
        }

        let handle = bpm
            .fetch_page(CATALOG_ROOT_ID)?
            .ok_or(DbError::PageNotFound(CATALOG_ROOT_ID))?;
        let meta = {
            let frame = write_frame(&handle);
            CatalogMeta::deserialize_from(frame.data())?
        };
        bpm.unpin_page(CATALOG_ROOT_ID, false);

        for &(table_id, meta_page_id) in &meta.table_meta_pages {
            mgr.load_table(table_id, meta_page_id)?;
        }
        for &(index_id, meta_page_id) in &meta.index_meta_pages {
            mgr.load_index(index_id, meta_page_id)?;
        }
        mgr.next_table_id = meta.table_meta_pages.iter().map(|&(id, _)| id + 1).max().unwrap_or(0);
        mgr.next_index_id = meta.index_meta_pages.iter().map(|&(id, _)| id + 1).max().unwrap_or(0);
        Ok(mgr)
    }

    fn load_table(&mut self, table_id: u32, meta_page_id: PageIdT) -> DbResult<()> {
        let handle = self
            .bpm
            .fetch_page(meta_page_id)?
            .ok_or(DbError::PageNotFound(meta_page_id))?;
        let (name, first_page_id, schema) = {
            let frame = write_frame(&handle);
            deserialize_table_meta(frame.data())?
        };
        self.bpm.unpin_page(meta_page_id, false);
        let schema = Arc::new(schema);
        let heap = TableHeap::open(self.bpm.clone(), schema.clone(), first_page_id);
        self.table_name_to_id.insert(name.clone(), table_id);
        self.tables.insert(
            table_id,
            TableInfo {
                table_id,
                name,
                schema,
                heap,
                meta_page_id,
            },
        );
        Ok(())
    }

    fn load_index(&mut self, index_id: u32, meta_page_id: PageIdT) -> DbResult<()> {
        let handle = self
            .bpm
            .fetch_page(meta_page_id)?
            .ok_or(DbError::PageNotFound(meta_page_id))?;
        let (name, table_name, key_schema) = {
            let frame = write_frame(&handle);
            deserialize_index_meta(frame.data())?
        };
        self.bpm.unpin_page(meta_page_id, false);
        self.index_name_to_id
            .insert((table_name.clone(), name.clone()), index_id);
        self.indexes.insert(
            index_id,
            IndexInfo {
                index_id,
                name,
                table_name,
                key_schema: Arc::new(key_schema),
                meta_page_id,
            },
        );
        Ok(())
    }

    fn flush_catalog_meta(&self) -> DbResult<()> {
        let meta = CatalogMeta {
            table_meta_pages: self
                .tables
                .values()
                .map(|t| (t.table_id, t.meta_page_id))
                .collect(),
            index_meta_pages: self
                .indexes
                .values()
                .map(|i| (i.index_id, i.meta_page_id))
                .collect(),
        };
        let handle = self
            .bpm
            .fetch_page(CATALOG_ROOT_ID)?
            .ok_or(DbError::PageNotFound(CATALOG_ROOT_ID))?;
        {
            let mut frame = write_frame(&handle);
            meta.serialize_to(frame.data_mut())?;
        }
        self.bpm.unpin_page(CATALOG_ROOT_ID, true);
        Ok(())
    }

    pub fn create_table(&mut self, name: impl Into<String>, schema: Schema) -> DbResult<u32> {
        let name = name.into();
        if self.table_name_to_id.contains_key(&name) {
            return Err(DbError::TableAlreadyExists(name));
        }
        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let schema = Arc::new(schema);
        let heap = TableHeap::create(self.bpm.clone(), schema.clone())?;

        let (meta_page_id, handle) = self.bpm.new_page()?.ok_or(DbError::BufferPoolFull)?;
        {
            let mut frame = write_frame(&handle);
            serialize_table_meta(frame.data_mut(), &name, heap.first_page_id(), &schema)?;
        }
        self.bpm.unpin_page(meta_page_id, true);

        self.table_name_to_id.insert(name.clone(), table_id);
        self.tables.insert(
            table_id,
            TableInfo {
                table_id,
                name,
                schema,
                heap,
                meta_page_id,
            },
        );
        self.flush_catalog_meta()?;
        Ok(table_id)
    }

    pub fn get_table(&self, name: &str) -> DbResult<&TableInfo> {
        let id = self
            .table_name_to_id
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_owned()))?;
        Ok(&self.tables[id])
    }

    pub fn get_table_by_id(&self, table_id: u32) -> DbResult<&TableInfo> {
        self.tables
            .get(&table_id)
            .ok_or(DbError::TableNotFound(table_id.to_string()))
    }

    pub fn create_index(
        &mut self,
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        key_schema: Schema,
    ) -> DbResult<u32> {
        let table_name = table_name.into();
        let index_name = index_name.into();
        if !self.table_name_to_id.contains_key(&table_name) {
            return Err(DbError::TableNotFound(table_name));
        }
        let key = (table_name.clone(), index_name.clone());
        if self.index_name_to_id.contains_key(&key) {
            return Err(DbError::IndexAlreadyExists(index_name));
        }
        let index_id = self.next_index_id;
        self.next_index_id += 1;

        let (meta_page_id, handle) = self.bpm.new_page()?.ok_or(DbError::BufferPoolFull)?;
        {
            let mut frame = write_frame(&handle);
            serialize_index_meta(frame.data_mut(), &index_name, &table_name, &key_schema)?;
        }
        self.bpm.unpin_page(meta_page_id, true);

        self.index_name_to_id.insert(key, index_id);
        self.indexes.insert(
            index_id,
            IndexInfo {
                index_id,
                name: index_name,
                table_name,
                key_schema: Arc::new(key_schema),
                meta_page_id,
            },
        );
        self.flush_catalog_meta()?;
        Ok(index_id)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> DbResult<&IndexInfo> {
        let id = self
            .index_name_to_id
            .get(&(table_name.to_owned(), index_name.to_owned()))
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_owned()))?;
        Ok(&self.indexes[id])
    }

    pub fn get_index_by_id(&self, index_id: u32) -> DbResult<&IndexInfo> {
        self.indexes
            .get(&index_id)
            .ok_or(DbError::IndexNotFound(index_id.to_string()))
    }

    /// Serializes the catalog meta back onto the reserved page and flushes
    /// every dirty page in the pool.
    pub fn shutdown(&self) -> DbResult<()> {
        self.flush_catalog_meta()?;
        self.bpm.flush_all_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::disk::DiskManager;
    use crate::record::{Column, ColumnType};
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(
            vec![Column::new_fixed("id", ColumnType::Int32, 0, false, true).unwrap()],
            false,
        )
    }

    #[test]
    fn create_and_reload_table() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("t.db");
        let table_id;
        {
            let dm = DiskManager::new(&db_path).unwrap();
            let bpm = Arc::new(BufferPoolManager::new(16, dm));
            let mut cat = CatalogManager::new(bpm, true).unwrap();
            table_id = cat.create_table("users", schema()).unwrap();
            cat.shutdown().unwrap();
        }
        let dm = DiskManager::new(&db_path).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(16, dm));
        let cat = CatalogManager::new(bpm, false).unwrap();
        let info = cat.get_table_by_id(table_id).unwrap();
        assert_eq!(info.name, "users");
        assert_eq!(info.schema.columns().len(), 1);
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path().join("t.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(16, dm));
        let mut cat = CatalogManager::new(bpm, true).unwrap();
        cat.create_table("users", schema()).unwrap();
        assert!(cat.create_table("users", schema()).is_err());
    }
}
