/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A table heap is a singly linked list of table pages, walked forward
//! from a stored first-page id. It holds a non-owning `Arc` to the buffer
//! pool it was built on top of, and the parent context (catalog or test
//! harness) owns the pool and must outlive every heap built against it.

use std::sync::Arc;

use log::warn;

use crate::buffer::{write_frame, BufferPoolManager};
use crate::constants::{PageIdT, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{DbError, DbResult};
use crate::page::table_page::TablePage;
use crate::record::{Row, RowId, Schema};

pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    schema: Arc<Schema>,
    first_page_id: PageIdT,
}

impl TableHeap {
    /// Creates a brand new, empty heap: allocates its first page.
    pub fn create(bpm: Arc<BufferPoolManager>, schema: Arc<Schema>) -> DbResult<Self> {
        let (page_id, handle) = bpm.new_page()?.ok_or(DbError::BufferPoolFull)?;
        {
            let mut frame = write_frame(&handle);
            TablePage::new(frame.data_mut()).init(page_id, INVALID_PAGE_ID);
        }
        bpm.unpin_page(page_id, true);
        Ok(TableHeap {
            bpm,
            schema,
            first_page_id: page_id,
        })
    }

    /// Re-opens a heap whose first page was already allocated (read from
    /// a table's catalog meta page).
    pub fn open(bpm: Arc<BufferPoolManager>, schema: Arc<Schema>, first_page_id: PageIdT) -> Self {
        TableHeap {
            bpm,
            schema,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageIdT {
        self.first_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Walks the linked list, inserting into the first page that fits and
    /// allocating a new tail page if none does.
    pub fn insert(&self, row: &mut Row) -> DbResult<()> {
        let size = row.serialized_size(&self.schema)?;
        if size >= PAGE_SIZE as u32 {
            return Err(DbError::RecordTooLarge);
        }
        let mut bytes = vec![0u8; size as usize];
        row.serialize_to(&mut bytes, &self.schema)?;

        let mut cur_id = self.first_page_id;
        let mut prev_id = self.first_page_id;
        while cur_id != INVALID_PAGE_ID {
            let handle = self
                .bpm
                .fetch_page(cur_id)?
                .ok_or(DbError::PageNotFound(cur_id))?;
            let (slot, next_id) = {
                let mut frame = write_frame(&handle);
                let mut tp = TablePage::new(frame.data_mut());
                let slot = tp.insert_tuple(&bytes);
                (slot, tp.next_page_id())
            };
            if let Some(slot) = slot {
                row.rid = RowId::new(cur_id, slot);
                self.bpm.unpin_page(cur_id, true);
                return Ok(());
            }
            self.bpm.unpin_page(cur_id, false);
            prev_id = cur_id;
            cur_id = next_id;
        }

        let (new_id, handle) = self.bpm.new_page()?.ok_or(DbError::BufferPoolFull)?;
        let slot = {
            let mut frame = write_frame(&handle);
            let mut tp = TablePage::new(frame.data_mut());
            tp.init(new_id, prev_id);
            tp.insert_tuple(&bytes)
                .expect("a fresh page must fit a row already checked against PAGE_SIZE")
        };
        row.rid = RowId::new(new_id, slot);
        self.bpm.unpin_page(new_id, true);

        let prev_handle = self
            .bpm
            .fetch_page(prev_id)?
            .ok_or(DbError::PageNotFound(prev_id))?;
        {
            let mut frame = write_frame(&prev_handle);
            TablePage::new(frame.data_mut()).set_next_page_id(new_id);
        }
        self.bpm.unpin_page(prev_id, true);
        Ok(())
    }

    fn with_page<R>(&self, page_id: PageIdT, f: impl FnOnce(&mut TablePage) -> R) -> DbResult<R> {
        let handle = self
            .bpm
            .fetch_page(page_id)?
            .ok_or(DbError::PageNotFound(page_id))?;
        let mut frame = write_frame(&handle);
        let mut tp = TablePage::new(frame.data_mut());
        Ok(f(&mut tp))
    }

    pub fn mark_delete(&self, rid: RowId) -> DbResult<()> {
        let result = self.with_page(rid.page_id(), |tp| tp.mark_delete(rid.slot()))?;
        self.bpm.unpin_page(rid.page_id(), true);
        result
    }

    pub fn apply_delete(&self, rid: RowId) -> DbResult<()> {
        let result = self.with_page(rid.page_id(), |tp| tp.apply_delete(rid.slot()))?;
        self.bpm.unpin_page(rid.page_id(), true);
        result
    }

    pub fn rollback_delete(&self, rid: RowId) -> DbResult<()> {
        let result = self.with_page(rid.page_id(), |tp| tp.rollback_delete(rid.slot()))?;
        self.bpm.unpin_page(rid.page_id(), true);
        result
    }

    /// Delegates to the page's `update_tuple`. Per the design's mandated
    /// resolution, this does NOT fall back to delete+insert when the new
    /// row doesn't fit in place; a caller that wants RowId-unstable
    /// update does that itself.
    pub fn update(&self, rid: RowId, new_row: &Row) -> DbResult<bool> {
        let size = new_row.serialized_size(&self.schema)?;
        let mut bytes = vec![0u8; size as usize];
        new_row.serialize_to(&mut bytes, &self.schema)?;
        let ok = self.with_page(rid.page_id(), |tp| tp.update_tuple(rid.slot(), &bytes))??;
        self.bpm.unpin_page(rid.page_id(), ok);
        Ok(ok)
    }

    pub fn get(&self, rid: RowId) -> DbResult<Option<Row>> {
        let result = self.with_page(rid.page_id(), |tp| -> DbResult<Option<Row>> {
            match tp.get_tuple(rid.slot())? {
                Some(bytes) => {
                    let (mut row, _) = Row::deserialize_from(bytes, &self.schema)?;
                    row.rid = rid;
                    Ok(Some(row))
                }
                None => Ok(None),
            }
        })??;
        self.bpm.unpin_page(rid.page_id(), false);
        Ok(result)
    }

    /// Recursively unpins and deletes every page in the chain starting at
    /// `page_id`.
    pub fn delete_table(&self, page_id: PageIdT) -> DbResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Ok(());
        }
        let next = self.with_page(page_id, |tp| tp.next_page_id())?;
        self.bpm.unpin_page(page_id, false);
        if next != INVALID_PAGE_ID {
            self.delete_table(next)?;
        }
        if !self.bpm.delete_page(page_id)? {
            warn!("table heap: could not delete page {page_id}, still pinned");
        }
        Ok(())
    }

    pub(crate) fn bpm(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Returns the first live tuple's RowId in the page chain, or the
    /// invalid sentinel if the table is empty.
    pub fn first_rid(&self) -> DbResult<RowId> {
        let mut cur = self.first_page_id;
        while cur != INVALID_PAGE_ID {
            let (first, next) =
                self.with_page(cur, |tp| (tp.get_first_tuple_rid(), tp.next_page_id()))?;
            self.bpm.unpin_page(cur, false);
            if let Some(slot) = first {
                return Ok(RowId::new(cur, slot));
            }
            cur = next;
        }
        Ok(RowId::invalid())
    }

    /// Returns the RowId following `rid`, walking forward through pages as
    /// needed, or the invalid sentinel at the end of the table.
    pub fn next_rid(&self, rid: RowId) -> DbResult<RowId> {
        let (next_in_page, next_page) = self.with_page(rid.page_id(), |tp| {
            (tp.get_next_tuple_rid(rid.slot()), tp.next_page_id())
        })?;
        self.bpm.unpin_page(rid.page_id(), false);
        if let Some(slot) = next_in_page {
            return Ok(RowId::new(rid.page_id(), slot));
        }
        let mut cur = next_page;
        while cur != INVALID_PAGE_ID {
            let (first, next) =
                self.with_page(cur, |tp| (tp.get_first_tuple_rid(), tp.next_page_id()))?;
            self.bpm.unpin_page(cur, false);
            if let Some(slot) = first {
                return Ok(RowId::new(cur, slot));
            }
            cur = next;
        }
        Ok(RowId::invalid())
    }
}
