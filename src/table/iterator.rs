/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A single-pass cursor over a table heap: `(table_heap, row)`, where
//! `row.rid` identifies the current position. `end()` holds the sentinel
//! invalid RowId. Multiple simultaneous iterators are permitted; they are
//! not synchronized against each other or against concurrent writers.

use crate::error::DbResult;
use crate::record::{Row, RowId};
use crate::table::heap::TableHeap;

pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    rid: RowId,
}

impl<'a> TableIterator<'a> {
    pub fn begin(heap: &'a TableHeap) -> DbResult<Self> {
        let rid = heap.first_rid()?;
        Ok(TableIterator { heap, rid })
    }

    pub fn end(heap: &'a TableHeap) -> Self {
        TableIterator {
            heap,
            rid: RowId::invalid(),
        }
    }

    pub fn is_end(&self) -> bool {
        !self.rid.is_valid()
    }

    /// Yields the current row, or `None` at the end.
    pub fn current(&self) -> DbResult<Option<Row>> {
        if self.is_end() {
            return Ok(None);
        }
        self.heap.get(self.rid)
    }

    /// Advances to the next row. A no-op once `is_end()`.
    pub fn advance(&mut self) -> DbResult<()> {
        if self.is_end() {
            return Ok(());
        }
        self.rid = self.heap.next_rid(self.rid)?;
        Ok(())
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }
        let result = self.heap.get(self.rid);
        if let Err(e) = self.advance() {
            return Some(Err(e));
        }
        match result {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::disk::DiskManager;
    use crate::record::{Column, ColumnType, Field, Schema};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            vec![Column::new_fixed("id", ColumnType::Int32, 0, false, true).unwrap()],
            false,
        ))
    }

    #[test]
    fn iterates_all_inserted_rows() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path().join("t.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(8, dm));
        let schema = schema();
        let heap = TableHeap::create(bpm, schema).unwrap();

        for i in 0..5 {
            let mut row = Row::new(vec![Some(Field::Int32(i))]);
            heap.insert(&mut row).unwrap();
        }

        let values: Vec<i32> = TableIterator::begin(&heap)
            .unwrap()
            .map(|r| match r.unwrap().fields[0].clone().unwrap() {
                Field::Int32(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }
}
