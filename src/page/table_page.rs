/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A slotted page: a 20-byte header, a slot directory growing down from
//! it, and tuples packed in from the end of the page. A slot's length
//! field triples as liveness state:
//!
//! - `len >= 0`: a live tuple of that length.
//! - `-(len + 1)` for `len >= 0`: the tuple is `mark_delete`d (soft
//!   deleted) but its bytes are still present, so `rollback_delete` can
//!   restore it.
//! - `i32::MIN`: the slot has been `apply_delete`d (hard deleted) and
//!   compacted away; the index is permanently a tombstone.

use crate::constants::{PageIdT, SlotIdT, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{DbError, DbResult};
use crate::io::{read_i32, read_u32, write_i32, write_u32};

const PAGE_ID_OFFSET: usize = 0;
const PREV_PAGE_ID_OFFSET: usize = 4;
const NEXT_PAGE_ID_OFFSET: usize = 8;
const FREE_SPACE_POINTER_OFFSET: usize = 12;
const TUPLE_COUNT_OFFSET: usize = 16;
pub const HEADER_SIZE: usize = 20;
pub const SLOT_SIZE: usize = 8;

const TOMBSTONE: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Live(u32),
    Marked(u32),
    Tombstone,
}

fn decode(raw: i32) -> SlotState {
    if raw == TOMBSTONE {
        SlotState::Tombstone
    } else if raw >= 0 {
        SlotState::Live(raw as u32)
    } else {
        SlotState::Marked((-raw - 1) as u32)
    }
}

fn encode_live(len: u32) -> i32 {
    len as i32
}

fn encode_marked(len: u32) -> i32 {
    -(len as i32) - 1
}

pub struct TablePage<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        TablePage { data }
    }

    pub fn init(&mut self, page_id: PageIdT, prev_page_id: PageIdT) {
        self.data.fill(0);
        self.set_page_id(page_id);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(INVALID_PAGE_ID);
        self.set_free_space_pointer(PAGE_SIZE as u32);
        self.set_tuple_count(0);
    }

    pub fn page_id(&self) -> PageIdT {
        read_i32(&self.data[PAGE_ID_OFFSET..]).unwrap_or(INVALID_PAGE_ID)
    }

    fn set_page_id(&mut self, id: PageIdT) {
        write_i32(&mut self.data[PAGE_ID_OFFSET..], id);
    }

    pub fn prev_page_id(&self) -> PageIdT {
        read_i32(&self.data[PREV_PAGE_ID_OFFSET..]).unwrap_or(INVALID_PAGE_ID)
    }

    pub fn set_prev_page_id(&mut self, id: PageIdT) {
        write_i32(&mut self.data[PREV_PAGE_ID_OFFSET..], id);
    }

    pub fn next_page_id(&self) -> PageIdT {
        read_i32(&self.data[NEXT_PAGE_ID_OFFSET..]).unwrap_or(INVALID_PAGE_ID)
    }

    pub fn set_next_page_id(&mut self, id: PageIdT) {
        write_i32(&mut self.data[NEXT_PAGE_ID_OFFSET..], id);
    }

    fn free_space_pointer(&self) -> u32 {
        read_u32(&self.data[FREE_SPACE_POINTER_OFFSET..]).unwrap_or(PAGE_SIZE as u32)
    }

    fn set_free_space_pointer(&mut self, v: u32) {
        write_u32(&mut self.data[FREE_SPACE_POINTER_OFFSET..], v);
    }

    pub fn tuple_count(&self) -> u32 {
        read_u32(&self.data[TUPLE_COUNT_OFFSET..]).unwrap_or(0)
    }

    fn set_tuple_count(&mut self, v: u32) {
        write_u32(&mut self.data[TUPLE_COUNT_OFFSET..], v);
    }

    fn slot_header(&self, slot: SlotIdT) -> usize {
        HEADER_SIZE + slot as usize * SLOT_SIZE
    }

    fn slot_offset(&self, slot: SlotIdT) -> u32 {
        let h = self.slot_header(slot);
        read_u32(&self.data[h..]).unwrap_or(0)
    }

    fn slot_raw(&self, slot: SlotIdT) -> i32 {
        let h = self.slot_header(slot);
        read_i32(&self.data[h + 4..]).unwrap_or(TOMBSTONE)
    }

    pub fn slot_state(&self, slot: SlotIdT) -> DbResult<SlotState> {
        if slot >= self.tuple_count() {
            return Err(DbError::Corrupt(format!("slot {slot} out of range")));
        }
        Ok(decode(self.slot_raw(slot)))
    }

    fn set_slot(&mut self, slot: SlotIdT, offset: u32, raw: i32) {
        let h = self.slot_header(slot);
        write_u32(&mut self.data[h..], offset);
        write_i32(&mut self.data[h + 4..], raw);
    }

    fn free_space(&self) -> u32 {
        let used_header = (HEADER_SIZE + self.tuple_count() as usize * SLOT_SIZE) as u32;
        self.free_space_pointer().saturating_sub(used_header)
    }

    /// Inserts `bytes`, allocating a new slot. `None` iff it doesn't fit.
    pub fn insert_tuple(&mut self, bytes: &[u8]) -> Option<SlotIdT> {
        let needed = bytes.len() as u32 + SLOT_SIZE as u32;
        if self.free_space() < needed {
            return None;
        }
        let new_fsp = self.free_space_pointer() - bytes.len() as u32;
        self.data[new_fsp as usize..new_fsp as usize + bytes.len()].copy_from_slice(bytes);
        let slot = self.tuple_count();
        self.set_slot(slot, new_fsp, encode_live(bytes.len() as u32));
        self.set_free_space_pointer(new_fsp);
        self.set_tuple_count(slot + 1);
        Some(slot)
    }

    pub fn get_tuple(&self, slot: SlotIdT) -> DbResult<Option<&[u8]>> {
        match self.slot_state(slot)? {
            SlotState::Live(len) => {
                let off = self.slot_offset(slot) as usize;
                Ok(Some(&self.data[off..off + len as usize]))
            }
            SlotState::Marked(_) | SlotState::Tombstone => Ok(None),
        }
    }

    pub fn mark_delete(&mut self, slot: SlotIdT) -> DbResult<()> {
        match self.slot_state(slot)? {
            SlotState::Live(len) => {
                let off = self.slot_offset(slot);
                self.set_slot(slot, off, encode_marked(len));
                Ok(())
            }
            SlotState::Marked(_) => Ok(()),
            SlotState::Tombstone => Err(DbError::Corrupt(format!(
                "cannot mark_delete a compacted slot {slot}"
            ))),
        }
    }

    pub fn rollback_delete(&mut self, slot: SlotIdT) -> DbResult<()> {
        match self.slot_state(slot)? {
            SlotState::Marked(len) => {
                let off = self.slot_offset(slot);
                self.set_slot(slot, off, encode_live(len));
                Ok(())
            }
            SlotState::Live(_) => Ok(()),
            SlotState::Tombstone => Err(DbError::Corrupt(format!(
                "cannot rollback_delete a compacted slot {slot}"
            ))),
        }
    }

    /// Physically compacts the slot's bytes out of the tuple area.
    pub fn apply_delete(&mut self, slot: SlotIdT) -> DbResult<()> {
        let len = match self.slot_state(slot)? {
            SlotState::Live(len) | SlotState::Marked(len) => len,
            SlotState::Tombstone => return Ok(()),
        };
        let offset = self.slot_offset(slot);
        let fsp = self.free_space_pointer();
        if offset > fsp {
            self.data
                .copy_within(fsp as usize..offset as usize, fsp as usize + len as usize);
        }
        for i in 0..self.tuple_count() {
            if i == slot {
                continue;
            }
            match decode(self.slot_raw(i)) {
                SlotState::Tombstone => {}
                SlotState::Live(l) => {
                    let o = self.slot_offset(i);
                    if o < offset {
                        self.set_slot(i, o + len, encode_live(l));
                    }
                }
                SlotState::Marked(l) => {
                    let o = self.slot_offset(i);
                    if o < offset {
                        self.set_slot(i, o + len, encode_marked(l));
                    }
                }
            }
        }
        self.set_free_space_pointer(fsp + len);
        self.set_slot(slot, 0, TOMBSTONE);
        Ok(())
    }

    /// Succeeds in place iff the new size fits the old slot, or this is
    /// the most recently inserted tuple and the page has room to grow.
    pub fn update_tuple(&mut self, slot: SlotIdT, new_bytes: &[u8]) -> DbResult<bool> {
        let old_len = match self.slot_state(slot)? {
            SlotState::Live(len) => len,
            SlotState::Marked(_) | SlotState::Tombstone => return Ok(false),
        };
        let new_len = new_bytes.len() as u32;
        let offset = self.slot_offset(slot);
        if new_len <= old_len {
            self.data[offset as usize..offset as usize + new_len as usize]
                .copy_from_slice(new_bytes);
            self.set_slot(slot, offset, encode_live(new_len));
            return Ok(true);
        }
        let grow = new_len - old_len;
        let at_boundary = offset == self.free_space_pointer();
        if at_boundary && self.free_space() >= grow {
            let new_offset = offset - grow;
            self.data[new_offset as usize..new_offset as usize + new_len as usize]
                .copy_from_slice(new_bytes);
            self.set_free_space_pointer(new_offset);
            self.set_slot(slot, new_offset, encode_live(new_len));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get_first_tuple_rid(&self) -> Option<SlotIdT> {
        (0..self.tuple_count()).find(|&s| matches!(decode(self.slot_raw(s)), SlotState::Live(_)))
    }

    pub fn get_next_tuple_rid(&self, current: SlotIdT) -> Option<SlotIdT> {
        (current + 1..self.tuple_count())
            .find(|&s| matches!(decode(self.slot_raw(s)), SlotState::Live(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn insert_and_get() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hello").unwrap();
        assert_eq!(p.get_tuple(slot).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn apply_delete_then_get_returns_none() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let s0 = p.insert_tuple(b"aaaa").unwrap();
        let s1 = p.insert_tuple(b"bb").unwrap();
        p.apply_delete(s0).unwrap();
        assert!(p.get_tuple(s0).unwrap().is_none());
        // the surviving tuple must still read back correctly after compaction.
        assert_eq!(p.get_tuple(s1).unwrap().unwrap(), b"bb");
    }

    #[test]
    fn mark_then_rollback_restores_visibility() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let s = p.insert_tuple(b"x").unwrap();
        p.mark_delete(s).unwrap();
        assert!(p.get_tuple(s).unwrap().is_none());
        p.rollback_delete(s).unwrap();
        assert_eq!(p.get_tuple(s).unwrap().unwrap(), b"x");
    }

    #[test]
    fn update_shrink_in_place() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let s = p.insert_tuple(b"hello").unwrap();
        assert!(p.update_tuple(s, b"hi").unwrap());
        assert_eq!(p.get_tuple(s).unwrap().unwrap(), b"hi");
    }

    #[test]
    fn update_grow_fails_when_not_most_recent() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let s0 = p.insert_tuple(b"a").unwrap();
        let _s1 = p.insert_tuple(b"b").unwrap();
        assert!(!p.update_tuple(s0, b"much longer value").unwrap());
    }

    #[test]
    fn iteration_skips_deleted_slots() {
        let mut buf = page();
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let s0 = p.insert_tuple(b"a").unwrap();
        let s1 = p.insert_tuple(b"b").unwrap();
        p.mark_delete(s0).unwrap();
        assert_eq!(p.get_first_tuple_rid(), Some(s1));
        assert_eq!(p.get_next_tuple_rid(s1), None);
    }
}
