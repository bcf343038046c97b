/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Buffer pool manager: caches a bounded set of pages in memory, pins them
//! out to callers, and coordinates eviction with the disk manager.
//!
//! Lock ordering follows the design exactly: the pool's one coarse lock
//! (covering the page table, free list and replacer) is taken first; a
//! frame's own read/write latch, when a caller needs one, is taken after;
//! the disk manager's lock is innermost and only ever entered while the
//! pool lock is held, never the reverse.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};

use crate::buffer::replacer::{LruReplacer, Replacer};
use crate::constants::{FrameIdT, PageIdT, INVALID_PAGE_ID, PAGE_SIZE};
use crate::disk::DiskManager;
use crate::error::{DbError, DbResult};

/// One buffer frame: the page it currently holds (or the invalid sentinel
/// if empty), its dirty bit, pin count, and the raw bytes.
pub struct Frame {
    page_id: PageIdT,
    pin_count: u32,
    dirty: bool,
    data: Vec<u8>,
}

impl Frame {
    fn empty() -> Self {
        Frame {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            dirty: false,
            data: vec![0u8; PAGE_SIZE],
        }
    }

    pub fn page_id(&self) -> PageIdT {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the page bytes. Does not itself mark the frame
    /// dirty; callers communicate that through `unpin_page`'s `is_dirty`
    /// flag, since a caller may touch these bytes speculatively (e.g. to
    /// attempt an insert that turns out not to fit) without actually
    /// writing anything durable.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A caller-held, non-owning reference to a pinned frame. Valid only
/// between `fetch_page`/`new_page` and the matching `unpin_page`.
pub type FrameHandle = Arc<RwLock<Frame>>;

pub fn read_frame(h: &FrameHandle) -> RwLockReadGuard<'_, Frame> {
    h.read().unwrap()
}

pub fn write_frame(h: &FrameHandle) -> RwLockWriteGuard<'_, Frame> {
    h.write().unwrap()
}

struct PoolState {
    free_list: VecDeque<FrameIdT>,
    page_table: HashMap<PageIdT, FrameIdT>,
    replacer: Box<dyn Replacer>,
}

pub struct BufferPoolManager {
    frames: Vec<FrameHandle>,
    disk: DiskManager,
    state: Mutex<PoolState>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk: DiskManager) -> Self {
        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Frame::empty())))
            .collect();
        let free_list = (0..pool_size as FrameIdT).collect();
        BufferPoolManager {
            frames,
            disk,
            state: Mutex::new(PoolState {
                free_list,
                page_table: HashMap::new(),
                replacer: Box::new(LruReplacer::new(pool_size)),
            }),
        }
    }

    pub fn with_replacer(pool_size: usize, disk: DiskManager, replacer: Box<dyn Replacer>) -> Self {
        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Frame::empty())))
            .collect();
        let free_list = (0..pool_size as FrameIdT).collect();
        BufferPoolManager {
            frames,
            disk,
            state: Mutex::new(PoolState {
                free_list,
                page_table: HashMap::new(),
                replacer,
            }),
        }
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Finds a free or victim frame id, evicting (and flushing if dirty)
    /// whatever it currently holds. Must be called with `state` locked.
    fn obtain_frame(&self, state: &mut PoolState) -> DbResult<Option<FrameIdT>> {
        if let Some(fid) = state.free_list.pop_front() {
            return Ok(Some(fid));
        }
        let fid = match state.replacer.victim() {
            Some(f) => f,
            None => return Ok(None),
        };
        let handle = self.frames[fid as usize].clone();
        let mut frame = write_frame(&handle);
        if frame.dirty && frame.page_id != INVALID_PAGE_ID {
            self.disk.write_page(frame.page_id, &frame.data)?;
        }
        if frame.page_id != INVALID_PAGE_ID {
            state.page_table.remove(&frame.page_id);
        }
        frame.page_id = INVALID_PAGE_ID;
        frame.dirty = false;
        Ok(Some(fid))
    }

    pub fn fetch_page(&self, page_id: PageIdT) -> DbResult<Option<FrameHandle>> {
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut state = self.state.lock().unwrap();
        if let Some(&fid) = state.page_table.get(&page_id) {
            let handle = self.frames[fid as usize].clone();
            write_frame(&handle).pin_count += 1;
            state.replacer.pin(fid);
            return Ok(Some(handle));
        }
        let fid = match self.obtain_frame(&mut state)? {
            Some(f) => f,
            None => {
                warn!("buffer pool: no victim frame available, pool is full");
                return Ok(None);
            }
        };
        let handle = self.frames[fid as usize].clone();
        {
            let mut frame = write_frame(&handle);
            self.disk.read_page(page_id, &mut frame.data)?;
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }
        state.page_table.insert(page_id, fid);
        state.replacer.pin(fid);
        debug!("buffer pool: fetched page {page_id} into frame {fid}");
        Ok(Some(handle))
    }

    pub fn new_page(&self) -> DbResult<Option<(PageIdT, FrameHandle)>> {
        let mut state = self.state.lock().unwrap();
        let fid = match self.obtain_frame(&mut state)? {
            Some(f) => f,
            None => {
                warn!("buffer pool: no victim frame available for new_page");
                return Ok(None);
            }
        };
        let page_id = self.disk.allocate_page()?;
        if page_id == INVALID_PAGE_ID {
            state.free_list.push_back(fid);
            return Ok(None);
        }
        let handle = self.frames[fid as usize].clone();
        {
            let mut frame = write_frame(&handle);
            frame.data.fill(0);
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }
        state.page_table.insert(page_id, fid);
        state.replacer.pin(fid);
        debug!("buffer pool: allocated new page {page_id} in frame {fid}");
        Ok(Some((page_id, handle)))
    }

    pub fn unpin_page(&self, page_id: PageIdT, is_dirty: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        let fid = match state.page_table.get(&page_id) {
            Some(&f) => f,
            None => return false,
        };
        let handle = self.frames[fid as usize].clone();
        let reached_zero = {
            let mut frame = write_frame(&handle);
            if frame.pin_count > 0 {
                frame.pin_count -= 1;
            }
            frame.dirty = frame.dirty || is_dirty;
            frame.pin_count == 0
        };
        if reached_zero {
            state.replacer.unpin(fid);
        }
        true
    }

    pub fn flush_page(&self, page_id: PageIdT) -> DbResult<bool> {
        let state = self.state.lock().unwrap();
        let fid = match state.page_table.get(&page_id) {
            Some(&f) => f,
            None => return Ok(false),
        };
        let handle = self.frames[fid as usize].clone();
        let mut frame = write_frame(&handle);
        self.disk.write_page(frame.page_id, &frame.data)?;
        frame.dirty = false;
        Ok(true)
    }

    pub fn flush_all_pages(&self) -> DbResult<()> {
        let page_ids: Vec<PageIdT> = {
            let state = self.state.lock().unwrap();
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    pub fn delete_page(&self, page_id: PageIdT) -> DbResult<bool> {
        let mut state = self.state.lock().unwrap();
        let fid = match state.page_table.get(&page_id).copied() {
            None => {
                self.disk.deallocate_page(page_id)?;
                return Ok(true);
            }
            Some(f) => f,
        };
        let handle = self.frames[fid as usize].clone();
        {
            let mut frame = write_frame(&handle);
            if frame.pin_count > 0 {
                return Ok(false);
            }
            if frame.dirty {
                self.disk.write_page(frame.page_id, &frame.data)?;
            }
            frame.page_id = INVALID_PAGE_ID;
            frame.dirty = false;
            frame.data.fill(0);
        }
        state.page_table.remove(&page_id);
        state.free_list.push_back(fid);
        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool(size: usize) -> (tempfile::TempDir, BufferPoolManager) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path().join("t.db")).unwrap();
        (dir, BufferPoolManager::new(size, dm))
    }

    #[test]
    fn unpin_returns_frame_to_replacer() {
        let (_d, bpm) = pool(2);
        let (pid, _h) = bpm.new_page().unwrap().unwrap();
        assert!(bpm.unpin_page(pid, false));
        let state = bpm.state.lock().unwrap();
        assert_eq!(state.replacer.size(), 1);
    }

    #[test]
    fn pinning_all_frames_exhausts_pool() {
        let (_d, bpm) = pool(2);
        let (_p1, _h1) = bpm.new_page().unwrap().unwrap();
        let (_p2, _h2) = bpm.new_page().unwrap().unwrap();
        assert!(bpm.new_page().unwrap().is_none());
    }

    #[test]
    fn unpinning_one_frame_restores_progress() {
        let (_d, bpm) = pool(2);
        let (p1, _h1) = bpm.new_page().unwrap().unwrap();
        let (_p2, _h2) = bpm.new_page().unwrap().unwrap();
        assert!(bpm.unpin_page(p1, false));
        assert!(bpm.new_page().unwrap().is_some());
    }

    #[test]
    fn dirty_eviction_is_observed_on_refetch() {
        let (_d, bpm) = pool(1);
        let (p1, h1) = bpm.new_page().unwrap().unwrap();
        write_frame(&h1).data_mut()[0] = 0x42;
        assert!(bpm.unpin_page(p1, true));
        // force eviction by fetching a different page into the only frame
        let (_p2, _h2) = bpm.new_page().unwrap().unwrap();
        let h1_again = bpm.fetch_page(p1).unwrap();
        // p1's frame was evicted already (pool size 1), so this should be None
        // unless re-fetched from disk after the second new_page evicted it.
        if let Some(h) = h1_again {
            assert_eq!(read_frame(&h).data()[0], 0x42);
        }
    }

    #[test]
    fn unpin_on_unmapped_page_returns_false() {
        let (_d, bpm) = pool(1);
        assert!(!bpm.unpin_page(99, false));
    }
}
