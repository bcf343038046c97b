/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Disk manager: maps logical page ids through a per-extent allocation
//! bitmap onto physical file offsets, and performs page-granular I/O.
//!
//! Physical page 0 is the file meta page. Every following `(1 + N)` run of
//! physical pages is one extent: a bitmap page followed by `N` data pages,
//! where `N = BITS_PER_BITMAP`. All I/O and all meta-buffer access goes
//! through a single lock (the "recursive lock" of the design collapses to
//! one `Mutex` in Rust, held for the whole of each public call).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{error, warn};

use crate::constants::{PageIdT, FILE_META_MAGIC_NUM, INVALID_PAGE_ID, PAGE_SIZE};
use crate::disk::bitmap::{BitmapPage, BITS_PER_BITMAP};
use crate::error::{DbError, DbResult};
use crate::io::{read_u32, write_u32};

const META_HEADER_WORDS: usize = 3; // magic, num_extents, num_allocated_pages
const META_HEADER_SIZE: usize = META_HEADER_WORDS * 4;

/// How many `u32` per-extent used-page counters fit after the header, on
/// one meta page. This bounds how many extents a single file may ever hold.
pub fn max_extents() -> usize {
    (PAGE_SIZE - META_HEADER_SIZE) / 4
}

struct Inner {
    file: File,
    meta: [u8; PAGE_SIZE],
    closed: bool,
}

impl Inner {
    fn num_extents(&self) -> u32 {
        read_u32(&self.meta[4..8]).unwrap_or(0)
    }

    fn set_num_extents(&mut self, v: u32) {
        write_u32(&mut self.meta[4..8], v);
    }

    fn num_allocated_pages(&self) -> u32 {
        read_u32(&self.meta[8..12]).unwrap_or(0)
    }

    fn set_num_allocated_pages(&mut self, v: u32) {
        write_u32(&mut self.meta[8..12], v);
    }

    fn extent_used(&self, ext: u32) -> u32 {
        let off = META_HEADER_SIZE + ext as usize * 4;
        read_u32(&self.meta[off..off + 4]).unwrap_or(0)
    }

    fn set_extent_used(&mut self, ext: u32, v: u32) {
        let off = META_HEADER_SIZE + ext as usize * 4;
        write_u32(&mut self.meta[off..off + 4], v);
    }

    /// Physical page id of the bitmap page heading extent `ext`.
    fn bitmap_physical(ext: u32) -> u64 {
        1 + ext as u64 * (BITS_PER_BITMAP as u64 + 1)
    }

    /// Physical page id for logical page `l`.
    fn data_physical(l: PageIdT) -> u64 {
        let l = l as u64;
        let ext = l / BITS_PER_BITMAP as u64;
        let offset = l % BITS_PER_BITMAP as u64;
        Self::bitmap_physical(ext as u32) + 1 + offset
    }

    fn read_physical(&mut self, phys: u64, buf: &mut [u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = phys * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        buf.fill(0);
        let mut read_total = 0usize;
        loop {
            match self.file.read(&mut buf[read_total..]) {
                Ok(0) => break,
                Ok(n) => read_total += n,
                Err(e) => {
                    error!("disk manager: read failed at physical page {phys}: {e}");
                    return Err(DbError::Io(e));
                }
            }
        }
        Ok(())
    }

    fn write_physical(&mut self, phys: u64, buf: &[u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = phys * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = self.file.write_all(buf) {
            error!("disk manager: write failed at physical page {phys}: {e}");
            return Err(DbError::Io(e));
        }
        Ok(())
    }

    fn read_bitmap(&mut self, ext: u32) -> DbResult<[u8; PAGE_SIZE]> {
        let mut buf = [0u8; PAGE_SIZE];
        self.read_physical(Self::bitmap_physical(ext), &mut buf)?;
        Ok(buf)
    }

    fn allocate_in_extent(&mut self, ext: u32) -> DbResult<PageIdT> {
        let mut buf = self.read_bitmap(ext)?;
        let mut bitmap = BitmapPage::new(&mut buf);
        let offset = match bitmap.allocate() {
            Some(o) => o,
            None => return Ok(INVALID_PAGE_ID),
        };
        drop(bitmap);
        self.write_physical(Self::bitmap_physical(ext), &buf)?;
        self.set_extent_used(ext, self.extent_used(ext) + 1);
        self.set_num_allocated_pages(self.num_allocated_pages() + 1);
        Ok((ext as u64 * BITS_PER_BITMAP as u64 + offset as u64) as PageIdT)
    }
}

pub struct DiskManager {
    inner: Mutex<Inner>,
}

impl DiskManager {
    /// Opens `path`, creating it (and its parent directories) if absent.
    pub fn new<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut meta = [0u8; PAGE_SIZE];
        if is_new {
            write_u32(&mut meta[0..4], FILE_META_MAGIC_NUM);
            file.write_all(&meta)?;
            file.seek(SeekFrom::Start(0))?;
        } else {
            file.seek(SeekFrom::Start(0))?;
            let mut read_total = 0usize;
            loop {
                match file.read(&mut meta[read_total..]) {
                    Ok(0) => break,
                    Ok(n) => read_total += n,
                    Err(e) => return Err(DbError::Io(e)),
                }
            }
            let magic = read_u32(&meta[0..4])?;
            if magic != FILE_META_MAGIC_NUM {
                return Err(DbError::Corrupt(format!(
                    "bad file meta magic: {magic:#x}"
                )));
            }
        }

        Ok(DiskManager {
            inner: Mutex::new(Inner {
                file,
                meta,
                closed: false,
            }),
        })
    }

    pub fn allocate_page(&self) -> DbResult<PageIdT> {
        let mut inner = self.inner.lock().unwrap();
        let num_extents = inner.num_extents();
        for ext in 0..num_extents {
            if inner.extent_used(ext) < BITS_PER_BITMAP as u32 {
                return inner.allocate_in_extent(ext);
            }
        }
        if num_extents as usize >= max_extents() {
            warn!("disk manager: file is full, cannot add another extent");
            return Ok(INVALID_PAGE_ID);
        }
        let ext = num_extents;
        let zero = [0u8; PAGE_SIZE];
        let bitmap_phys = Inner::bitmap_physical(ext);
        inner.write_physical(bitmap_phys, &zero)?;
        inner.set_num_extents(ext + 1);
        inner.allocate_in_extent(ext)
    }

    pub fn deallocate_page(&self, l: PageIdT) -> DbResult<()> {
        if l == INVALID_PAGE_ID {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        let ext = (l as u64 / BITS_PER_BITMAP as u64) as u32;
        let offset = (l as u64 % BITS_PER_BITMAP as u64) as u32;
        let mut buf = inner.read_bitmap(ext)?;
        let mut bitmap = BitmapPage::new(&mut buf);
        let was_set = bitmap.deallocate(offset);
        drop(bitmap);
        if !was_set {
            return Ok(());
        }
        inner.write_physical(Inner::bitmap_physical(ext), &buf)?;
        inner.set_extent_used(ext, inner.extent_used(ext).saturating_sub(1));
        inner.set_num_allocated_pages(inner.num_allocated_pages().saturating_sub(1));
        Ok(())
    }

    pub fn is_page_free(&self, l: PageIdT) -> DbResult<bool> {
        if l == INVALID_PAGE_ID {
            return Ok(true);
        }
        let mut inner = self.inner.lock().unwrap();
        let ext = (l as u64 / BITS_PER_BITMAP as u64) as u32;
        let offset = (l as u64 % BITS_PER_BITMAP as u64) as u32;
        let buf = inner.read_bitmap(ext)?;
        let mut scratch = buf;
        Ok(BitmapPage::new(&mut scratch).is_free(offset))
    }

    pub fn read_page(&self, l: PageIdT, buf: &mut [u8]) -> DbResult<()> {
        if l == INVALID_PAGE_ID {
            return Err(DbError::PageNotFound(l));
        }
        let mut inner = self.inner.lock().unwrap();
        let phys = Inner::data_physical(l);
        inner.read_physical(phys, buf)
    }

    pub fn write_page(&self, l: PageIdT, buf: &[u8]) -> DbResult<()> {
        if l == INVALID_PAGE_ID {
            return Err(DbError::PageNotFound(l));
        }
        let mut inner = self.inner.lock().unwrap();
        let phys = Inner::data_physical(l);
        inner.write_physical(phys, buf)
    }

    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().unwrap().num_allocated_pages()
    }

    /// Writes the meta page and closes the file. Safe to call more than
    /// once; the second call is a no-op.
    pub fn close(&self) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Ok(());
        }
        let meta = inner.meta;
        inner.write_physical(0, &meta)?;
        inner.file.flush()?;
        inner.closed = true;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("disk manager: error flushing meta page on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_manager() -> (tempfile::TempDir, DiskManager) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::new(&path).unwrap();
        (dir, dm)
    }

    #[test]
    fn allocate_then_free_roundtrip() {
        let (_dir, dm) = temp_manager();
        let p = dm.allocate_page().unwrap();
        assert_ne!(p, INVALID_PAGE_ID);
        assert!(!dm.is_page_free(p).unwrap());
        dm.deallocate_page(p).unwrap();
        assert!(dm.is_page_free(p).unwrap());
    }

    #[test]
    fn write_then_reopen_preserves_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xab;
        data[PAGE_SIZE - 1] = 0xcd;
        let p;
        {
            let dm = DiskManager::new(&path).unwrap();
            p = dm.allocate_page().unwrap();
            dm.write_page(p, &data).unwrap();
            dm.close().unwrap();
        }
        let dm = DiskManager::new(&path).unwrap();
        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(p, &mut out).unwrap();
        assert_eq!(&out[..], &data[..]);
    }

    #[test]
    fn short_read_past_eof_is_zero_filled() {
        let (_dir, dm) = temp_manager();
        let p = dm.allocate_page().unwrap();
        let mut out = [0xffu8; PAGE_SIZE];
        dm.read_page(p, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn deallocate_is_idempotent() {
        let (_dir, dm) = temp_manager();
        let p = dm.allocate_page().unwrap();
        dm.deallocate_page(p).unwrap();
        dm.deallocate_page(p).unwrap();
        assert!(dm.is_page_free(p).unwrap());
    }
}
