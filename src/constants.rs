/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Shared type aliases and tunables, mirroring the original `jin` crate's
//! `constants.rs` module.

/// Logical and physical page ids. Signed so `-1` can serve as the "invalid"
/// sentinel without a separate `Option` wrapper on every hot path.
pub type PageIdT = i32;

/// Frame ids within the buffer pool's fixed frame array.
pub type FrameIdT = i32;

/// Log sequence numbers, monotonically increasing from 0.
pub type LsnT = i64;

/// Transaction identifiers.
pub type TxnIdT = i64;

/// Slot index within a table page's slot directory.
pub type SlotIdT = u32;

pub const INVALID_PAGE_ID: PageIdT = -1;
pub const INVALID_FRAME_ID: FrameIdT = -1;
pub const INVALID_LSN: LsnT = -1;
pub const INVALID_TXN_ID: TxnIdT = -1;

/// Bytes per page. 4 KiB, as recommended.
pub const PAGE_SIZE: usize = 4096;

/// Default number of frames in a freshly constructed buffer pool.
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Reserved logical page id holding the catalog meta page.
pub const CATALOG_ROOT_ID: PageIdT = 0;

pub const COLUMN_MAGIC_NUM: u32 = 210928;
pub const SCHEMA_MAGIC_NUM: u32 = 200715;
pub const CATALOG_MAGIC_NUM: u32 = 89849;
pub const FILE_META_MAGIC_NUM: u32 = 1231009;
