/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Crate-wide error type. Mirrors the two error bands from the design: most
//! variants are ordinary, caller-recoverable conditions (full pool, missing
//! table, oversized row); `Corrupt` is reserved for structural/invariant
//! violations such as a magic-number mismatch, and callers are expected to
//! treat it as a programmer/on-disk-corruption error rather than retry.

use crate::constants::PageIdT;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk is full, no more pages can be allocated")]
    DiskFull,

    #[error("buffer pool is full, every frame is pinned")]
    BufferPoolFull,

    #[error("page {0} not found")]
    PageNotFound(PageIdT),

    #[error("row does not fit in a single page")]
    RecordTooLarge,

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    #[error("index '{0}' not found")]
    IndexNotFound(String),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;
