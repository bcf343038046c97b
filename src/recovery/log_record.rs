/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A log record carries a type, its own LSN, the previous LSN within its
//! transaction (or "invalid" for `Begin`), the transaction id, and a
//! payload. The core models a key/value image, so payloads are short
//! string keys and 32-bit integer values, with wider payloads future work.

use crate::constants::{LsnT, TxnIdT};

#[derive(Debug, Clone, PartialEq)]
pub enum LogRecordKind {
    Begin,
    Commit,
    Abort,
    Insert { key: String, value: i32 },
    Delete { key: String, value: i32 },
    Update {
        old_key: String,
        old_value: i32,
        new_key: String,
        new_value: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: LsnT,
    pub prev_lsn: LsnT,
    pub txn_id: TxnIdT,
    pub kind: LogRecordKind,
}
