/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

pub mod log_record;
pub mod manager;

pub use log_record::{LogRecord, LogRecordKind};
pub use manager::{Checkpoint, RecoveryManager};
