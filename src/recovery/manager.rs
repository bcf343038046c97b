/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Single-threaded, in-memory redo/undo engine over a key/value image.
//! `next_lsn`/`prev_lsn` bookkeeping lives on the manager itself rather
//! than as process-wide static state (the source's `LogRec::next_lsn_` /
//! `prev_lsn_map_` statics), so tests can build independent managers.

use std::collections::{BTreeMap, HashMap};

use log::info;

use crate::constants::{LsnT, TxnIdT, INVALID_LSN};
use crate::recovery::log_record::{LogRecord, LogRecordKind};

/// A snapshot taken at some point in the log, used to bound how far back
/// `redo` has to replay.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub persist_lsn: LsnT,
    pub active_txns: HashMap<TxnIdT, LsnT>,
    pub image: HashMap<String, i32>,
}

impl Checkpoint {
    pub fn new(persist_lsn: LsnT) -> Self {
        Checkpoint {
            persist_lsn,
            active_txns: HashMap::new(),
            image: HashMap::new(),
        }
    }

    pub fn add_active_txn(&mut self, txn_id: TxnIdT, last_lsn: LsnT) {
        self.active_txns.insert(txn_id, last_lsn);
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: i32) {
        self.image.insert(key.into(), value);
    }
}

pub struct RecoveryManager {
    next_lsn: LsnT,
    prev_lsn_of: HashMap<TxnIdT, LsnT>,
    log: BTreeMap<LsnT, LogRecord>,
    persist_lsn: LsnT,
    active_txns: HashMap<TxnIdT, LsnT>,
    image: HashMap<String, i32>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        RecoveryManager {
            next_lsn: 0,
            prev_lsn_of: HashMap::new(),
            log: BTreeMap::new(),
            persist_lsn: INVALID_LSN,
            active_txns: HashMap::new(),
            image: HashMap::new(),
        }
    }

    pub fn init(&mut self, checkpoint: Checkpoint) {
        self.persist_lsn = checkpoint.persist_lsn;
        self.active_txns = checkpoint.active_txns;
        self.image = checkpoint.image;
    }

    pub fn image(&self) -> &HashMap<String, i32> {
        &self.image
    }

    pub fn active_txns(&self) -> &HashMap<TxnIdT, LsnT> {
        &self.active_txns
    }

    fn append(&mut self, txn_id: TxnIdT, kind: LogRecordKind) -> LsnT {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        let prev_lsn = *self.prev_lsn_of.get(&txn_id).unwrap_or(&INVALID_LSN);
        self.prev_lsn_of.insert(txn_id, lsn);
        self.log.insert(
            lsn,
            LogRecord {
                lsn,
                prev_lsn,
                txn_id,
                kind,
            },
        );
        lsn
    }

    pub fn append_begin(&mut self, txn_id: TxnIdT) -> LsnT {
        self.prev_lsn_of.insert(txn_id, INVALID_LSN);
        self.append(txn_id, LogRecordKind::Begin)
    }

    pub fn append_commit(&mut self, txn_id: TxnIdT) -> LsnT {
        self.append(txn_id, LogRecordKind::Commit)
    }

    pub fn append_abort(&mut self, txn_id: TxnIdT) -> LsnT {
        self.append(txn_id, LogRecordKind::Abort)
    }

    pub fn append_insert(&mut self, txn_id: TxnIdT, key: impl Into<String>, value: i32) -> LsnT {
        self.append(
            txn_id,
            LogRecordKind::Insert {
                key: key.into(),
                value,
            },
        )
    }

    pub fn append_delete(&mut self, txn_id: TxnIdT, key: impl Into<String>, value: i32) -> LsnT {
        self.append(
            txn_id,
            LogRecordKind::Delete {
                key: key.into(),
                value,
            },
        )
    }

    pub fn append_update(
        &mut self,
        txn_id: TxnIdT,
        old_key: impl Into<String>,
        old_value: i32,
        new_key: impl Into<String>,
        new_value: i32,
    ) -> LsnT {
        self.append(
            txn_id,
            LogRecordKind::Update {
                old_key: old_key.into(),
                old_value,
                new_key: new_key.into(),
                new_value,
            },
        )
    }

    /// Applies every record with LSN greater than the persisted watermark,
    /// in ascending order, to the image.
    pub fn redo(&mut self) {
        info!("recovery: redo phase");
        let lsns: Vec<LsnT> = self
            .log
            .range((self.persist_lsn + 1)..)
            .map(|(&lsn, _)| lsn)
            .collect();
        for lsn in lsns {
            let rec = self.log.get(&lsn).expect("lsn was just listed").clone();
            match &rec.kind {
                LogRecordKind::Begin => {
                    self.active_txns.insert(rec.txn_id, rec.lsn);
                }
                LogRecordKind::Commit | LogRecordKind::Abort => {
                    self.active_txns.remove(&rec.txn_id);
                }
                LogRecordKind::Insert { key, value } => {
                    self.image.insert(key.clone(), *value);
                    self.active_txns.insert(rec.txn_id, rec.lsn);
                }
                LogRecordKind::Delete { key, .. } => {
                    self.image.remove(key);
                    self.active_txns.insert(rec.txn_id, rec.lsn);
                }
                LogRecordKind::Update {
                    old_key,
                    new_key,
                    new_value,
                    ..
                } => {
                    self.image.remove(old_key);
                    self.image.insert(new_key.clone(), *new_value);
                    self.active_txns.insert(rec.txn_id, rec.lsn);
                }
            }
        }
    }

    /// Reverses every record belonging to a still-active transaction, in
    /// descending LSN order along `prev_lsn`, stopping at each
    /// transaction's `Begin`.
    pub fn undo(&mut self) {
        info!("recovery: undo phase");
        let starts: Vec<LsnT> = self.active_txns.values().copied().collect();
        for mut lsn in starts {
            while lsn != INVALID_LSN {
                let rec = self
                    .log
                    .get(&lsn)
                    .expect("active transaction points at a missing log record")
                    .clone();
                match &rec.kind {
                    LogRecordKind::Begin => break,
                    LogRecordKind::Commit | LogRecordKind::Abort => {
                        panic!(
                            "invariant violated: a Commit/Abort record must never belong to an active transaction"
                        );
                    }
                    LogRecordKind::Insert { key, .. } => {
                        self.image.remove(key);
                    }
                    LogRecordKind::Delete { key, value } => {
                        self.image.insert(key.clone(), *value);
                    }
                    LogRecordKind::Update {
                        old_key,
                        old_value,
                        new_key,
                        ..
                    } => {
                        self.image.remove(new_key);
                        self.image.insert(old_key.clone(), *old_value);
                    }
                }
                lsn = rec.prev_lsn;
            }
        }
        self.active_txns.clear();
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_commit_then_active_update() {
        let mut rm = RecoveryManager::new();
        rm.init(Checkpoint::new(INVALID_LSN));
        rm.append_begin(1); // lsn 0
        rm.append_insert(1, "a", 1); // lsn 1
        rm.append_commit(1); // lsn 2
        rm.append_begin(2); // lsn 3
        rm.append_update(2, "a", 1, "b", 2); // lsn 4

        rm.redo();
        assert_eq!(rm.image().get("b"), Some(&2));
        assert_eq!(rm.active_txns().get(&2), Some(&4));

        rm.undo();
        assert_eq!(rm.image().get("a"), Some(&1));
        assert!(rm.image().get("b").is_none());
        assert!(rm.active_txns().is_empty());
    }

    #[test]
    fn scenario_aborted_transaction() {
        let mut rm = RecoveryManager::new();
        rm.init(Checkpoint::new(INVALID_LSN));
        rm.append_begin(1); // lsn 0
        rm.append_insert(1, "k", 7); // lsn 1
        rm.append_delete(1, "k", 7); // lsn 2
        rm.append_abort(1); // lsn 3

        rm.redo();
        assert!(rm.image().is_empty());
        assert!(rm.active_txns().is_empty());

        rm.undo();
        assert!(rm.image().is_empty());
    }

    #[test]
    fn scenario_still_active_at_crash() {
        let mut rm = RecoveryManager::new();
        rm.init(Checkpoint::new(INVALID_LSN));
        rm.append_begin(1); // lsn 0
        rm.append_insert(1, "x", 1); // lsn 1

        rm.redo();
        assert_eq!(rm.image().get("x"), Some(&1));
        assert_eq!(rm.active_txns().get(&1), Some(&1));

        rm.undo();
        assert!(rm.image().is_empty());
    }
}
