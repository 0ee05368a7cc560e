//! Percolator-style transaction helper over the raw engine.
//!
//! Every function here is pure with respect to the engine: reads and writes
//! are batched, no retries happen inside, and conflicts surface as
//! [`TxnError`] or inside [`TxnResultInfo`] for the request layer to encode.
//! Lock resolution and backoff live with the caller.

use tracing::{debug, warn};

use basalt_common::error::{BasaltError, EngineError, TxnError};
use basalt_common::types::{IsolationLevel, Range};

use crate::codec::{decode_txn_key, encode_txn_key, prefix_next, MAX_TS};
use crate::coprocessor::Coprocessor;
use crate::mvcc::{LockInfo, Mutation, TxnResultInfo, WriteInfo, WriteOp, SHORT_VALUE_LIMIT};
use crate::raw::{RawEngine, RawIterator, WriteBatch, CF_DATA, CF_LOCK, CF_WRITE};

/// Point read of the lock CF. Absent key yields `None`.
pub fn get_lock_info(
    engine: &dyn RawEngine,
    key: &[u8],
) -> Result<Option<LockInfo>, BasaltError> {
    match engine.get(CF_LOCK, key)? {
        Some(raw) => Ok(Some(LockInfo::decode(&raw)?)),
        None => Ok(None),
    }
}

/// Scan the lock CF across `range`, keeping locks whose
/// `lock_ts ∈ [min_lock_ts, max_lock_ts)`, capped at `limit` (0 = no cap).
pub fn scan_lock_info(
    engine: &dyn RawEngine,
    min_lock_ts: u64,
    max_lock_ts: u64,
    range: Range,
    limit: usize,
) -> Result<Vec<LockInfo>, BasaltError> {
    let mut iter = engine.iter(CF_LOCK, range)?;
    let mut locks = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        let lock = LockInfo::decode(iter.value())?;
        if lock.lock_ts >= min_lock_ts && lock.lock_ts < max_lock_ts {
            locks.push(lock);
            if limit > 0 && locks.len() >= limit {
                break;
            }
        }
        iter.next();
    }
    Ok(locks)
}

/// Find the newest write record for `key` with
/// `commit_ts ∈ [min_commit_ts, max_commit_ts]`, filtered by op kind and,
/// when given, by the producing transaction's `start_ts`. Returns the record
/// and its commit timestamp.
#[allow(clippy::too_many_arguments)]
pub fn get_write_info(
    engine: &dyn RawEngine,
    min_commit_ts: u64,
    max_commit_ts: u64,
    start_ts: Option<u64>,
    key: &[u8],
    include_rollback: bool,
    include_delete: bool,
    include_put: bool,
) -> Result<Option<(WriteInfo, u64)>, BasaltError> {
    let bounds = Range::new(encode_txn_key(key, MAX_TS), prefix_next(&encode_txn_key(key, 0)));
    let mut iter = engine.iter(CF_WRITE, bounds)?;
    iter.seek(&encode_txn_key(key, max_commit_ts));
    while iter.valid() {
        let (user_key, commit_ts) = decode_txn_key(iter.key())?;
        if user_key != key || commit_ts < min_commit_ts {
            break;
        }
        let write = WriteInfo::decode(iter.value())?;
        let op_included = match write.op {
            WriteOp::Put => include_put,
            WriteOp::Delete => include_delete,
            WriteOp::Rollback => include_rollback,
            WriteOp::Lock => false,
        };
        let start_ts_matches = start_ts.map_or(true, |ts| write.start_ts == ts);
        if op_included && start_ts_matches {
            return Ok(Some((write, commit_ts)));
        }
        iter.next();
    }
    Ok(None)
}

/// The rollback specialization of [`get_write_info`]: the marker a rollback
/// leaves at `commit_ts == start_ts` for its own transaction.
pub fn get_rollback_info(
    engine: &dyn RawEngine,
    start_ts: u64,
    key: &[u8],
) -> Result<Option<WriteInfo>, BasaltError> {
    Ok(
        get_write_info(engine, start_ts, start_ts, Some(start_ts), key, true, false, false)?
            .map(|(write, _)| write),
    )
}

/// A lock blocks a read iff it was placed at or before the read's start
/// timestamp. Later locks belong to transactions the reader cannot see and
/// are ignored under both isolation levels.
fn lock_blocks_read(_isolation: IsolationLevel, start_ts: u64, lock: &LockInfo) -> bool {
    lock.lock_ts <= start_ts
}

/// Resolve the value visible at `start_ts` for a write record, reading the
/// data CF when the value was not inlined.
fn load_value(
    engine: &dyn RawEngine,
    key: &[u8],
    write: &WriteInfo,
) -> Result<Vec<u8>, BasaltError> {
    if let Some(short) = &write.short_value {
        return Ok(short.clone());
    }
    engine
        .get(CF_DATA, &encode_txn_key(key, write.start_ts))?
        .ok_or_else(|| {
            EngineError::Corruption {
                cf: "data",
                key: key.to_vec(),
                reason: format!("missing data record for start_ts {}", write.start_ts),
            }
            .into()
        })
}

/// Snapshot point reads for a set of keys.
///
/// Keys blocked by a visible lock are reported in the returned
/// [`TxnResultInfo`] and produce no value; the caller resolves the locks and
/// retries. Deleted and never-written keys are silently absent.
pub fn batch_get(
    engine: &dyn RawEngine,
    isolation: IsolationLevel,
    start_ts: u64,
    keys: &[Vec<u8>],
) -> Result<(Vec<(Vec<u8>, Vec<u8>)>, TxnResultInfo), BasaltError> {
    let mut kvs = Vec::new();
    let mut txn_result = TxnResultInfo::default();
    for key in keys {
        if let Some(lock) = get_lock_info(engine, key)? {
            if lock_blocks_read(isolation, start_ts, &lock) {
                debug!(key = ?key, lock_ts = lock.lock_ts, "batch_get blocked by lock");
                txn_result.locked.push(lock);
                continue;
            }
        }
        let found = get_write_info(engine, 0, start_ts, None, key, false, true, true)?;
        if let Some((write, _)) = found {
            match write.op {
                WriteOp::Put => kvs.push((key.clone(), load_value(engine, key, &write)?)),
                WriteOp::Delete => {}
                WriteOp::Rollback | WriteOp::Lock => unreachable!("filtered by include flags"),
            }
        }
    }
    Ok((kvs, txn_result))
}

/// Stage locks (and out-of-line values) for a transaction's mutations.
///
/// Checks, per mutation: a committed write newer than `start_ts` is a write
/// conflict; an existing rollback marker at `start_ts` means this
/// transaction was already rolled back; a lock held by another transaction
/// is a lock conflict; our own lock makes the prewrite idempotent. All
/// mutations are staged in one atomic batch or not at all.
pub fn prewrite(
    engine: &dyn RawEngine,
    mutations: &[Mutation],
    primary_lock: &[u8],
    start_ts: u64,
    lock_ttl: u64,
) -> Result<(), BasaltError> {
    let mut batch = WriteBatch::new();
    for mutation in mutations {
        let key = mutation.key();
        if let Some((_, conflict_ts)) =
            get_write_info(engine, start_ts, MAX_TS, None, key, false, true, true)?
        {
            if conflict_ts > start_ts {
                warn!(key = ?key, start_ts, conflict_ts, "prewrite write conflict");
                return Err(TxnError::WriteConflict {
                    key: key.to_vec(),
                    start_ts,
                    conflict_ts,
                }
                .into());
            }
        }
        if get_rollback_info(engine, start_ts, key)?.is_some() {
            return Err(TxnError::WriteConflict {
                key: key.to_vec(),
                start_ts,
                conflict_ts: start_ts,
            }
            .into());
        }
        if let Some(lock) = get_lock_info(engine, key)? {
            if lock.lock_ts == start_ts {
                // Retried prewrite of our own mutation.
                continue;
            }
            return Err(TxnError::LockConflict {
                key: key.to_vec(),
                lock_ts: lock.lock_ts,
            }
            .into());
        }

        let mut short_value = None;
        if let Mutation::Put { value, .. } = mutation {
            if value.len() <= SHORT_VALUE_LIMIT {
                short_value = Some(value.clone());
            } else {
                batch.put(CF_DATA, encode_txn_key(key, start_ts), value.clone());
            }
        }
        let lock = LockInfo {
            key: key.to_vec(),
            primary_lock: primary_lock.to_vec(),
            lock_ts: start_ts,
            ttl: lock_ttl,
            for_update_ts: 0,
            lock_type: mutation.lock_type(),
            short_value,
        };
        batch.put(CF_LOCK, key.to_vec(), lock.encode());
    }
    engine.write(batch)?;
    Ok(())
}

/// Commit a set of prewritten locks at `commit_ts` in one atomic batch.
///
/// For each lock still held: append the write record, move any inline value
/// to the data CF, and release the lock. A lock that is already gone is an
/// idempotent success iff the matching write record exists; otherwise the
/// transaction was rolled back (or never prewritten) and the commit fails.
pub fn commit(
    engine: &dyn RawEngine,
    lock_infos: &[LockInfo],
    commit_ts: u64,
) -> Result<(), BasaltError> {
    let mut batch = WriteBatch::new();
    for lock in lock_infos {
        if commit_ts <= lock.lock_ts {
            return Err(TxnError::Internal(format!(
                "commit_ts {} must exceed start_ts {}",
                commit_ts, lock.lock_ts
            ))
            .into());
        }
        let key = &lock.key;
        let current = match get_lock_info(engine, key)? {
            Some(current) if current.lock_ts == lock.lock_ts => current,
            _ => {
                // The lock is gone: idempotent success iff this transaction
                // already left a non-rollback write record behind.
                let existing =
                    get_write_info(engine, 0, MAX_TS, Some(lock.lock_ts), key, true, true, true)?;
                match existing {
                    Some((write, _)) if write.op != WriteOp::Rollback => {
                        debug!(key = ?key, start_ts = lock.lock_ts, "commit already applied");
                        continue;
                    }
                    _ => {
                        return Err(TxnError::LockNotFound {
                            key: key.clone(),
                            start_ts: lock.lock_ts,
                        }
                        .into());
                    }
                }
            }
        };
        if let Some(short) = &current.short_value {
            batch.put(CF_DATA, encode_txn_key(key, current.lock_ts), short.clone());
        }
        let write = WriteInfo {
            op: current.lock_type.into(),
            start_ts: current.lock_ts,
            short_value: None,
        };
        batch.put(CF_WRITE, encode_txn_key(key, commit_ts), write.encode());
        batch.delete(CF_LOCK, key.clone());
    }
    engine.write(batch)?;
    Ok(())
}

/// Roll back a transaction's staging on the given keys in one atomic batch:
/// staged data records are deleted, locks owned by `start_ts` are released,
/// and a rollback marker is appended for every key so a late prewrite of the
/// same transaction observes it and aborts. Idempotent.
pub fn rollback(
    engine: &dyn RawEngine,
    keys_with_data: &[Vec<u8>],
    keys_without_data: &[Vec<u8>],
    start_ts: u64,
) -> Result<(), BasaltError> {
    let mut batch = WriteBatch::new();
    for key in keys_with_data {
        batch.delete(CF_DATA, encode_txn_key(key, start_ts));
    }
    let rollback_marker = WriteInfo {
        op: WriteOp::Rollback,
        start_ts,
        short_value: None,
    };
    for key in keys_with_data.iter().chain(keys_without_data) {
        if let Some(lock) = get_lock_info(engine, key)? {
            if lock.lock_ts == start_ts {
                batch.delete(CF_LOCK, key.clone());
            }
        }
        batch.put(
            CF_WRITE,
            encode_txn_key(key, start_ts),
            rollback_marker.encode(),
        );
    }
    engine.write(batch)?;
    Ok(())
}

/// Outcome of a transactional scan.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub kvs: Vec<(Vec<u8>, Vec<u8>)>,
    /// True iff the scan stopped because of `limit`, not range exhaustion.
    pub has_more: bool,
    /// Resumption point: the first key not yet consumed.
    pub end_key: Vec<u8>,
    pub txn_result: TxnResultInfo,
}

/// Transactional snapshot scan over `range`.
///
/// The lock and write iterators advance in lockstep on user key. Keys whose
/// lock blocks the read are surfaced in `txn_result` and skipped; that
/// includes lock-only keys with no write record at all. With `key_only` the
/// values are left empty; a coprocessor, when provided, filters and projects
/// the visible values.
#[allow(clippy::too_many_arguments)]
pub fn scan(
    engine: &dyn RawEngine,
    isolation: IsolationLevel,
    start_ts: u64,
    range: Range,
    limit: usize,
    key_only: bool,
    reverse: bool,
    coprocessor: Option<&dyn Coprocessor>,
) -> Result<ScanOutput, BasaltError> {
    let mut executor = ScanExecutor::new(engine, isolation, start_ts, range.clone(), reverse)?;
    let mut output = ScanOutput::default();

    loop {
        if limit > 0 && output.kvs.len() >= limit {
            if let Some(next_key) = executor.peek_candidate()? {
                output.has_more = true;
                output.end_key = next_key;
            } else {
                output.end_key = executor.exhausted_end_key();
            }
            break;
        }
        match executor.next_visible(&mut output.txn_result)? {
            Some((key, value)) => {
                let value = if key_only {
                    Vec::new()
                } else if let Some(cop) = coprocessor {
                    match cop.process(&key, &value) {
                        Some(projected) => projected,
                        None => continue,
                    }
                } else {
                    value
                };
                output.kvs.push((key, value));
            }
            None => {
                output.end_key = executor.exhausted_end_key();
                break;
            }
        }
    }
    Ok(output)
}

/// Lockstep co-iteration of the lock and write CFs, yielding one visible
/// key-value at a time.
struct ScanExecutor<'a> {
    engine: &'a dyn RawEngine,
    isolation: IsolationLevel,
    start_ts: u64,
    range: Range,
    reverse: bool,
    lock_iter: Box<dyn RawIterator>,
    write_iter: Box<dyn RawIterator>,
    /// Last user keys fully consumed from each CF, kept so a key straddling
    /// both families is never processed twice.
    last_lock_key: Option<Vec<u8>>,
    last_write_key: Option<Vec<u8>>,
}

impl<'a> ScanExecutor<'a> {
    fn new(
        engine: &'a dyn RawEngine,
        isolation: IsolationLevel,
        start_ts: u64,
        range: Range,
        reverse: bool,
    ) -> Result<Self, BasaltError> {
        let mut lock_iter = engine.iter(CF_LOCK, range.clone())?;
        let write_bounds = Range::new(
            encode_txn_key(&range.start_key, MAX_TS),
            if range.end_key.is_empty() {
                Vec::new()
            } else {
                encode_txn_key(&range.end_key, MAX_TS)
            },
        );
        let mut write_iter = engine.iter(CF_WRITE, write_bounds)?;
        if reverse {
            lock_iter.seek_to_last();
            write_iter.seek_to_last();
        } else {
            lock_iter.seek_to_first();
            write_iter.seek_to_first();
        }
        Ok(Self {
            engine,
            isolation,
            start_ts,
            range,
            reverse,
            lock_iter,
            write_iter,
            last_lock_key: None,
            last_write_key: None,
        })
    }

    fn current_write_user_key(&self) -> Result<Option<Vec<u8>>, BasaltError> {
        if !self.write_iter.valid() {
            return Ok(None);
        }
        let (user_key, _) = decode_txn_key(self.write_iter.key())?;
        Ok(Some(user_key))
    }

    fn current_lock_key(&self) -> Option<Vec<u8>> {
        self.lock_iter.valid().then(|| self.lock_iter.key().to_vec())
    }

    /// The next user key the scan would process, without consuming it.
    fn peek_candidate(&self) -> Result<Option<Vec<u8>>, BasaltError> {
        let lock_key = self.current_lock_key();
        let write_key = self.current_write_user_key()?;
        Ok(match (lock_key, write_key) {
            (None, None) => None,
            (Some(k), None) | (None, Some(k)) => Some(k),
            (Some(l), Some(w)) => Some(if self.reverse { l.max(w) } else { l.min(w) }),
        })
    }

    fn exhausted_end_key(&self) -> Vec<u8> {
        if self.reverse {
            self.range.start_key.clone()
        } else {
            self.range.end_key.clone()
        }
    }

    /// Advance the lock iterator past `key` in scan direction.
    fn skip_lock(&mut self, key: &[u8]) {
        while self.lock_iter.valid() && self.lock_iter.key() == key {
            if self.reverse {
                self.lock_iter.prev();
            } else {
                self.lock_iter.next();
            }
        }
        self.last_lock_key = Some(key.to_vec());
    }

    /// Consume every version of `key` from the write iterator in scan
    /// direction, returning `(commit_ts, WriteInfo)` ordered newest-first.
    fn drain_write_versions(
        &mut self,
        key: &[u8],
    ) -> Result<Vec<(u64, WriteInfo)>, BasaltError> {
        let mut versions = Vec::new();
        while self.write_iter.valid() {
            let (user_key, commit_ts) = decode_txn_key(self.write_iter.key())?;
            if user_key != key {
                break;
            }
            versions.push((commit_ts, WriteInfo::decode(self.write_iter.value())?));
            if self.reverse {
                self.write_iter.prev();
            } else {
                self.write_iter.next();
            }
        }
        if self.reverse {
            // Reverse iteration visits versions oldest-first.
            versions.reverse();
        }
        self.last_write_key = Some(key.to_vec());
        Ok(versions)
    }

    /// Produce the next visible key-value pair, or `None` when the range is
    /// exhausted. Locked and invisible keys are consumed internally.
    fn next_visible(
        &mut self,
        txn_result: &mut TxnResultInfo,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, BasaltError> {
        loop {
            let candidate = match self.peek_candidate()? {
                Some(key) => key,
                None => return Ok(None),
            };

            let mut blocked = false;
            let lock_unconsumed = self.last_lock_key.as_deref() != Some(&candidate[..]);
            if lock_unconsumed && self.lock_iter.valid() && self.lock_iter.key() == candidate {
                let lock = LockInfo::decode(self.lock_iter.value())?;
                if lock_blocks_read(self.isolation, self.start_ts, &lock) {
                    debug!(key = ?candidate, lock_ts = lock.lock_ts, "scan blocked by lock");
                    txn_result.locked.push(lock);
                    blocked = true;
                }
                self.skip_lock(&candidate);
            }

            let write_unconsumed = self.last_write_key.as_deref() != Some(&candidate[..]);
            let versions = if write_unconsumed
                && self.current_write_user_key()?.as_deref() == Some(&candidate[..])
            {
                self.drain_write_versions(&candidate)?
            } else {
                Vec::new()
            };
            if blocked {
                continue;
            }

            for (commit_ts, write) in versions {
                if commit_ts > self.start_ts {
                    continue;
                }
                match write.op {
                    WriteOp::Put => {
                        let value = load_value(self.engine, &candidate, &write)?;
                        return Ok(Some((candidate, value)));
                    }
                    WriteOp::Delete => break,
                    WriteOp::Rollback | WriteOp::Lock => continue,
                }
            }
            // Key invisible at start_ts; move on to the next candidate.
        }
    }
}
