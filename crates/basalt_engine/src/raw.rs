//! The raw key-value engine seam.
//!
//! The transaction helper is written against [`RawEngine`] and
//! [`RawIterator`] only, so any engine with ordered column families, point
//! reads, and atomic batch writes can sit underneath. [`MemEngine`] is the
//! in-memory implementation used by tests, the in-process cluster, and the
//! benchmark harness.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use basalt_common::error::EngineError;
use basalt_common::types::Range;

/// Data column family: versioned user values.
pub const CF_DATA: &str = "data";
/// Lock column family: one lock record per user key.
pub const CF_LOCK: &str = "lock";
/// Write column family: commit and rollback records.
pub const CF_WRITE: &str = "write";

const ALL_CFS: [&str; 3] = [CF_DATA, CF_LOCK, CF_WRITE];

/// One entry of an atomic write batch.
#[derive(Debug, Clone)]
enum BatchEntry {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

/// An ordered set of mutations applied atomically by [`RawEngine::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cf: &'static str, key: Vec<u8>, value: Vec<u8>) {
        self.entries.push(BatchEntry::Put { cf, key, value });
    }

    pub fn delete(&mut self, cf: &'static str, key: Vec<u8>) {
        self.entries.push(BatchEntry::Delete { cf, key });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cursor over one column family, bounded by a key range.
///
/// Iterators are not restartable: callers consume them to exhaustion or to
/// their own limit within a single request.
pub trait RawIterator {
    /// Position at the first entry with key `>= key` (within bounds).
    fn seek(&mut self, key: &[u8]);
    /// Position at the first in-bounds entry.
    fn seek_to_first(&mut self);
    /// Position at the last in-bounds entry.
    fn seek_to_last(&mut self);
    fn next(&mut self);
    fn prev(&mut self);
    fn valid(&self) -> bool;
    /// Current key. Panics if `!valid()`.
    fn key(&self) -> &[u8];
    /// Current value. Panics if `!valid()`.
    fn value(&self) -> &[u8];
}

/// Abstract raw engine: three ordered column families with point reads,
/// bounded iterators, and atomic batch apply.
pub trait RawEngine: Send + Sync {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Iterator over `cf` restricted to `[range.start_key, range.end_key)`.
    /// An empty `end_key` means "unbounded above".
    fn iter(&self, cf: &str, range: Range) -> Result<Box<dyn RawIterator>, EngineError>;

    fn write(&self, batch: WriteBatch) -> Result<(), EngineError>;
}

/// In-memory raw engine over one `BTreeMap` per column family.
#[derive(Default)]
pub struct MemEngine {
    cfs: [RwLock<BTreeMap<Vec<u8>, Vec<u8>>>; 3],
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn cf_index(cf: &str) -> Result<usize, EngineError> {
        ALL_CFS
            .iter()
            .position(|&name| name == cf)
            .ok_or_else(|| EngineError::UnknownColumnFamily(cf.to_string()))
    }

    /// Number of entries in a column family. Test and diagnostic helper.
    pub fn cf_len(&self, cf: &str) -> Result<usize, EngineError> {
        Ok(self.cfs[Self::cf_index(cf)?].read().len())
    }
}

impl RawEngine for MemEngine {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let map = self.cfs[Self::cf_index(cf)?].read();
        Ok(map.get(key).cloned())
    }

    fn iter(&self, cf: &str, range: Range) -> Result<Box<dyn RawIterator>, EngineError> {
        let map = self.cfs[Self::cf_index(cf)?].read();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = if range.end_key.is_empty() {
            map.range(range.start_key.clone()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            map.range(range.start_key.clone()..range.end_key.clone())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        Ok(Box::new(MemIterator { entries, pos: None }))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), EngineError> {
        // Validate CF names before taking any lock so a bad batch applies
        // nothing at all.
        for entry in &batch.entries {
            match entry {
                BatchEntry::Put { cf, .. } | BatchEntry::Delete { cf, .. } => {
                    Self::cf_index(cf)?;
                }
            }
        }
        let mut guards: Vec<_> = self.cfs.iter().map(|cf| cf.write()).collect();
        for entry in batch.entries {
            match entry {
                BatchEntry::Put { cf, key, value } => {
                    guards[Self::cf_index(cf)?].insert(key, value);
                }
                BatchEntry::Delete { cf, key } => {
                    guards[Self::cf_index(cf)?].remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Snapshot iterator over a materialized range of one column family.
struct MemIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Current position; `None` means invalid (before first / after last).
    pos: Option<usize>,
}

impl RawIterator for MemIterator {
    fn seek(&mut self, key: &[u8]) {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() < key);
        self.pos = (idx < self.entries.len()).then_some(idx);
    }

    fn seek_to_first(&mut self) {
        self.pos = (!self.entries.is_empty()).then_some(0);
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().checked_sub(1);
    }

    fn next(&mut self) {
        self.pos = match self.pos {
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            _ => None,
        };
    }

    fn prev(&mut self) {
        self.pos = match self.pos {
            Some(i) => i.checked_sub(1),
            None => None,
        };
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator is not valid")].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator is not valid")].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(pairs: &[(&[u8], &[u8])]) -> MemEngine {
        let engine = MemEngine::new();
        let mut batch = WriteBatch::new();
        for (k, v) in pairs {
            batch.put(CF_DATA, k.to_vec(), v.to_vec());
        }
        engine.write(batch).unwrap();
        engine
    }

    #[test]
    fn batch_apply_and_point_get() {
        let engine = engine_with(&[(b"a", b"1"), (b"b", b"2")]);
        assert_eq!(engine.get(CF_DATA, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get(CF_DATA, b"c").unwrap(), None);

        let mut batch = WriteBatch::new();
        batch.delete(CF_DATA, b"a".to_vec());
        engine.write(batch).unwrap();
        assert_eq!(engine.get(CF_DATA, b"a").unwrap(), None);
    }

    #[test]
    fn unknown_cf_is_rejected() {
        let engine = MemEngine::new();
        assert!(engine.get("raft", b"k").is_err());
    }

    #[test]
    fn iterator_respects_bounds_and_direction() {
        let engine = engine_with(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3"), (b"d", b"4")]);
        let mut iter = engine
            .iter(CF_DATA, Range::new(b"b".to_vec(), b"d".to_vec()))
            .unwrap();

        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"b");
        iter.next();
        assert_eq!(iter.key(), b"c");
        iter.next();
        assert!(!iter.valid());

        iter.seek_to_last();
        assert_eq!(iter.key(), b"c");
        iter.prev();
        assert_eq!(iter.key(), b"b");
        iter.prev();
        assert!(!iter.valid());

        iter.seek(b"bz");
        assert_eq!(iter.key(), b"c");
    }
}
