//! In-memory Raft log storage and state machine for the meta log.
//!
//! The `StateMachine` holds an optional [`ApplyFn`] called for every
//! committed [`MetaRequest::Write`] entry, which is how committed
//! `MetaIncrement` payloads reach the coordinator's in-memory maps.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::sync::Arc;

use openraft::storage::{
    LogFlushed, LogState, RaftLogReader, RaftLogStorage, RaftStateMachine, Snapshot,
};
use openraft::{
    BasicNode, Entry, EntryPayload, LogId, RaftLogId, RaftSnapshotBuilder, SnapshotMeta,
    StorageError, StoredMembership, Vote,
};
use tokio::sync::Mutex;

use crate::types::{MetaRequest, MetaResponse, TypeConfig};

/// Thread-safe apply callback: called for each committed `Write` entry.
pub type ApplyFn = Arc<dyn Fn(&[u8]) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Log store
// ---------------------------------------------------------------------------

struct LogStoreInner {
    vote: Option<Vote<u64>>,
    log: BTreeMap<u64, Entry<TypeConfig>>,
    purged: Option<LogId<u64>>,
}

impl LogStoreInner {
    fn new() -> Self {
        Self {
            vote: None,
            log: BTreeMap::new(),
            purged: None,
        }
    }
}

/// In-memory log store.
///
/// Uses `Arc<Mutex<...>>` internally so the reader returned by
/// `get_log_reader` always sees the latest appended entries.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<Mutex<LogStoreInner>>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogStoreInner::new())),
        }
    }

    /// Insert entries into the log. The `RaftLogStorage::append` trait
    /// method delegates here after arranging its flush callback.
    pub async fn append_entries<I>(&self, entries: I)
    where
        I: IntoIterator<Item = Entry<TypeConfig>>,
    {
        let mut inner = self.inner.lock().await;
        for entry in entries {
            let idx = entry.get_log_id().index;
            inner.log.insert(idx, entry);
        }
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Send>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<u64>> {
        let inner = self.inner.lock().await;
        Ok(inner.log.range(range).map(|(_, e)| e.clone()).collect())
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<u64>> {
        let inner = self.inner.lock().await;
        let last = inner.log.iter().next_back().map(|(_, e)| *e.get_log_id());
        Ok(LogState {
            last_purged_log_id: inner.purged,
            last_log_id: last,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        // Clone shares the Arc — the reader sees all future appends.
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote<u64>) -> Result<(), StorageError<u64>> {
        self.inner.lock().await.vote = Some(*vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<u64>>, StorageError<u64>> {
        Ok(self.inner.lock().await.vote)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        self.append_entries(entries).await;
        // In-memory: data is immediately "persisted".
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<u64> = inner.log.range(log_id.index..).map(|(k, _)| *k).collect();
        for k in keys {
            inner.log.remove(&k);
        }
        Ok(())
    }

    async fn purge(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<u64> = inner.log.range(..=log_id.index).map(|(k, _)| *k).collect();
        for k in keys {
            inner.log.remove(&k);
        }
        inner.purged = Some(log_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// In-memory state machine.
///
/// When `apply_fn` is set, every committed `MetaRequest::Write` payload is
/// forwarded to it; the payloads are also retained for snapshot transfer so
/// a follower installing the snapshot can replay them.
pub struct StateMachine {
    last_applied: Option<LogId<u64>>,
    last_membership: StoredMembership<u64, BasicNode>,
    /// Raw payloads of all applied Write entries, in apply order.
    data: Vec<Vec<u8>>,
    snapshot_idx: u64,
    current_snapshot: Option<StoredSnapshot>,
    apply_fn: Option<ApplyFn>,
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta<u64, BasicNode>,
    pub data: Vec<u8>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// State machine with no apply callback (payloads retained in memory only).
    pub fn new() -> Self {
        Self {
            last_applied: None,
            last_membership: StoredMembership::new(None, openraft::Membership::new(vec![], None)),
            data: Vec::new(),
            snapshot_idx: 0,
            current_snapshot: None,
            apply_fn: None,
        }
    }

    /// State machine forwarding committed Write entries to `apply_fn`.
    pub fn with_apply_fn(apply_fn: ApplyFn) -> Self {
        Self {
            apply_fn: Some(apply_fn),
            ..Self::new()
        }
    }

    /// Payloads applied so far, in log order.
    pub fn applied_payloads(&self) -> &[Vec<u8>] {
        &self.data
    }
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<u64>>, StoredMembership<u64, BasicNode>), StorageError<u64>> {
        Ok((self.last_applied, self.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<MetaResponse>, StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        let mut responses = Vec::new();
        for entry in entries {
            self.last_applied = Some(*entry.get_log_id());

            match entry.payload {
                EntryPayload::Blank => {
                    responses.push(MetaResponse::Ok);
                }
                EntryPayload::Normal(ref req) => match req {
                    MetaRequest::Write { ref data } => {
                        self.data.push(data.clone());
                        if let Some(ref cb) = self.apply_fn {
                            if let Err(e) = cb(data) {
                                tracing::error!(
                                    log_index = entry.get_log_id().index,
                                    error = %e,
                                    "meta apply callback failed"
                                );
                                return Err(StorageError::IO {
                                    source: openraft::StorageIOError::write_state_machine(
                                        &std::io::Error::other(format!("apply callback: {}", e)),
                                    ),
                                });
                            }
                        }
                        responses.push(MetaResponse::Ok);
                    }
                    MetaRequest::Noop => {
                        responses.push(MetaResponse::Noop);
                    }
                },
                EntryPayload::Membership(ref mem) => {
                    self.last_membership =
                        StoredMembership::new(Some(*entry.get_log_id()), mem.clone());
                    responses.push(MetaResponse::Ok);
                }
            }
        }
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        StateMachine {
            last_applied: self.last_applied,
            last_membership: self.last_membership.clone(),
            data: self.data.clone(),
            snapshot_idx: self.snapshot_idx,
            current_snapshot: self.current_snapshot.clone(),
            apply_fn: self.apply_fn.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<u64, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let new_snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: snapshot.into_inner(),
        };

        self.last_applied = meta.last_log_id;
        self.last_membership = meta.last_membership.clone();

        if let Ok(data) = serde_json::from_slice::<Vec<Vec<u8>>>(&new_snapshot.data) {
            // Replay the snapshot's payloads through the callback so the
            // coordinator maps catch up with the leader.
            if let Some(ref cb) = self.apply_fn {
                for payload in &data {
                    if let Err(e) = cb(payload) {
                        tracing::error!(error = %e, "apply callback failed during snapshot install");
                    }
                }
            }
            self.data = data;
        }

        self.current_snapshot = Some(new_snapshot);
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<u64>> {
        match &self.current_snapshot {
            Some(snap) => Ok(Some(Snapshot {
                meta: snap.meta.clone(),
                snapshot: Box::new(Cursor::new(snap.data.clone())),
            })),
            None => Ok(None),
        }
    }
}

impl RaftSnapshotBuilder<TypeConfig> for StateMachine {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<u64>> {
        let data = serde_json::to_vec(&self.data).unwrap_or_default();

        self.snapshot_idx += 1;
        let snapshot_id = format!(
            "snap-{}-{}",
            self.snapshot_idx,
            self.last_applied.map_or(0, |id| id.index)
        );

        let meta = SnapshotMeta {
            last_log_id: self.last_applied,
            last_membership: self.last_membership.clone(),
            snapshot_id,
        };

        let snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: data.clone(),
        };
        self.current_snapshot = Some(snapshot);

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openraft::CommittedLeaderId;
    use std::sync::Mutex as StdMutex;

    fn write_entry(index: u64, data: Vec<u8>) -> Entry<TypeConfig> {
        Entry {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(MetaRequest::Write { data }),
        }
    }

    #[tokio::test]
    async fn apply_forwards_write_payloads_in_log_order() {
        let seen: Arc<StdMutex<Vec<Vec<u8>>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let mut sm = StateMachine::with_apply_fn(Arc::new(move |data: &[u8]| {
            sink.lock().unwrap().push(data.to_vec());
            Ok(())
        }));

        let entries = vec![
            write_entry(1, b"first".to_vec()),
            write_entry(2, b"second".to_vec()),
        ];
        let responses = sm.apply(entries).await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![b"first".to_vec(), b"second".to_vec()]
        );
        assert_eq!(sm.applied_state().await.unwrap().0.unwrap().index, 2);
    }

    #[tokio::test]
    async fn failing_callback_surfaces_a_storage_error() {
        let mut sm = StateMachine::with_apply_fn(Arc::new(|_: &[u8]| Err("boom".to_string())));
        let result = sm.apply(vec![write_entry(1, b"x".to_vec())]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn snapshot_roundtrip_replays_payloads() {
        let mut sm = StateMachine::new();
        sm.apply(vec![
            write_entry(1, b"a".to_vec()),
            write_entry(2, b"b".to_vec()),
        ])
        .await
        .unwrap();

        let snapshot = sm.get_snapshot_builder().await.build_snapshot().await.unwrap();

        let replayed: Arc<StdMutex<Vec<Vec<u8>>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = replayed.clone();
        let mut follower = StateMachine::with_apply_fn(Arc::new(move |data: &[u8]| {
            sink.lock().unwrap().push(data.to_vec());
            Ok(())
        }));
        follower
            .install_snapshot(&snapshot.meta, snapshot.snapshot)
            .await
            .unwrap();

        assert_eq!(follower.applied_payloads().len(), 2);
        assert_eq!(
            *replayed.lock().unwrap(),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        assert_eq!(follower.applied_state().await.unwrap().0.unwrap().index, 2);
    }

    #[tokio::test]
    async fn log_store_state_and_vote() {
        let mut store = LogStore::new();
        assert!(store.read_vote().await.unwrap().is_none());

        store
            .append_entries(vec![write_entry(1, b"a".to_vec()), write_entry(2, b"b".to_vec())])
            .await;
        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.unwrap().index, 2);

        let entries = store.try_get_log_entries(1..=2).await.unwrap();
        assert_eq!(entries.len(), 2);

        store.purge(LogId::new(CommittedLeaderId::new(1, 1), 1)).await.unwrap();
        let entries = store.try_get_log_entries(0..10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    /// End-to-end seam check: committed increments reach a coordinator
    /// control through the apply callback and mutate its maps.
    #[tokio::test]
    async fn apply_callback_drives_coordinator_control() {
        use basalt_common::types::ROOT_SCHEMA;
        use basalt_meta::control::CoordinatorControl;
        use basalt_meta::increment::MetaIncrement;
        use basalt_meta::sequence::MemSequenceService;

        let control = Arc::new(CoordinatorControl::new(Arc::new(MemSequenceService::new())));
        let target = control.clone();
        let mut sm = StateMachine::with_apply_fn(Arc::new(move |data: &[u8]| {
            let increment: MetaIncrement =
                serde_json::from_slice(data).map_err(|e| e.to_string())?;
            target.apply_increment(&increment);
            Ok(())
        }));

        // Build an increment on a scratch control, ship its serialized form
        // through the state machine, and observe the target converge.
        let scratch = CoordinatorControl::new(Arc::new(MemSequenceService::new()));
        let mut increment = MetaIncrement::default();
        let schema_id = scratch
            .create_schema(ROOT_SCHEMA, "replicated", &mut increment)
            .unwrap();
        let payload = serde_json::to_vec(&increment).unwrap();

        sm.apply(vec![write_entry(1, payload)]).await.unwrap();
        assert_eq!(control.get_schema(schema_id).unwrap().name, "replicated");
    }
}
