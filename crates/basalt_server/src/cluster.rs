//! Same-process cluster wiring: a coordinator, N store engines, and a
//! router, with no network in between.
//!
//! Each store holds an independent raw engine; a region's transactional
//! traffic lands on its leader store's engine. This is the substrate for
//! integration tests and the benchmark harness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basalt_common::error::{BasaltError, RouteError};
use basalt_common::types::{
    IsolationLevel, Location, Range, Store, StoreId, StoreState,
};
use basalt_engine::codec::encode_raw_key;
use basalt_engine::mvcc::Mutation;
use basalt_engine::raw::MemEngine;
use basalt_meta::sequence::MemSequenceService;
use basalt_meta::Coordinator;
use basalt_router::{RegionCache, RegionFetcher, RegionRoute};

use crate::message::{StatusCode, TxnRequest, TxnResponse};
use crate::service::{MetaService, StoreService};

/// Default lock TTL for one-shot client transactions, in milliseconds.
const DEFAULT_LOCK_TTL_MS: u64 = 3_000;

/// Router fetch path backed directly by the coordinator's region map.
pub struct CoordinatorFetcher {
    coordinator: Arc<Coordinator>,
}

impl CoordinatorFetcher {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

impl RegionFetcher for CoordinatorFetcher {
    fn fetch_region_by_key(&self, key: &[u8]) -> Result<RegionRoute, RouteError> {
        self.coordinator
            .control()
            .query_region_by_key(key)
            .map(|region| RegionRoute::from(&region))
            .ok_or_else(|| RouteError::RegionNotFound(key.to_vec()))
    }
}

/// One data-plane store: its id and its raw engine behind the txn service.
pub struct StoreInstance {
    pub store_id: StoreId,
    pub engine: Arc<MemEngine>,
    pub service: StoreService,
}

/// A coordinator, its stores, and a warm router in one process.
pub struct LocalCluster {
    pub coordinator: Arc<Coordinator>,
    pub meta_service: MetaService,
    pub router: RegionCache<CoordinatorFetcher>,
    stores: Vec<StoreInstance>,
    tso: AtomicU64,
}

impl LocalCluster {
    /// Stand up `store_count` stores registered with a fresh coordinator.
    pub fn new(store_count: u64) -> Self {
        let coordinator = Arc::new(Coordinator::new(Arc::new(MemSequenceService::new())));
        let mut stores = Vec::with_capacity(store_count as usize);
        for i in 0..store_count {
            let store_id = StoreId(i + 1);
            coordinator
                .register_store(Store {
                    id: store_id,
                    server_location: Location {
                        host: "127.0.0.1".into(),
                        port: 20160 + i as u16,
                    },
                    state: StoreState::Active,
                })
                .expect("store registration on a fresh coordinator");
            let engine = Arc::new(MemEngine::new());
            stores.push(StoreInstance {
                store_id,
                engine: engine.clone(),
                service: StoreService::new(engine),
            });
        }
        let router = RegionCache::new(CoordinatorFetcher::new(coordinator.clone()));
        Self {
            meta_service: MetaService::new(coordinator.clone()),
            router,
            coordinator,
            stores,
            tso: AtomicU64::new(1),
        }
    }

    /// Timestamp-oracle stand-in: strictly increasing per cluster.
    pub fn next_ts(&self) -> u64 {
        self.tso.fetch_add(1, Ordering::SeqCst)
    }

    pub fn store(&self, store_id: StoreId) -> Option<&StoreInstance> {
        self.stores.iter().find(|s| s.store_id == store_id)
    }

    pub fn stores(&self) -> &[StoreInstance] {
        &self.stores
    }

    /// The store currently holding a route's leader replica.
    pub fn leader_store(&self, route: &RegionRoute) -> Result<&StoreInstance, BasaltError> {
        self.store(route.leader_store_id).ok_or_else(|| {
            BasaltError::Internal(format!("leader store {} not wired", route.leader_store_id))
        })
    }

    fn send_to_leader(&self, key: &[u8], request: TxnRequest) -> Result<TxnResponse, BasaltError> {
        let route = self.router.lookup_region_by_key(key).map_err(BasaltError::Route)?;
        let store = self.leader_store(&route)?;
        Ok(store.service.handle(request))
    }

    /// One-shot transactional put of a single raw key.
    pub fn raw_put(&self, key: &[u8], value: &[u8]) -> Result<(), BasaltError> {
        self.raw_batch_put(&[(key.to_vec(), value.to_vec())])
    }

    /// One-shot transactional put of a batch of raw keys. The batch is
    /// grouped per region; each group commits as its own transaction.
    pub fn raw_batch_put(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<(), BasaltError> {
        let encoded: Vec<(Vec<u8>, Vec<u8>)> = pairs
            .iter()
            .map(|(k, v)| (encode_raw_key(k), v.clone()))
            .collect();
        let keys: Vec<Vec<u8>> = encoded.iter().map(|(k, _)| k.clone()).collect();
        let groups = self
            .router
            .group_by_region(&keys)
            .map_err(BasaltError::Route)?;

        for (route, group_keys) in groups {
            let start_ts = self.next_ts();
            let mutations: Vec<Mutation> = group_keys
                .iter()
                .map(|key| {
                    let value = encoded
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    Mutation::Put {
                        key: key.clone(),
                        value,
                    }
                })
                .collect();
            let primary = group_keys[0].clone();
            let store = self.leader_store(&route)?;

            let response = store.service.handle(TxnRequest::TxnPrewrite {
                mutations,
                primary_lock: primary,
                start_ts,
                lock_ttl: DEFAULT_LOCK_TTL_MS,
            });
            check_status(&response)?;

            let commit_ts = self.next_ts();
            let response = store.service.handle(TxnRequest::TxnCommit {
                start_ts,
                commit_ts,
                keys: group_keys,
            });
            check_status(&response)?;
        }
        Ok(())
    }

    /// Snapshot read of a single raw key at a fresh timestamp.
    pub fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BasaltError> {
        let encoded = encode_raw_key(key);
        let start_ts = self.next_ts();
        let response = self.send_to_leader(
            &encoded,
            TxnRequest::TxnBatchGet {
                isolation: IsolationLevel::SnapshotIsolation,
                start_ts,
                keys: vec![encoded.clone()],
            },
        )?;
        check_status(&response)?;
        Ok(response.kvs.into_iter().next().map(|(_, v)| v))
    }

    /// Snapshot read of a batch of raw keys, grouped per region.
    pub fn raw_batch_get(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BasaltError> {
        let encoded: Vec<Vec<u8>> = keys.iter().map(|k| encode_raw_key(k)).collect();
        let groups = self
            .router
            .group_by_region(&encoded)
            .map_err(BasaltError::Route)?;
        let start_ts = self.next_ts();
        let mut kvs = Vec::new();
        for (route, group_keys) in groups {
            let store = self.leader_store(&route)?;
            let response = store.service.handle(TxnRequest::TxnBatchGet {
                isolation: IsolationLevel::SnapshotIsolation,
                start_ts,
                keys: group_keys,
            });
            check_status(&response)?;
            kvs.extend(response.kvs);
        }
        // Strip the namespace tag so callers see their own keys.
        Ok(kvs
            .into_iter()
            .map(|(k, v)| (k[1..].to_vec(), v))
            .collect())
    }

    /// Transactional scan over an encoded range on whichever store leads
    /// the region containing `range.start_key`.
    pub fn raw_scan(&self, range: Range, limit: usize) -> Result<TxnResponse, BasaltError> {
        let start_ts = self.next_ts();
        let start_key = range.start_key.clone();
        self.send_to_leader(
            &start_key,
            TxnRequest::TxnScan {
                isolation: IsolationLevel::SnapshotIsolation,
                start_ts,
                range,
                limit,
                key_only: false,
                reverse: false,
            },
        )
    }
}

fn check_status(response: &TxnResponse) -> Result<(), BasaltError> {
    if response.status.code == StatusCode::Ok && response.txn_result.is_empty() {
        Ok(())
    } else if !response.txn_result.is_empty() {
        Err(BasaltError::Internal(format!(
            "{} keys locked, resolution required",
            response.txn_result.locked.len()
        )))
    } else {
        Err(BasaltError::Internal(format!(
            "txn request failed: {:?} {}",
            response.status.code, response.status.message
        )))
    }
}
