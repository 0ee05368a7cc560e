//! Client-side meta cache and region router.
//!
//! The cache is an ordered map from region start key to a
//! [`RegionRoute`]. Lookups resolve a user key to the covering region; a
//! miss fetches the covering region from the coordinator through the
//! [`RegionFetcher`] seam and caches it. Cached entries are weak: callers
//! report `NotLeader`/`RegionSplit`/`EpochStale` outcomes, which invalidate
//! the entry so the next lookup reconciles against the coordinator.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use basalt_common::error::RouteError;
use basalt_common::types::{Peer, Range, Region, RegionId, StoreId};

/// What a client holds about one region: enough to address the leader and
/// detect staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRoute {
    pub region_id: RegionId,
    pub range: Range,
    pub leader_store_id: StoreId,
    pub peers: Vec<Peer>,
    pub epoch: u64,
}

impl From<&Region> for RegionRoute {
    fn from(region: &Region) -> Self {
        Self {
            region_id: region.id,
            range: region.range.clone(),
            leader_store_id: region.leader_store_id,
            peers: region.peers.clone(),
            epoch: region.epoch,
        }
    }
}

/// Routing failure reported back by an RPC caller. Every kind invalidates
/// the cached entry before the caller retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFailure {
    NotLeader,
    RegionSplit,
    EpochStale,
}

/// Source of authoritative region metadata, backed by the coordinator.
pub trait RegionFetcher: Send + Sync {
    fn fetch_region_by_key(&self, key: &[u8]) -> Result<RegionRoute, RouteError>;
}

/// The meta cache. All state sits behind one `RwLock`; lookups take the
/// read lock, misses upgrade to a brief write for the insert.
pub struct RegionCache<F: RegionFetcher> {
    regions: RwLock<BTreeMap<Vec<u8>, RegionRoute>>,
    fetcher: F,
}

impl<F: RegionFetcher> RegionCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            fetcher,
        }
    }

    /// Resolve `key` to its covering region: cached entry if the greatest
    /// start key at or below `key` still covers it, otherwise a coordinator
    /// fetch.
    pub fn lookup_region_by_key(&self, key: &[u8]) -> Result<RegionRoute, RouteError> {
        if let Some(route) = self.lookup_cached(key) {
            return Ok(route);
        }
        debug!(key = ?key, "region cache miss, fetching from coordinator");
        let route = self.fetcher.fetch_region_by_key(key)?;
        self.regions
            .write()
            .insert(route.range.start_key.clone(), route.clone());
        Ok(route)
    }

    fn lookup_cached(&self, key: &[u8]) -> Option<RegionRoute> {
        let regions = self.regions.read();
        let (_, route) = regions.range(..=key.to_vec()).next_back()?;
        route.range.contains(key).then(|| route.clone())
    }

    /// Group point keys by covering region, resolving each through the
    /// cache. Key order within a group is preserved.
    pub fn group_by_region(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<Vec<(RegionRoute, Vec<Vec<u8>>)>, RouteError> {
        let mut groups: Vec<(RegionRoute, Vec<Vec<u8>>)> = Vec::new();
        for key in keys {
            let route = self.lookup_region_by_key(key)?;
            match groups.iter_mut().find(|(r, _)| r.region_id == route.region_id) {
                Some((_, bucket)) => bucket.push(key.clone()),
                None => groups.push((route, vec![key.clone()])),
            }
        }
        Ok(groups)
    }

    /// Drop the cached entry for `region_id` after an RPC-level failure.
    pub fn report_failure(&self, region_id: RegionId, failure: RouteFailure) {
        let mut regions = self.regions.write();
        let start_key = regions
            .iter()
            .find(|(_, route)| route.region_id == region_id)
            .map(|(start, _)| start.clone());
        if let Some(start_key) = start_key {
            info!(%region_id, ?failure, "invalidating cached region");
            regions.remove(&start_key);
        }
    }

    /// Out-of-band invalidation: erase every cached entry overlapping
    /// `range` (split/merge notifications).
    pub fn invalidate_range(&self, range: &Range) {
        let mut regions = self.regions.write();
        let stale: Vec<Vec<u8>> = regions
            .iter()
            .filter(|(_, route)| {
                route.range.start_key < range.end_key && range.start_key < route.range.end_key
            })
            .map(|(start, _)| start.clone())
            .collect();
        for start_key in stale {
            regions.remove(&start_key);
        }
    }

    /// Diagnostic listing of the cached routes in start-key order.
    pub fn dump(&self) -> Vec<RegionRoute> {
        self.regions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_common::types::{Location, PeerRole};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn route(id: u64, start: &[u8], end: &[u8]) -> RegionRoute {
        RegionRoute {
            region_id: RegionId(id),
            range: Range::new(start.to_vec(), end.to_vec()),
            leader_store_id: StoreId(1),
            peers: vec![Peer {
                store_id: StoreId(1),
                role: PeerRole::Voter,
                server_location: Location {
                    host: "127.0.0.1".into(),
                    port: 20160,
                },
            }],
            epoch: 1,
        }
    }

    /// Fetcher over a fixed region list, counting fetches.
    struct FixedFetcher {
        routes: Mutex<Vec<RegionRoute>>,
        fetches: AtomicUsize,
    }

    impl FixedFetcher {
        fn new(routes: Vec<RegionRoute>) -> Self {
            Self {
                routes: Mutex::new(routes),
                fetches: AtomicUsize::new(0),
            }
        }

        fn set_routes(&self, routes: Vec<RegionRoute>) {
            *self.routes.lock() = routes;
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl RegionFetcher for &FixedFetcher {
        fn fetch_region_by_key(&self, key: &[u8]) -> Result<RegionRoute, RouteError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.routes
                .lock()
                .iter()
                .find(|r| r.range.contains(key))
                .cloned()
                .ok_or_else(|| RouteError::RegionNotFound(key.to_vec()))
        }
    }

    #[test]
    fn miss_fetches_then_hits_from_cache() {
        let fetcher = FixedFetcher::new(vec![route(1, b"a", b"m"), route(2, b"m", b"z")]);
        let cache = RegionCache::new(&fetcher);

        assert_eq!(cache.lookup_region_by_key(b"b").unwrap().region_id, RegionId(1));
        assert_eq!(fetcher.fetch_count(), 1);

        // Warm: any key in [a, m) resolves without another fetch.
        assert_eq!(cache.lookup_region_by_key(b"lzz").unwrap().region_id, RegionId(1));
        assert_eq!(fetcher.fetch_count(), 1);

        assert_eq!(cache.lookup_region_by_key(b"n").unwrap().region_id, RegionId(2));
        assert_eq!(fetcher.fetch_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn keys_outside_every_region_are_not_found() {
        let fetcher = FixedFetcher::new(vec![route(1, b"a", b"m")]);
        let cache = RegionCache::new(&fetcher);

        assert!(matches!(
            cache.lookup_region_by_key(b"zz"),
            Err(RouteError::RegionNotFound(_))
        ));
        // An end key is exclusive: "m" is not covered by [a, m).
        assert!(cache.lookup_region_by_key(b"m").is_err());
    }

    #[test]
    fn reported_failures_invalidate_the_entry() {
        let fetcher = FixedFetcher::new(vec![route(1, b"a", b"z")]);
        let cache = RegionCache::new(&fetcher);
        cache.lookup_region_by_key(b"b").unwrap();
        assert_eq!(cache.len(), 1);

        cache.report_failure(RegionId(1), RouteFailure::NotLeader);
        assert!(cache.is_empty());

        cache.lookup_region_by_key(b"b").unwrap();
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn split_refreshes_to_the_new_right_region() {
        let fetcher = FixedFetcher::new(vec![route(1, b"a", b"z")]);
        let cache = RegionCache::new(&fetcher);
        cache.lookup_region_by_key(b"n").unwrap();

        // Backend reports the split; the caller marks the old entry stale.
        fetcher.set_routes(vec![route(2, b"a", b"m"), route(3, b"m", b"z")]);
        cache.report_failure(RegionId(1), RouteFailure::RegionSplit);

        let right = cache.lookup_region_by_key(b"n").unwrap();
        assert_eq!(right.region_id, RegionId(3));
        assert_eq!(right.range, Range::new(b"m".to_vec(), b"z".to_vec()));
    }

    #[test]
    fn invalidate_range_erases_overlapping_entries() {
        let fetcher = FixedFetcher::new(vec![
            route(1, b"a", b"g"),
            route(2, b"g", b"p"),
            route(3, b"p", b"z"),
        ]);
        let cache = RegionCache::new(&fetcher);
        for key in [b"b", b"h", b"q"] {
            cache.lookup_region_by_key(key).unwrap();
        }
        assert_eq!(cache.len(), 3);

        cache.invalidate_range(&Range::new(b"f".to_vec(), b"q".to_vec()));
        let remaining = cache.dump();
        assert_eq!(remaining.len(), 0);

        cache.lookup_region_by_key(b"b").unwrap();
        cache.invalidate_range(&Range::new(b"x".to_vec(), b"y".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn group_by_region_buckets_preserve_key_order() {
        let fetcher = FixedFetcher::new(vec![route(1, b"a", b"m"), route(2, b"m", b"z")]);
        let cache = RegionCache::new(&fetcher);

        let keys = vec![
            b"b".to_vec(),
            b"n".to_vec(),
            b"c".to_vec(),
            b"x".to_vec(),
        ];
        let groups = cache.group_by_region(&keys).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.region_id, RegionId(1));
        assert_eq!(groups[0].1, vec![b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(groups[1].0.region_id, RegionId(2));
        assert_eq!(groups[1].1, vec![b"n".to_vec(), b"x".to_vec()]);
    }
}
