use serde::{Deserialize, Serialize};
use std::fmt;

use crate::meta::IndexParameter;

/// Unique identifier for a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId(pub u64);

/// Unique identifier for a table or an index.
///
/// Tables and indexes draw from the same id counter so that their ids are
/// globally unique; a `TableId` therefore also names an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Unique identifier for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u64);

/// Unique identifier for a store node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub u64);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema:{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tbl:{}", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region:{}", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store:{}", self.0)
    }
}

/// The root schema. Only the root schema can hold sub-schemas.
pub const ROOT_SCHEMA: SchemaId = SchemaId(0);
/// Reserved schema holding coordinator-internal tables.
pub const META_SCHEMA: SchemaId = SchemaId(1);
/// Default user schema.
pub const BASALT_SCHEMA: SchemaId = SchemaId(2);
/// MySQL-compatibility schema.
pub const MYSQL_SCHEMA: SchemaId = SchemaId(3);
/// `information_schema` compatibility schema.
pub const INFORMATION_SCHEMA: SchemaId = SchemaId(4);

/// Largest id in the reserved range. Allocated ids start above this, so any
/// entity id `<= RESERVED_ID_MAX` belongs to the coordinator itself and can
/// never be dropped through the public API.
pub const RESERVED_ID_MAX: u64 = 99;

/// A contiguous key range `[start, end)`. Keys are opaque bytes; ordering is
/// plain lexicographic byte order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl Range {
    pub fn new(start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Self {
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// True iff `key` falls within `[start, end)`.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && key < self.end_key.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.start_key >= self.end_key
    }
}

/// Network location of a server process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Role of a region replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Voter,
    Learner,
}

/// One replica of a region placed on a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub store_id: StoreId,
    pub role: PeerRole,
    pub server_location: Location,
}

/// Kind of data a region carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionType {
    /// Table data region.
    Store,
    /// Vector/scalar index region.
    Index,
}

/// Lifecycle state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    New,
    Normal,
    Deleting,
}

/// Per-region metrics reported by the leader store on heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionMetrics {
    pub row_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

/// A contiguous key-range replica group: the unit of placement and routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub region_type: RegionType,
    pub range: Range,
    pub peers: Vec<Peer>,
    /// Store currently holding the leader replica. Always one of the voters.
    pub leader_store_id: StoreId,
    pub schema_id: SchemaId,
    /// Owning table (zero when the region belongs to an index).
    pub table_id: TableId,
    /// Owning index (zero when the region belongs to a table).
    pub index_id: TableId,
    pub replica_num: u32,
    /// Build parameters carried by index regions; `None` for table regions.
    pub index_parameter: Option<IndexParameter>,
    pub state: RegionState,
    pub epoch: u64,
    pub metrics: Option<RegionMetrics>,
}

impl Region {
    pub fn leader_location(&self) -> Option<&Location> {
        self.peers
            .iter()
            .find(|p| p.store_id == self.leader_store_id)
            .map(|p| &p.server_location)
    }
}

/// Availability state of a store node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreState {
    Active,
    Draining,
    Down,
}

/// A data-plane store node registered with the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub server_location: Location,
    pub state: StoreState,
}

/// Transactional read isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    SnapshotIsolation,
    ReadCommitted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_contains_is_half_open() {
        let r = Range::new(b"a".to_vec(), b"m".to_vec());
        assert!(r.contains(b"a"));
        assert!(r.contains(b"lzz"));
        assert!(!r.contains(b"m"));
        assert!(!r.contains(b"z"));
    }

    #[test]
    fn reserved_schemas_are_below_allocation_floor() {
        for id in [
            ROOT_SCHEMA,
            META_SCHEMA,
            BASALT_SCHEMA,
            MYSQL_SCHEMA,
            INFORMATION_SCHEMA,
        ] {
            assert!(id.0 <= RESERVED_ID_MAX);
        }
    }
}
