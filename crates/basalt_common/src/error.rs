use thiserror::Error;

use crate::types::{RegionId, SchemaId, StoreId, TableId};

/// Top-level error type that all layer-specific errors convert into.
#[derive(Error, Debug)]
pub enum BasaltError {
    #[error("Meta error: {0}")]
    Meta(#[from] MetaError),

    #[error("Transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coordinator metadata errors.
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Illegal parameters: {0}")]
    IllegalParameters(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Schema already exists: {0}")]
    SchemaExists(String),

    #[error("Schema {0} is not empty")]
    SchemaNotEmpty(SchemaId),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Illegal table definition: {0}")]
    TableDefinitionIllegal(String),

    #[error("Illegal index definition: {0}")]
    IndexDefinitionIllegal(String),

    #[error("Region not found: {0}")]
    RegionNotFound(RegionId),

    #[error("Region creation failed while creating table: {0}")]
    TableRegionCreateFailed(String),

    #[error("Region creation failed while creating index: {0}")]
    IndexRegionCreateFailed(String),

    #[error("Auto-increment sequence creation failed while creating table: {0}")]
    AutoIncrementWhileCreatingTable(String),

    #[error("Store not found: {0}")]
    StoreNotFound(StoreId),

    #[error("Metrics calculation failed for {0}")]
    MetricsFailed(TableId),

    #[error("Internal meta error: {0}")]
    Internal(String),
}

/// Transaction helper errors. The helper never retries; callers resolve
/// locks or back off and retry above this layer.
#[derive(Error, Debug)]
pub enum TxnError {
    #[error("Lock conflict on key {key:?}: held by txn starting at ts {lock_ts}")]
    LockConflict { key: Vec<u8>, lock_ts: u64 },

    #[error("Write conflict on key {key:?}: committed at ts {conflict_ts} after start ts {start_ts}")]
    WriteConflict {
        key: Vec<u8>,
        start_ts: u64,
        conflict_ts: u64,
    },

    #[error("Lock not found for key {key:?} at start ts {start_ts}")]
    LockNotFound { key: Vec<u8>, start_ts: u64 },

    #[error("Transaction not found: start ts {0}")]
    NotFound(u64),

    #[error("Internal txn error: {0}")]
    Internal(String),
}

/// Raw engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown column family: {0}")]
    UnknownColumnFamily(String),

    #[error("Corrupted record in {cf} at key {key:?}: {reason}")]
    Corruption {
        cf: &'static str,
        key: Vec<u8>,
        reason: String,
    },

    #[error("Internal engine error: {0}")]
    Internal(String),
}

/// Client-side routing errors. All of these invalidate the cached region
/// entry before the caller retries.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("No region covers key {0:?}")]
    RegionNotFound(Vec<u8>),

    #[error("Store {0} is not the leader of region {1}")]
    NotLeader(StoreId, RegionId),

    #[error("Region {0} epoch is stale")]
    EpochStale(RegionId),

    #[error("Region {0} was split")]
    RegionSplit(RegionId),

    #[error("Internal route error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_errors_convert_to_top_level() {
        let err: BasaltError = MetaError::SchemaNotFound(SchemaId(100).to_string()).into();
        assert!(matches!(err, BasaltError::Meta(_)));

        let err: BasaltError = TxnError::NotFound(7).into();
        assert!(err.to_string().contains("Transaction"));
    }
}
