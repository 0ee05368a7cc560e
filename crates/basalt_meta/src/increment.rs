//! `MetaIncrement`: one atomic metadata mutation, as appended to the
//! replicated log.
//!
//! An increment carries everything a replica needs to reach the same state:
//! the counter values drawn while building it, and the created/deleted
//! records themselves. Applying is idempotent per record and increments are
//! applied strictly in log order.

use serde::{Deserialize, Serialize};

use basalt_common::types::{Region, RegionId, SchemaId, Store, StoreId, TableId};

use crate::catalog::{IndexRecord, Schema, TableRecord};
use crate::id_epoch::IdEpochKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaIncrementOp {
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEpochIncrement {
    pub kind: IdEpochKind,
    /// Counter value after the bump; replay applies it with a monotonic max.
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaIncrement {
    pub id: SchemaId,
    pub op: MetaIncrementOp,
    pub parent_schema_id: SchemaId,
    pub schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableIncrement {
    pub id: TableId,
    pub op: MetaIncrementOp,
    pub table: TableRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexIncrement {
    pub id: TableId,
    pub op: MetaIncrementOp,
    pub index: IndexRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionIncrement {
    pub id: RegionId,
    pub op: MetaIncrementOp,
    pub region: Region,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIncrement {
    pub id: StoreId,
    pub op: MetaIncrementOp,
    pub store: Store,
}

/// One log record describing an atomic metadata mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaIncrement {
    pub id_epochs: Vec<IdEpochIncrement>,
    pub schemas: Vec<SchemaIncrement>,
    pub tables: Vec<TableIncrement>,
    pub indexes: Vec<IndexIncrement>,
    pub regions: Vec<RegionIncrement>,
    pub stores: Vec<StoreIncrement>,
}

impl MetaIncrement {
    pub fn is_empty(&self) -> bool {
        self.id_epochs.is_empty()
            && self.schemas.is_empty()
            && self.tables.is_empty()
            && self.indexes.is_empty()
            && self.regions.is_empty()
            && self.stores.is_empty()
    }
}
