//! Catalog records held by the coordinator maps, and the view types handed
//! back to clients.
//!
//! Relations are stored as ids only: a schema holds child ids, a table holds
//! its schema id, a partition holds its region id. Ranges live on the
//! region, never on the partition record.

use serde::{Deserialize, Serialize};

use basalt_common::meta::{IndexDefinition, TableDefinition};
use basalt_common::types::{Location, Range, RegionId, SchemaId, TableId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: SchemaId,
    pub name: String,
    pub table_ids: Vec<TableId>,
    pub index_ids: Vec<TableId>,
}

impl Schema {
    pub fn new(id: SchemaId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            table_ids: Vec::new(),
            index_ids: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table_ids.is_empty() && self.index_ids.is_empty()
    }
}

/// A committed table: definition plus the region id per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: TableId,
    pub schema_id: SchemaId,
    pub definition: TableDefinition,
    pub partitions: Vec<RegionId>,
}

/// A committed index: definition plus the region id per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: TableId,
    pub schema_id: SchemaId,
    pub definition: IndexDefinition,
    pub partitions: Vec<RegionId>,
}

/// Placement of one partition: its region's range, leader, and replica
/// locations, stamped with the epochs the client needs for staleness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDistribution {
    pub region_id: RegionId,
    pub range: Range,
    pub leader: Location,
    pub voters: Vec<Location>,
    pub learners: Vec<Location>,
    pub regionmap_epoch: u64,
    pub storemap_epoch: u64,
}

/// Full placement of a table or index across its partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRange {
    pub range_distribution: Vec<RangeDistribution>,
}

/// Aggregated metrics for a table or index, summed over its regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetrics {
    pub rows_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub part_count: u32,
}
