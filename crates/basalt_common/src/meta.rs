//! Table and index definitions as submitted to the coordinator.

use serde::{Deserialize, Serialize};

use crate::types::Range;

/// Column types understood by the catalog. The store itself treats values as
/// opaque bytes; types exist for definition bookkeeping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Varchar,
    Bytes,
    FloatVector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub is_primary_key: bool,
    /// Values for this column are drawn from an auto-increment sequence.
    pub auto_increment: bool,
}

/// How a table or index is partitioned across regions.
///
/// Only range partitioning is supported; a hash rule is carried so that the
/// validators can refuse it with a definition error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionRule {
    Range(Vec<Range>),
    Hash(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Replica count per region; 0 means "use the default" (3).
    pub replica: u32,
    pub partition: PartitionRule,
    /// Start value for the table's auto-increment sequence.
    pub auto_increment: u64,
}

impl TableDefinition {
    /// True iff any column is declared auto-increment.
    pub fn has_auto_increment(&self) -> bool {
        self.columns.iter().any(|c| c.auto_increment)
    }

    pub fn range_partitions(&self) -> Option<&[Range]> {
        match &self.partition {
            PartitionRule::Range(ranges) => Some(ranges),
            PartitionRule::Hash(_) => None,
        }
    }
}

/// Distance metric for vector indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    None,
    L2,
    InnerProduct,
    Cosine,
}

/// Per-algorithm build parameters for a vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorIndexParameter {
    Hnsw {
        dimension: u32,
        metric_type: MetricType,
        efconstruction: u32,
        max_elements: u64,
        nlinks: u32,
    },
    Flat {
        dimension: u32,
        metric_type: MetricType,
    },
    IvfFlat {
        dimension: u32,
        metric_type: MetricType,
        ncentroids: u32,
    },
    IvfPq {
        dimension: u32,
        metric_type: MetricType,
        ncentroids: u32,
        nsubvector: u32,
        bucket_init_size: u32,
        bucket_max_size: u32,
    },
    Diskann {
        dimension: u32,
        metric_type: MetricType,
        num_trees: u32,
        num_neighbors: u32,
        num_threads: u32,
    },
}

impl VectorIndexParameter {
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            VectorIndexParameter::Hnsw { .. } => "hnsw",
            VectorIndexParameter::Flat { .. } => "flat",
            VectorIndexParameter::IvfFlat { .. } => "ivf_flat",
            VectorIndexParameter::IvfPq { .. } => "ivf_pq",
            VectorIndexParameter::Diskann { .. } => "diskann",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarIndexType {
    None,
    Lsm,
    Btree,
}

/// What kind of index a definition declares. `None` is always rejected by
/// the validator; it exists so that an unset parameter is representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexParameter {
    None,
    Vector(VectorIndexParameter),
    Scalar { scalar_index_type: ScalarIndexType },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Replica count per region; 0 means "use the default" (3).
    pub replica: u32,
    pub partition: PartitionRule,
    pub index_parameter: IndexParameter,
    pub with_auto_increment: bool,
    pub auto_increment: u64,
}

impl IndexDefinition {
    pub fn range_partitions(&self) -> Option<&[Range]> {
        match &self.partition {
            PartitionRule::Range(ranges) => Some(ranges),
            PartitionRule::Hash(_) => None,
        }
    }
}
