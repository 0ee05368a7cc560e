//! Aggregated table and index metrics.
//!
//! Metrics are computed from the per-region metrics reported by store
//! heartbeats: row counts are summed, key bounds are folded with
//! lexicographic min/max starting from 10-byte sentinels. Lookups memoize;
//! the periodic [`CoordinatorControl::calculate_table_metrics`] pass
//! refreshes every memoized entry and evicts entries whose table vanished.
//! Readers may observe a stale snapshot; entries are replaced, not mutated.

use tracing::{info, warn};

use basalt_common::error::MetaError;
use basalt_common::types::{SchemaId, TableId};

use crate::catalog::TableMetrics;
use crate::control::CoordinatorControl;

/// Initial lower bound: ten zero bytes.
const MIN_KEY_INIT: [u8; 10] = [0x00; 10];
/// Initial upper bound: ten 0xFF bytes.
const MAX_KEY_INIT: [u8; 10] = [0xFF; 10];

impl CoordinatorControl {
    /// Fold the region metrics of one table.
    pub fn calculate_table_metrics_single(
        &self,
        table_id: TableId,
    ) -> Result<TableMetrics, MetaError> {
        let partitions = self
            .table_map
            .get(&table_id)
            .map(|t| t.partitions.clone())
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))?;
        Ok(self.fold_region_metrics(&partitions))
    }

    /// Fold the region metrics of one index.
    pub fn calculate_index_metrics_single(
        &self,
        index_id: TableId,
    ) -> Result<TableMetrics, MetaError> {
        let partitions = self
            .index_map
            .get(&index_id)
            .map(|i| i.partitions.clone())
            .ok_or_else(|| MetaError::IndexNotFound(index_id.to_string()))?;
        Ok(self.fold_region_metrics(&partitions))
    }

    fn fold_region_metrics(&self, partitions: &[basalt_common::types::RegionId]) -> TableMetrics {
        let mut rows_count = 0u64;
        let mut min_key = MIN_KEY_INIT.to_vec();
        let mut max_key = MAX_KEY_INIT.to_vec();

        for region_id in partitions {
            let region = match self.region_map.get(region_id) {
                Some(region) => region,
                None => {
                    warn!(%region_id, "partition references unknown region, skipping metrics");
                    continue;
                }
            };
            let metrics = match &region.metrics {
                Some(metrics) => metrics,
                None => {
                    warn!(%region_id, "region has reported no metrics yet, skipping");
                    continue;
                }
            };
            rows_count += metrics.row_count;
            if metrics.min_key < min_key {
                min_key = metrics.min_key.clone();
            }
            if metrics.max_key > max_key {
                max_key = metrics.max_key.clone();
            }
        }

        TableMetrics {
            rows_count,
            min_key,
            max_key,
            part_count: partitions.len() as u32,
        }
    }

    /// Memoized metrics lookup: computed on first access, refreshed by the
    /// periodic pass.
    pub fn get_table_metrics(
        &self,
        schema_id: SchemaId,
        table_id: TableId,
    ) -> Result<TableMetrics, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        if !self.table_map.contains_key(&table_id) {
            return Err(MetaError::TableNotFound(table_id.to_string()));
        }
        if let Some(cached) = self.table_metrics_map.get(&table_id) {
            return Ok(cached.clone());
        }
        let metrics = self
            .calculate_table_metrics_single(table_id)
            .map_err(|_| MetaError::MetricsFailed(table_id))?;
        info!(%table_id, rows = metrics.rows_count, parts = metrics.part_count,
            "table metrics first calculated");
        self.table_metrics_map.insert(table_id, metrics.clone());
        Ok(metrics)
    }

    pub fn get_index_metrics(
        &self,
        schema_id: SchemaId,
        index_id: TableId,
    ) -> Result<TableMetrics, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        if !self.index_map.contains_key(&index_id) {
            return Err(MetaError::IndexNotFound(index_id.to_string()));
        }
        if let Some(cached) = self.index_metrics_map.get(&index_id) {
            return Ok(cached.clone());
        }
        let metrics = self
            .calculate_index_metrics_single(index_id)
            .map_err(|_| MetaError::MetricsFailed(index_id))?;
        info!(%index_id, rows = metrics.rows_count, parts = metrics.part_count,
            "index metrics first calculated");
        self.index_metrics_map.insert(index_id, metrics.clone());
        Ok(metrics)
    }

    /// Periodic refresh: recompute every memoized table entry, evicting
    /// entries whose table has disappeared.
    pub fn calculate_table_metrics(&self) {
        let table_ids: Vec<TableId> = self.table_metrics_map.iter().map(|e| *e.key()).collect();
        for table_id in table_ids {
            match self.calculate_table_metrics_single(table_id) {
                Ok(metrics) => {
                    self.table_metrics_map.insert(table_id, metrics);
                }
                Err(_) => {
                    warn!(%table_id, "table vanished, evicting memoized metrics");
                    self.table_metrics_map.remove(&table_id);
                }
            }
        }
    }

    /// Periodic refresh for indexes; identical rules.
    pub fn calculate_index_metrics(&self) {
        let index_ids: Vec<TableId> = self.index_metrics_map.iter().map(|e| *e.key()).collect();
        for index_id in index_ids {
            match self.calculate_index_metrics_single(index_id) {
                Ok(metrics) => {
                    self.index_metrics_map.insert(index_id, metrics);
                }
                Err(_) => {
                    warn!(%index_id, "index vanished, evicting memoized metrics");
                    self.index_metrics_map.remove(&index_id);
                }
            }
        }
    }
}
