//! Coordinator metadata control.
//!
//! The coordinator owns the schema/table/index/region hierarchy. Every
//! mutation is expressed as a [`increment::MetaIncrement`] built by
//! [`control::CoordinatorControl`] and applied in log order; the in-memory
//! maps are pure functions of the applied log plus snapshots. The
//! [`Coordinator`] facade serializes mutations through a single-writer
//! in-process log; `basalt_raft` provides the replicated-log storage traits
//! for multi-replica deployments.

pub mod catalog;
pub mod control;
pub mod id_epoch;
pub mod increment;
pub mod metrics;
pub mod sequence;
pub mod validate;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use parking_lot::Mutex;

use basalt_common::error::MetaError;
use basalt_common::meta::{IndexDefinition, TableDefinition};
use basalt_common::types::{
    Range, RegionId, RegionType, SchemaId, Store, TableId, BASALT_SCHEMA,
};

use crate::control::CoordinatorControl;
use crate::increment::MetaIncrement;
use crate::sequence::SequenceService;

pub use crate::catalog::{
    IndexRecord, RangeDistribution, Schema, TableMetrics, TableRange, TableRecord,
};
pub use crate::control::MetaSnapshot;

/// Single-writer facade over [`CoordinatorControl`].
///
/// Mutating operations build a `MetaIncrement`, then commit it: append to
/// the log and apply to the in-memory maps, both under one writer lock. A
/// failed operation discards its increment, so nothing of it is ever
/// observable. Reads go straight to the control.
pub struct Coordinator {
    control: Arc<CoordinatorControl>,
    log: Mutex<Vec<MetaIncrement>>,
}

impl Coordinator {
    pub fn new(sequences: Arc<dyn SequenceService>) -> Self {
        Self {
            control: Arc::new(CoordinatorControl::new(sequences)),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Read-side access to the control and its maps.
    pub fn control(&self) -> &CoordinatorControl {
        &self.control
    }

    fn commit(&self, increment: MetaIncrement) {
        let mut log = self.log.lock();
        self.control.apply_increment(&increment);
        log.push(increment);
    }

    /// Number of committed log entries.
    pub fn log_len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn create_schema(&self, parent: SchemaId, name: &str) -> Result<SchemaId, MetaError> {
        let mut increment = MetaIncrement::default();
        let id = self.control.create_schema(parent, name, &mut increment)?;
        self.commit(increment);
        Ok(id)
    }

    pub fn drop_schema(&self, parent: SchemaId, schema_id: SchemaId) -> Result<(), MetaError> {
        let mut increment = MetaIncrement::default();
        self.control.drop_schema(parent, schema_id, &mut increment)?;
        self.commit(increment);
        Ok(())
    }

    pub fn create_table_id(&self, schema_id: SchemaId) -> Result<TableId, MetaError> {
        let mut increment = MetaIncrement::default();
        let id = self.control.create_table_id(schema_id, &mut increment)?;
        self.commit(increment);
        Ok(id)
    }

    pub fn create_table(
        &self,
        schema_id: SchemaId,
        definition: TableDefinition,
        preset_id: Option<TableId>,
    ) -> Result<TableId, MetaError> {
        let mut increment = MetaIncrement::default();
        let id = self
            .control
            .create_table(schema_id, definition, preset_id, &mut increment)?;
        self.commit(increment);
        Ok(id)
    }

    pub fn drop_table(&self, schema_id: SchemaId, table_id: TableId) -> Result<(), MetaError> {
        let mut increment = MetaIncrement::default();
        self.control.drop_table(schema_id, table_id, &mut increment)?;
        self.commit(increment);
        Ok(())
    }

    pub fn create_index_id(&self, schema_id: SchemaId) -> Result<TableId, MetaError> {
        let mut increment = MetaIncrement::default();
        let id = self.control.create_index_id(schema_id, &mut increment)?;
        self.commit(increment);
        Ok(id)
    }

    pub fn create_index(
        &self,
        schema_id: SchemaId,
        definition: IndexDefinition,
        preset_id: Option<TableId>,
    ) -> Result<TableId, MetaError> {
        let mut increment = MetaIncrement::default();
        let id = self
            .control
            .create_index(schema_id, definition, preset_id, &mut increment)?;
        self.commit(increment);
        Ok(id)
    }

    pub fn drop_index(&self, schema_id: SchemaId, index_id: TableId) -> Result<(), MetaError> {
        let mut increment = MetaIncrement::default();
        self.control.drop_index(schema_id, index_id, &mut increment)?;
        self.commit(increment);
        Ok(())
    }

    /// Create a standalone raw-KV region, not owned by any table or index.
    /// Used by clients that address the key space directly.
    pub fn create_region(
        &self,
        name: String,
        replica: u32,
        range: Range,
    ) -> Result<RegionId, MetaError> {
        let mut increment = MetaIncrement::default();
        let region_id = self.control.create_region(
            name,
            RegionType::Store,
            replica,
            range,
            BASALT_SCHEMA,
            TableId(0),
            TableId(0),
            None,
            &mut increment,
        )?;
        self.control
            .id_epochs
            .get_next_id(crate::id_epoch::IdEpochKind::EpochRegion, &mut increment);
        self.commit(increment);
        Ok(region_id)
    }

    pub fn drop_region(&self, region_id: RegionId) -> Result<(), MetaError> {
        let mut increment = MetaIncrement::default();
        self.control.drop_region(region_id, &mut increment)?;
        self.commit(increment);
        Ok(())
    }

    pub fn register_store(&self, store: Store) -> Result<(), MetaError> {
        let mut increment = MetaIncrement::default();
        self.control.register_store(store, &mut increment)?;
        self.commit(increment);
        Ok(())
    }
}

#[cfg(test)]
mod facade_tests {
    use super::*;
    use crate::sequence::MemSequenceService;
    use basalt_common::types::ROOT_SCHEMA;

    #[test]
    fn failed_operations_append_nothing_to_the_log() {
        let coordinator = Coordinator::new(Arc::new(MemSequenceService::new()));
        assert!(coordinator.create_schema(SchemaId(42), "s").is_err());
        assert_eq!(coordinator.log_len(), 0);

        coordinator.create_schema(ROOT_SCHEMA, "s").unwrap();
        assert_eq!(coordinator.log_len(), 1);
    }
}
