//! The coordinator control: authoritative owner of the metadata maps.
//!
//! Mutating operations validate against the current maps, reserve names in
//! the staging maps, and describe their effect as a [`MetaIncrement`]. The
//! maps themselves change only in [`CoordinatorControl::apply_increment`],
//! invoked in log order by the log owner. An operation that fails after
//! reserving a name erases its reservation before returning, and its
//! increment is discarded unapplied, so partial creations are never
//! observable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use basalt_common::error::MetaError;
use basalt_common::meta::{IndexDefinition, IndexParameter, PartitionRule, TableDefinition};
use basalt_common::types::{
    Peer, PeerRole, Range, Region, RegionId, RegionState, RegionType,
};

use crate::catalog::{IndexRecord, RangeDistribution, Schema, TableMetrics, TableRange, TableRecord};
use crate::id_epoch::{IdEpochKind, IdEpochMap};
use crate::increment::{
    IndexIncrement, MetaIncrement, MetaIncrementOp, RegionIncrement, SchemaIncrement,
    StoreIncrement, TableIncrement,
};
use crate::sequence::SequenceService;
use crate::validate::{check_auto_increment, validate_index_definition};

use basalt_common::types::{
    SchemaId, Store, StoreId, StoreState, TableId, INFORMATION_SCHEMA, BASALT_SCHEMA, META_SCHEMA,
    MYSQL_SCHEMA, RESERVED_ID_MAX, ROOT_SCHEMA,
};

/// Default replica count when a definition leaves it unset.
const DEFAULT_REPLICA_NUM: u32 = 3;

pub struct CoordinatorControl {
    pub(crate) id_epochs: IdEpochMap,
    pub(crate) schema_map: DashMap<SchemaId, Schema>,
    pub(crate) table_map: DashMap<TableId, TableRecord>,
    pub(crate) index_map: DashMap<TableId, IndexRecord>,
    pub(crate) region_map: DashMap<RegionId, Region>,
    pub(crate) store_map: DashMap<StoreId, Store>,
    pub(crate) table_metrics_map: DashMap<TableId, TableMetrics>,
    pub(crate) index_metrics_map: DashMap<TableId, TableMetrics>,

    // Pre-log name reservations: updated before the increment is appended so
    // concurrent duplicate names fail fast, erased on downstream failure.
    schema_name_map_safe_temp: DashMap<String, u64>,
    table_name_map_safe_temp: DashMap<String, u64>,
    index_name_map_safe_temp: DashMap<String, u64>,

    sequences: Arc<dyn SequenceService>,

    // Test hook: remaining successful create_region calls before one
    // injected failure; negative means disabled.
    region_create_fault: AtomicI64,
}

fn name_key(schema_id: SchemaId, name: &str) -> String {
    format!("{}#{}", schema_id.0, name)
}

fn put_if_absent(map: &DashMap<String, u64>, key: String, value: u64) -> bool {
    match map.entry(key) {
        dashmap::mapref::entry::Entry::Occupied(_) => false,
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(value);
            true
        }
    }
}

impl CoordinatorControl {
    pub fn new(sequences: Arc<dyn SequenceService>) -> Self {
        let control = Self {
            id_epochs: IdEpochMap::new(),
            schema_map: DashMap::new(),
            table_map: DashMap::new(),
            index_map: DashMap::new(),
            region_map: DashMap::new(),
            store_map: DashMap::new(),
            table_metrics_map: DashMap::new(),
            index_metrics_map: DashMap::new(),
            schema_name_map_safe_temp: DashMap::new(),
            table_name_map_safe_temp: DashMap::new(),
            index_name_map_safe_temp: DashMap::new(),
            sequences,
            region_create_fault: AtomicI64::new(-1),
        };
        control.generate_root_schemas();
        control
    }

    /// Seed the reserved schemas. They exist on every replica from the
    /// beginning and never appear in the log.
    fn generate_root_schemas(&self) {
        for (id, name) in [
            (ROOT_SCHEMA, "root"),
            (META_SCHEMA, "meta"),
            (BASALT_SCHEMA, "basalt"),
            (MYSQL_SCHEMA, "mysql"),
            (INFORMATION_SCHEMA, "information_schema"),
        ] {
            self.schema_map.insert(id, Schema::new(id, name));
            self.schema_name_map_safe_temp.insert(name.to_string(), id.0);
            info!(%id, name, "seeded reserved schema");
        }
    }

    /// Test hook: let `after` more `create_region` calls succeed, then fail
    /// the next one.
    pub fn fail_region_create_after(&self, after: u64) {
        self.region_create_fault.store(after as i64, Ordering::SeqCst);
    }

    pub fn get_present_id(&self, kind: IdEpochKind) -> u64 {
        self.id_epochs.get_present_id(kind)
    }

    // ------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------

    /// True iff `schema_id` exists.
    pub fn validate_schema(&self, schema_id: SchemaId) -> bool {
        let exists = self.schema_map.contains_key(&schema_id);
        if !exists {
            error!(%schema_id, "schema id is not known");
        }
        exists
    }

    pub fn create_schema(
        &self,
        parent_schema_id: SchemaId,
        schema_name: &str,
        increment: &mut MetaIncrement,
    ) -> Result<SchemaId, MetaError> {
        // Only the root schema can hold sub-schemas.
        if parent_schema_id != ROOT_SCHEMA {
            return Err(MetaError::IllegalParameters(format!(
                "parent schema {parent_schema_id} is not the root schema"
            )));
        }
        if schema_name.is_empty() {
            return Err(MetaError::IllegalParameters("schema name is empty".into()));
        }
        if self.schema_name_map_safe_temp.contains_key(schema_name) {
            return Err(MetaError::SchemaExists(schema_name.to_string()));
        }

        let new_schema_id = SchemaId(self.id_epochs.get_next_id(IdEpochKind::IdNextSchema, increment));

        if !put_if_absent(
            &self.schema_name_map_safe_temp,
            schema_name.to_string(),
            new_schema_id.0,
        ) {
            info!(schema_name, %new_schema_id, "schema name raced into existence");
            return Err(MetaError::SchemaExists(schema_name.to_string()));
        }

        increment.schemas.push(SchemaIncrement {
            id: new_schema_id,
            op: MetaIncrementOp::Create,
            parent_schema_id,
            schema: Schema::new(new_schema_id, schema_name),
        });
        self.id_epochs.get_next_id(IdEpochKind::EpochSchema, increment);

        Ok(new_schema_id)
    }

    pub fn drop_schema(
        &self,
        parent_schema_id: SchemaId,
        schema_id: SchemaId,
        increment: &mut MetaIncrement,
    ) -> Result<(), MetaError> {
        if schema_id.0 <= RESERVED_ID_MAX {
            return Err(MetaError::IllegalParameters(format!(
                "{schema_id} is in the reserved range"
            )));
        }
        if parent_schema_id != ROOT_SCHEMA {
            return Err(MetaError::IllegalParameters(format!(
                "parent schema {parent_schema_id} is not the root schema"
            )));
        }
        let schema = self
            .schema_map
            .get(&schema_id)
            .map(|s| s.clone())
            .ok_or_else(|| MetaError::SchemaNotFound(schema_id.to_string()))?;
        if !schema.is_empty() {
            error!(%schema_id, tables = schema.table_ids.len(), indexes = schema.index_ids.len(),
                "cannot drop non-empty schema");
            return Err(MetaError::SchemaNotEmpty(schema_id));
        }

        self.id_epochs.get_next_id(IdEpochKind::EpochSchema, increment);
        self.schema_name_map_safe_temp.remove(&schema.name);
        increment.schemas.push(SchemaIncrement {
            id: schema_id,
            op: MetaIncrementOp::Delete,
            parent_schema_id,
            schema,
        });
        Ok(())
    }

    pub fn get_schema(&self, schema_id: SchemaId) -> Result<Schema, MetaError> {
        self.schema_map
            .get(&schema_id)
            .map(|s| s.clone())
            .ok_or_else(|| MetaError::SchemaNotFound(schema_id.to_string()))
    }

    /// List sub-schemas. Only the root schema has any.
    pub fn get_schemas(&self, schema_id: SchemaId) -> Result<Vec<Schema>, MetaError> {
        if schema_id != ROOT_SCHEMA {
            return Err(MetaError::IllegalParameters(format!(
                "{schema_id} is not the root schema"
            )));
        }
        let mut schemas: Vec<Schema> = self.schema_map.iter().map(|e| e.value().clone()).collect();
        schemas.sort_by_key(|s| s.id);
        Ok(schemas)
    }

    pub fn get_schema_by_name(&self, schema_name: &str) -> Result<Schema, MetaError> {
        if schema_name.is_empty() {
            return Err(MetaError::IllegalParameters("schema name is empty".into()));
        }
        let id = self
            .schema_name_map_safe_temp
            .get(schema_name)
            .map(|v| SchemaId(*v))
            .ok_or_else(|| MetaError::SchemaNotFound(schema_name.to_string()))?;
        self.get_schema(id)
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    pub fn create_table_id(
        &self,
        schema_id: SchemaId,
        increment: &mut MetaIncrement,
    ) -> Result<TableId, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let id = TableId(self.id_epochs.get_next_id(IdEpochKind::IdNextTable, increment));
        info!(%id, "allocated table id");
        Ok(id)
    }

    /// Index ids are drawn from the table counter: one namespace for both.
    pub fn create_index_id(
        &self,
        schema_id: SchemaId,
        increment: &mut MetaIncrement,
    ) -> Result<TableId, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let id = TableId(self.id_epochs.get_next_id(IdEpochKind::IdNextTable, increment));
        info!(%id, "allocated index id");
        Ok(id)
    }

    pub fn create_table(
        &self,
        schema_id: SchemaId,
        definition: TableDefinition,
        preset_id: Option<TableId>,
        increment: &mut MetaIncrement,
    ) -> Result<TableId, MetaError> {
        if schema_id == ROOT_SCHEMA {
            return Err(MetaError::IllegalParameters(
                "cannot create a table in the root schema".into(),
            ));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        if definition.name.is_empty() {
            return Err(MetaError::IllegalParameters("table name is empty".into()));
        }
        let has_auto_increment = check_auto_increment(&definition)?;

        let ranges = match &definition.partition {
            PartitionRule::Hash(_) => {
                return Err(MetaError::TableDefinitionIllegal(
                    "hash partitioning is not supported".into(),
                ));
            }
            PartitionRule::Range(ranges) if ranges.is_empty() => {
                return Err(MetaError::TableDefinitionIllegal("no range provided".into()));
            }
            PartitionRule::Range(ranges) => ranges.clone(),
        };

        let staging_key = name_key(schema_id, &definition.name);
        if self.table_name_map_safe_temp.contains_key(&staging_key) {
            return Err(MetaError::TableExists(definition.name.clone()));
        }

        let new_table_id = match preset_id {
            Some(id) => id,
            None => TableId(self.id_epochs.get_next_id(IdEpochKind::IdNextTable, increment)),
        };

        // The sequence must exist before any region does; a failure here
        // aborts the creation before it has side effects.
        if has_auto_increment {
            self.sequences
                .create(new_table_id, definition.auto_increment)
                .map_err(|e| MetaError::AutoIncrementWhileCreatingTable(e.to_string()))?;
        }

        if !put_if_absent(&self.table_name_map_safe_temp, staging_key.clone(), new_table_id.0) {
            info!(table_name = %definition.name, %new_table_id, "table name raced into existence");
            return Err(MetaError::TableExists(definition.name.clone()));
        }

        let replica = if definition.replica < 1 {
            DEFAULT_REPLICA_NUM
        } else {
            definition.replica
        };

        let mut new_region_ids = Vec::with_capacity(ranges.len());
        for (i, range) in ranges.iter().enumerate() {
            let region_name = format!("T_{}_{}_part_{}", schema_id.0, definition.name, i);
            match self.create_region(
                region_name,
                RegionType::Store,
                replica,
                range.clone(),
                schema_id,
                new_table_id,
                TableId(0),
                None,
                increment,
            ) {
                Ok(region_id) => {
                    info!(%region_id, part = i, "created table region");
                    new_region_ids.push(region_id);
                }
                Err(e) => {
                    error!(table_name = %definition.name, part = i, error = %e,
                        "region creation failed, abandoning table");
                    self.table_name_map_safe_temp.remove(&staging_key);
                    return Err(MetaError::TableRegionCreateFailed(format!(
                        "created {}/{} regions: {e}",
                        new_region_ids.len(),
                        ranges.len()
                    )));
                }
            }
        }

        self.id_epochs.get_next_id(IdEpochKind::EpochRegion, increment);

        let table = TableRecord {
            id: new_table_id,
            schema_id,
            definition,
            partitions: new_region_ids,
        };
        self.id_epochs.get_next_id(IdEpochKind::EpochTable, increment);
        increment.tables.push(TableIncrement {
            id: new_table_id,
            op: MetaIncrementOp::Create,
            table,
        });

        Ok(new_table_id)
    }

    pub fn drop_table(
        &self,
        schema_id: SchemaId,
        table_id: TableId,
        increment: &mut MetaIncrement,
    ) -> Result<(), MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let table = self
            .table_map
            .get(&table_id)
            .map(|t| t.clone())
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))?;

        for region_id in &table.partitions {
            if let Err(e) = self.drop_region(*region_id, increment) {
                error!(%table_id, %region_id, error = %e, "drop region failed while dropping table");
            }
        }

        let has_auto_increment = check_auto_increment(&table.definition).unwrap_or(false);
        let staging_key = name_key(schema_id, &table.definition.name);
        self.table_name_map_safe_temp.remove(&staging_key);

        self.id_epochs.get_next_id(IdEpochKind::EpochTable, increment);
        increment.tables.push(TableIncrement {
            id: table_id,
            op: MetaIncrementOp::Delete,
            table,
        });

        if has_auto_increment {
            self.sequences.delete_async(table_id);
        }
        Ok(())
    }

    pub fn get_table(&self, schema_id: SchemaId, table_id: TableId) -> Result<TableRecord, MetaError> {
        if table_id.0 <= RESERVED_ID_MAX {
            return Err(MetaError::IllegalParameters(format!(
                "{table_id} is in the reserved range"
            )));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        self.table_map
            .get(&table_id)
            .map(|t| t.clone())
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))
    }

    pub fn get_tables(&self, schema_id: SchemaId) -> Result<Vec<TableRecord>, MetaError> {
        let schema = self.get_schema(schema_id)?;
        let mut tables = Vec::with_capacity(schema.table_ids.len());
        for table_id in schema.table_ids {
            match self.table_map.get(&table_id) {
                Some(table) => tables.push(table.clone()),
                None => error!(%table_id, "schema references unknown table"),
            }
        }
        Ok(tables)
    }

    pub fn get_tables_count(&self, schema_id: SchemaId) -> Result<usize, MetaError> {
        Ok(self.get_schema(schema_id)?.table_ids.len())
    }

    pub fn get_table_by_name(
        &self,
        schema_id: SchemaId,
        table_name: &str,
    ) -> Result<TableRecord, MetaError> {
        if table_name.is_empty() {
            return Err(MetaError::IllegalParameters("table name is empty".into()));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let table_id = self
            .table_name_map_safe_temp
            .get(&name_key(schema_id, table_name))
            .map(|v| TableId(*v))
            .ok_or_else(|| MetaError::TableNotFound(table_name.to_string()))?;
        self.get_table(schema_id, table_id)
    }

    pub fn get_table_range(
        &self,
        schema_id: SchemaId,
        table_id: TableId,
    ) -> Result<TableRange, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let table = self
            .table_map
            .get(&table_id)
            .map(|t| t.clone())
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))?;
        Ok(self.range_distribution_of(&table.partitions))
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    pub fn create_index(
        &self,
        schema_id: SchemaId,
        definition: IndexDefinition,
        preset_id: Option<TableId>,
        increment: &mut MetaIncrement,
    ) -> Result<TableId, MetaError> {
        if schema_id == ROOT_SCHEMA {
            return Err(MetaError::IllegalParameters(
                "cannot create an index in the root schema".into(),
            ));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        validate_index_definition(&definition)?;
        if let IndexParameter::Vector(vector) = &definition.index_parameter {
            info!(index_name = %definition.name, algorithm = vector.algorithm_name(),
                "validated vector index definition");
        }

        let ranges = match &definition.partition {
            PartitionRule::Hash(_) => {
                return Err(MetaError::IndexDefinitionIllegal(
                    "hash partitioning is not supported".into(),
                ));
            }
            PartitionRule::Range(ranges) if ranges.is_empty() => {
                return Err(MetaError::IndexDefinitionIllegal("no range provided".into()));
            }
            PartitionRule::Range(ranges) => ranges.clone(),
        };

        let staging_key = name_key(schema_id, &definition.name);
        if self.index_name_map_safe_temp.contains_key(&staging_key) {
            return Err(MetaError::IndexExists(definition.name.clone()));
        }

        let new_index_id = match preset_id {
            Some(id) => id,
            None => TableId(self.id_epochs.get_next_id(IdEpochKind::IdNextTable, increment)),
        };

        if definition.with_auto_increment {
            self.sequences
                .create(new_index_id, definition.auto_increment)
                .map_err(|e| MetaError::AutoIncrementWhileCreatingTable(e.to_string()))?;
        }

        if !put_if_absent(&self.index_name_map_safe_temp, staging_key.clone(), new_index_id.0) {
            info!(index_name = %definition.name, %new_index_id, "index name raced into existence");
            return Err(MetaError::IndexExists(definition.name.clone()));
        }

        let replica = if definition.replica < 1 {
            DEFAULT_REPLICA_NUM
        } else {
            definition.replica
        };

        let mut new_region_ids = Vec::with_capacity(ranges.len());
        for (i, range) in ranges.iter().enumerate() {
            let region_name = format!("I_{}_{}_part_{}", schema_id.0, definition.name, i);
            match self.create_region(
                region_name,
                RegionType::Index,
                replica,
                range.clone(),
                schema_id,
                TableId(0),
                new_index_id,
                Some(definition.index_parameter.clone()),
                increment,
            ) {
                Ok(region_id) => {
                    info!(%region_id, part = i, "created index region");
                    new_region_ids.push(region_id);
                }
                Err(e) => {
                    error!(index_name = %definition.name, part = i, error = %e,
                        "region creation failed, abandoning index");
                    self.index_name_map_safe_temp.remove(&staging_key);
                    return Err(MetaError::IndexRegionCreateFailed(format!(
                        "created {}/{} regions: {e}",
                        new_region_ids.len(),
                        ranges.len()
                    )));
                }
            }
        }

        self.id_epochs.get_next_id(IdEpochKind::EpochRegion, increment);

        let index = IndexRecord {
            id: new_index_id,
            schema_id,
            definition,
            partitions: new_region_ids,
        };
        self.id_epochs.get_next_id(IdEpochKind::EpochIndex, increment);
        increment.indexes.push(IndexIncrement {
            id: new_index_id,
            op: MetaIncrementOp::Create,
            index,
        });

        Ok(new_index_id)
    }

    pub fn drop_index(
        &self,
        schema_id: SchemaId,
        index_id: TableId,
        increment: &mut MetaIncrement,
    ) -> Result<(), MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let index = self
            .index_map
            .get(&index_id)
            .map(|i| i.clone())
            .ok_or_else(|| MetaError::IndexNotFound(index_id.to_string()))?;

        for region_id in &index.partitions {
            if let Err(e) = self.drop_region(*region_id, increment) {
                error!(%index_id, %region_id, error = %e, "drop region failed while dropping index");
            }
        }

        let staging_key = name_key(schema_id, &index.definition.name);
        self.index_name_map_safe_temp.remove(&staging_key);

        self.id_epochs.get_next_id(IdEpochKind::EpochIndex, increment);
        let with_auto_increment = index.definition.with_auto_increment;
        increment.indexes.push(IndexIncrement {
            id: index_id,
            op: MetaIncrementOp::Delete,
            index,
        });

        if with_auto_increment {
            self.sequences.delete_async(index_id);
        }
        Ok(())
    }

    pub fn get_index(&self, schema_id: SchemaId, index_id: TableId) -> Result<IndexRecord, MetaError> {
        if index_id.0 <= RESERVED_ID_MAX {
            return Err(MetaError::IllegalParameters(format!(
                "{index_id} is in the reserved range"
            )));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        self.index_map
            .get(&index_id)
            .map(|i| i.clone())
            .ok_or_else(|| MetaError::IndexNotFound(index_id.to_string()))
    }

    pub fn get_indexes(&self, schema_id: SchemaId) -> Result<Vec<IndexRecord>, MetaError> {
        let schema = self.get_schema(schema_id)?;
        let mut indexes = Vec::with_capacity(schema.index_ids.len());
        for index_id in schema.index_ids {
            match self.index_map.get(&index_id) {
                Some(index) => indexes.push(index.clone()),
                None => error!(%index_id, "schema references unknown index"),
            }
        }
        Ok(indexes)
    }

    pub fn get_indexes_count(&self, schema_id: SchemaId) -> Result<usize, MetaError> {
        Ok(self.get_schema(schema_id)?.index_ids.len())
    }

    pub fn get_index_by_name(
        &self,
        schema_id: SchemaId,
        index_name: &str,
    ) -> Result<IndexRecord, MetaError> {
        if index_name.is_empty() {
            return Err(MetaError::IllegalParameters("index name is empty".into()));
        }
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let index_id = self
            .index_name_map_safe_temp
            .get(&name_key(schema_id, index_name))
            .map(|v| TableId(*v))
            .ok_or_else(|| MetaError::IndexNotFound(index_name.to_string()))?;
        self.get_index(schema_id, index_id)
    }

    pub fn get_index_range(
        &self,
        schema_id: SchemaId,
        index_id: TableId,
    ) -> Result<TableRange, MetaError> {
        if !self.validate_schema(schema_id) {
            return Err(MetaError::SchemaNotFound(schema_id.to_string()));
        }
        let index = self
            .index_map
            .get(&index_id)
            .map(|i| i.clone())
            .ok_or_else(|| MetaError::IndexNotFound(index_id.to_string()))?;
        Ok(self.range_distribution_of(&index.partitions))
    }

    fn range_distribution_of(&self, partitions: &[RegionId]) -> TableRange {
        let regionmap_epoch = self.id_epochs.get_present_id(IdEpochKind::EpochRegion);
        let storemap_epoch = self.id_epochs.get_present_id(IdEpochKind::EpochStore);
        let mut table_range = TableRange::default();
        for region_id in partitions {
            let region = match self.region_map.get(region_id) {
                Some(r) => r,
                None => {
                    error!(%region_id, "partition references unknown region");
                    continue;
                }
            };
            let leader = region.leader_location().cloned().unwrap_or_default();
            let mut voters = Vec::new();
            let mut learners = Vec::new();
            for peer in &region.peers {
                match peer.role {
                    PeerRole::Voter => voters.push(peer.server_location.clone()),
                    PeerRole::Learner => learners.push(peer.server_location.clone()),
                }
            }
            table_range.range_distribution.push(RangeDistribution {
                region_id: *region_id,
                range: region.range.clone(),
                leader,
                voters,
                learners,
                regionmap_epoch,
                storemap_epoch,
            });
        }
        table_range
    }

    // ------------------------------------------------------------------
    // Regions and stores
    // ------------------------------------------------------------------

    /// Create one region covering `range`, placing `replica` voter peers on
    /// the least-loaded active stores.
    #[allow(clippy::too_many_arguments)]
    pub fn create_region(
        &self,
        region_name: String,
        region_type: RegionType,
        replica: u32,
        range: Range,
        schema_id: SchemaId,
        table_id: TableId,
        index_id: TableId,
        index_parameter: Option<IndexParameter>,
        increment: &mut MetaIncrement,
    ) -> Result<RegionId, MetaError> {
        let fault = self.region_create_fault.load(Ordering::SeqCst);
        if fault >= 0 {
            self.region_create_fault.fetch_sub(1, Ordering::SeqCst);
            if fault == 0 {
                return Err(MetaError::Internal("injected region create failure".into()));
            }
        }
        if range.is_empty() {
            return Err(MetaError::IllegalParameters(format!(
                "region range is empty: {:?}..{:?}",
                range.start_key, range.end_key
            )));
        }

        let stores = self.select_stores(replica as usize)?;
        let region_id = RegionId(self.id_epochs.get_next_id(IdEpochKind::IdNextRegion, increment));
        let peers: Vec<Peer> = stores
            .iter()
            .map(|store| Peer {
                store_id: store.id,
                role: PeerRole::Voter,
                server_location: store.server_location.clone(),
            })
            .collect();
        let leader_store_id = peers[0].store_id;

        let region = Region {
            id: region_id,
            name: region_name,
            region_type,
            range,
            peers,
            leader_store_id,
            schema_id,
            table_id,
            index_id,
            replica_num: replica,
            index_parameter,
            state: RegionState::Normal,
            epoch: 1,
            metrics: None,
        };
        increment.regions.push(RegionIncrement {
            id: region_id,
            op: MetaIncrementOp::Create,
            region,
        });
        Ok(region_id)
    }

    /// Least-loaded active stores first; ties broken by store id.
    fn select_stores(&self, replica: usize) -> Result<Vec<Store>, MetaError> {
        let mut region_counts: std::collections::HashMap<StoreId, usize> =
            std::collections::HashMap::new();
        for region in self.region_map.iter() {
            for peer in &region.peers {
                *region_counts.entry(peer.store_id).or_default() += 1;
            }
        }
        let mut candidates: Vec<Store> = self
            .store_map
            .iter()
            .filter(|s| s.state == StoreState::Active)
            .map(|s| s.clone())
            .collect();
        if candidates.len() < replica {
            return Err(MetaError::Internal(format!(
                "need {replica} active stores, only {} available",
                candidates.len()
            )));
        }
        candidates.sort_by_key(|s| (region_counts.get(&s.id).copied().unwrap_or(0), s.id));
        candidates.truncate(replica);
        Ok(candidates)
    }

    pub fn drop_region(
        &self,
        region_id: RegionId,
        increment: &mut MetaIncrement,
    ) -> Result<(), MetaError> {
        let mut region = self
            .region_map
            .get(&region_id)
            .map(|r| r.clone())
            .ok_or(MetaError::RegionNotFound(region_id))?;
        region.state = RegionState::Deleting;
        self.id_epochs.get_next_id(IdEpochKind::EpochRegion, increment);
        increment.regions.push(RegionIncrement {
            id: region_id,
            op: MetaIncrementOp::Delete,
            region,
        });
        Ok(())
    }

    pub fn get_region(&self, region_id: RegionId) -> Result<Region, MetaError> {
        self.region_map
            .get(&region_id)
            .map(|r| r.clone())
            .ok_or(MetaError::RegionNotFound(region_id))
    }

    pub fn get_regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.region_map.iter().map(|e| e.value().clone()).collect();
        regions.sort_by_key(|r| r.id);
        regions
    }

    /// The region whose range covers `key`, if any. Serves router misses.
    pub fn query_region_by_key(&self, key: &[u8]) -> Option<Region> {
        self.region_map
            .iter()
            .find(|r| r.range.contains(key))
            .map(|r| r.clone())
    }

    pub fn register_store(
        &self,
        store: Store,
        increment: &mut MetaIncrement,
    ) -> Result<(), MetaError> {
        self.id_epochs.get_next_id(IdEpochKind::EpochStore, increment);
        increment.stores.push(StoreIncrement {
            id: store.id,
            op: MetaIncrementOp::Create,
            store,
        });
        Ok(())
    }

    /// Record metrics reported by a region's leader. Soft state: metrics
    /// ride outside the log and are rebuilt from heartbeats after restart.
    pub fn update_region_metrics(
        &self,
        region_id: RegionId,
        metrics: basalt_common::types::RegionMetrics,
    ) -> Result<(), MetaError> {
        let mut region = self
            .region_map
            .get_mut(&region_id)
            .ok_or(MetaError::RegionNotFound(region_id))?;
        region.metrics = Some(metrics);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Log apply and snapshots
    // ------------------------------------------------------------------

    /// Apply one committed increment to the in-memory maps. Called in log
    /// order by the log owner; also used when replaying after restart, which
    /// is why name reservations are re-seeded here.
    pub fn apply_increment(&self, increment: &MetaIncrement) {
        for bump in &increment.id_epochs {
            self.id_epochs.apply(bump.kind, bump.value);
        }

        for schema_increment in &increment.schemas {
            match schema_increment.op {
                MetaIncrementOp::Create => {
                    let schema = schema_increment.schema.clone();
                    put_if_absent(
                        &self.schema_name_map_safe_temp,
                        schema.name.clone(),
                        schema.id.0,
                    );
                    self.schema_map.insert(schema_increment.id, schema);
                }
                MetaIncrementOp::Delete => {
                    self.schema_name_map_safe_temp
                        .remove(&schema_increment.schema.name);
                    self.schema_map.remove(&schema_increment.id);
                }
            }
        }

        for region_increment in &increment.regions {
            match region_increment.op {
                MetaIncrementOp::Create => {
                    self.region_map
                        .insert(region_increment.id, region_increment.region.clone());
                }
                MetaIncrementOp::Delete => {
                    self.region_map.remove(&region_increment.id);
                }
            }
        }

        for table_increment in &increment.tables {
            let table = &table_increment.table;
            let staging_key = name_key(table.schema_id, &table.definition.name);
            match table_increment.op {
                MetaIncrementOp::Create => {
                    put_if_absent(&self.table_name_map_safe_temp, staging_key, table.id.0);
                    if let Some(mut schema) = self.schema_map.get_mut(&table.schema_id) {
                        if !schema.table_ids.contains(&table.id) {
                            schema.table_ids.push(table.id);
                        }
                    }
                    self.table_map.insert(table_increment.id, table.clone());
                }
                MetaIncrementOp::Delete => {
                    self.table_name_map_safe_temp.remove(&staging_key);
                    if let Some(mut schema) = self.schema_map.get_mut(&table.schema_id) {
                        schema.table_ids.retain(|id| *id != table_increment.id);
                    }
                    self.table_map.remove(&table_increment.id);
                    self.table_metrics_map.remove(&table_increment.id);
                }
            }
        }

        for index_increment in &increment.indexes {
            let index = &index_increment.index;
            let staging_key = name_key(index.schema_id, &index.definition.name);
            match index_increment.op {
                MetaIncrementOp::Create => {
                    put_if_absent(&self.index_name_map_safe_temp, staging_key, index.id.0);
                    if let Some(mut schema) = self.schema_map.get_mut(&index.schema_id) {
                        if !schema.index_ids.contains(&index.id) {
                            schema.index_ids.push(index.id);
                        }
                    }
                    self.index_map.insert(index_increment.id, index.clone());
                }
                MetaIncrementOp::Delete => {
                    self.index_name_map_safe_temp.remove(&staging_key);
                    if let Some(mut schema) = self.schema_map.get_mut(&index.schema_id) {
                        schema.index_ids.retain(|id| *id != index_increment.id);
                    }
                    self.index_map.remove(&index_increment.id);
                    self.index_metrics_map.remove(&index_increment.id);
                }
            }
        }

        for store_increment in &increment.stores {
            match store_increment.op {
                MetaIncrementOp::Create => {
                    self.store_map
                        .insert(store_increment.id, store_increment.store.clone());
                }
                MetaIncrementOp::Delete => {
                    self.store_map.remove(&store_increment.id);
                }
            }
        }
    }

    /// Serialize the applied state. Metrics memoization is deliberately
    /// excluded: it is recomputed lazily after restore.
    pub fn snapshot(&self) -> MetaSnapshot {
        MetaSnapshot {
            id_epochs: self.id_epochs.export(),
            schemas: self.schema_map.iter().map(|e| e.value().clone()).collect(),
            tables: self.table_map.iter().map(|e| e.value().clone()).collect(),
            indexes: self.index_map.iter().map(|e| e.value().clone()).collect(),
            regions: self.region_map.iter().map(|e| e.value().clone()).collect(),
            stores: self.store_map.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// Replace the in-memory state with a snapshot, rebuilding the name
    /// reservations from the authoritative records.
    pub fn restore_snapshot(&self, snapshot: &MetaSnapshot) {
        self.schema_map.clear();
        self.table_map.clear();
        self.index_map.clear();
        self.region_map.clear();
        self.store_map.clear();
        self.table_metrics_map.clear();
        self.index_metrics_map.clear();
        self.schema_name_map_safe_temp.clear();
        self.table_name_map_safe_temp.clear();
        self.index_name_map_safe_temp.clear();

        for (kind, value) in &snapshot.id_epochs {
            self.id_epochs.apply(*kind, *value);
        }
        for schema in &snapshot.schemas {
            self.schema_name_map_safe_temp
                .insert(schema.name.clone(), schema.id.0);
            self.schema_map.insert(schema.id, schema.clone());
        }
        for table in &snapshot.tables {
            self.table_name_map_safe_temp
                .insert(name_key(table.schema_id, &table.definition.name), table.id.0);
            self.table_map.insert(table.id, table.clone());
        }
        for index in &snapshot.indexes {
            self.index_name_map_safe_temp
                .insert(name_key(index.schema_id, &index.definition.name), index.id.0);
            self.index_map.insert(index.id, index.clone());
        }
        for region in &snapshot.regions {
            self.region_map.insert(region.id, region.clone());
        }
        for store in &snapshot.stores {
            self.store_map.insert(store.id, store.clone());
        }
        warn!(
            schemas = snapshot.schemas.len(),
            tables = snapshot.tables.len(),
            regions = snapshot.regions.len(),
            "restored coordinator state from snapshot"
        );
    }
}

/// Serializable image of the coordinator's applied state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetaSnapshot {
    pub id_epochs: Vec<(IdEpochKind, u64)>,
    pub schemas: Vec<Schema>,
    pub tables: Vec<TableRecord>,
    pub indexes: Vec<IndexRecord>,
    pub regions: Vec<Region>,
    pub stores: Vec<Store>,
}
