//! Request dispatch for the meta and store services.

use std::sync::Arc;

use tracing::debug;

use basalt_common::error::BasaltError;
use basalt_engine::raw::RawEngine;
use basalt_engine::txn;
use basalt_meta::Coordinator;

use crate::message::{
    HelloResponse, MetaRequest, MetaResponse, MetaResponsePayload, Status, TxnRequest,
    TxnResponse,
};

/// The coordinator's meta service: one handler per request kind, every
/// outcome folded into a `MetaResponse`.
pub struct MetaService {
    coordinator: Arc<Coordinator>,
}

impl MetaService {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn handle(&self, request: MetaRequest) -> MetaResponse {
        debug!(request = request.name(), "meta service dispatch");
        match request {
            MetaRequest::Hello => MetaResponse::ok(MetaResponsePayload::Hello(HelloResponse {
                version: env!("CARGO_PKG_VERSION").to_string(),
                package: "basalt".to_string(),
            })),
            MetaRequest::CreateSchema {
                parent_schema_id,
                schema_name,
            } => self.respond(
                self.coordinator
                    .create_schema(parent_schema_id, &schema_name),
                MetaResponsePayload::SchemaId,
            ),
            MetaRequest::DropSchema {
                parent_schema_id,
                schema_id,
            } => self.respond_unit(self.coordinator.drop_schema(parent_schema_id, schema_id)),
            MetaRequest::GetSchema { schema_id } => self.respond(
                self.coordinator.control().get_schema(schema_id),
                MetaResponsePayload::Schema,
            ),
            MetaRequest::GetSchemas { schema_id } => self.respond(
                self.coordinator.control().get_schemas(schema_id),
                MetaResponsePayload::Schemas,
            ),
            MetaRequest::GetSchemaByName { schema_name } => self.respond(
                self.coordinator.control().get_schema_by_name(&schema_name),
                MetaResponsePayload::Schema,
            ),
            MetaRequest::CreateTableId { schema_id } => self.respond(
                self.coordinator.create_table_id(schema_id),
                MetaResponsePayload::TableId,
            ),
            MetaRequest::CreateTable {
                schema_id,
                definition,
                table_id,
            } => self.respond(
                self.coordinator.create_table(schema_id, definition, table_id),
                MetaResponsePayload::TableId,
            ),
            MetaRequest::DropTable {
                schema_id,
                table_id,
            } => self.respond_unit(self.coordinator.drop_table(schema_id, table_id)),
            MetaRequest::GetTable {
                schema_id,
                table_id,
            } => self.respond(
                self.coordinator.control().get_table(schema_id, table_id),
                MetaResponsePayload::Table,
            ),
            MetaRequest::GetTables { schema_id } => self.respond(
                self.coordinator.control().get_tables(schema_id),
                MetaResponsePayload::Tables,
            ),
            MetaRequest::GetTableByName {
                schema_id,
                table_name,
            } => self.respond(
                self.coordinator
                    .control()
                    .get_table_by_name(schema_id, &table_name),
                MetaResponsePayload::Table,
            ),
            MetaRequest::GetTableRange {
                schema_id,
                table_id,
            } => self.respond(
                self.coordinator.control().get_table_range(schema_id, table_id),
                MetaResponsePayload::TableRange,
            ),
            MetaRequest::GetTableMetrics {
                schema_id,
                table_id,
            } => self.respond(
                self.coordinator
                    .control()
                    .get_table_metrics(schema_id, table_id),
                MetaResponsePayload::TableMetrics,
            ),
            MetaRequest::CreateIndexId { schema_id } => self.respond(
                self.coordinator.create_index_id(schema_id),
                MetaResponsePayload::TableId,
            ),
            MetaRequest::CreateIndex {
                schema_id,
                definition,
                index_id,
            } => self.respond(
                self.coordinator.create_index(schema_id, definition, index_id),
                MetaResponsePayload::TableId,
            ),
            MetaRequest::DropIndex {
                schema_id,
                index_id,
            } => self.respond_unit(self.coordinator.drop_index(schema_id, index_id)),
            MetaRequest::GetIndex {
                schema_id,
                index_id,
            } => self.respond(
                self.coordinator.control().get_index(schema_id, index_id),
                MetaResponsePayload::Index,
            ),
            MetaRequest::GetIndexes { schema_id } => self.respond(
                self.coordinator.control().get_indexes(schema_id),
                MetaResponsePayload::Indexes,
            ),
            MetaRequest::GetIndexByName {
                schema_id,
                index_name,
            } => self.respond(
                self.coordinator
                    .control()
                    .get_index_by_name(schema_id, &index_name),
                MetaResponsePayload::Index,
            ),
            MetaRequest::GetIndexRange {
                schema_id,
                index_id,
            } => self.respond(
                self.coordinator.control().get_index_range(schema_id, index_id),
                MetaResponsePayload::TableRange,
            ),
            MetaRequest::GetIndexMetrics {
                schema_id,
                index_id,
            } => self.respond(
                self.coordinator
                    .control()
                    .get_index_metrics(schema_id, index_id),
                MetaResponsePayload::TableMetrics,
            ),
            MetaRequest::CreateRegion {
                region_name,
                replica,
                range,
            } => self.respond(
                self.coordinator.create_region(region_name, replica, range),
                MetaResponsePayload::RegionId,
            ),
            MetaRequest::DropRegion { region_id } => {
                self.respond_unit(self.coordinator.drop_region(region_id))
            }
        }
    }

    fn respond<T>(
        &self,
        result: Result<T, basalt_common::error::MetaError>,
        wrap: impl FnOnce(T) -> MetaResponsePayload,
    ) -> MetaResponse {
        match result {
            Ok(value) => MetaResponse::ok(wrap(value)),
            Err(e) => MetaResponse::error(Status::from(&e)),
        }
    }

    fn respond_unit(&self, result: Result<(), basalt_common::error::MetaError>) -> MetaResponse {
        match result {
            Ok(()) => MetaResponse::ok(MetaResponsePayload::None),
            Err(e) => MetaResponse::error(Status::from(&e)),
        }
    }
}

/// A store's transactional service over its raw engine. Requests map 1-1
/// onto the txn engine helper; conflicts come back inside the response
/// rather than as transport failures.
pub struct StoreService {
    engine: Arc<dyn RawEngine>,
}

impl StoreService {
    pub fn new(engine: Arc<dyn RawEngine>) -> Self {
        Self { engine }
    }

    pub fn handle(&self, request: TxnRequest) -> TxnResponse {
        debug!(request = request.name(), "store service dispatch");
        match request {
            TxnRequest::TxnPrewrite {
                mutations,
                primary_lock,
                start_ts,
                lock_ttl,
            } => self.fold_unit(txn::prewrite(
                self.engine.as_ref(),
                &mutations,
                &primary_lock,
                start_ts,
                lock_ttl,
            )),
            TxnRequest::TxnCommit {
                start_ts,
                commit_ts,
                keys,
            } => self.fold_unit(self.commit_keys(start_ts, commit_ts, &keys)),
            TxnRequest::TxnRollback { start_ts, keys } => {
                self.fold_unit(self.rollback_keys(start_ts, &keys))
            }
            TxnRequest::TxnBatchGet {
                isolation,
                start_ts,
                keys,
            } => match txn::batch_get(self.engine.as_ref(), isolation, start_ts, &keys) {
                Ok((kvs, txn_result)) => TxnResponse {
                    kvs,
                    txn_result,
                    ..TxnResponse::empty_ok()
                },
                Err(e) => TxnResponse::error(Status::from(&e)),
            },
            TxnRequest::TxnScan {
                isolation,
                start_ts,
                range,
                limit,
                key_only,
                reverse,
            } => match txn::scan(
                self.engine.as_ref(),
                isolation,
                start_ts,
                range,
                limit,
                key_only,
                reverse,
                None,
            ) {
                Ok(output) => TxnResponse {
                    kvs: output.kvs,
                    txn_result: output.txn_result,
                    has_more: output.has_more,
                    end_key: output.end_key,
                    ..TxnResponse::empty_ok()
                },
                Err(e) => TxnResponse::error(Status::from(&e)),
            },
            TxnRequest::TxnScanLock {
                min_lock_ts,
                max_lock_ts,
                range,
                limit,
            } => match txn::scan_lock_info(
                self.engine.as_ref(),
                min_lock_ts,
                max_lock_ts,
                range,
                limit,
            ) {
                Ok(locks) => TxnResponse {
                    locks,
                    ..TxnResponse::empty_ok()
                },
                Err(e) => TxnResponse::error(Status::from(&e)),
            },
        }
    }

    /// Resolve each key's lock at `start_ts` and commit through the helper.
    /// Keys whose lock is already gone are passed through with a synthetic
    /// lock record so the helper can decide idempotency from the write CF.
    fn commit_keys(
        &self,
        start_ts: u64,
        commit_ts: u64,
        keys: &[Vec<u8>],
    ) -> Result<(), BasaltError> {
        let mut locks = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = match txn::get_lock_info(self.engine.as_ref(), key)? {
                Some(lock) if lock.lock_ts == start_ts => lock,
                _ => basalt_engine::mvcc::LockInfo {
                    key: key.clone(),
                    primary_lock: key.clone(),
                    lock_ts: start_ts,
                    ttl: 0,
                    for_update_ts: 0,
                    lock_type: basalt_engine::mvcc::LockType::Put,
                    short_value: None,
                },
            };
            locks.push(lock);
        }
        txn::commit(self.engine.as_ref(), &locks, commit_ts)
    }

    /// Split keys by whether their prewrite staged a data record, then
    /// delegate to the helper.
    fn rollback_keys(&self, start_ts: u64, keys: &[Vec<u8>]) -> Result<(), BasaltError> {
        let mut with_data = Vec::new();
        let mut without_data = Vec::new();
        for key in keys {
            match txn::get_lock_info(self.engine.as_ref(), key)? {
                Some(lock)
                    if lock.lock_ts == start_ts
                        && lock.lock_type == basalt_engine::mvcc::LockType::Put
                        && lock.short_value.is_none() =>
                {
                    with_data.push(key.clone());
                }
                _ => without_data.push(key.clone()),
            }
        }
        txn::rollback(self.engine.as_ref(), &with_data, &without_data, start_ts)
    }

    fn fold_unit(&self, result: Result<(), BasaltError>) -> TxnResponse {
        match result {
            Ok(()) => TxnResponse::empty_ok(),
            Err(e) => TxnResponse::error(Status::from(&e)),
        }
    }
}
