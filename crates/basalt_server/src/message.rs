//! Hand-written request/response records (no protoc needed).
//!
//! Every response carries a `Status`; payloads are tagged enums so a
//! transport can ship them with any serde format.

use serde::{Deserialize, Serialize};

use basalt_common::error::{BasaltError, EngineError, MetaError, RouteError, TxnError};
use basalt_common::meta::{IndexDefinition, TableDefinition};
use basalt_common::types::{IsolationLevel, Range, RegionId, SchemaId, TableId};
use basalt_engine::mvcc::{LockInfo, Mutation, TxnResultInfo};
use basalt_meta::{IndexRecord, Schema, TableMetrics, TableRange, TableRecord};

/// Machine-readable outcome code carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    IllegalParameters,
    SchemaNotFound,
    SchemaExists,
    SchemaNotEmpty,
    TableNotFound,
    TableExists,
    IndexNotFound,
    IndexExists,
    TableDefinitionIllegal,
    IndexDefinitionIllegal,
    RegionNotFound,
    TableRegionCreateFailed,
    IndexRegionCreateFailed,
    AutoIncrementWhileCreatingTable,
    StoreNotFound,
    MetricsFailed,
    TxnLockConflict,
    TxnWriteConflict,
    TxnLockNotFound,
    TxnNotFound,
    NotLeader,
    EpochStale,
    RegionSplit,
    Corruption,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl From<&MetaError> for Status {
    fn from(err: &MetaError) -> Self {
        let code = match err {
            MetaError::IllegalParameters(_) => StatusCode::IllegalParameters,
            MetaError::SchemaNotFound(_) => StatusCode::SchemaNotFound,
            MetaError::SchemaExists(_) => StatusCode::SchemaExists,
            MetaError::SchemaNotEmpty(_) => StatusCode::SchemaNotEmpty,
            MetaError::TableNotFound(_) => StatusCode::TableNotFound,
            MetaError::TableExists(_) => StatusCode::TableExists,
            MetaError::IndexNotFound(_) => StatusCode::IndexNotFound,
            MetaError::IndexExists(_) => StatusCode::IndexExists,
            MetaError::TableDefinitionIllegal(_) => StatusCode::TableDefinitionIllegal,
            MetaError::IndexDefinitionIllegal(_) => StatusCode::IndexDefinitionIllegal,
            MetaError::RegionNotFound(_) => StatusCode::RegionNotFound,
            MetaError::TableRegionCreateFailed(_) => StatusCode::TableRegionCreateFailed,
            MetaError::IndexRegionCreateFailed(_) => StatusCode::IndexRegionCreateFailed,
            MetaError::AutoIncrementWhileCreatingTable(_) => {
                StatusCode::AutoIncrementWhileCreatingTable
            }
            MetaError::StoreNotFound(_) => StatusCode::StoreNotFound,
            MetaError::MetricsFailed(_) => StatusCode::MetricsFailed,
            MetaError::Internal(_) => StatusCode::Internal,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<&TxnError> for Status {
    fn from(err: &TxnError) -> Self {
        let code = match err {
            TxnError::LockConflict { .. } => StatusCode::TxnLockConflict,
            TxnError::WriteConflict { .. } => StatusCode::TxnWriteConflict,
            TxnError::LockNotFound { .. } => StatusCode::TxnLockNotFound,
            TxnError::NotFound(_) => StatusCode::TxnNotFound,
            TxnError::Internal(_) => StatusCode::Internal,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<&RouteError> for Status {
    fn from(err: &RouteError) -> Self {
        let code = match err {
            RouteError::RegionNotFound(_) => StatusCode::RegionNotFound,
            RouteError::NotLeader(_, _) => StatusCode::NotLeader,
            RouteError::EpochStale(_) => StatusCode::EpochStale,
            RouteError::RegionSplit(_) => StatusCode::RegionSplit,
            RouteError::Internal(_) => StatusCode::Internal,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<&EngineError> for Status {
    fn from(err: &EngineError) -> Self {
        let code = match err {
            EngineError::Corruption { .. } => StatusCode::Corruption,
            _ => StatusCode::Internal,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<&BasaltError> for Status {
    fn from(err: &BasaltError) -> Self {
        match err {
            BasaltError::Meta(e) => e.into(),
            BasaltError::Txn(e) => e.into(),
            BasaltError::Engine(e) => e.into(),
            BasaltError::Route(e) => e.into(),
            BasaltError::Internal(message) => Self {
                code: StatusCode::Internal,
                message: message.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Meta service
// ---------------------------------------------------------------------------

/// Requests served by the coordinator's meta service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetaRequest {
    Hello,
    CreateSchema {
        parent_schema_id: SchemaId,
        schema_name: String,
    },
    DropSchema {
        parent_schema_id: SchemaId,
        schema_id: SchemaId,
    },
    GetSchema {
        schema_id: SchemaId,
    },
    GetSchemas {
        schema_id: SchemaId,
    },
    GetSchemaByName {
        schema_name: String,
    },
    CreateTableId {
        schema_id: SchemaId,
    },
    CreateTable {
        schema_id: SchemaId,
        definition: TableDefinition,
        table_id: Option<TableId>,
    },
    DropTable {
        schema_id: SchemaId,
        table_id: TableId,
    },
    GetTable {
        schema_id: SchemaId,
        table_id: TableId,
    },
    GetTables {
        schema_id: SchemaId,
    },
    GetTableByName {
        schema_id: SchemaId,
        table_name: String,
    },
    GetTableRange {
        schema_id: SchemaId,
        table_id: TableId,
    },
    GetTableMetrics {
        schema_id: SchemaId,
        table_id: TableId,
    },
    CreateIndexId {
        schema_id: SchemaId,
    },
    CreateIndex {
        schema_id: SchemaId,
        definition: IndexDefinition,
        index_id: Option<TableId>,
    },
    DropIndex {
        schema_id: SchemaId,
        index_id: TableId,
    },
    GetIndex {
        schema_id: SchemaId,
        index_id: TableId,
    },
    GetIndexes {
        schema_id: SchemaId,
    },
    GetIndexByName {
        schema_id: SchemaId,
        index_name: String,
    },
    GetIndexRange {
        schema_id: SchemaId,
        index_id: TableId,
    },
    GetIndexMetrics {
        schema_id: SchemaId,
        index_id: TableId,
    },
    CreateRegion {
        region_name: String,
        replica: u32,
        range: Range,
    },
    DropRegion {
        region_id: RegionId,
    },
}

impl MetaRequest {
    /// Stable request name, used for dispatch logging.
    pub fn name(&self) -> &'static str {
        match self {
            MetaRequest::Hello => "Hello",
            MetaRequest::CreateSchema { .. } => "CreateSchema",
            MetaRequest::DropSchema { .. } => "DropSchema",
            MetaRequest::GetSchema { .. } => "GetSchema",
            MetaRequest::GetSchemas { .. } => "GetSchemas",
            MetaRequest::GetSchemaByName { .. } => "GetSchemaByName",
            MetaRequest::CreateTableId { .. } => "CreateTableId",
            MetaRequest::CreateTable { .. } => "CreateTable",
            MetaRequest::DropTable { .. } => "DropTable",
            MetaRequest::GetTable { .. } => "GetTable",
            MetaRequest::GetTables { .. } => "GetTables",
            MetaRequest::GetTableByName { .. } => "GetTableByName",
            MetaRequest::GetTableRange { .. } => "GetTableRange",
            MetaRequest::GetTableMetrics { .. } => "GetTableMetrics",
            MetaRequest::CreateIndexId { .. } => "CreateIndexId",
            MetaRequest::CreateIndex { .. } => "CreateIndex",
            MetaRequest::DropIndex { .. } => "DropIndex",
            MetaRequest::GetIndex { .. } => "GetIndex",
            MetaRequest::GetIndexes { .. } => "GetIndexes",
            MetaRequest::GetIndexByName { .. } => "GetIndexByName",
            MetaRequest::GetIndexRange { .. } => "GetIndexRange",
            MetaRequest::GetIndexMetrics { .. } => "GetIndexMetrics",
            MetaRequest::CreateRegion { .. } => "CreateRegion",
            MetaRequest::DropRegion { .. } => "DropRegion",
        }
    }
}

/// Version information returned by `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResponse {
    pub version: String,
    pub package: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetaResponsePayload {
    None,
    Hello(HelloResponse),
    SchemaId(SchemaId),
    Schema(Schema),
    Schemas(Vec<Schema>),
    TableId(TableId),
    Table(TableRecord),
    Tables(Vec<TableRecord>),
    Index(IndexRecord),
    Indexes(Vec<IndexRecord>),
    TableRange(TableRange),
    TableMetrics(TableMetrics),
    RegionId(RegionId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaResponse {
    pub status: Status,
    pub payload: MetaResponsePayload,
}

impl MetaResponse {
    pub fn ok(payload: MetaResponsePayload) -> Self {
        Self {
            status: Status::ok(),
            payload,
        }
    }

    pub fn error(status: Status) -> Self {
        Self {
            status,
            payload: MetaResponsePayload::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Store txn service
// ---------------------------------------------------------------------------

/// Requests served by a store's transactional service. These map 1-1 onto
/// the txn engine helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TxnRequest {
    TxnPrewrite {
        mutations: Vec<Mutation>,
        primary_lock: Vec<u8>,
        start_ts: u64,
        lock_ttl: u64,
    },
    TxnCommit {
        start_ts: u64,
        commit_ts: u64,
        keys: Vec<Vec<u8>>,
    },
    TxnRollback {
        start_ts: u64,
        keys: Vec<Vec<u8>>,
    },
    TxnBatchGet {
        isolation: IsolationLevel,
        start_ts: u64,
        keys: Vec<Vec<u8>>,
    },
    TxnScan {
        isolation: IsolationLevel,
        start_ts: u64,
        range: Range,
        limit: usize,
        key_only: bool,
        reverse: bool,
    },
    TxnScanLock {
        min_lock_ts: u64,
        max_lock_ts: u64,
        range: Range,
        limit: usize,
    },
}

impl TxnRequest {
    pub fn name(&self) -> &'static str {
        match self {
            TxnRequest::TxnPrewrite { .. } => "TxnPrewrite",
            TxnRequest::TxnCommit { .. } => "TxnCommit",
            TxnRequest::TxnRollback { .. } => "TxnRollback",
            TxnRequest::TxnBatchGet { .. } => "TxnBatchGet",
            TxnRequest::TxnScan { .. } => "TxnScan",
            TxnRequest::TxnScanLock { .. } => "TxnScanLock",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnResponse {
    pub status: Status,
    pub txn_result: TxnResultInfo,
    pub kvs: Vec<(Vec<u8>, Vec<u8>)>,
    pub locks: Vec<LockInfo>,
    pub has_more: bool,
    pub end_key: Vec<u8>,
}

impl TxnResponse {
    pub fn empty_ok() -> Self {
        Self {
            status: Status::ok(),
            txn_result: TxnResultInfo::default(),
            kvs: Vec::new(),
            locks: Vec::new(),
            has_more: false,
            end_key: Vec::new(),
        }
    }

    pub fn error(status: Status) -> Self {
        Self {
            status,
            ..Self::empty_ok()
        }
    }
}
