//! Shared types for Basalt: identifiers, key ranges, region/peer records,
//! table and index definitions, and the error taxonomy used across the
//! coordinator, the store engine, and the client router.

pub mod error;
pub mod meta;
pub mod types;

pub use error::{BasaltError, EngineError, MetaError, RouteError, TxnError};
pub use types::{RegionId, SchemaId, StoreId, TableId};
