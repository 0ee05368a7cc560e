//! Message-oriented service surface and in-process cluster wiring.
//!
//! Requests and responses are hand-written serde records, no IDL compiler
//! involved. Each service is a tagged request enum with one dispatch point;
//! every response carries a [`message::Status`]. [`cluster::LocalCluster`]
//! wires a coordinator, store engines, and a router together in one process
//! for integration tests and the benchmark harness.

pub mod cluster;
pub mod message;
pub mod service;

pub use cluster::{CoordinatorFetcher, LocalCluster, StoreInstance};
pub use message::{
    HelloResponse, MetaRequest, MetaResponse, MetaResponsePayload, Status, StatusCode,
    TxnRequest, TxnResponse,
};
pub use service::{MetaService, StoreService};
