// openraft's StorageError is large by design — allow it.
#![allow(clippy::result_large_err)]

//! Replicated-log storage for the coordinator's meta log.
//!
//! Implements openraft 0.9 `RaftLogStorage`, `RaftLogReader`,
//! `RaftStateMachine`, and `RaftSnapshotBuilder` over in-memory state. The
//! state machine holds an `ApplyFn` invoked for every committed
//! [`types::MetaRequest::Write`] entry; the coordinator registers a callback
//! that decodes the payload as a `MetaIncrement` and applies it to its maps.
//! Consensus transport is out of scope: only the storage seam lives here.

pub mod store;
pub mod types;

pub use store::{ApplyFn, LogStore, StateMachine};
pub use types::{MetaRaft, MetaRequest, MetaResponse, TypeConfig};
