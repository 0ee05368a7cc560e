//! Raw key-value engine seam and the percolator-style MVCC transaction
//! helper that runs on top of it.
//!
//! The engine exposes three logical column families:
//!
//! - **data** — key = `encode(user_key, start_ts)`, value = raw bytes
//! - **lock** — key = `user_key`, value = [`mvcc::LockInfo`]
//! - **write** — key = `encode(user_key, commit_ts)`, value = [`mvcc::WriteInfo`]
//!
//! Keys in the data and write families are memcomparable-encoded with an
//! inverted big-endian timestamp suffix, so a forward seek at
//! `encode(key, T)` yields that key's commits newest-first with
//! `commit_ts <= T`. Everything in [`txn`] depends on that ordering.

pub mod codec;
pub mod coprocessor;
pub mod mvcc;
pub mod raw;
pub mod txn;


pub use coprocessor::Coprocessor;
pub use mvcc::{LockInfo, LockType, Mutation, TxnResultInfo, WriteInfo, WriteOp};
pub use raw::{MemEngine, RawEngine, RawIterator, WriteBatch, CF_DATA, CF_LOCK, CF_WRITE};
