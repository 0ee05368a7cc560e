//! Auto-increment sequence collaborator.
//!
//! Sequences are owned by a separate service. Creation is synchronous and
//! must succeed before table creation continues; deletion on drop is
//! fire-and-forget.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::info;

use basalt_common::error::MetaError;
use basalt_common::types::TableId;

pub trait SequenceService: Send + Sync {
    /// Create the sequence for `id` starting at `start`. Fails if one
    /// already exists.
    fn create(&self, id: TableId, start: u64) -> Result<(), MetaError>;

    /// Fire-and-forget deletion of the sequence for `id`.
    fn delete_async(&self, id: TableId);

    /// Draw `count` consecutive values; returns the first of the batch.
    fn generate(&self, id: TableId, count: u64) -> Result<u64, MetaError>;
}

/// In-memory sequence service. The in-process implementation completes
/// `delete_async` immediately; a networked one would dispatch and return.
#[derive(Default)]
pub struct MemSequenceService {
    sequences: DashMap<TableId, u64>,
    fail_next_create: AtomicBool,
}

impl MemSequenceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next `create` call fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn exists(&self, id: TableId) -> bool {
        self.sequences.contains_key(&id)
    }
}

impl SequenceService for MemSequenceService {
    fn create(&self, id: TableId, start: u64) -> Result<(), MetaError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(MetaError::Internal("sequence service unavailable".into()));
        }
        let start = if start == 0 { 1 } else { start };
        match self.sequences.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(MetaError::Internal(format!(
                "sequence for {id} already exists"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(start);
                info!(%id, start, "created auto-increment sequence");
                Ok(())
            }
        }
    }

    fn delete_async(&self, id: TableId) {
        self.sequences.remove(&id);
        info!(%id, "deleted auto-increment sequence");
    }

    fn generate(&self, id: TableId, count: u64) -> Result<u64, MetaError> {
        let mut entry = self
            .sequences
            .get_mut(&id)
            .ok_or_else(|| MetaError::TableNotFound(id.to_string()))?;
        let first = *entry;
        *entry += count;
        Ok(first)
    }
}
