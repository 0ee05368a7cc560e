//! Monotonic id and epoch counters.
//!
//! Every id the coordinator hands out and every map epoch it bumps is drawn
//! through [`IdEpochMap::get_next_id`], which records the post-bump value in
//! the pending [`MetaIncrement`]. Replaying the log applies each recorded
//! value with a monotonic max, so counters reach the same value after a
//! restart or leader change and never decrease.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use basalt_common::types::RESERVED_ID_MAX;

use crate::increment::{IdEpochIncrement, MetaIncrement};

/// The counter families. Table and index ids share `IdNextTable` so that
/// both id spaces stay globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdEpochKind {
    IdNextSchema,
    IdNextTable,
    IdNextRegion,
    EpochSchema,
    EpochTable,
    EpochIndex,
    EpochRegion,
    EpochStore,
}

const ID_KINDS: [IdEpochKind; 3] = [
    IdEpochKind::IdNextSchema,
    IdEpochKind::IdNextTable,
    IdEpochKind::IdNextRegion,
];

const EPOCH_KINDS: [IdEpochKind; 5] = [
    IdEpochKind::EpochSchema,
    IdEpochKind::EpochTable,
    IdEpochKind::EpochIndex,
    IdEpochKind::EpochRegion,
    IdEpochKind::EpochStore,
];

#[derive(Debug)]
pub struct IdEpochMap {
    counters: DashMap<IdEpochKind, u64>,
}

impl Default for IdEpochMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdEpochMap {
    /// Id counters start at the reserved-range ceiling, so the first
    /// allocated id is `RESERVED_ID_MAX + 1`. Epochs start at zero.
    pub fn new() -> Self {
        let counters = DashMap::new();
        for kind in ID_KINDS {
            counters.insert(kind, RESERVED_ID_MAX);
        }
        for kind in EPOCH_KINDS {
            counters.insert(kind, 0);
        }
        Self { counters }
    }

    /// Bump `kind` and record the new value in `increment`.
    pub fn get_next_id(&self, kind: IdEpochKind, increment: &mut MetaIncrement) -> u64 {
        let mut entry = self.counters.entry(kind).or_insert(0);
        *entry += 1;
        let value = *entry;
        drop(entry);
        increment.id_epochs.push(IdEpochIncrement { kind, value });
        value
    }

    /// Current value without bumping.
    pub fn get_present_id(&self, kind: IdEpochKind) -> u64 {
        self.counters.get(&kind).map(|v| *v).unwrap_or(0)
    }

    /// Log-apply path: counters only ever move forward.
    pub fn apply(&self, kind: IdEpochKind, value: u64) {
        let mut entry = self.counters.entry(kind).or_insert(0);
        if value > *entry {
            *entry = value;
        }
    }

    pub fn export(&self) -> Vec<(IdEpochKind, u64)> {
        self.counters.iter().map(|e| (*e.key(), *e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_allocated_id_is_above_reserved_range() {
        let map = IdEpochMap::new();
        let mut inc = MetaIncrement::default();
        assert_eq!(map.get_next_id(IdEpochKind::IdNextSchema, &mut inc), 100);
        assert_eq!(map.get_next_id(IdEpochKind::IdNextSchema, &mut inc), 101);
        assert_eq!(inc.id_epochs.len(), 2);
    }

    #[test]
    fn apply_never_decreases() {
        let map = IdEpochMap::new();
        map.apply(IdEpochKind::EpochTable, 7);
        map.apply(IdEpochKind::EpochTable, 3);
        assert_eq!(map.get_present_id(IdEpochKind::EpochTable), 7);
    }

    #[test]
    fn replaying_recorded_bumps_reaches_the_same_value() {
        let map = IdEpochMap::new();
        let mut inc = MetaIncrement::default();
        for _ in 0..5 {
            map.get_next_id(IdEpochKind::IdNextRegion, &mut inc);
        }

        let replica = IdEpochMap::new();
        for bump in &inc.id_epochs {
            replica.apply(bump.kind, bump.value);
        }
        assert_eq!(
            replica.get_present_id(IdEpochKind::IdNextRegion),
            map.get_present_id(IdEpochKind::IdNextRegion),
        );
    }
}
