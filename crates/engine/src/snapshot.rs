//! BaseSnapshot: the root of the transactional state owned by a `Memory`
//!
//! A base snapshot pairs the client's transactional data with an internal map
//! of process-wide values keyed by sequential ids (see `GlobalRef`). Every copy
//! protocol operation delegates to both members; only `commit` advances the
//! timestamp.

use entwined_core::{Error, Result, Snapshot, Transactional};
use entwined_primitives::TransactionalMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Value stored in the global map of a snapshot
pub type GlobalValue = Arc<dyn Any + Send + Sync>;

/// Timestamped client data plus the global-value map
pub struct BaseSnapshot<V> {
    timestamp: u64,
    data: V,
    global_map: TransactionalMap<u64, GlobalValue>,
}

impl<V: Transactional> BaseSnapshot<V> {
    /// Create a snapshot with an empty global map
    pub fn new(timestamp: u64, data: V) -> Self {
        Self::with_global_map(timestamp, data, TransactionalMap::new())
    }

    /// Create a snapshot with an existing global map
    pub fn with_global_map(
        timestamp: u64,
        data: V,
        global_map: TransactionalMap<u64, GlobalValue>,
    ) -> Self {
        BaseSnapshot {
            timestamp,
            data,
            global_map,
        }
    }

    /// The client data
    pub fn data(&self) -> &V {
        &self.data
    }

    /// The client data, mutably
    pub fn data_mut(&mut self) -> &mut V {
        &mut self.data
    }

    /// The map of global values
    pub fn global_map(&self) -> &TransactionalMap<u64, GlobalValue> {
        &self.global_map
    }

    /// The map of global values, mutably
    pub fn global_map_mut(&mut self) -> &mut TransactionalMap<u64, GlobalValue> {
        &mut self.global_map
    }
}

impl<V: fmt::Debug> fmt::Debug for BaseSnapshot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSnapshot")
            .field("timestamp", &self.timestamp)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl<V: Transactional> Transactional for BaseSnapshot<V> {
    fn clean_copy(&self) -> Self {
        Self::with_global_map(
            self.timestamp,
            self.data.clean_copy(),
            self.global_map.clean_copy(),
        )
    }

    fn dirty_copy(&self) -> Self {
        Self::with_global_map(
            self.timestamp,
            self.data.dirty_copy(),
            self.global_map.dirty_copy(),
        )
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        if self.timestamp != changes.timestamp {
            return Err(Error::contract(
                "Updates are only possible from dirty copies of this snapshot",
            ));
        }
        self.data.update(changes.data, only_read_logs)?;
        self.global_map.update(changes.global_map, only_read_logs)
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        Ok(Self::with_global_map(
            global.timestamp + 1,
            self.data.commit(&global.data)?,
            self.global_map.commit(&global.global_map)?,
        ))
    }
}

impl<V: Transactional> Snapshot for BaseSnapshot<V> {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
