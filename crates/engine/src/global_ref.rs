//! GlobalRef: a process-wide value hosted in a memory's global map
//!
//! Global references give code outside the client data a transactional cell
//! of its own. Each reference owns one id from [`Memory::get_next_id`] and
//! stores its value in the global map of the memory's snapshots, so reads and
//! writes take part in conflict detection like any other access. Every access
//! resolves its snapshot through [`Memory::get_committed_snapshot_for_read`].
//!
//! ## Lifetime
//!
//! The entry is removed deterministically: either explicitly with
//! [`GlobalRef::release`] / [`GlobalRef::release_in`], or on drop. Removal on
//! drop runs its own small transaction and is best-effort: when it cannot run
//! (for example when dropped inside a transaction body on the same thread) the
//! failure is logged and the entry stays in the map.

use crate::memory::Memory;
use crate::scope::{SnapshotContext, TransactionScope};
use crate::snapshot::GlobalValue;
use entwined_core::{Error, Result, Transactional};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Typed handle to a value in the global map of a [`Memory`]
pub struct GlobalRef<T, V: Transactional> {
    memory: Arc<Memory<V>>,
    id: u64,
    released: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T, V> GlobalRef<T, V>
where
    T: Any + Send + Sync,
    V: Transactional,
{
    /// Register `value` in a transaction of its own
    ///
    /// # Errors
    ///
    /// Fails like [`Memory::run_transaction`], in particular with
    /// `EngineMisuse` when called from a transaction body; use
    /// [`GlobalRef::create_in`] there.
    pub fn create(memory: &Arc<Memory<V>>, value: T) -> Result<Self> {
        let id = memory.get_next_id();
        let value: GlobalValue = Arc::new(value);
        memory.atomically(|scope| {
            memory
                .get_committed_snapshot_for_read(scope)?
                .global_map_mut()
                .put(id, Arc::clone(&value));
            Ok(true)
        })?;
        Ok(Self::attached(memory, id))
    }

    /// Register `value` inside a running transaction
    ///
    /// The value becomes visible to other transactions when `scope` commits.
    ///
    /// # Errors
    ///
    /// - `NoActiveTransaction` if `memory` is not running a transaction on
    ///   this thread
    /// - `ContractViolation` if `scope` belongs to a different memory
    pub fn create_in(
        memory: &Arc<Memory<V>>,
        scope: &mut TransactionScope<'_, V>,
        value: T,
    ) -> Result<Self> {
        let snapshot = memory.get_committed_snapshot_for_read(scope)?;
        let id = memory.get_next_id();
        snapshot
            .global_map_mut()
            .put(id, Arc::new(value) as GlobalValue);
        Ok(Self::attached(memory, id))
    }

    fn attached(memory: &Arc<Memory<V>>, id: u64) -> Self {
        GlobalRef {
            memory: Arc::clone(memory),
            id,
            released: false,
            _value: PhantomData,
        }
    }

    /// Id of the entry in the global map
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read the value as seen by the calling thread
    ///
    /// `context` is the scope of a transaction body or the snapshot of a
    /// committed callback. `None` when the entry is not visible there (for
    /// example when it was created by a transaction that has not committed
    /// yet).
    ///
    /// # Errors
    ///
    /// Fails like [`Memory::get_committed_snapshot_for_read`], or with
    /// `ContractViolation` when the entry holds another type.
    pub fn get<C>(&self, context: &mut C) -> Result<Option<Arc<T>>>
    where
        C: SnapshotContext<V> + ?Sized,
    {
        let stored = self
            .memory
            .get_committed_snapshot_for_read(context)?
            .global_map_mut()
            .get(&self.id);
        stored.map(|value| downcast(&value)).transpose()
    }

    /// Replace the value as seen by the calling thread, returning the previous one
    pub fn set<C>(&self, context: &mut C, value: T) -> Result<Option<Arc<T>>>
    where
        C: SnapshotContext<V> + ?Sized,
    {
        let previous = self
            .memory
            .get_committed_snapshot_for_read(context)?
            .global_map_mut()
            .put(self.id, Arc::new(value) as GlobalValue);
        previous.map(|value| downcast(&value)).transpose()
    }

    /// Remove the entry in a transaction of its own
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.remove_entry()
    }

    /// Remove the entry inside a running transaction
    ///
    /// On error the handle is dropped and removal falls back to its own
    /// transaction.
    pub fn release_in(mut self, scope: &mut TransactionScope<'_, V>) -> Result<()> {
        self.memory
            .get_committed_snapshot_for_read(scope)?
            .global_map_mut()
            .remove(&self.id);
        self.released = true;
        Ok(())
    }
}

impl<T, V: Transactional> GlobalRef<T, V> {
    fn remove_entry(&self) -> Result<()> {
        let id = self.id;
        let memory = &self.memory;
        memory
            .atomically(|scope| {
                memory
                    .get_committed_snapshot_for_read(scope)?
                    .global_map_mut()
                    .remove(&id);
                Ok(true)
            })
            .map(|_| ())
    }
}

fn downcast<T: Any + Send + Sync>(stored: &GlobalValue) -> Result<Arc<T>> {
    Arc::clone(stored)
        .downcast::<T>()
        .map_err(|_| Error::contract("Global value holds a different type"))
}

impl<T, V: Transactional> Drop for GlobalRef<T, V> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.remove_entry() {
            warn!(target: "entwined::txn", id = self.id, error = %e, "Failed to release global value");
        }
    }
}

impl<T, V: Transactional> fmt::Debug for GlobalRef<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalRef")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
