//! Core traits for the copy protocol
//!
//! Every transactional entity (cells, maps, queues, composites, snapshots)
//! implements [`Transactional`]. The engine only ever talks to client state
//! through these four operations.
//!
//! ## Copies
//!
//! - A **clean** copy carries the source (baseline) data only, with zero logs.
//! - A **dirty** copy shares the source data by reference and carries the
//!   access logs and pending writes, so logs recorded on the copy can be merged
//!   back into the original with [`Transactional::update`].
//!
//! ## Lifecycle
//!
//! 1. BEGIN: the engine takes a clean copy of the committed state
//! 2. BODY: client code mutates the copy, nested transactions branch dirty copies
//! 3. MERGE: nested results are folded back with `update`
//! 4. COMMIT: `commit(global)` validates and produces the next committed state

use std::cmp::Ordering;

use crate::error::Result;

/// The copy protocol every transactional entity satisfies
///
/// Source data is held behind shared pointers, so an entity returned "unchanged"
/// from [`Transactional::commit`] shares its source with the global state it was
/// committed into. Implementations expose a `ptr_eq` associated function to
/// observe that identity.
pub trait Transactional: Sized + Send + Sync + 'static {
    /// Create a new entity from this one, discarding all local changes and logs
    fn clean_copy(&self) -> Self;

    /// Branch this entity for a nested transaction
    ///
    /// The copy shares source data by reference and carries the current access
    /// logs and pending writes.
    fn dirty_copy(&self) -> Self;

    /// Merge the logs of a dirty copy back into this entity
    ///
    /// With `only_read_logs` set, only read-access logs are merged; this is how a
    /// discarded nested transaction still contributes its reads to conflict
    /// detection. Otherwise reads and writes are both merged.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation` if `changes` was not branched from this entity.
    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()>;

    /// Validate local accesses against `global` and produce the next committed state
    ///
    /// If nothing was accessed, the result shares all of its state with `global`.
    ///
    /// # Errors
    ///
    /// - `EngineMisuse` if `global` carries logs of its own
    /// - `Conflict` if something this entity observed has changed in `global`
    fn commit(&self, global: &Self) -> Result<Self>;
}

/// A timestamped root of transactional state
///
/// The timestamp increases only at commit. Comparison is by timestamp only and
/// never substitutes for structural equality; use [`Transactional::commit`] to
/// compare states.
pub trait Snapshot: Transactional {
    /// Commit counter of this snapshot
    fn timestamp(&self) -> u64;

    /// Order two snapshots by timestamp
    fn cmp_timestamp(&self, other: &Self) -> Ordering {
        self.timestamp().cmp(&other.timestamp())
    }
}
