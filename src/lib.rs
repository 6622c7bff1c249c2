//! Entwined - in-process software transactional memory
//!
//! Entwined runs transactions over client data built from transactional
//! collections. Transactions see a private copy of the committed state,
//! validate what they read at commit time and are retried automatically when
//! another commit got in the way.
//!
//! # Quick Start
//!
//! ```ignore
//! use entwined::{Memory, TransactionalMap};
//!
//! let memory = Memory::new(TransactionalMap::<String, u64>::new());
//!
//! memory.atomically(|scope| {
//!     let hits = scope.data_mut().get(&"hits".to_string()).map_or(0, |v| *v);
//!     scope.data_mut().put("hits".to_string(), hits + 1);
//!     Ok(true)
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `entwined-core`: error taxonomy and the copy protocol traits
//! - `entwined-primitives`: ref, map, multimap, queue and composite collections
//! - `entwined-engine`: memory, scopes, nested transactions, committed callbacks
//!
//! This crate re-exports the public API of all three.

pub use entwined_core::{BoxedError, Error, Result, Snapshot, Transactional};
pub use entwined_engine::{
    BaseSnapshot, GlobalRef, GlobalValue, Memory, MemoryConfig, MemoryMetrics, NoCommit,
    SnapshotContext, Transaction, TransactionFn, TransactionScope, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES,
};
pub use entwined_primitives::{
    CompositeBuilder, CompositeCollection, Keys, Slot, TransactionalMap, TransactionalMultimap,
    TransactionalQueue, TransactionalRef,
};
