//! Transaction engine for Entwined
//!
//! This crate runs transactions over client data built from the collections
//! in `entwined-primitives`:
//! - Memory: committed state, retry loop, commit order, re-entrancy checks
//! - TransactionScope: snapshot stack and nested transactions of one attempt
//! - Transaction: the run / committed callback pair
//! - BaseSnapshot: timestamped root holding client data and the global map
//! - GlobalRef: typed handles to values in the global map
//! - MemoryConfig / MemoryMetrics: retry tuning and statistics
//!
//! ```rust,ignore
//! use entwined_engine::Memory;
//! use entwined_primitives::TransactionalRef;
//!
//! let memory = Memory::new(TransactionalRef::new(0));
//! memory.atomically(|scope| {
//!     let value = *scope.data_mut().deref();
//!     scope.data_mut().assoc(value + 1);
//!     Ok(true)
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod call_tree;
mod commit_order;
pub mod config;
pub mod global_ref;
pub mod memory;
pub mod metrics;
pub mod scope;
pub mod snapshot;
pub mod transaction;

pub use config::{MemoryConfig, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES};
pub use global_ref::GlobalRef;
pub use memory::Memory;
pub use metrics::MemoryMetrics;
pub use scope::{SnapshotContext, TransactionScope};
pub use snapshot::{BaseSnapshot, GlobalValue};
pub use transaction::{NoCommit, Transaction, TransactionFn};
