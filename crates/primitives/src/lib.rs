//! Transactional collections for Entwined
//!
//! Every type in this crate implements the copy protocol
//! ([`entwined_core::Transactional`]) and can be placed inside a snapshot:
//! - **TransactionalRef**: a single mutable cell
//! - **TransactionalMap**: a hash map with per-key and whole-map conflict tracking
//! - **TransactionalQueue**: a FIFO queue with head/tail conflict tracking
//! - **TransactionalMultimap**: a map from keys to sets of values
//! - **CompositeCollection**: a fixed bundle of heterogeneous entities
//!
//! ## Identity
//!
//! Stored values live behind `Arc`. Conflict detection compares those pointers,
//! not the values: re-storing the `Arc` that was read keeps its identity, while
//! storing an equal but freshly allocated value is a change.
//!
//! ```rust,ignore
//! use entwined_primitives::TransactionalRef;
//! use entwined_core::Transactional;
//!
//! let global = TransactionalRef::new(10);
//! let mut local = global.clean_copy();
//! local.assoc(11);
//! let next_global = local.commit(&global)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod composite;
pub mod map;
pub mod multimap;
pub mod queue;
pub mod reference;

pub use composite::{CompositeBuilder, CompositeCollection, Slot};
pub use map::{Keys, TransactionalMap};
pub use multimap::TransactionalMultimap;
pub use queue::TransactionalQueue;
pub use reference::TransactionalRef;
