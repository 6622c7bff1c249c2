//! Memory Integration Tests
//!
//! Tests for the transaction engine: conflict detection, retries, nested
//! transactions, committed callbacks and global references.

#[path = "../common/mod.rs"]
mod common;

mod callbacks;
mod conflicts;
mod global_refs;
