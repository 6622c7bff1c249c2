//! Core types and traits for Entwined
//!
//! This crate defines the foundational pieces used throughout the system:
//! - Error: the error taxonomy (`Conflict`, `EngineMisuse`, ...)
//! - Transactional: the clean copy / dirty copy / update / commit protocol
//! - Snapshot: timestamped roots of transactional state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;

pub use error::{BoxedError, Error, Result};
pub use traits::{Snapshot, Transactional};
