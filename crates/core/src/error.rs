//! Error types for Entwined
//!
//! This module defines the single error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation Policy
//!
//! - `Conflict` is the only retryable error, and it is retried only at the
//!   outer-transaction boundary, bounded by the configured retry limit.
//! - Every other variant aborts the in-flight attempt immediately and reaches
//!   the caller of `run_transaction` unchanged.

use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for Entwined operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed client failure carried by [`Error::InvocationFailure`]
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Error types for the transactional memory
#[derive(Debug, Error)]
pub enum Error {
    /// Observed accesses are stale relative to the committed state
    ///
    /// Raised by an entity's `commit` when another transaction published a
    /// change to something this transaction read.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transactional data accessed outside of a running transaction
    #[error("No active transaction: {0}")]
    NoActiveTransaction(String),

    /// The engine was driven in a way it does not support
    ///
    /// For example starting a transaction from within a post-commit callback,
    /// or committing into a global state that has already been touched.
    #[error("Engine misuse: {0}")]
    EngineMisuse(String),

    /// A failure raised by client transactional code
    #[error("{context}: {source}")]
    InvocationFailure {
        /// Where the failure was raised
        context: String,
        /// The client failure
        #[source]
        source: BoxedError,
    },

    /// Invalid argument or mismatched entity passed to an operation
    #[error("Contract violation: {0}")]
    ContractViolation(String),
}

impl Error {
    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    /// Create a no-active-transaction error
    pub fn no_transaction(message: impl Into<String>) -> Self {
        Error::NoActiveTransaction(message.into())
    }

    /// Create an engine misuse error
    pub fn misuse(message: impl Into<String>) -> Self {
        Error::EngineMisuse(message.into())
    }

    /// Create a contract violation error
    pub fn contract(message: impl Into<String>) -> Self {
        Error::ContractViolation(message.into())
    }

    /// Wrap a client failure
    ///
    /// An `Error` that is already an `InvocationFailure` is unwrapped one
    /// level first, so re-raising through nested transactions never stacks
    /// wrappers. Any other Entwined error is returned as it is.
    pub fn invocation<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxedError>,
    {
        let source: BoxedError = source.into();
        match source.downcast::<Error>() {
            Ok(inner) => match *inner {
                Error::InvocationFailure { source, .. } => Error::InvocationFailure {
                    context: context.into(),
                    source,
                },
                other => other,
            },
            Err(source) => Error::InvocationFailure {
                context: context.into(),
                source,
            },
        }
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if the failed attempt may be retried
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// Take the client failure out of an `InvocationFailure`
    ///
    /// Returns `Err(self)` for every other variant.
    pub fn into_source(self) -> std::result::Result<BoxedError, Error> {
        match self {
            Error::InvocationFailure { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

impl From<BoxedError> for Error {
    fn from(source: BoxedError) -> Self {
        Error::invocation("Exception in the transactional code", source)
    }
}
