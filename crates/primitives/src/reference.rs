//! TransactionalRef: a single mutable cell
//!
//! The cell remembers the value it was created with (`source`), which is the
//! "as-of" baseline for conflict detection, next to the current value.
//!
//! ## Conflict Rule
//!
//! A cell that was accessed (read or written) conflicts when the global
//! cell's source is no longer the *same* `Arc` as this cell's source. The
//! check is by identity, not equality: committing an equal but distinct
//! value still invalidates every concurrent reader.

use entwined_core::{Error, Result, Transactional};
use std::fmt;
use std::sync::Arc;

/// Transactional single-value cell
pub struct TransactionalRef<T> {
    /// Value that was a part of the global state when the transaction began
    source: Arc<T>,
    /// The referenced value
    value: Arc<T>,
    /// Whether the value was read or written
    accessed: bool,
    /// Whether the value was written
    updated: bool,
}

impl<T> TransactionalRef<T>
where
    T: Send + Sync + 'static,
{
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Create a cell holding an existing shared value
    pub fn from_arc(value: Arc<T>) -> Self {
        TransactionalRef {
            source: Arc::clone(&value),
            value,
            accessed: false,
            updated: false,
        }
    }

    /// Read the value, marking the cell accessed
    pub fn deref(&mut self) -> Arc<T> {
        self.accessed = true;
        Arc::clone(&self.value)
    }

    /// Replace the value, returning the previous one
    pub fn assoc(&mut self, value: T) -> Arc<T> {
        self.assoc_arc(Arc::new(value))
    }

    /// Replace the value with an existing shared value, returning the previous one
    ///
    /// Storing the very `Arc` the cell started from keeps its identity, so
    /// concurrent readers of the old value are not invalidated by it.
    pub fn assoc_arc(&mut self, value: Arc<T>) -> Arc<T> {
        self.accessed = true;
        self.updated = true;
        std::mem::replace(&mut self.value, value)
    }

    /// Whether the cell was read or written
    pub fn is_accessed(&self) -> bool {
        self.accessed
    }

    /// Whether the cell was written
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Whether two cells share the same source value
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.source, &b.source)
    }
}

impl<T> Default for TransactionalRef<T>
where
    T: Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for TransactionalRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalRef")
            .field("value", &self.value)
            .field("accessed", &self.accessed)
            .field("updated", &self.updated)
            .finish()
    }
}

impl<T> Transactional for TransactionalRef<T>
where
    T: Send + Sync + 'static,
{
    fn clean_copy(&self) -> Self {
        Self::from_arc(Arc::clone(&self.source))
    }

    fn dirty_copy(&self) -> Self {
        TransactionalRef {
            source: Arc::clone(&self.source),
            value: Arc::clone(&self.value),
            accessed: self.accessed,
            updated: self.updated,
        }
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        if !Arc::ptr_eq(&changes.source, &self.source) {
            return Err(Error::contract(
                "Updates are only possible for references with the same source",
            ));
        }
        self.accessed = changes.accessed;
        if !only_read_logs {
            self.updated = changes.updated;
            self.value = changes.value;
        }
        Ok(())
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        if global.accessed {
            return Err(Error::misuse(
                "Global state must be committed before calling this method",
            ));
        }
        if self.accessed && !Arc::ptr_eq(&global.source, &self.source) {
            return Err(Error::conflict("Conflicting update detected"));
        }

        if !self.updated {
            Ok(global.clean_copy())
        } else {
            Ok(Self::from_arc(Arc::clone(&self.value)))
        }
    }
}
