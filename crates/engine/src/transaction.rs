//! Transaction callbacks
//!
//! A transaction has two phases:
//! - `run`: the transactional body, executed against a private copy of the
//!   state and possibly several times when commits conflict. Return
//!   `Ok(true)` to commit, `Ok(false)` to roll back, or an error to abort.
//! - `committed`: executed once after a successful commit, in commit order,
//!   against a fresh clean copy of the newly committed state. This is the
//!   place for side effects (I/O, notifications).
//!
//! [`TransactionFn`] adapts closures to the trait:
//!
//! ```rust,ignore
//! let committed = memory.run_transaction(&mut TransactionFn::new(|scope| {
//!     scope.data_mut().assoc(42);
//!     Ok(true)
//! }).on_commit(|snapshot| {
//!     println!("now {}", snapshot.data_mut().deref());
//!     Ok(())
//! }))?;
//! ```

use crate::scope::TransactionScope;
use crate::snapshot::BaseSnapshot;
use entwined_core::Result;
use std::fmt;
use std::marker::PhantomData;

/// A unit of work run by a `Memory`
pub trait Transaction<V> {
    /// The transactional body
    ///
    /// May run more than once; it must not perform side effects that cannot
    /// be repeated.
    fn run(&mut self, scope: &mut TransactionScope<'_, V>) -> Result<bool>;

    /// Called after the transaction committed
    fn committed(&mut self, snapshot: &mut BaseSnapshot<V>) -> Result<()> {
        let _ = snapshot;
        Ok(())
    }
}

/// Committed callback that does nothing
pub type NoCommit<V> = fn(&mut BaseSnapshot<V>) -> Result<()>;

/// Closure-based [`Transaction`]
pub struct TransactionFn<V, R, C = NoCommit<V>> {
    run: R,
    committed: C,
    _state: PhantomData<fn() -> V>,
}

impl<V, R> TransactionFn<V, R>
where
    R: FnMut(&mut TransactionScope<'_, V>) -> Result<bool>,
{
    /// Wrap a transactional body without committed callback
    pub fn new(run: R) -> Self {
        TransactionFn {
            run,
            committed: |_| Ok(()),
            _state: PhantomData,
        }
    }
}

impl<V, R, C> TransactionFn<V, R, C> {
    /// Attach a committed callback
    pub fn on_commit<C2>(self, committed: C2) -> TransactionFn<V, R, C2>
    where
        C2: FnMut(&mut BaseSnapshot<V>) -> Result<()>,
    {
        TransactionFn {
            run: self.run,
            committed,
            _state: PhantomData,
        }
    }
}

impl<V, R, C> Transaction<V> for TransactionFn<V, R, C>
where
    R: FnMut(&mut TransactionScope<'_, V>) -> Result<bool>,
    C: FnMut(&mut BaseSnapshot<V>) -> Result<()>,
{
    fn run(&mut self, scope: &mut TransactionScope<'_, V>) -> Result<bool> {
        (self.run)(scope)
    }

    fn committed(&mut self, snapshot: &mut BaseSnapshot<V>) -> Result<()> {
        (self.committed)(snapshot)
    }
}

impl<V, R, C> fmt::Debug for TransactionFn<V, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionFn").finish_non_exhaustive()
    }
}
