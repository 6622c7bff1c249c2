//! TransactionScope: the explicit context of a running transaction
//!
//! A scope is created by `Memory` for every attempt of an outer transaction
//! and handed to the transaction body. It owns:
//! - the snapshot stack: the outer working snapshot, plus one dirty copy per
//!   nested transaction currently running
//! - the call tree recording which nested transactions committed, so their
//!   callbacks can run after the outer commit
//!
//! All state access goes through the top of the stack, so code running in a
//! nested transaction sees its parent's uncommitted changes while its own
//! changes stay private until it returns `Ok(true)`.

use crate::call_tree::{CallTree, NodeId};
use crate::memory::Memory;
use crate::snapshot::BaseSnapshot;
use crate::transaction::{Transaction, TransactionFn};
use entwined_core::{Result, Transactional};
use tracing::trace;

/// Call tree value: `None` for the outer transaction and for nested
/// transactions still running
pub(crate) type CallbackNode<V> = Option<Box<dyn Transaction<V>>>;

/// Context of a running transaction
pub struct TransactionScope<'m, V> {
    memory: &'m Memory<V>,
    base: BaseSnapshot<V>,
    nested: Vec<BaseSnapshot<V>>,
    tree: CallTree<CallbackNode<V>>,
    current: NodeId,
}

impl<'m, V: Transactional> TransactionScope<'m, V> {
    pub(crate) fn new(memory: &'m Memory<V>, base: BaseSnapshot<V>) -> Self {
        let tree = CallTree::new(None);
        let current = tree.root();
        TransactionScope {
            memory,
            base,
            nested: Vec::new(),
            tree,
            current,
        }
    }

    /// The memory running this transaction
    pub fn memory(&self) -> &'m Memory<V> {
        self.memory
    }

    /// Client data of the innermost running transaction
    pub fn data(&self) -> &V {
        self.snapshot().data()
    }

    /// Client data of the innermost running transaction, mutably
    pub fn data_mut(&mut self) -> &mut V {
        self.snapshot_mut().data_mut()
    }

    /// Snapshot of the innermost running transaction
    pub fn snapshot(&self) -> &BaseSnapshot<V> {
        self.nested.last().unwrap_or(&self.base)
    }

    /// Snapshot of the innermost running transaction, mutably
    pub fn snapshot_mut(&mut self) -> &mut BaseSnapshot<V> {
        match self.nested.last_mut() {
            Some(snapshot) => snapshot,
            None => &mut self.base,
        }
    }

    /// Nesting depth, 0 for the outer transaction
    pub fn depth(&self) -> usize {
        self.nested.len()
    }

    /// Run a nested transaction
    ///
    /// The nested body runs against a dirty copy of the current snapshot.
    /// - `Ok(true)`: its changes and read logs are merged into the parent and
    ///   its committed callback will run after the outer commit, before the
    ///   parent's own callback.
    /// - `Ok(false)` or an error: its changes are discarded and its callback
    ///   never runs, but its read logs are still merged, so what it observed
    ///   still counts when the outer transaction commits.
    pub fn run_transaction<T>(&mut self, mut nested: T) -> Result<bool>
    where
        T: Transaction<V> + 'static,
    {
        let parent = self.current;
        let branch = self.snapshot().dirty_copy();
        self.current = self.tree.add_child(parent, None);
        self.nested.push(branch);
        trace!(target: "entwined::txn", depth = self.depth(), "Nested transaction started");

        let outcome = nested.run(self);

        let node = self.current;
        debug_assert_eq!(self.tree.parent(node), Some(parent));
        self.current = parent;
        let branch = self.pop_nested()?;
        match outcome {
            Ok(true) => {
                self.snapshot_mut().update(branch, false)?;
                *self.tree.value_mut(node) = Some(Box::new(nested));
                trace!(target: "entwined::txn", depth = self.depth(), "Nested transaction merged");
                Ok(true)
            }
            Ok(false) => {
                self.discard(parent, branch)?;
                trace!(target: "entwined::txn", depth = self.depth(), "Nested transaction rolled back");
                Ok(false)
            }
            Err(e) => {
                self.discard(parent, branch)?;
                trace!(target: "entwined::txn", depth = self.depth(), error = %e, "Nested transaction failed");
                Err(e)
            }
        }
    }

    /// Run a nested transaction from a closure, without committed callback
    pub fn atomically<R>(&mut self, run: R) -> Result<bool>
    where
        R: FnMut(&mut TransactionScope<'_, V>) -> Result<bool> + 'static,
    {
        self.run_transaction(TransactionFn::new(run))
    }

    pub(crate) fn into_parts(self) -> (BaseSnapshot<V>, CallTree<CallbackNode<V>>) {
        (self.base, self.tree)
    }

    fn pop_nested(&mut self) -> Result<BaseSnapshot<V>> {
        self.nested
            .pop()
            .ok_or_else(|| entwined_core::Error::misuse("Nested snapshot stack is empty"))
    }

    fn discard(&mut self, parent: NodeId, branch: BaseSnapshot<V>) -> Result<()> {
        self.tree.remove_last_child(parent);
        self.snapshot_mut().update(branch, true)
    }
}

/// Something holding the innermost snapshot of the calling thread
///
/// Implemented by [`TransactionScope`] for transaction bodies and by
/// [`BaseSnapshot`] for the copy handed to a committed callback.
/// [`Memory::get_committed_snapshot_for_read`] resolves a context to that
/// snapshot.
pub trait SnapshotContext<V> {
    /// Whether this context was opened by `memory`
    fn belongs_to(&self, memory: &Memory<V>) -> bool;

    /// The innermost snapshot
    fn top_snapshot(&self) -> &BaseSnapshot<V>;

    /// The innermost snapshot, mutably
    fn top_snapshot_mut(&mut self) -> &mut BaseSnapshot<V>;
}

impl<V: Transactional> SnapshotContext<V> for TransactionScope<'_, V> {
    fn belongs_to(&self, memory: &Memory<V>) -> bool {
        std::ptr::eq(self.memory, memory)
    }

    fn top_snapshot(&self) -> &BaseSnapshot<V> {
        self.snapshot()
    }

    fn top_snapshot_mut(&mut self) -> &mut BaseSnapshot<V> {
        self.snapshot_mut()
    }
}

impl<V> SnapshotContext<V> for BaseSnapshot<V> {
    fn belongs_to(&self, _memory: &Memory<V>) -> bool {
        true
    }

    fn top_snapshot(&self) -> &BaseSnapshot<V> {
        self
    }

    fn top_snapshot_mut(&mut self) -> &mut BaseSnapshot<V> {
        self
    }
}

impl<V> std::fmt::Debug for TransactionScope<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("depth", &self.nested.len())
            .finish_non_exhaustive()
    }
}
