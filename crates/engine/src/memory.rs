//! Memory: the transaction engine
//!
//! A `Memory` owns the committed state of the client data and runs
//! transactions against it with snapshot isolation.
//!
//! ## Transaction Lifecycle
//!
//! 1. BEGIN: take a clean copy of the committed snapshot
//! 2. RUN: execute the body against the copy through a [`TransactionScope`]
//!    (`Ok(false)` rolls back, an error aborts; neither is retried)
//! 3. COMMIT: under the commit lock, validate the copy against the current
//!    committed snapshot and publish the result; on conflict go back to 1,
//!    up to `max_retries` times
//! 4. CALLBACKS: wait for this commit's turn in the commit order, then run the
//!    committed callbacks of the call tree in postorder, each against its own
//!    fresh clean copy of the published snapshot
//!
//! ## Concurrency
//!
//! The commit lock is the only mutual exclusion point and is held only while
//! computing and publishing the next snapshot. Transaction bodies and retries
//! run without blocking. Callbacks are not run under a lock: they are ordered
//! by the FIFO commit order, so the callbacks of commit N complete before
//! those of commit N+1 begin.
//!
//! ## Re-entrancy
//!
//! The memory tracks, per thread, whether a transaction body or committed
//! callbacks are running. Starting an outer transaction from either is an
//! `EngineMisuse` error; nested transactions go through
//! [`TransactionScope::run_transaction`].

use crate::call_tree::CallTree;
use crate::commit_order::CommitOrder;
use crate::config::MemoryConfig;
use crate::metrics::{MemoryMetrics, MetricsRecorder};
use crate::scope::{CallbackNode, SnapshotContext, TransactionScope};
use crate::snapshot::BaseSnapshot;
use crate::transaction::{Transaction, TransactionFn};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use entwined_core::{Error, Result, Snapshot, Transactional};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

/// What a thread is doing inside a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Running the body of an outer transaction
    Running,
    /// Running committed callbacks of the commit with this timestamp
    Committing(u64),
}

/// Transactional memory over client data `V`
pub struct Memory<V> {
    /// Latest published snapshot
    committed: RwLock<Arc<BaseSnapshot<V>>>,
    /// Serializes compute-and-publish
    commit_lock: Mutex<()>,
    /// Order in which committed callbacks run
    commit_order: CommitOrder,
    /// Threads currently inside a transaction of this memory
    phases: DashMap<ThreadId, Phase>,
    /// Source of global-value ids
    id_sequence: AtomicU64,
    config: MemoryConfig,
    metrics: MetricsRecorder,
}

impl<V: Transactional> Memory<V> {
    /// Create a memory with the default configuration
    ///
    /// The committed state starts as a clean copy of `initial`, at timestamp 0.
    pub fn new(initial: V) -> Self {
        Self::with_config(initial, MemoryConfig::default())
    }

    /// Create a memory with a custom configuration
    pub fn with_config(initial: V, config: MemoryConfig) -> Self {
        Memory {
            committed: RwLock::new(Arc::new(BaseSnapshot::new(0, initial.clean_copy()))),
            commit_lock: Mutex::new(()),
            commit_order: CommitOrder::new(),
            phases: DashMap::new(),
            id_sequence: AtomicU64::new(0),
            config,
            metrics: MetricsRecorder::default(),
        }
    }

    /// Run an outer transaction
    ///
    /// Returns `Ok(true)` once the transaction committed and its callbacks ran,
    /// `Ok(false)` if its body rolled back.
    ///
    /// # Errors
    ///
    /// - `EngineMisuse` when called from a transaction body or a committed
    ///   callback running on this thread
    /// - `Conflict` when every allowed attempt conflicted
    /// - any error returned by the body (the attempt is not retried)
    /// - any error returned by a committed callback; the commit stays published
    pub fn run_transaction<T>(&self, transaction: &mut T) -> Result<bool>
    where
        T: Transaction<V> + ?Sized,
    {
        let phase = self.enter()?;
        self.metrics.record_start();

        let mut attempt = 0usize;
        loop {
            debug!(target: "entwined::txn", attempt, "Transaction started");
            let working = self.committed_snapshot().clean_copy();
            let mut scope = TransactionScope::new(self, working);

            match transaction.run(&mut scope) {
                Ok(true) => {}
                Ok(false) => {
                    self.metrics.record_rollback();
                    debug!(target: "entwined::txn", attempt, "Transaction rolled back");
                    return Ok(false);
                }
                Err(e) => {
                    self.metrics.record_failure();
                    debug!(target: "entwined::txn", attempt, error = %e, "Transaction failed");
                    return Err(e);
                }
            }

            let (working, tree) = scope.into_parts();
            match self.publish(&working) {
                Ok(published) => {
                    self.metrics.record_commit();
                    let outcome = self.run_callbacks(transaction, tree, &published, &phase);
                    self.metrics.record_callbacks_done();
                    return outcome.map(|()| true);
                }
                Err(e) if e.is_conflict() => {
                    self.metrics.record_conflict();
                    if attempt >= self.config.max_retries {
                        self.metrics.record_failure();
                        warn!(
                            target: "entwined::txn",
                            attempts = attempt + 1,
                            "Transaction exhausted its retries"
                        );
                        return Err(e);
                    }
                    let delay = self.config.calculate_delay(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    self.metrics.record_failure();
                    return Err(e);
                }
            }
        }
    }

    /// Run an outer transaction from a closure, without committed callback
    pub fn atomically<R>(&self, run: R) -> Result<bool>
    where
        R: FnMut(&mut TransactionScope<'_, V>) -> Result<bool>,
    {
        self.run_transaction(&mut TransactionFn::new(run))
    }

    /// The snapshot the calling thread is working on
    ///
    /// In a transaction body, `context` is its [`TransactionScope`] and the
    /// result is the snapshot of the innermost running transaction: reads
    /// through it are logged and writes to its global map commit with it. In
    /// a committed callback, `context` is the snapshot the callback received,
    /// a copy of the commit being reported even when later commits have
    /// already been published.
    ///
    /// # Errors
    ///
    /// - `NoActiveTransaction` unless the calling thread is running a
    ///   transaction or committed callbacks of this memory
    /// - `ContractViolation` if `context` belongs to another memory, or if a
    ///   callback passes a snapshot of a different commit
    pub fn get_committed_snapshot_for_read<'c, C>(
        &self,
        context: &'c mut C,
    ) -> Result<&'c mut BaseSnapshot<V>>
    where
        C: SnapshotContext<V> + ?Sized,
    {
        let phase = self
            .phases
            .get(&thread::current().id())
            .map(|entry| *entry.value());
        let Some(phase) = phase else {
            return Err(Error::no_transaction(
                "There is no running transaction, cannot access the committed snapshot",
            ));
        };
        if !context.belongs_to(self) {
            return Err(Error::contract(
                "Transaction scope belongs to a different memory",
            ));
        }
        if let Phase::Committing(timestamp) = phase {
            if context.top_snapshot().timestamp() != timestamp {
                return Err(Error::contract(
                    "Snapshot is not a copy of the commit being reported",
                ));
            }
        }
        Ok(context.top_snapshot_mut())
    }

    /// Allocate an id for a global value
    pub fn get_next_id(&self) -> u64 {
        self.id_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Current transaction statistics
    pub fn metrics(&self) -> MemoryMetrics {
        self.metrics.snapshot()
    }

    /// The configuration of this memory
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn committed_snapshot(&self) -> Arc<BaseSnapshot<V>> {
        Arc::clone(&self.committed.read())
    }

    /// Validate `working` against the committed snapshot and publish the result
    fn publish(&self, working: &BaseSnapshot<V>) -> Result<Arc<BaseSnapshot<V>>> {
        let _guard = self.commit_lock.lock();
        let current = self.committed_snapshot();
        let next = Arc::new(working.commit(&current)?);
        *self.committed.write() = Arc::clone(&next);
        self.commit_order.enqueue(next.timestamp());
        debug!(target: "entwined::commit", timestamp = next.timestamp(), "Snapshot published");
        Ok(next)
    }

    fn run_callbacks<T>(
        &self,
        transaction: &mut T,
        mut tree: CallTree<CallbackNode<V>>,
        published: &BaseSnapshot<V>,
        phase: &PhaseGuard<'_>,
    ) -> Result<()>
    where
        T: Transaction<V> + ?Sized,
    {
        let _turn = self.commit_order.wait_turn(published.timestamp());
        phase.set(Phase::Committing(published.timestamp()));
        trace!(target: "entwined::commit", timestamp = published.timestamp(), "Running committed callbacks");

        let root = tree.root();
        for id in tree.postorder() {
            let mut snapshot = published.clean_copy();
            if id == root {
                transaction.committed(&mut snapshot)?;
            } else if let Some(nested) = tree.value_mut(id) {
                nested.committed(&mut snapshot)?;
            }
        }
        Ok(())
    }

    fn enter(&self) -> Result<PhaseGuard<'_>> {
        let thread = thread::current().id();
        match self.phases.entry(thread) {
            Entry::Occupied(entry) => match *entry.get() {
                Phase::Committing(_) => Err(Error::misuse(
                    "Cannot run transaction within committed block",
                )),
                Phase::Running => Err(Error::misuse(
                    "A transaction is already running on this thread, \
                     use TransactionScope::run_transaction for nested transactions",
                )),
            },
            Entry::Vacant(entry) => {
                entry.insert(Phase::Running);
                Ok(PhaseGuard {
                    phases: &self.phases,
                    thread,
                })
            }
        }
    }
}

impl<V> fmt::Debug for Memory<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Registration of the current thread in `Memory::phases`, removed on drop
struct PhaseGuard<'a> {
    phases: &'a DashMap<ThreadId, Phase>,
    thread: ThreadId,
}

impl PhaseGuard<'_> {
    fn set(&self, phase: Phase) {
        self.phases.insert(self.thread, phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phases.remove(&self.thread);
    }
}
