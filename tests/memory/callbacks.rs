//! Committed Callback Tests
//!
//! Callbacks run after the outer commit, children before parents, each with
//! its own clean copy of the committed snapshot.

use crate::common::*;
use entwined::{BaseSnapshot, Error, GlobalValue, Snapshot, TransactionFn, TransactionScope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(
    log: &Log,
    name: &'static str,
) -> impl FnMut(&mut BaseSnapshot<Registry>) -> entwined::Result<()> {
    let log = Arc::clone(log);
    move |_| {
        log.lock().push(name);
        Ok(())
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn callbacks_run_children_first() {
    let memory = registry(&[]);
    let log: Log = Arc::default();
    let nested_log = Arc::clone(&log);

    let mut outer = TransactionFn::new(move |scope: &mut TransactionScope<'_, Registry>| {
        let leaf_log = Arc::clone(&nested_log);
        scope.run_transaction(
            TransactionFn::new(move |inner: &mut TransactionScope<'_, Registry>| {
                inner.run_transaction(
                    TransactionFn::new(|leaf: &mut TransactionScope<'_, Registry>| {
                        leaf.data_mut().put("leaf".to_string(), 1);
                        Ok(true)
                    })
                    .on_commit(recorder(&leaf_log, "leaf")),
                )?;
                Ok(true)
            })
            .on_commit(recorder(&nested_log, "first")),
        )?;
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(false))
                .on_commit(recorder(&nested_log, "rolled back")),
        )?;
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(true))
                .on_commit(recorder(&nested_log, "second")),
        )?;
        Ok(true)
    })
    .on_commit(recorder(&log, "outer"));

    assert!(memory.run_transaction(&mut outer).unwrap());
    assert_eq!(*log.lock(), vec!["leaf", "first", "second", "outer"]);
}

#[test]
fn callbacks_do_not_run_on_rollback() {
    let memory = registry(&[]);
    let log: Log = Arc::default();
    let nested_log = Arc::clone(&log);

    let mut outer = TransactionFn::new(move |scope: &mut TransactionScope<'_, Registry>| {
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(true))
                .on_commit(recorder(&nested_log, "nested")),
        )?;
        Ok(false)
    })
    .on_commit(recorder(&log, "outer"));

    assert!(!memory.run_transaction(&mut outer).unwrap());
    assert!(log.lock().is_empty());
}

// ============================================================================
// Snapshots Seen by Callbacks
// ============================================================================

#[test]
fn callbacks_get_fresh_copies_of_the_commit() {
    let memory = registry(&[]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let outer_seen = Arc::clone(&seen);

    let mut outer = TransactionFn::new(|scope: &mut TransactionScope<'_, Registry>| {
        scope.data_mut().put("x".to_string(), 1);
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(true)).on_commit(
                |snapshot: &mut BaseSnapshot<Registry>| {
                    snapshot.data_mut().put("x".to_string(), 99);
                    Ok(())
                },
            ),
        )
    })
    .on_commit(move |snapshot| {
        let x = snapshot.data_mut().get(&"x".to_string()).map(|v| *v);
        outer_seen.lock().push((snapshot.timestamp(), x));
        Ok(())
    });

    assert!(memory.run_transaction(&mut outer).unwrap());
    assert_eq!(*seen.lock(), vec![(1, Some(1))]);
    assert_eq!(read_key(&memory, "x"), Some(1));
}

#[test]
fn callback_reads_committed_snapshot() {
    let memory = registry(&[]);
    let mut timestamp = None;

    let mut tx = TransactionFn::new(|scope: &mut TransactionScope<'_, Registry>| {
        scope.data_mut().put("a".to_string(), 1);
        Ok(true)
    })
    .on_commit(|snapshot| {
        timestamp = Some(memory.get_committed_snapshot_for_read(snapshot)?.timestamp());
        Ok(())
    });
    memory.run_transaction(&mut tx).unwrap();
    drop(tx);

    assert_eq!(timestamp, Some(1));
}

#[test]
fn callback_reads_its_own_commit_after_newer_publish() {
    let memory = registry(&[]);
    let barrier = Barrier::new(2);
    let mut seen = None;

    thread::scope(|s| {
        s.spawn(|| {
            barrier.wait();
            memory
                .atomically(|scope| {
                    scope.data_mut().put("b".to_string(), 2);
                    Ok(true)
                })
                .unwrap();
        });

        let mut tx = TransactionFn::new(|scope: &mut TransactionScope<'_, Registry>| {
            scope.data_mut().put("a".to_string(), 1);
            Ok(true)
        })
        .on_commit(|snapshot| {
            barrier.wait();
            // The other commit is published but its callbacks wait for ours
            while memory.metrics().total_committed < 2 {
                thread::yield_now();
            }
            let own = memory.get_committed_snapshot_for_read(snapshot)?;
            let has_b = own.data_mut().contains_key(&"b".to_string());
            seen = Some((own.timestamp(), has_b));
            Ok(())
        });
        memory.run_transaction(&mut tx).unwrap();
    });

    assert_eq!(seen, Some((1, false)));
    assert_eq!(read_key(&memory, "b"), Some(2));
}

#[test]
fn body_writes_through_committed_snapshot() {
    let memory = registry(&[]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let memory = scope.memory();
            let snapshot = memory.get_committed_snapshot_for_read(scope)?;
            let seen = snapshot.data_mut().get(&"hits".to_string()).map_or(0, |v| *v);
            if first_attempt(&attempts) {
                interfere(memory, |other| {
                    other.data_mut().put("hits".to_string(), 10);
                    Ok(true)
                });
            }
            let snapshot = memory.get_committed_snapshot_for_read(scope)?;
            snapshot.data_mut().put("hits".to_string(), seen + 1);
            snapshot
                .global_map_mut()
                .put(7, Arc::new(seen) as GlobalValue);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_key(&memory, "hits"), Some(11));
    let mut stored = None;
    memory
        .atomically(|scope| {
            stored = scope
                .snapshot_mut()
                .global_map_mut()
                .get(&7)
                .and_then(|value| GlobalValue::clone(&value).downcast::<i64>().ok())
                .map(|value| *value);
            Ok(true)
        })
        .unwrap();
    assert_eq!(stored, Some(10));
}

// ============================================================================
// Failures and Misuse
// ============================================================================

#[test]
fn transaction_inside_callback_is_misuse() {
    let memory = registry(&[]);
    let mut reentrant = None;

    let mut tx = TransactionFn::new(|scope: &mut TransactionScope<'_, Registry>| {
        scope.data_mut().put("a".to_string(), 1);
        Ok(true)
    })
    .on_commit(|_| {
        reentrant = Some(memory.atomically(|_| Ok(true)));
        Ok(())
    });
    assert!(memory.run_transaction(&mut tx).unwrap());
    drop(tx);

    assert!(matches!(reentrant, Some(Err(Error::EngineMisuse(_)))));
    assert!(memory.atomically(|_| Ok(true)).unwrap());
}

#[test]
fn callback_error_propagates_but_commit_stays() {
    let memory = registry(&[]);
    let log: Log = Arc::default();
    let nested_log = Arc::clone(&log);

    let mut tx = TransactionFn::new(move |scope: &mut TransactionScope<'_, Registry>| {
        scope.data_mut().put("a".to_string(), 1);
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(true))
                .on_commit(|_: &mut BaseSnapshot<Registry>| Err(Error::contract("notify failed"))),
        )?;
        scope.run_transaction(
            TransactionFn::new(|_: &mut TransactionScope<'_, Registry>| Ok(true))
                .on_commit(recorder(&nested_log, "after failure")),
        )
    })
    .on_commit(recorder(&log, "outer"));

    let err = memory.run_transaction(&mut tx).unwrap_err();
    assert!(matches!(err, Error::ContractViolation(_)));
    assert!(log.lock().is_empty());
    assert_eq!(read_key(&memory, "a"), Some(1));
    assert_eq!(memory.metrics().total_committed, 2);
}
