//! Conflict Detection Tests
//!
//! Each test commits an interfering transaction from another thread while the
//! transaction under test is between its reads and its commit.

use crate::common::*;
use entwined::Error;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Cells
// ============================================================================

#[test]
fn ref_read_then_concurrent_write_retries() {
    let memory = counter(1);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let value = *scope.data_mut().deref();
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().assoc(10);
                    Ok(true)
                });
            }
            scope.data_mut().assoc(value + 1);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_counter(&memory), 11);
    assert_eq!(memory.metrics().total_conflicts, 1);
}

#[test]
fn untouched_ref_does_not_conflict() {
    let memory = counter(1);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|_| {
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().assoc(10);
                    Ok(true)
                });
            }
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(read_counter(&memory), 10);
}

// ============================================================================
// Maps
// ============================================================================

#[test]
fn map_unrelated_keys_commit_together() {
    let memory = registry(&[("a", 1)]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let a = scope.data_mut().get(&"a".to_string()).map_or(0, |v| *v);
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("b".to_string(), 2);
                    Ok(true)
                });
            }
            scope.data_mut().put("a".to_string(), a + 1);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        read_all(&memory),
        vec![("a".to_string(), 2), ("b".to_string(), 2)]
    );
}

#[test]
fn map_same_key_conflicts() {
    let memory = registry(&[("a", 1)]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let a = scope.data_mut().get(&"a".to_string()).map_or(0, |v| *v);
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("a".to_string(), 100);
                    Ok(true)
                });
            }
            scope.data_mut().put("a".to_string(), a + 1);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_key(&memory, "a"), Some(101));
}

#[test]
fn map_absent_key_read_conflicts_with_insert() {
    let memory = registry(&[]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let missing = !scope.data_mut().contains_key(&"x".to_string());
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("x".to_string(), 1);
                    Ok(true)
                });
            }
            if missing {
                scope.data_mut().put("x".to_string(), 0);
            }
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_key(&memory, "x"), Some(1));
}

#[test]
fn map_size_read_conflicts_with_any_insert() {
    let memory = registry(&[("a", 1)]);
    let attempts = AtomicUsize::new(0);
    let mut sizes = Vec::new();

    memory
        .atomically(|scope| {
            let size = scope.data_mut().len();
            sizes.push(size);
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("unrelated".to_string(), 7);
                    Ok(true)
                });
            }
            scope.data_mut().put("size".to_string(), size as i64);
            Ok(true)
        })
        .unwrap();

    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(read_key(&memory, "size"), Some(2));
}

#[test]
fn map_key_iteration_conflicts_with_any_insert() {
    let memory = registry(&[("a", 1)]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let total: usize = scope.data_mut().keys().count();
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("b".to_string(), 2);
                    Ok(true)
                });
            }
            scope.data_mut().put("keys".to_string(), total as i64);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_key(&memory, "keys"), Some(2));
}

#[test]
fn map_clear_keeps_concurrent_insert() {
    let memory = registry(&[("a", 1), ("b", 2)]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            scope.data_mut().clear();
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("z".to_string(), 26);
                    Ok(true)
                });
            }
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(read_all(&memory), vec![("z".to_string(), 26)]);
}

#[test]
fn map_clear_conflicts_with_concurrent_update_of_cleared_key() {
    let memory = registry(&[("a", 1)]);
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            scope.data_mut().clear();
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().put("a".to_string(), 5);
                    Ok(true)
                });
            }
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(read_all(&memory).is_empty());
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn rollback_is_never_retried() {
    let memory = counter(1);
    let attempts = AtomicUsize::new(0);

    let committed = memory
        .atomically(|scope| {
            let value = *scope.data_mut().deref();
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().assoc(10);
                    Ok(true)
                });
            }
            scope.data_mut().assoc(value + 1);
            Ok(false)
        })
        .unwrap();

    assert!(!committed);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(read_counter(&memory), 10);
}

#[test]
fn body_error_is_never_retried() {
    let memory = counter(1);
    let attempts = AtomicUsize::new(0);

    let err = memory
        .atomically(|scope| {
            attempts.fetch_add(1, Ordering::SeqCst);
            scope.data_mut().assoc(2);
            Err(Error::invocation(
                "loading input",
                io::Error::new(io::ErrorKind::Other, "disk"),
            ))
        })
        .unwrap_err();

    assert!(matches!(err, Error::InvocationFailure { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(read_counter(&memory), 1);
}
