//! Global Reference Tests
//!
//! Global references live in the snapshot's global map and take part in
//! conflict detection like client data.

use crate::common::*;
use entwined::{GlobalRef, TransactionFn, TransactionScope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn global_ref_conflicts_like_client_data() {
    let memory = Arc::new(registry(&[]));
    let global = GlobalRef::create(&memory, 1u64).unwrap();
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let seen = global.get(scope)?.map_or(0, |v| *v);
            if first_attempt(&attempts) {
                interfere(&*memory, |other| {
                    global.set(other, 10)?;
                    Ok(true)
                });
            }
            global.set(scope, seen + 1)?;
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let mut value = None;
    memory
        .atomically(|scope| {
            value = global.get(scope)?;
            Ok(true)
        })
        .unwrap();
    assert_eq!(value.as_deref(), Some(&11));
}

#[test]
fn global_ref_is_readable_from_callbacks() {
    let memory = Arc::new(registry(&[]));
    let global = GlobalRef::create(&memory, String::from("draft")).unwrap();
    let mut published = None;

    let mut tx = TransactionFn::new(|scope: &mut TransactionScope<'_, Registry>| {
        global.set(scope, String::from("final"))?;
        Ok(true)
    })
    .on_commit(|snapshot| {
        published = global.get(snapshot)?;
        Ok(())
    });
    memory.run_transaction(&mut tx).unwrap();
    drop(tx);

    assert_eq!(published.as_deref().map(String::as_str), Some("final"));
}

#[test]
fn global_ref_created_in_rolled_back_transaction_disappears() {
    let memory = Arc::new(registry(&[]));
    let mut id = None;

    let handle = Arc::clone(&memory);
    memory
        .atomically(|scope| {
            let global = GlobalRef::create_in(&handle, scope, 5u8)?;
            id = Some(global.id());
            global.release_in(scope)?;
            Ok(false)
        })
        .unwrap();

    let id = id.unwrap();
    let mut present = true;
    memory
        .atomically(|scope| {
            present = scope.snapshot_mut().global_map_mut().contains_key(&id);
            Ok(true)
        })
        .unwrap();
    assert!(!present);
}

#[test]
fn dropped_global_ref_releases_its_entry() {
    let memory = Arc::new(registry(&[]));
    let global = GlobalRef::create(&memory, 3i32).unwrap();
    let id = global.id();
    drop(global);

    let mut remaining = None;
    memory
        .atomically(|scope| {
            remaining = Some(scope.snapshot_mut().global_map_mut().len());
            Ok(true)
        })
        .unwrap();
    assert_eq!(remaining, Some(0));
    assert!(memory.get_next_id() > id);
}
