//! Composite Tests
//!
//! Slots of a composite are tracked independently: touching one slot never
//! conflicts with a concurrent commit to another.

use crate::common::*;
use entwined::{CompositeCollection, Error, Memory, Slot, TransactionalQueue, TransactionalRef};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Layout {
    status: Slot<TransactionalRef<String>>,
    inbox: Slot<TransactionalQueue<u32>>,
    visits: Slot<Registry>,
}

fn mailbox() -> (Memory<CompositeCollection>, Layout) {
    init_tracing();
    let mut builder = CompositeCollection::builder();
    let layout = Layout {
        status: builder.push(TransactionalRef::new("idle".to_string())),
        inbox: builder.push(TransactionalQueue::new()),
        visits: builder.push(Registry::new()),
    };
    (Memory::new(builder.build().unwrap()), layout)
}

#[test]
fn disjoint_slots_commit_concurrently() {
    let (memory, layout) = mailbox();
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let status = scope.data_mut().get(layout.status)?;
            let current = status.deref();
            status.assoc(format!("{}-busy", current));
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().get(layout.inbox)?.offer(7);
                    Ok(true)
                });
            }
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let mut seen = None;
    memory
        .atomically(|scope| {
            let composite = scope.data_mut();
            let status = composite.get(layout.status)?.deref();
            let head = composite.get(layout.inbox)?.peek().copied();
            seen = Some((status.to_string(), head));
            Ok(true)
        })
        .unwrap();
    assert_eq!(seen, Some(("idle-busy".to_string(), Some(7))));
}

#[test]
fn same_slot_conflicts() {
    let (memory, layout) = mailbox();
    let attempts = AtomicUsize::new(0);

    memory
        .atomically(|scope| {
            let visits = scope.data_mut().get(layout.visits)?;
            let count = visits.get(&"home".to_string()).map_or(0, |v| *v);
            if first_attempt(&attempts) {
                interfere(&memory, |other| {
                    other.data_mut().get(layout.visits)?.put("home".to_string(), 10);
                    Ok(true)
                });
            }
            scope
                .data_mut()
                .get(layout.visits)?
                .put("home".to_string(), count + 1);
            Ok(true)
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn nested_transactions_over_composite() {
    let (memory, layout) = mailbox();
    let inbox = layout.inbox;

    memory
        .atomically(move |scope| {
            scope.data_mut().get(inbox)?.offer(1);
            scope.atomically(move |inner| {
                inner.data_mut().get(inbox)?.offer(2);
                Ok(false)
            })?;
            scope.atomically(move |inner| {
                inner.data_mut().get(inbox)?.offer(3);
                Ok(true)
            })?;
            Ok(true)
        })
        .unwrap();

    let mut items = Vec::new();
    memory
        .atomically(|scope| {
            scope.data_mut().get(inbox)?.drain_to(&mut items);
            Ok(false)
        })
        .unwrap();
    assert_eq!(items, vec![1, 3]);
}

#[test]
fn wrong_slot_type_is_contract_violation() {
    let (memory, layout) = mailbox();
    let mut outcome = None;

    memory
        .atomically(|scope| {
            outcome = Some(
                scope
                    .data_mut()
                    .get_at::<TransactionalQueue<u32>>(layout.status.index())
                    .map(|_| ()),
            );
            Ok(true)
        })
        .unwrap();

    assert!(matches!(outcome, Some(Err(Error::ContractViolation(_)))));
}
