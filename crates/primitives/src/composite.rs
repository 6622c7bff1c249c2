//! CompositeCollection: a fixed set of heterogeneous transactional slots
//!
//! A composite bundles several transactional entities (cells, maps, queues,
//! nested composites) into one. Slots are copied lazily: copying the composite
//! only records *how* each untouched slot must be materialized, and the copy
//! happens on first access. Commit validates and merges only the slots that
//! were accessed, sharing every other slot with the global state.
//!
//! ## Typed Access
//!
//! Slots are registered through [`CompositeBuilder::push`], which returns a
//! [`Slot<T>`] handle carrying the slot's index and entity type. Accessing a
//! slot through a handle is statically typed; the stored entity is checked
//! with `Any` downcasting, so a handle from a different composite yields
//! `ContractViolation` instead of undefined behaviour.
//!
//! ## Materialization
//!
//! | Composite obtained by | Untouched slot on first access |
//! |-----------------------|--------------------------------|
//! | `build()` / `commit`  | taken as-is                    |
//! | `clean_copy()`        | clean copy of the shared slot  |
//! | `dirty_copy()`        | dirty copy of the shared slot  |

use entwined_core::{Error, Result, Transactional};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased view of a transactional entity stored in a slot
trait ErasedSlot: Any + Send + Sync {
    fn clean_copy_erased(&self) -> Box<dyn ErasedSlot>;
    fn dirty_copy_erased(&self) -> Box<dyn ErasedSlot>;
    fn update_erased(&mut self, changes: Arc<dyn ErasedSlot>, only_read_logs: bool) -> Result<()>;
    fn commit_erased(&self, global: &dyn ErasedSlot) -> Result<Box<dyn ErasedSlot>>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Transactional> ErasedSlot for T {
    fn clean_copy_erased(&self) -> Box<dyn ErasedSlot> {
        Box::new(self.clean_copy())
    }

    fn dirty_copy_erased(&self) -> Box<dyn ErasedSlot> {
        Box::new(self.dirty_copy())
    }

    fn update_erased(&mut self, changes: Arc<dyn ErasedSlot>, only_read_logs: bool) -> Result<()> {
        let changes = changes
            .into_any_arc()
            .downcast::<T>()
            .map_err(|_| Error::contract("Slot changes have a different entity type"))?;
        let changes = Arc::try_unwrap(changes).unwrap_or_else(|shared| shared.dirty_copy());
        self.update(changes, only_read_logs)
    }

    fn commit_erased(&self, global: &dyn ErasedSlot) -> Result<Box<dyn ErasedSlot>> {
        let global = global
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| Error::contract("Global slot has a different entity type"))?;
        Ok(Box::new(self.commit(global)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// How untouched slots are materialized on first access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyStrategy {
    Take,
    Clean,
    Dirty,
}

/// Typed handle to a slot of a [`CompositeCollection`]
pub struct Slot<T> {
    index: usize,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Slot<T> {
    /// Position of the slot in its composite
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("index", &self.index).finish()
    }
}

/// Builder registering the slots of a [`CompositeCollection`]
#[derive(Default)]
pub struct CompositeBuilder {
    slots: Vec<Arc<dyn ErasedSlot>>,
}

impl CompositeBuilder {
    /// Register an entity, returning its typed handle
    pub fn push<T: Transactional>(&mut self, entity: T) -> Slot<T> {
        let index = self.slots.len();
        self.slots.push(Arc::new(entity));
        Slot {
            index,
            _entity: PhantomData,
        }
    }

    /// Finish the composite
    ///
    /// # Errors
    ///
    /// `ContractViolation` if no slot was registered.
    pub fn build(self) -> Result<CompositeCollection> {
        if self.slots.is_empty() {
            return Err(Error::contract("At least one slot must be specified"));
        }
        let accessed = vec![false; self.slots.len()];
        Ok(CompositeCollection {
            slots: self.slots,
            accessed,
            strategy: CopyStrategy::Take,
        })
    }
}

/// Transactional collection of heterogeneous slots
///
/// Accessed slots are always uniquely owned by the composite; untouched slots
/// may be shared with other copies.
pub struct CompositeCollection {
    slots: Vec<Arc<dyn ErasedSlot>>,
    accessed: Vec<bool>,
    strategy: CopyStrategy,
}

impl CompositeCollection {
    /// Start building a composite
    pub fn builder() -> CompositeBuilder {
        CompositeBuilder::default()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: a composite has at least one slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the slot at `index` was accessed
    pub fn is_accessed(&self, index: usize) -> bool {
        self.accessed.get(index).copied().unwrap_or(false)
    }

    /// Access a slot through its typed handle
    pub fn get<T: Transactional>(&mut self, slot: Slot<T>) -> Result<&mut T> {
        self.get_at(slot.index)
    }

    /// Access the slot at `index` as an entity of type `T`
    ///
    /// # Errors
    ///
    /// `ContractViolation` if `index` is out of bounds or the slot holds a
    /// different entity type.
    pub fn get_at<T: Transactional>(&mut self, index: usize) -> Result<&mut T> {
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| Error::contract(format!("Index {} is out of bounds", index)))?;
        if !slot.as_any().is::<T>() {
            return Err(Error::contract(format!(
                "Slot {} holds a different entity type",
                index
            )));
        }
        self.materialize(index);
        Arc::get_mut(&mut self.slots[index])
            .and_then(|entity| entity.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| Error::misuse(format!("Slot {} is shared after access", index)))
    }

    /// Whether two composites share every slot
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.slots.len() == b.slots.len()
            && a.slots
                .iter()
                .zip(&b.slots)
                .all(|(x, y)| Arc::ptr_eq(x, y))
    }

    fn materialize(&mut self, index: usize) {
        if self.accessed[index] {
            return;
        }
        let slot = &mut self.slots[index];
        let copy = match self.strategy {
            CopyStrategy::Take if Arc::get_mut(slot).is_some() => None,
            CopyStrategy::Take | CopyStrategy::Dirty => Some(slot.dirty_copy_erased()),
            CopyStrategy::Clean => Some(slot.clean_copy_erased()),
        };
        if let Some(copy) = copy {
            *slot = Arc::from(copy);
        }
        self.accessed[index] = true;
    }

    fn share(&self, strategy: CopyStrategy) -> Self {
        CompositeCollection {
            slots: self.slots.clone(),
            accessed: vec![false; self.slots.len()],
            strategy,
        }
    }
}

impl fmt::Debug for CompositeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeCollection")
            .field("len", &self.slots.len())
            .field("accessed", &self.accessed)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Transactional for CompositeCollection {
    fn clean_copy(&self) -> Self {
        let mut copy = self.share(CopyStrategy::Clean);
        // Accessed slots stay with their owner
        for (index, accessed) in self.accessed.iter().enumerate() {
            if *accessed {
                copy.slots[index] = Arc::from(self.slots[index].clean_copy_erased());
            }
        }
        copy
    }

    fn dirty_copy(&self) -> Self {
        let mut copy = self.share(CopyStrategy::Dirty);
        for (index, accessed) in self.accessed.iter().enumerate() {
            if *accessed {
                copy.slots[index] = Arc::from(self.slots[index].dirty_copy_erased());
                copy.accessed[index] = true;
            }
        }
        copy
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        if changes.slots.len() != self.slots.len() {
            return Err(Error::contract(
                "Updates are only possible for composites with the same layout",
            ));
        }
        for (index, slot) in changes.slots.into_iter().enumerate() {
            if !changes.accessed[index] {
                continue;
            }
            self.materialize(index);
            let target = Arc::get_mut(&mut self.slots[index])
                .ok_or_else(|| Error::misuse(format!("Slot {} is shared after access", index)))?;
            target.update_erased(slot, only_read_logs)?;
        }
        Ok(())
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        if global.slots.len() != self.slots.len() {
            return Err(Error::contract(
                "Commit is only possible for composites with the same layout",
            ));
        }
        if global.accessed.iter().any(|accessed| *accessed) {
            return Err(Error::misuse(
                "Global state composite must be committed before calling this method",
            ));
        }
        if !self.accessed.iter().any(|accessed| *accessed) {
            return Ok(global.share(CopyStrategy::Take));
        }

        let mut result = global.share(CopyStrategy::Take);
        for (index, accessed) in self.accessed.iter().enumerate() {
            if *accessed {
                let committed = self.slots[index].commit_erased(&*global.slots[index])?;
                result.slots[index] = Arc::from(committed);
            }
        }
        Ok(result)
    }
}
