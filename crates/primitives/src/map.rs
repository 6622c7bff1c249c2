//! TransactionalMap: copy-on-write associative collection
//!
//! The map keeps an immutable `source` baseline shared by every copy, plus
//! per-transaction pending modifications, pending deletions and an access log.
//!
//! ## Access Logging
//!
//! - `get`, `contains_key`, `put`, `remove` log the key as accessed.
//! - `len`, an "empty" answer from `is_empty` and exhausting `keys()` mark the
//!   map **globally accessed**: knowing how many keys exist means knowing which
//!   keys do not exist, which any concurrent insertion invalidates.
//! - `clear` logs every existing key individually and sets `cleared`, but does
//!   not mark global access, so a cleared map still commits against a global
//!   state that gained unrelated keys.
//!
//! ## Conflict Rule
//!
//! Values are compared by `Arc` identity. Under global access any difference
//! between the two source maps conflicts; otherwise each accessed key must map
//! to the same `Arc` (or be absent) in both sources.

use entwined_core::{Error, Result, Transactional};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Transactional hash map
pub struct TransactionalMap<K, V> {
    /// The unmodifiable backbone, shared by all copies
    source: Arc<HashMap<K, Arc<V>>>,
    /// Locally added or modified entries
    pending_modifications: HashMap<K, Arc<V>>,
    /// Keys of source entries locally removed
    pending_deletions: HashSet<K>,
    /// Keys read or written, including keys that were absent
    accessed: HashSet<K>,
    /// Whether the whole keyspace was observed
    globally_accessed: bool,
    /// Set the first time `clear` is called
    cleared: bool,
}

impl<K, V> TransactionalMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self::with_source(Arc::new(HashMap::new()))
    }

    /// Create a map initialized with the given entries
    pub fn from_map(entries: HashMap<K, V>) -> Self {
        entries.into_iter().collect()
    }

    fn with_source(source: Arc<HashMap<K, Arc<V>>>) -> Self {
        TransactionalMap {
            source,
            pending_modifications: HashMap::new(),
            pending_deletions: HashSet::new(),
            accessed: HashSet::new(),
            globally_accessed: false,
            cleared: false,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Number of entries, marking the map globally accessed
    pub fn len(&mut self) -> usize {
        self.mark_globally_accessed();
        let added = self
            .pending_modifications
            .keys()
            .filter(|k| !self.source.contains_key(*k))
            .count();
        self.source.len() + added - self.pending_deletions.len()
    }

    /// Whether the map is empty
    ///
    /// Only an "empty" answer marks the map globally accessed; a non-empty
    /// answer merely proves that some key exists.
    pub fn is_empty(&mut self) -> bool {
        let empty = self.source.len() == self.pending_deletions.len()
            && self.pending_modifications.is_empty();
        if empty {
            self.mark_globally_accessed();
        }
        empty
    }

    /// Whether the key is present, logging it as accessed
    pub fn contains_key(&mut self, key: &K) -> bool {
        self.mark_accessed(key);
        (self.source.contains_key(key) || self.pending_modifications.contains_key(key))
            && !self.pending_deletions.contains(key)
    }

    /// Read the value of a key, logging it as accessed
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        self.mark_accessed(key);
        self.lookup(key)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace an entry, returning the previous value
    pub fn put(&mut self, key: K, value: V) -> Option<Arc<V>> {
        self.put_arc(key, Arc::new(value))
    }

    /// Insert or replace an entry with an existing shared value
    ///
    /// Storing the `Arc` already present keeps its identity for conflict checks.
    pub fn put_arc(&mut self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let previous = self.lookup(&key);
        self.mark_accessed(&key);
        self.pending_deletions.remove(&key);
        self.pending_modifications.insert(key, value);
        previous
    }

    /// Insert every entry of the iterator
    pub fn put_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Remove an entry, returning its value
    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        let previous = self.get(key);
        if self.source.contains_key(key) {
            self.pending_deletions.insert(key.clone());
        }
        self.pending_modifications.remove(key);
        previous
    }

    /// Remove every entry
    ///
    /// Every existing key is logged as accessed, but the map is not marked
    /// globally accessed.
    pub fn clear(&mut self) {
        self.mark_cleared();
        self.pending_deletions.extend(self.source.keys().cloned());
        self.pending_modifications.clear();
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Iterate over the keys
    ///
    /// Yields source keys followed by locally added keys, minus deletions.
    /// Exhausting the iterator marks the map globally accessed.
    pub fn keys(&mut self) -> Keys<'_, K, V> {
        let mut keys: Vec<K> = self
            .source
            .keys()
            .filter(|k| !self.pending_modifications.contains_key(*k))
            .cloned()
            .collect();
        keys.extend(self.pending_modifications.keys().cloned());
        keys.retain(|k| !self.pending_deletions.contains(k));
        Keys {
            map: self,
            keys: keys.into_iter(),
        }
    }

    /// Collect all keys, marking the map globally accessed
    pub fn key_vec(&mut self) -> Vec<K> {
        self.keys().collect()
    }

    /// Whether the map was globally accessed
    pub fn is_globally_accessed(&self) -> bool {
        self.globally_accessed
    }

    /// Whether two maps share the same source
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.source, &b.source)
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn lookup(&self, key: &K) -> Option<Arc<V>> {
        if self.pending_deletions.contains(key) {
            None
        } else if let Some(value) = self.pending_modifications.get(key) {
            Some(Arc::clone(value))
        } else {
            self.source.get(key).cloned()
        }
    }

    fn mark_accessed(&mut self, key: &K) {
        if !self.globally_accessed {
            self.accessed.insert(key.clone());
        }
    }

    fn mark_globally_accessed(&mut self) {
        // Global access is allowed after the map has been cleared
        if !self.cleared {
            self.globally_accessed = true;
            self.accessed.clear();
        }
    }

    fn mark_cleared(&mut self) {
        if !self.globally_accessed {
            self.cleared = true;
            self.accessed.extend(self.source.keys().cloned());
        }
    }

    fn has_logs(&self) -> bool {
        !self.pending_deletions.is_empty()
            || !self.pending_modifications.is_empty()
            || !self.accessed.is_empty()
            || self.globally_accessed
    }

    fn same_entry(&self, global: &HashMap<K, Arc<V>>, key: &K) -> bool {
        match (self.source.get(key), global.get(key)) {
            (Some(ours), Some(theirs)) => Arc::ptr_eq(ours, theirs),
            (None, None) => true,
            _ => false,
        }
    }

    fn same_source(&self, global: &Arc<HashMap<K, Arc<V>>>) -> bool {
        Arc::ptr_eq(&self.source, global)
            || (self.source.len() == global.len()
                && self.source.keys().all(|k| self.same_entry(global, k)))
    }
}

impl<K, V> Default for TransactionalMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for TransactionalMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let source = iter.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        Self::with_source(Arc::new(source))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for TransactionalMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalMap")
            .field("source_len", &self.source.len())
            .field("pending_modifications", &self.pending_modifications)
            .field("pending_deletions", &self.pending_deletions)
            .field("accessed", &self.accessed)
            .field("globally_accessed", &self.globally_accessed)
            .field("cleared", &self.cleared)
            .finish()
    }
}

impl<K, V> Transactional for TransactionalMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn clean_copy(&self) -> Self {
        Self::with_source(Arc::clone(&self.source))
    }

    fn dirty_copy(&self) -> Self {
        TransactionalMap {
            source: Arc::clone(&self.source),
            pending_modifications: self.pending_modifications.clone(),
            pending_deletions: self.pending_deletions.clone(),
            accessed: self.accessed.clone(),
            globally_accessed: self.globally_accessed,
            cleared: self.cleared,
        }
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        if !Arc::ptr_eq(&self.source, &changes.source) {
            return Err(Error::contract(
                "Updates are only possible for collections with the same source",
            ));
        }
        if changes.globally_accessed {
            self.mark_globally_accessed();
        }
        if !self.globally_accessed {
            self.accessed.extend(changes.accessed);
        }
        if !only_read_logs {
            self.cleared = self.cleared || changes.cleared;
            self.pending_modifications = changes.pending_modifications;
            self.pending_deletions = changes.pending_deletions;
        }
        Ok(())
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        if global.has_logs() {
            return Err(Error::misuse(
                "Global state map must be committed before calling this method",
            ));
        }

        if self.globally_accessed && !self.same_source(&global.source) {
            return Err(Error::conflict(
                "All the items of this map have been accessed, \
                 this prohibits commit in the case of concurrent changes",
            ));
        }
        if self
            .accessed
            .iter()
            .any(|key| !self.same_entry(&global.source, key))
        {
            return Err(Error::conflict("Conflicting changes for an accessed key"));
        }

        if self.pending_deletions.is_empty() && self.pending_modifications.is_empty() {
            return Ok(global.clean_copy());
        }

        let mut merged = HashMap::clone(&global.source);
        for (key, value) in &self.pending_modifications {
            merged.insert(key.clone(), Arc::clone(value));
        }
        for key in &self.pending_deletions {
            merged.remove(key);
        }
        Ok(Self::with_source(Arc::new(merged)))
    }
}

/// Iterator over the keys of a [`TransactionalMap`]
///
/// Marks the map globally accessed once it reports exhaustion.
pub struct Keys<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    map: &'a mut TransactionalMap<K, V>,
    keys: std::vec::IntoIter<K>,
}

impl<K, V> Iterator for Keys<'_, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let next = self.keys.next();
        if next.is_none() {
            self.map.mark_globally_accessed();
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}
