//! TransactionalMultimap: a map from keys to sets of values
//!
//! A thin layer over [`TransactionalMap<K, HashSet<V>>`](TransactionalMap).
//! Every change replaces the whole set stored under a key, so conflict
//! detection works per key exactly as it does for the map. Storing an empty
//! set removes the key; reading an absent key yields an empty set.

use crate::map::{Keys, TransactionalMap};
use entwined_core::{Result, Transactional};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

/// Transactional multimap
#[derive(Debug)]
pub struct TransactionalMultimap<K, V> {
    inner: TransactionalMap<K, HashSet<V>>,
}

impl<K, V> TransactionalMultimap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create an empty multimap
    pub fn new() -> Self {
        TransactionalMultimap {
            inner: TransactionalMap::new(),
        }
    }

    /// Values stored under `key`, empty when absent
    pub fn get(&mut self, key: &K) -> Arc<HashSet<V>> {
        self.inner.get(key).unwrap_or_default()
    }

    /// Add a value under `key`, returning the previous set
    pub fn put(&mut self, key: K, value: V) -> Arc<HashSet<V>> {
        self.put_all(key, std::iter::once(value))
    }

    /// Add every value under `key`, returning the previous set
    pub fn put_all<I>(&mut self, key: K, values: I) -> Arc<HashSet<V>>
    where
        I: IntoIterator<Item = V>,
    {
        let mut set = HashSet::clone(&self.get(&key));
        set.extend(values);
        self.replace(key, set)
    }

    /// Remove a single value from the set under `key`, returning the previous set
    pub fn remove_value(&mut self, key: &K, value: &V) -> Arc<HashSet<V>> {
        let previous = self.get(key);
        if previous.contains(value) {
            let mut set = HashSet::clone(&previous);
            set.remove(value);
            self.replace(key.clone(), set);
        }
        previous
    }

    /// Remove every value stored under `key`
    pub fn remove(&mut self, key: &K) -> Arc<HashSet<V>> {
        self.inner.remove(key).unwrap_or_default()
    }

    /// Whether any value is stored under `key`
    pub fn contains_key(&mut self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Number of keys, marking the multimap globally accessed
    pub fn len(&mut self) -> usize {
        self.inner.len()
    }

    /// Whether the multimap has no keys
    pub fn is_empty(&mut self) -> bool {
        self.inner.is_empty()
    }

    /// Remove every key
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate over the keys
    pub fn keys(&mut self) -> Keys<'_, K, HashSet<V>> {
        self.inner.keys()
    }

    /// Whether two multimaps share the same source
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        TransactionalMap::ptr_eq(&a.inner, &b.inner)
    }

    fn replace(&mut self, key: K, set: HashSet<V>) -> Arc<HashSet<V>> {
        let previous = if set.is_empty() {
            self.inner.remove(&key)
        } else {
            self.inner.put(key, set)
        };
        previous.unwrap_or_default()
    }
}

impl<K, V> Default for TransactionalMultimap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Transactional for TransactionalMultimap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn clean_copy(&self) -> Self {
        TransactionalMultimap {
            inner: self.inner.clean_copy(),
        }
    }

    fn dirty_copy(&self) -> Self {
        TransactionalMultimap {
            inner: self.inner.dirty_copy(),
        }
    }

    fn update(&mut self, changes: Self, only_read_logs: bool) -> Result<()> {
        self.inner.update(changes.inner, only_read_logs)
    }

    fn commit(&self, global: &Self) -> Result<Self> {
        Ok(TransactionalMultimap {
            inner: self.inner.commit(&global.inner)?,
        })
    }
}
