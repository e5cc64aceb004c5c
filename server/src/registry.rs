//! Concurrent key→entity stores for players, games and lobbies.
//!
//! Values are handed out as `Arc<V>`; each entity guards its own mutable fields, so
//! the map lock is only held for the insert/lookup/remove itself and never while a
//! caller works on an entity.

use crate::error::{EntityKind, Result, ServerError};
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

pub struct Registry<K, V> {
    kind: EntityKind,
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
{
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Inserts `value` unless `key` is taken. Returns the stored handle, or `None`
    /// when another entity already owns the key.
    pub fn create_if_absent(&self, key: K, value: V) -> Option<Arc<V>> {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return None;
        }
        let value = Arc::new(value);
        entries.insert(key, Arc::clone(&value));
        Some(value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().get(key).cloned()
    }

    /// Like [`Registry::get`], but a miss is a `NotFound` error naming the key.
    pub fn lookup<Q>(&self, key: &Q) -> Result<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + std::fmt::Display + ?Sized,
    {
        self.get(key)
            .ok_or_else(|| ServerError::not_found(self.kind, key.to_string()))
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key)
    }

    /// Removes `key` only if it still maps to this exact entity, so a stale handle
    /// can never delete a newer entity registered under the same key.
    pub fn remove_if_same<Q>(&self, key: &Q, expected: &Arc<V>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Like [`Registry::remove_if_same`], but also requires `condition` to hold.
    /// The condition is checked under the registry lock.
    pub fn remove_if_same_and<Q>(&self, key: &Q, expected: &Arc<V>, condition: impl FnOnce(&V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, expected) && condition(current) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Visits a snapshot of the entries; `f` may freely call back into the registry.
    pub fn for_each(&self, mut f: impl FnMut(&K, &Arc<V>)) {
        for (key, value) in self.snapshot() {
            f(&key, &value);
        }
    }

    pub fn snapshot(&self) -> Vec<(K, Arc<V>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
