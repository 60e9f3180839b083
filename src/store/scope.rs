//! Key-tracking guard for store cleanup.
//!
//! A `Scope` remembers the keys bound through it and removes them from the
//! store when dropped, newest first. Keys the caller wants to outlive the
//! scope are handed back with [`Scope::keep`].

use std::sync::Arc;

use crate::frame::table::Table;
use crate::store::{Key, KeyedStore};

pub struct Scope<'a> {
    store: &'a KeyedStore,
    keys: Vec<Key>,
}

impl<'a> Scope<'a> {
    pub fn enter(store: &'a KeyedStore) -> Self {
        Self {
            store,
            keys: Vec::new(),
        }
    }

    pub fn store(&self) -> &'a KeyedStore {
        self.store
    }

    /// Remove `key` when the scope ends.
    pub fn track(&mut self, key: Key) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Bind `table` and track its key.
    pub fn put_table(&mut self, table: impl Into<Arc<Table>>) -> Key {
        let table = table.into();
        let key = table.key();
        self.store.put_table(table);
        self.track(key);
        key
    }

    /// Stop tracking `key`; it stays bound after the scope ends.
    pub fn keep(&mut self, key: Key) {
        self.keys.retain(|k| *k != key);
    }

    pub fn tracked(&self) -> &[Key] {
        &self.keys
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        for key in self.keys.drain(..).rev() {
            if let Err(e) = self.store.remove(key) {
                tracing::debug!(%key, error = %e, "scope cleanup skipped key");
            }
        }
    }
}
