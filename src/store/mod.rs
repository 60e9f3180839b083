//! KeyedStore - process-wide registry of tables, columns and segments
//!
//! Every stored object answers for exactly one [`Key`]. Tables are the usual
//! entry point: binding a table also registers its columns, and each column
//! registers its segments under keys derived from the column key.
//!
//! # Reference counting
//!
//! - A column slot counts the live table bindings that reference it
//! - A slot put explicitly by a caller stays bound until the caller removes it
//! - A slot that is neither explicit nor referenced is dropped, cascading to
//!   the segments of a dropped column
//!
//! Rebinding a key (`put_*` on a bound key) happens under one write lock:
//! the new object's columns are retained before the previous object's are
//! released, so columns shared by both bindings survive the swap.
//!
//! The store is an injected service, not ambient state: tests build their
//! own isolated instance.

pub mod key;
pub mod scope;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use key::Key;
pub use scope::Scope;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::segment::Segment;
use crate::frame::table::Table;

/// An object bound in the store.
#[derive(Debug, Clone)]
pub enum StoredValue {
    Segment(Arc<Segment>),
    Column(Arc<Column>),
    Table(Arc<Table>),
}

impl StoredValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StoredValue::Segment(_) => "segment",
            StoredValue::Column(_) => "column",
            StoredValue::Table(_) => "table",
        }
    }
}

struct Slot {
    value: StoredValue,
    /// Bound by a caller, as opposed to registered on behalf of a table.
    explicit: bool,
    /// Live bindings referencing this slot.
    holders: usize,
}

/// Object counts, used by leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub tables: usize,
    pub columns: usize,
    pub segments: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.tables + self.columns + self.segments
    }
}

pub struct KeyedStore {
    slots: RwLock<HashMap<Key, Slot>>,
}

impl Default for KeyedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedStore {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    // ── Binding ─────────────────────────────────────────────────────

    /// Bind `table` under its own key. Returns the superseded object, if any.
    pub fn put_table(&self, table: impl Into<Arc<Table>>) -> Option<StoredValue> {
        let table = table.into();
        self.put(table.key(), StoredValue::Table(table))
    }

    /// Bind `column` under its own key.
    pub fn put_column(&self, column: impl Into<Arc<Column>>) -> Option<StoredValue> {
        let column = column.into();
        self.put(column.key(), StoredValue::Column(column))
    }

    pub fn put_segment(&self, key: Key, segment: impl Into<Arc<Segment>>) -> Option<StoredValue> {
        self.put(key, StoredValue::Segment(segment.into()))
    }

    /// Atomically (re)bind `key`.
    pub fn put(&self, key: Key, value: StoredValue) -> Option<StoredValue> {
        let mut slots = self.slots.write().unwrap();

        if let StoredValue::Table(table) = &value {
            for column in table.columns() {
                retain_column(&mut slots, column);
            }
        }

        let previous = match slots.get_mut(&key) {
            Some(slot) => {
                let was_explicit = slot.explicit;
                slot.explicit = true;
                let old = std::mem::replace(&mut slot.value, value);
                was_explicit.then_some(old)
            }
            None => {
                slots.insert(
                    key,
                    Slot {
                        value,
                        explicit: true,
                        holders: 0,
                    },
                );
                None
            }
        };

        if let Some(old) = &previous {
            release_references(&mut slots, old);
        }
        previous
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub fn get(&self, key: Key) -> Result<StoredValue> {
        let slots = self.slots.read().unwrap();
        slots
            .get(&key)
            .map(|s| s.value.clone())
            .ok_or(EncodingError::KeyNotFound(key))
    }

    pub fn get_table(&self, key: Key) -> Result<Arc<Table>> {
        match self.get(key)? {
            StoredValue::Table(t) => Ok(t),
            other => Err(wrong_kind(key, "table", &other)),
        }
    }

    pub fn get_column(&self, key: Key) -> Result<Arc<Column>> {
        match self.get(key)? {
            StoredValue::Column(c) => Ok(c),
            other => Err(wrong_kind(key, "column", &other)),
        }
    }

    pub fn get_segment(&self, key: Key) -> Result<Arc<Segment>> {
        match self.get(key)? {
            StoredValue::Segment(s) => Ok(s),
            other => Err(wrong_kind(key, "segment", &other)),
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.slots.read().unwrap().contains_key(&key)
    }

    /// Number of live bindings referencing `key` (0 for unknown keys).
    pub fn holders(&self, key: Key) -> usize {
        self.slots.read().unwrap().get(&key).map_or(0, |s| s.holders)
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let slots = self.slots.read().unwrap();
        let mut stats = StoreStats::default();
        for slot in slots.values() {
            match slot.value {
                StoredValue::Table(_) => stats.tables += 1,
                StoredValue::Column(_) => stats.columns += 1,
                StoredValue::Segment(_) => stats.segments += 1,
            }
        }
        stats
    }

    // ── Removal ─────────────────────────────────────────────────────

    /// Unbind `key`. Removing a table releases its columns, and columns no
    /// longer referenced by any live table are dropped with their segments.
    ///
    /// A key registered only on behalf of live tables cannot be removed
    /// directly. An explicitly bound key that is also referenced by a live
    /// table loses its explicit binding but stays until the table goes.
    pub fn remove(&self, key: Key) -> Result<()> {
        let mut slots = self.slots.write().unwrap();
        let slot = slots.get_mut(&key).ok_or(EncodingError::KeyNotFound(key))?;
        if !slot.explicit {
            return Err(EncodingError::KeyInUse {
                key,
                holders: slot.holders,
            });
        }
        if slot.holders > 0 {
            slot.explicit = false;
            return Ok(());
        }
        if let Some(slot) = slots.remove(&key) {
            release_owned(&mut slots, &slot.value);
        }
        Ok(())
    }

    /// Replace the table bound at `key` with the result of `f` applied to a
    /// copy of it. Concurrent updates of the same key are whole-object
    /// replacements; the last writer wins.
    pub fn update_table<F>(&self, key: Key, f: F) -> Result<Arc<Table>>
    where
        F: FnOnce(&mut Table) -> Result<()>,
    {
        let current = self.get_table(key)?;
        let mut table = (*current).clone();
        f(&mut table)?;
        let table = Arc::new(table.with_key(key));
        self.put_table(Arc::clone(&table));
        Ok(table)
    }
}

// ── Reference bookkeeping (caller holds the write lock) ─────────────

fn retain_column(slots: &mut HashMap<Key, Slot>, column: &Arc<Column>) {
    if let Some(slot) = slots.get_mut(&column.key()) {
        slot.holders += 1;
        return;
    }
    slots.insert(
        column.key(),
        Slot {
            value: StoredValue::Column(Arc::clone(column)),
            explicit: false,
            holders: 1,
        },
    );
    for (i, segment) in column.segments().iter().enumerate() {
        slots
            .entry(column.segment_key(i))
            .and_modify(|s| s.holders += 1)
            .or_insert_with(|| Slot {
                value: StoredValue::Segment(Arc::clone(segment)),
                explicit: false,
                holders: 1,
            });
    }
}

fn release_key(slots: &mut HashMap<Key, Slot>, key: Key) {
    let drop_slot = match slots.get_mut(&key) {
        Some(slot) => {
            slot.holders = slot.holders.saturating_sub(1);
            slot.holders == 0 && !slot.explicit
        }
        None => false,
    };
    if drop_slot {
        if let Some(slot) = slots.remove(&key) {
            release_owned(slots, &slot.value);
        }
    }
}

/// Drop the references `value` holds as a binding.
fn release_references(slots: &mut HashMap<Key, Slot>, value: &StoredValue) {
    if let StoredValue::Table(table) = value {
        for column in table.columns() {
            release_key(slots, column.key());
        }
    }
}

/// Drop everything a removed slot owned: a table's column references, or a
/// column's segment registrations.
fn release_owned(slots: &mut HashMap<Key, Slot>, value: &StoredValue) {
    match value {
        StoredValue::Table(_) => release_references(slots, value),
        StoredValue::Column(column) => {
            for i in 0..column.segment_count() {
                release_key(slots, column.segment_key(i));
            }
        }
        StoredValue::Segment(_) => {}
    }
}

fn wrong_kind(key: Key, expected: &str, found: &StoredValue) -> EncodingError {
    EncodingError::invalid(format!(
        "key {} is bound to a {}, not a {}",
        key,
        found.kind(),
        expected
    ))
}
