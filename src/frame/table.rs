//! Tables: ordered, uniquely-named columns sharing one segment layout.

use std::fmt;
use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::store::Key;

const EMPTY_OFFSETS: &[u64] = &[0];

/// Column addressed by name or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<&String> for ColumnRef {
    fn from(name: &String) -> Self {
        ColumnRef::Name(name.clone())
    }
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&ColumnRef> for ColumnRef {
    fn from(r: &ColumnRef) -> Self {
        r.clone()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => write!(f, "'{}'", name),
            ColumnRef::Index(i) => write!(f, "#{}", i),
        }
    }
}

/// Ordered name -> column mapping. Cloning keeps the key and shares the
/// columns; use [`Table::derive`] or [`Table::deep_copy`] for a new identity.
#[derive(Debug, Clone)]
pub struct Table {
    key: Key,
    names: Vec<String>,
    columns: Vec<Arc<Column>>,
}

impl Table {
    /// Build a table under a fresh key.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Result<Self> {
        Self::from_shared(names, columns.into_iter().map(Arc::new).collect())
    }

    pub(crate) fn from_shared(names: Vec<String>, columns: Vec<Arc<Column>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(EncodingError::invalid(format!(
                "{} names given for {} columns",
                names.len(),
                columns.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(EncodingError::invalid(format!("duplicate column name '{}'", name)));
            }
        }
        if let Some(first) = columns.first() {
            for (name, col) in names.iter().zip(&columns).skip(1) {
                if !col.same_layout(first) {
                    return Err(EncodingError::LayoutMismatch(format!(
                        "column '{}' is not partitioned like column '{}'",
                        name, names[0]
                    )));
                }
            }
        }
        Ok(Self {
            key: Key::make(),
            names,
            columns,
        })
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Same columns under a fresh key.
    pub fn derive(&self) -> Self {
        Self {
            key: Key::make(),
            names: self.names.clone(),
            columns: self.columns.clone(),
        }
    }

    /// Fresh keys for the table and every column. Segment memory is shared
    /// until one side mutates it.
    pub fn deep_copy(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut copy = (**c).clone();
                copy.set_key(Key::make());
                Arc::new(copy)
            })
            .collect();
        Self {
            key: Key::make(),
            names: self.names.clone(),
            columns,
        }
    }

    // -- Shape ----------------------------------------------------------------

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> u64 {
        self.columns.first().map_or(0, |c| c.len())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Shared offset table of every column (`[0]` for a column-less table).
    pub fn offsets(&self) -> &[u64] {
        self.columns.first().map_or(EMPTY_OFFSETS, |c| c.offsets())
    }

    pub fn segment_count(&self) -> usize {
        self.offsets().len() - 1
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Arc<Column>] {
        &mut self.columns
    }

    // -- Lookup ---------------------------------------------------------------

    pub fn index_of(&self, column: impl Into<ColumnRef>) -> Result<usize> {
        match column.into() {
            ColumnRef::Name(name) => self
                .names
                .iter()
                .position(|n| *n == name)
                .ok_or(EncodingError::ColumnNotFound(name)),
            ColumnRef::Index(i) if i < self.columns.len() => Ok(i),
            ColumnRef::Index(i) => Err(EncodingError::ColumnNotFound(format!(
                "index {} (table has {} columns)",
                i,
                self.columns.len()
            ))),
        }
    }

    pub fn column(&self, column: impl Into<ColumnRef>) -> Result<&Arc<Column>> {
        let idx = self.index_of(column)?;
        Ok(&self.columns[idx])
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|s| s.as_str())
    }

    /// Names of the columns at `indices`, in the given order.
    pub fn column_names_by(&self, indices: &[usize]) -> Result<Vec<String>> {
        indices
            .iter()
            .map(|&i| {
                self.name_of(i).map(str::to_string).ok_or_else(|| {
                    EncodingError::ColumnNotFound(format!("index {}", i))
                })
            })
            .collect()
    }

    // -- Column edits ---------------------------------------------------------

    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        self.add_shared(name.into(), Arc::new(column))
    }

    pub(crate) fn add_shared(&mut self, name: String, column: Arc<Column>) -> Result<()> {
        if self.names.contains(&name) {
            return Err(EncodingError::invalid(format!("duplicate column name '{}'", name)));
        }
        if !self.columns.is_empty() && column.offsets() != self.offsets() {
            return Err(EncodingError::LayoutMismatch(format!(
                "column '{}' is not partitioned like table {}",
                name, self.key
            )));
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Swap in a replacement column; returns the previous one.
    pub fn replace_column(
        &mut self,
        target: impl Into<ColumnRef>,
        column: Column,
    ) -> Result<Arc<Column>> {
        let idx = self.index_of(target)?;
        if column.offsets() != self.columns[idx].offsets() {
            return Err(EncodingError::LayoutMismatch(format!(
                "replacement for '{}' is partitioned differently",
                self.names[idx]
            )));
        }
        Ok(std::mem::replace(&mut self.columns[idx], Arc::new(column)))
    }

    pub fn remove_column(&mut self, target: impl Into<ColumnRef>) -> Result<Arc<Column>> {
        let idx = self.index_of(target)?;
        self.names.remove(idx);
        Ok(self.columns.remove(idx))
    }

    pub fn rename_column(&mut self, target: impl Into<ColumnRef>, name: impl Into<String>) -> Result<()> {
        let idx = self.index_of(target)?;
        let name = name.into();
        if self.names.iter().enumerate().any(|(i, n)| i != idx && *n == name) {
            return Err(EncodingError::invalid(format!("duplicate column name '{}'", name)));
        }
        self.names[idx] = name;
        Ok(())
    }
}
