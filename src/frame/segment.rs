//! Column segments: contiguous runs of one column's values plus an NA bitmap.
//!
//! A segment is the unit of parallel work. Values are stored in one of three
//! closed representations (numeric, categorical code, string); the NA bitmap
//! has one bit per row, set when the row is missing.

use std::fmt;

use bitvec::prelude::*;

use crate::error::{EncodingError, Result};

// ── Column Type ────────────────────────────────────────────────────

/// Type tag shared by a column and all of its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Numeric,
    Categorical,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Text => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Segment ────────────────────────────────────────────────────────

/// Raw value storage. Slots for NA rows hold a placeholder (0 / empty).
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentValues {
    Numeric(Vec<f64>),
    Categorical(Vec<u32>),
    Text(Vec<String>),
}

impl SegmentValues {
    fn empty(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Numeric => SegmentValues::Numeric(Vec::with_capacity(capacity)),
            ColumnType::Categorical => SegmentValues::Categorical(Vec::with_capacity(capacity)),
            ColumnType::Text => SegmentValues::Text(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            SegmentValues::Numeric(_) => ColumnType::Numeric,
            SegmentValues::Categorical(_) => ColumnType::Categorical,
            SegmentValues::Text(_) => ColumnType::Text,
        }
    }

    fn len(&self) -> usize {
        match self {
            SegmentValues::Numeric(v) => v.len(),
            SegmentValues::Categorical(v) => v.len(),
            SegmentValues::Text(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    values: SegmentValues,
    na: BitVec<u8, Lsb0>,
}

impl Segment {
    pub fn new(values: SegmentValues, na: BitVec<u8, Lsb0>) -> Result<Self> {
        if values.len() != na.len() {
            return Err(EncodingError::invalid(format!(
                "segment has {} values but an NA bitmap of {} bits",
                values.len(),
                na.len()
            )));
        }
        Ok(Self { values, na })
    }

    pub fn column_type(&self) -> ColumnType {
        self.values.column_type()
    }

    pub fn values(&self) -> &SegmentValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.na.len()
    }

    pub fn is_empty(&self) -> bool {
        self.na.is_empty()
    }

    pub fn is_na(&self, i: usize) -> bool {
        self.na[i]
    }

    pub fn na_count(&self) -> usize {
        self.na.count_ones()
    }

    /// Numeric view of row `i`: the value for numeric segments, the code for
    /// categorical ones, NaN for missing rows and strings.
    pub fn num(&self, i: usize) -> f64 {
        if self.na[i] {
            return f64::NAN;
        }
        match &self.values {
            SegmentValues::Numeric(v) => v[i],
            SegmentValues::Categorical(v) => v[i] as f64,
            SegmentValues::Text(_) => f64::NAN,
        }
    }

    pub fn code(&self, i: usize) -> Option<u32> {
        match &self.values {
            SegmentValues::Categorical(v) if !self.na[i] => Some(v[i]),
            _ => None,
        }
    }

    pub fn text(&self, i: usize) -> Option<&str> {
        match &self.values {
            SegmentValues::Text(v) if !self.na[i] => Some(v[i].as_str()),
            _ => None,
        }
    }

    /// Overwrite a numeric row. NaN marks the row missing.
    pub fn set_num(&mut self, i: usize, value: f64) -> Result<()> {
        match &mut self.values {
            SegmentValues::Numeric(v) => {
                if value.is_nan() {
                    v[i] = 0.0;
                    self.na.set(i, true);
                } else {
                    v[i] = value;
                    self.na.set(i, false);
                }
                Ok(())
            }
            other => Err(EncodingError::invalid(format!(
                "cannot store a number in a {} segment",
                other.column_type()
            ))),
        }
    }

    pub fn set_code(&mut self, i: usize, code: u32) -> Result<()> {
        match &mut self.values {
            SegmentValues::Categorical(v) => {
                v[i] = code;
                self.na.set(i, false);
                Ok(())
            }
            other => Err(EncodingError::invalid(format!(
                "cannot store a category code in a {} segment",
                other.column_type()
            ))),
        }
    }

    pub fn set_na(&mut self, i: usize) {
        self.na.set(i, true);
    }
}

// ── Segment Builder ────────────────────────────────────────────────

/// Append-only builder for a fresh output segment.
#[derive(Debug)]
pub struct SegmentBuilder {
    values: SegmentValues,
    na: BitVec<u8, Lsb0>,
}

impl SegmentBuilder {
    pub fn new(column_type: ColumnType) -> Self {
        Self::with_capacity(column_type, 0)
    }

    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        Self {
            values: SegmentValues::empty(column_type, capacity),
            na: BitVec::with_capacity(capacity),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.values.column_type()
    }

    pub fn len(&self) -> usize {
        self.na.len()
    }

    pub fn is_empty(&self) -> bool {
        self.na.is_empty()
    }

    /// Append a number. NaN is appended as missing.
    pub fn push_num(&mut self, value: f64) -> Result<()> {
        match &mut self.values {
            SegmentValues::Numeric(v) => {
                let missing = value.is_nan();
                v.push(if missing { 0.0 } else { value });
                self.na.push(missing);
                Ok(())
            }
            other => Err(EncodingError::invalid(format!(
                "cannot append a number to a {} segment",
                other.column_type()
            ))),
        }
    }

    pub fn push_code(&mut self, code: u32) -> Result<()> {
        match &mut self.values {
            SegmentValues::Categorical(v) => {
                v.push(code);
                self.na.push(false);
                Ok(())
            }
            other => Err(EncodingError::invalid(format!(
                "cannot append a category code to a {} segment",
                other.column_type()
            ))),
        }
    }

    pub fn push_text(&mut self, value: impl Into<String>) -> Result<()> {
        match &mut self.values {
            SegmentValues::Text(v) => {
                v.push(value.into());
                self.na.push(false);
                Ok(())
            }
            other => Err(EncodingError::invalid(format!(
                "cannot append a string to a {} segment",
                other.column_type()
            ))),
        }
    }

    pub fn push_na(&mut self) {
        match &mut self.values {
            SegmentValues::Numeric(v) => v.push(0.0),
            SegmentValues::Categorical(v) => v.push(0),
            SegmentValues::Text(v) => v.push(String::new()),
        }
        self.na.push(true);
    }

    /// Copy row `i` of `source` verbatim. Both sides must share a type.
    pub fn push_from(&mut self, source: &Segment, i: usize) -> Result<()> {
        if source.is_na(i) {
            self.push_na();
            return Ok(());
        }
        match &source.values {
            SegmentValues::Numeric(v) => self.push_num(v[i]),
            SegmentValues::Categorical(v) => self.push_code(v[i]),
            SegmentValues::Text(v) => self.push_text(v[i].clone()),
        }
    }

    pub fn finish(self) -> Segment {
        Segment {
            values: self.values,
            na: self.na,
        }
    }
}
