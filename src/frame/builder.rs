//! Table construction from column-name/value-sequence pairs.
//!
//! Every column is partitioned with the same [`SegmentPlanner`], so all
//! columns of a built table share segment boundaries. Column types are
//! either declared or inferred from the raw labels.
//!
//! [`TableBuilder::build`] returns an unbound table under a fresh [`Key`];
//! binding it is a second step (`KeyedStore::put_table` or
//! `Scope::put_table`). `Context::build_table` does both at once.

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::domain::Domain;
use crate::frame::planner::SegmentPlanner;
use crate::frame::segment::{ColumnType, SegmentBuilder};
use crate::frame::table::Table;
use crate::store::Key;
use crate::task::resource::TuningProfile;

/// Inferred label columns with at most this many levels become categorical.
pub const INFER_CATEGORICAL_MAX_LEVELS: usize = 1_000;

enum ColumnData {
    Numbers(Vec<f64>),
    Labels(Option<ColumnType>, Vec<Option<String>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numbers(v) => v.len(),
            ColumnData::Labels(_, v) => v.len(),
        }
    }
}

/// Builder for tables with explicit missing markers.
///
/// Numeric missing values are `f64::NAN`; label missing values are `None`.
pub struct TableBuilder {
    key: Option<Key>,
    planner: SegmentPlanner,
    columns: Vec<(String, ColumnData)>,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            key: None,
            planner: SegmentPlanner::new(TuningProfile::default().rows_per_segment),
            columns: Vec::new(),
        }
    }

    /// Bind the built table to the key derived from `name`.
    pub fn with_name(mut self, name: &str) -> Self {
        self.key = Some(Key::named(name));
        self
    }

    pub fn with_rows_per_segment(mut self, rows: usize) -> Self {
        self.planner = SegmentPlanner::new(rows);
        self
    }

    pub fn with_planner(mut self, planner: SegmentPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn numeric(mut self, name: &str, values: &[f64]) -> Self {
        self.columns
            .push((name.to_string(), ColumnData::Numbers(values.to_vec())));
        self
    }

    pub fn categorical(self, name: &str, labels: &[&str]) -> Self {
        let labels: Vec<Option<&str>> = labels.iter().map(|l| Some(*l)).collect();
        self.categorical_with_na(name, &labels)
    }

    pub fn categorical_with_na(self, name: &str, labels: &[Option<&str>]) -> Self {
        self.labels(name, Some(ColumnType::Categorical), labels)
    }

    pub fn text(self, name: &str, values: &[&str]) -> Self {
        let values: Vec<Option<&str>> = values.iter().map(|l| Some(*l)).collect();
        self.text_with_na(name, &values)
    }

    pub fn text_with_na(self, name: &str, values: &[Option<&str>]) -> Self {
        self.labels(name, Some(ColumnType::Text), values)
    }

    /// Raw labels whose column type is inferred at build time: numeric if
    /// every present label parses as a number, categorical if the number of
    /// distinct labels is at most [`INFER_CATEGORICAL_MAX_LEVELS`], else string.
    pub fn inferred(self, name: &str, labels: &[Option<&str>]) -> Self {
        self.labels(name, None, labels)
    }

    /// Labels with a declared type. Numeric columns parse each label.
    pub fn labels(
        mut self,
        name: &str,
        column_type: Option<ColumnType>,
        labels: &[Option<&str>],
    ) -> Self {
        let owned = labels.iter().map(|l| l.map(str::to_string)).collect();
        self.columns
            .push((name.to_string(), ColumnData::Labels(column_type, owned)));
        self
    }

    /// Build the table under a fresh key. The result is not bound in any store.
    pub fn build(self) -> Result<Table> {
        let rows = self.columns.first().map_or(0, |(_, d)| d.len());
        for (name, data) in &self.columns {
            if data.len() != rows {
                return Err(EncodingError::invalid(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    data.len(),
                    rows
                )));
            }
        }

        let planner = self.planner;
        let mut names = Vec::with_capacity(self.columns.len());
        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, data) in self.columns {
            let column = match data {
                ColumnData::Numbers(values) => numeric_column(&planner, &values)?,
                ColumnData::Labels(declared, labels) => {
                    let column_type = declared.unwrap_or_else(|| infer_type(&labels));
                    label_column(&planner, column_type, &labels)
                        .map_err(|e| match e {
                            EncodingError::InvalidArgument(msg) => {
                                EncodingError::invalid(format!("column '{}': {}", name, msg))
                            }
                            other => other,
                        })?
                }
            };
            names.push(name);
            columns.push(column);
        }

        let table = Table::new(names, columns)?;
        Ok(match self.key {
            Some(key) => table.with_key(key),
            None => table,
        })
    }
}

fn infer_type(labels: &[Option<String>]) -> ColumnType {
    let present: Vec<&str> = labels.iter().flatten().map(|s| s.as_str()).collect();
    if present.iter().all(|s| s.trim().parse::<f64>().is_ok()) {
        return ColumnType::Numeric;
    }
    let levels = Domain::from_labels(present.iter()).len();
    if levels <= INFER_CATEGORICAL_MAX_LEVELS {
        ColumnType::Categorical
    } else {
        ColumnType::Text
    }
}

pub(crate) fn numeric_column(planner: &SegmentPlanner, values: &[f64]) -> Result<Column> {
    let segments = planner
        .ranges(values.len())
        .into_iter()
        .map(|range| {
            let mut b = SegmentBuilder::with_capacity(ColumnType::Numeric, range.len());
            for &v in &values[range] {
                b.push_num(v)?;
            }
            Ok(b.finish())
        })
        .collect::<Result<Vec<_>>>()?;
    Column::from_segments(ColumnType::Numeric, None, segments)
}

fn label_column(
    planner: &SegmentPlanner,
    column_type: ColumnType,
    labels: &[Option<String>],
) -> Result<Column> {
    match column_type {
        ColumnType::Numeric => {
            let values = labels
                .iter()
                .map(|l| match l {
                    None => Ok(f64::NAN),
                    Some(s) => s.trim().parse::<f64>().map_err(|_| {
                        EncodingError::invalid(format!("'{}' is not a number", s))
                    }),
                })
                .collect::<Result<Vec<_>>>()?;
            numeric_column(planner, &values)
        }
        ColumnType::Categorical => {
            let domain = Domain::from_labels(labels.iter().flatten());
            let segments = planner
                .ranges(labels.len())
                .into_iter()
                .map(|range| {
                    let mut b = SegmentBuilder::with_capacity(ColumnType::Categorical, range.len());
                    for label in &labels[range] {
                        match label.as_deref().and_then(|l| domain.code_of(l)) {
                            Some(code) => b.push_code(code)?,
                            None => b.push_na(),
                        }
                    }
                    Ok(b.finish())
                })
                .collect::<Result<Vec<_>>>()?;
            Column::from_segments(ColumnType::Categorical, Some(domain), segments)
        }
        ColumnType::Text => {
            let segments = planner
                .ranges(labels.len())
                .into_iter()
                .map(|range| {
                    let mut b = SegmentBuilder::with_capacity(ColumnType::Text, range.len());
                    for label in &labels[range] {
                        match label {
                            Some(s) => b.push_text(s.clone())?,
                            None => b.push_na(),
                        }
                    }
                    Ok(b.finish())
                })
                .collect::<Result<Vec<_>>>()?;
            Column::from_segments(ColumnType::Text, None, segments)
        }
    }
}
