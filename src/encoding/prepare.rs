//! Target normalization before encoding.

use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::domain::Domain;
use crate::frame::ops::{filter_rows, remap_codes};
use crate::frame::segment::ColumnType;
use crate::frame::table::{ColumnRef, Table};
use crate::task::{OutputSpec, TaskRunner};

use super::aggregate::sum_and_count;

pub const NOT_BINARY: &str = "`target` must be a binary vector";
pub const NOT_NUMERIC_OR_BINARY: &str = "`target` must be a numeric or binary vector";

/// Rows whose `target` is present.
pub fn filter_out_missing_target(
    runner: &TaskRunner,
    table: &Table,
    target: impl Into<ColumnRef>,
) -> Result<Table> {
    filter_rows(runner, table, target, |cell| !cell.is_na())
}

/// Accept a numeric target as is; a categorical target must have exactly two
/// levels and comes back with its domain in lexicographic order.
pub fn ensure_binary_or_numeric(
    runner: &TaskRunner,
    table: &Table,
    target: impl Into<ColumnRef>,
) -> Result<Table> {
    let idx = table.index_of(target)?;
    let column = &table.columns()[idx];
    match column.column_type() {
        ColumnType::Numeric => Ok(table.clone()),
        ColumnType::Categorical => {
            let domain = column
                .domain()
                .ok_or_else(|| EncodingError::InvalidTarget(NOT_BINARY.to_string()))?;
            if domain.len() != 2 {
                return Err(EncodingError::InvalidTarget(NOT_BINARY.to_string()));
            }
            let sorted = Domain::from_labels(domain.labels());
            if sorted == *domain {
                return Ok(table.clone());
            }
            let sorted = Arc::new(sorted);
            let segments = remap_codes(runner, column, &sorted)?;
            let mut out = table.derive();
            out.replace_column(
                idx,
                Column::from_shared(ColumnType::Categorical, Some(sorted), segments)?,
            )?;
            Ok(out)
        }
        ColumnType::Text => Err(EncodingError::InvalidTarget(NOT_NUMERIC_OR_BINARY.to_string())),
    }
}

/// Replace a binary categorical `target` with a numeric 0/1 column whose
/// values are the codes of the lexicographically sorted labels. Missing stays
/// missing; numeric targets are returned unchanged.
pub fn transform_binary_target(
    runner: &TaskRunner,
    table: &Table,
    target: impl Into<ColumnRef>,
) -> Result<Table> {
    let idx = table.index_of(target)?;
    let checked = ensure_binary_or_numeric(runner, table, idx)?;
    let column = &checked.columns()[idx];
    if column.is_numeric() {
        return Ok(checked);
    }
    let name = checked.names()[idx].clone();
    let numeric = runner.produce(
        "transform_binary_target",
        &[column.as_ref()],
        &[OutputSpec::numeric(name)],
        |_, segs, outs| {
            let seg = segs[0];
            for i in 0..seg.len() {
                match seg.code(i) {
                    Some(code) => outs[0].push_num(code as f64)?,
                    None => outs[0].push_na(),
                }
            }
            Ok(())
        },
    )?;
    let mut out = checked.derive();
    out.replace_column(idx, (*numeric.columns()[0]).clone())?;
    Ok(out)
}

/// Fill missing values of numeric `column` with the mean of its present
/// values, in place. Returns the mean.
pub fn impute_numeric_mean(
    runner: &TaskRunner,
    table: &mut Table,
    column: impl Into<ColumnRef>,
) -> Result<f64> {
    let idx = table.index_of(column)?;
    let col = &table.columns()[idx];
    if !col.is_numeric() {
        return Err(EncodingError::invalid(format!(
            "cannot impute a mean into {} column '{}'",
            col.column_type(),
            table.names()[idx]
        )));
    }
    let (sum, count) = sum_and_count(runner, col)?;
    if count == 0 {
        return Err(EncodingError::UndefinedAggregate(format!(
            "mean of column '{}' which has no present values",
            table.names()[idx]
        )));
    }
    let mean = sum / count as f64;
    if col.na_count() == 0 {
        return Ok(mean);
    }
    runner.transform_in_place(
        "impute_numeric_mean",
        table,
        &[ColumnRef::Index(idx)],
        &[],
        |_, segs, _| {
            let seg = &mut segs[0];
            for i in 0..seg.len() {
                if seg.is_na(i) {
                    seg.set_num(i, mean)?;
                }
            }
            Ok(())
        },
    )?;
    Ok(mean)
}
