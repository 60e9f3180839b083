//! Row-level table operations built on the producing task kind.

use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::column::{Cell, Column};
use crate::frame::domain::Domain;
use crate::frame::segment::{ColumnType, Segment};
use crate::frame::table::{ColumnRef, Table};
use crate::task::{OutputSpec, TaskRunner};

// ── Filtering ───────────────────────────────────────────────────────

/// New table holding the rows whose `column` cell satisfies `keep`, in
/// their original order.
pub fn filter_rows<F>(
    runner: &TaskRunner,
    table: &Table,
    column: impl Into<ColumnRef>,
    keep: F,
) -> Result<Table>
where
    F: Fn(Cell<'_>) -> bool + Sync,
{
    let by = table.index_of(column)?;
    if table.num_cols() == 0 {
        return Ok(table.derive());
    }
    let filter_col = table.columns()[by].as_ref();
    let inputs: Vec<&Column> = table.columns().iter().map(|c| c.as_ref()).collect();
    let outputs: Vec<OutputSpec> = table
        .names()
        .iter()
        .zip(table.columns())
        .map(|(name, col)| OutputSpec::like(name.clone(), col))
        .collect();

    runner.produce("filter_rows", &inputs, &outputs, |_, segs, outs| {
        let by_seg = segs[by];
        for i in 0..by_seg.len() {
            if keep(filter_col.cell_in(by_seg, i)) {
                for (out, seg) in outs.iter_mut().zip(segs) {
                    out.push_from(seg, i)?;
                }
            }
        }
        Ok(())
    })
}

/// Rows whose `column` label equals `label`.
pub fn filter_by_label(
    runner: &TaskRunner,
    table: &Table,
    column: impl Into<ColumnRef>,
    label: &str,
) -> Result<Table> {
    filter_rows(runner, table, column, |cell| cell.as_label() == Some(label))
}

/// Rows whose `column` label differs from `label`. Missing rows are kept.
pub fn filter_out_by_label(
    runner: &TaskRunner,
    table: &Table,
    column: impl Into<ColumnRef>,
    label: &str,
) -> Result<Table> {
    filter_rows(runner, table, column, |cell| cell.as_label() != Some(label))
}

/// Rows whose numeric `column` value equals `value`.
pub fn filter_by_value(
    runner: &TaskRunner,
    table: &Table,
    column: impl Into<ColumnRef>,
    value: f64,
) -> Result<Table> {
    filter_rows(runner, table, column, |cell| cell.as_num() == Some(value))
}

// ── Row binding ─────────────────────────────────────────────────────

/// Append the rows of `bottom` below `top`. With no `top`, `bottom` is
/// returned as is. Column names and types must match pairwise; categorical
/// domains are unified and both sides' codes remapped onto the union.
pub fn rbind(runner: &TaskRunner, top: Option<&Table>, bottom: &Table) -> Result<Table> {
    let top = match top {
        None => return Ok(bottom.clone()),
        Some(t) => t,
    };
    if top.names() != bottom.names() {
        return Err(EncodingError::invalid(format!(
            "cannot bind tables with columns {:?} and {:?}",
            top.names(),
            bottom.names()
        )));
    }

    let mut columns = Vec::with_capacity(top.num_cols());
    for ((name, upper), lower) in top.names().iter().zip(top.columns()).zip(bottom.columns()) {
        if upper.column_type() != lower.column_type() {
            return Err(EncodingError::invalid(format!(
                "column '{}' is {} on top but {} below",
                name,
                upper.column_type(),
                lower.column_type()
            )));
        }
        let column = match (upper.domain(), lower.domain()) {
            (Some(a), Some(b)) => {
                let union = Arc::new(a.union(b));
                let mut segments = remap_codes(runner, upper, &union)?;
                segments.extend(remap_codes(runner, lower, &union)?);
                Column::from_shared(ColumnType::Categorical, Some(union), segments)?
            }
            _ => {
                let segments = upper
                    .segments()
                    .iter()
                    .chain(lower.segments())
                    .cloned()
                    .collect();
                Column::from_shared(upper.column_type(), None, segments)?
            }
        };
        columns.push(Arc::new(column));
    }
    Table::from_shared(top.names().to_vec(), columns)
}

/// Segments of categorical `column` re-coded against `target`.
pub(crate) fn remap_codes(
    runner: &TaskRunner,
    column: &Column,
    target: &Arc<Domain>,
) -> Result<Vec<Arc<Segment>>> {
    let source = match column.domain() {
        Some(d) if d == target.as_ref() => return Ok(column.segments().to_vec()),
        Some(d) => d,
        None => return Err(EncodingError::invalid("categorical column requires a domain")),
    };
    let mapping = source.remap_into(target);
    let spec = OutputSpec {
        name: "remapped".to_string(),
        column_type: ColumnType::Categorical,
        domain: Some(Arc::clone(target)),
    };
    let remapped = runner.produce("remap_domain", &[column], &[spec], |_, segs, outs| {
        let seg = segs[0];
        for i in 0..seg.len() {
            match seg.code(i).and_then(|c| mapping.get(c as usize).copied().flatten()) {
                Some(code) => outs[0].push_code(code)?,
                None => outs[0].push_na(),
            }
        }
        Ok(())
    })?;
    Ok(remapped.columns()[0].segments().to_vec())
}
