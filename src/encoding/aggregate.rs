//! Group-by-and-sum and full reductions over encoding tables.
//!
//! Grouping is a single reduce task: each segment pre-aggregates into a
//! local map keyed by `(category code, fold)`, and the per-segment maps are
//! merged by summation in segment order. The result is sorted by key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::segment::{ColumnType, Segment, SegmentBuilder};
use crate::frame::table::{ColumnRef, Table};
use crate::task::TaskRunner;

/// Prefix of the per-value sum columns emitted by [`group_by_and_sum`].
pub const SUM_PREFIX: &str = "sum_";

/// Fold identifier read from a numeric (integral) or categorical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FoldValue {
    Int(i64),
    Code(u32),
}

impl FoldValue {
    /// Fold of row `i`, `None` when missing.
    pub(crate) fn read(segment: &Segment, i: usize) -> Result<Option<FoldValue>> {
        if segment.is_na(i) {
            return Ok(None);
        }
        match segment.column_type() {
            ColumnType::Categorical => Ok(segment.code(i).map(FoldValue::Code)),
            ColumnType::Numeric => {
                let v = segment.num(i);
                if v.fract() != 0.0 {
                    return Err(EncodingError::invalid(format!(
                        "fold value {} is not an integer",
                        v
                    )));
                }
                Ok(Some(FoldValue::Int(v as i64)))
            }
            ColumnType::Text => Err(EncodingError::invalid(
                "fold column must be numeric or categorical",
            )),
        }
    }
}

type GroupKey = (u32, Option<FoldValue>);

#[derive(Default)]
struct Partial {
    sums: HashMap<GroupKey, Vec<f64>>,
    skipped: u64,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Partial {
        for (key, sums) in other.sums {
            match self.sums.get_mut(&key) {
                Some(acc) => {
                    for (a, s) in acc.iter_mut().zip(sums) {
                        *a += s;
                    }
                }
                None => {
                    self.sums.insert(key, sums);
                }
            }
        }
        self.skipped += other.skipped;
        self
    }
}

/// One row per distinct `(group[, fold])` pair, holding the group label,
/// the fold (when given) and `sum_<value>` for every value column.
///
/// Rows with a missing group or fold are skipped; missing values do not
/// contribute to their sum.
pub fn group_by_and_sum(
    runner: &TaskRunner,
    table: &Table,
    group: impl Into<ColumnRef>,
    fold: Option<ColumnRef>,
    values: &[ColumnRef],
) -> Result<Table> {
    let group_idx = table.index_of(group)?;
    let group_col = &table.columns()[group_idx];
    if !group_col.is_categorical() {
        return Err(EncodingError::invalid(format!(
            "group column '{}' must be categorical",
            table.names()[group_idx]
        )));
    }
    let fold_idx = fold.map(|f| table.index_of(f)).transpose()?;
    if let Some(idx) = fold_idx {
        if table.columns()[idx].is_string() {
            return Err(EncodingError::invalid(format!(
                "fold column '{}' must be numeric or categorical",
                table.names()[idx]
            )));
        }
    }
    let value_idx = values
        .iter()
        .map(|v| table.index_of(v))
        .collect::<Result<Vec<_>>>()?;
    for &idx in &value_idx {
        if !table.columns()[idx].is_numeric() {
            return Err(EncodingError::invalid(format!(
                "summed column '{}' must be numeric",
                table.names()[idx]
            )));
        }
    }

    let mut inputs: Vec<&Column> = vec![group_col.as_ref()];
    if let Some(idx) = fold_idx {
        inputs.push(table.columns()[idx].as_ref());
    }
    inputs.extend(value_idx.iter().map(|&i| table.columns()[i].as_ref()));
    let first_value = inputs.len() - value_idx.len();
    let has_fold = fold_idx.is_some();

    let partial = runner.reduce(
        "group_by_and_sum",
        &inputs,
        Partial::default(),
        |_, segs| {
            let mut local = Partial::default();
            let group_seg = segs[0];
            for i in 0..group_seg.len() {
                let code = match group_seg.code(i) {
                    Some(c) => c,
                    None => {
                        local.skipped += 1;
                        continue;
                    }
                };
                let fold = if has_fold {
                    match FoldValue::read(segs[1], i)? {
                        Some(f) => Some(f),
                        None => {
                            local.skipped += 1;
                            continue;
                        }
                    }
                } else {
                    None
                };
                let sums = local
                    .sums
                    .entry((code, fold))
                    .or_insert_with(|| vec![0.0; segs.len() - first_value]);
                for (acc, seg) in sums.iter_mut().zip(&segs[first_value..]) {
                    if !seg.is_na(i) {
                        *acc += seg.num(i);
                    }
                }
            }
            Ok(local)
        },
        Partial::merge,
    )?;

    if partial.skipped > 0 {
        tracing::warn!(
            column = %table.names()[group_idx],
            rows = partial.skipped,
            "group-by skipped rows with a missing group or fold"
        );
    }

    let sorted: BTreeMap<GroupKey, Vec<f64>> = partial.sums.into_iter().collect();

    let mut group_out = SegmentBuilder::with_capacity(ColumnType::Categorical, sorted.len());
    let fold_type = fold_idx.map(|i| table.columns()[i].column_type());
    let mut fold_out = fold_type.map(|t| SegmentBuilder::with_capacity(t, sorted.len()));
    let mut sum_out: Vec<SegmentBuilder> = value_idx
        .iter()
        .map(|_| SegmentBuilder::with_capacity(ColumnType::Numeric, sorted.len()))
        .collect();

    for ((code, fold), sums) in &sorted {
        group_out.push_code(*code)?;
        if let Some(b) = fold_out.as_mut() {
            match fold {
                Some(FoldValue::Int(v)) => b.push_num(*v as f64)?,
                Some(FoldValue::Code(c)) => b.push_code(*c)?,
                None => b.push_na(),
            }
        }
        for (b, s) in sum_out.iter_mut().zip(sums) {
            b.push_num(*s)?;
        }
    }

    let mut names = vec![table.names()[group_idx].clone()];
    let mut columns = vec![Arc::new(Column::from_shared(
        ColumnType::Categorical,
        group_col.shared_domain(),
        vec![Arc::new(group_out.finish())],
    )?)];
    if let (Some(idx), Some(b)) = (fold_idx, fold_out) {
        let src = &table.columns()[idx];
        names.push(table.names()[idx].clone());
        columns.push(Arc::new(Column::from_shared(
            src.column_type(),
            src.shared_domain(),
            vec![Arc::new(b.finish())],
        )?));
    }
    for (&idx, b) in value_idx.iter().zip(sum_out) {
        names.push(format!("{}{}", SUM_PREFIX, table.names()[idx]));
        columns.push(Arc::new(Column::from_shared(
            ColumnType::Numeric,
            None,
            vec![Arc::new(b.finish())],
        )?));
    }
    Table::from_shared(names, columns)
}

/// Sum and count of the non-missing values of a numeric column.
pub fn sum_and_count(runner: &TaskRunner, column: &Column) -> Result<(f64, u64)> {
    if !column.is_numeric() {
        return Err(EncodingError::invalid(format!(
            "cannot sum a {} column",
            column.column_type()
        )));
    }
    runner.reduce(
        "sum_and_count",
        &[column],
        (0.0, 0u64),
        |_, segs| {
            let seg = segs[0];
            let mut acc = (0.0, 0u64);
            for i in 0..seg.len() {
                if !seg.is_na(i) {
                    acc.0 += seg.num(i);
                    acc.1 += 1;
                }
            }
            Ok(acc)
        },
        |a, b| (a.0 + b.0, a.1 + b.1),
    )
}

/// `sum(numerator) / sum(denominator)` over the whole table.
pub fn global_mean(
    runner: &TaskRunner,
    table: &Table,
    numerator: impl Into<ColumnRef>,
    denominator: impl Into<ColumnRef>,
) -> Result<f64> {
    let (num, _) = sum_and_count(runner, table.column(numerator)?)?;
    let (den, _) = sum_and_count(runner, table.column(denominator)?)?;
    if den == 0.0 {
        return Err(EncodingError::UndefinedAggregate(
            "global mean over zero total weight".to_string(),
        ));
    }
    Ok(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::builder::TableBuilder;

    fn labels(t: &Table, col: &str) -> Vec<String> {
        let c = t.column(col).unwrap();
        (0..c.len() as i64)
            .map(|r| c.cell(r).unwrap().as_label().unwrap_or("NA").to_string())
            .collect()
    }

    fn nums(t: &Table, col: &str) -> Vec<f64> {
        let c = t.column(col).unwrap();
        (0..c.len() as i64).map(|r| c.at(r).unwrap()).collect()
    }

    #[test]
    fn test_group_by_sums_per_category() {
        let t = TableBuilder::new()
            .with_rows_per_segment(2)
            .categorical("ColA", &["a", "b", "b", "b"])
            .numeric("numerator", &[2.0, 6.0, 6.0, 6.0])
            .numeric("denominator", &[1.0, 1.0, 1.0, 1.0])
            .build()
            .unwrap();
        let runner = TaskRunner::new(2).unwrap();
        let out = group_by_and_sum(
            &runner,
            &t,
            "ColA",
            None,
            &["numerator".into(), "denominator".into()],
        )
        .unwrap();
        assert_eq!(out.names(), &["ColA", "sum_numerator", "sum_denominator"]);
        assert_eq!(labels(&out, "ColA"), vec!["a", "b"]);
        assert_eq!(nums(&out, "sum_numerator"), vec![2.0, 18.0]);
        assert_eq!(nums(&out, "sum_denominator"), vec![1.0, 3.0]);
    }

    #[test]
    fn test_group_by_with_fold() {
        let t = TableBuilder::new()
            .with_rows_per_segment(1)
            .categorical("ColA", &["a", "b", "a", "a"])
            .numeric("fold", &[2.0, 1.0, 1.0, 2.0])
            .numeric("y", &[1.0, 0.0, 1.0, 0.0])
            .build()
            .unwrap();
        let out = group_by_and_sum(
            &TaskRunner::sequential(),
            &t,
            "ColA",
            Some("fold".into()),
            &["y".into()],
        )
        .unwrap();
        assert_eq!(labels(&out, "ColA"), vec!["a", "a", "b"]);
        assert_eq!(nums(&out, "fold"), vec![1.0, 2.0, 1.0]);
        assert_eq!(nums(&out, "sum_y"), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_groups_and_values() {
        let t = TableBuilder::new()
            .categorical_with_na("c", &[Some("a"), None, Some("a")])
            .numeric("v", &[1.0, 5.0, f64::NAN])
            .build()
            .unwrap();
        let out =
            group_by_and_sum(&TaskRunner::sequential(), &t, "c", None, &["v".into()]).unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(nums(&out, "sum_v"), vec![1.0]);
    }

    #[test]
    fn test_non_integral_fold_rejected() {
        let t = TableBuilder::new()
            .categorical("c", &["a"])
            .numeric("fold", &[1.5])
            .numeric("v", &[1.0])
            .build()
            .unwrap();
        let err = group_by_and_sum(
            &TaskRunner::sequential(),
            &t,
            "c",
            Some("fold".into()),
            &["v".into()],
        )
        .unwrap_err();
        assert!(matches!(err.root_cause(), EncodingError::InvalidArgument(_)));
    }

    #[test]
    fn test_global_mean() {
        let t = TableBuilder::new()
            .numeric("numerator", &[2.0, 0.0])
            .numeric("denominator", &[2.0, 1.0])
            .build()
            .unwrap();
        let mean = global_mean(&TaskRunner::sequential(), &t, "numerator", "denominator").unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_global_mean_zero_weight() {
        let t = TableBuilder::new()
            .numeric("numerator", &[1.0])
            .numeric("denominator", &[0.0])
            .build()
            .unwrap();
        let err = global_mean(&TaskRunner::sequential(), &t, "numerator", "denominator");
        assert!(matches!(err, Err(EncodingError::UndefinedAggregate(_))));
    }
}
