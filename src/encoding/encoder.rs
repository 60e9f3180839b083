//! TargetEncoder - encoding map preparation and application
//!
//! An encoding map holds, per category (and per fold when a fold column is
//! given), the target sum (`numerator`) and row count (`denominator`).
//! Applying maps joins them back onto a table and turns every row's
//! aggregates into a `<column>_te` value:
//!
//! - `HoldoutType::None`: aggregates over all rows
//! - `HoldoutType::KFold`: aggregates over the other folds only
//! - `HoldoutType::LeaveOneOut`: aggregates minus the row's own target
//!
//! Because the maps hold exact sums, collapsing folds or excluding a row is
//! plain summation or subtraction.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::EncoderConfig;
use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::ops::{filter_rows, rbind};
use crate::frame::segment::{ColumnType, SegmentBuilder};
use crate::frame::table::{ColumnRef, Table};
use crate::store::{Key, KeyedStore};
use crate::task::TaskRunner;

use super::aggregate::{global_mean, group_by_and_sum, FoldValue, SUM_PREFIX};
use super::blend::{add_noise, blended_encoding, unblended_encoding};
use super::merge::{merge_plain, merge_plain_and_fold, COLLISION_SUFFIX};
use super::params::{BlendingParams, HoldoutType, NoiseSpec};
use super::prepare::transform_binary_target;

pub const NUMERATOR: &str = "numerator";
pub const DENOMINATOR: &str = "denominator";
pub const ENCODED_SUFFIX: &str = "_te";

pub const NOT_CATEGORICAL: &str =
    "argument `columns_to_encode` should contain only names of categorical columns";

// ── Encoding maps ───────────────────────────────────────────────────

/// Aggregates for one encoded column: `[column, (fold), numerator, denominator]`.
#[derive(Debug, Clone)]
pub struct EncodingMap {
    column: String,
    fold: Option<String>,
    table: Table,
}

impl EncodingMap {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn fold_column(&self) -> Option<&str> {
        self.fold.as_deref()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn key(&self) -> Key {
        self.table.key()
    }

    /// Number of (category[, fold]) entries.
    pub fn len(&self) -> u64 {
        self.table.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encoding maps of one target, in the order the columns were requested.
#[derive(Debug, Clone)]
pub struct EncodingMaps {
    target: String,
    maps: Vec<EncodingMap>,
}

impl EncodingMaps {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn get(&self, column: &str) -> Option<&EncodingMap> {
        self.maps.iter().find(|m| m.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingMap> {
        self.maps.iter()
    }

    pub fn columns(&self) -> Vec<&str> {
        self.maps.iter().map(|m| m.column.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Bind every map table in `store`. Returns the bound keys.
    pub fn publish(&self, store: &KeyedStore) -> Vec<Key> {
        self.maps
            .iter()
            .map(|m| {
                store.put_table(m.table.clone());
                m.key()
            })
            .collect()
    }

    /// Unbind every map table from `store`.
    pub fn release(&self, store: &KeyedStore) -> Result<()> {
        for m in &self.maps {
            match store.remove(m.key()) {
                Ok(()) | Err(EncodingError::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ── Encoder ─────────────────────────────────────────────────────────

pub struct TargetEncoder<'r> {
    runner: &'r TaskRunner,
    /// `None` encodes with the raw category mean.
    blending: Option<BlendingParams>,
}

impl<'r> TargetEncoder<'r> {
    /// Encoder blending with the default parameters (k = 20, f = 10).
    pub fn new(runner: &'r TaskRunner) -> Self {
        Self {
            runner,
            blending: Some(BlendingParams::default()),
        }
    }

    pub fn from_config(runner: &'r TaskRunner, config: &EncoderConfig) -> Self {
        Self {
            runner,
            blending: config.with_blending.then_some(config.blending),
        }
    }

    pub fn with_blending(mut self, params: BlendingParams) -> Self {
        self.blending = Some(params);
        self
    }

    pub fn without_blending(mut self) -> Self {
        self.blending = None;
        self
    }

    pub fn blending(&self) -> Option<&BlendingParams> {
        self.blending.as_ref()
    }

    /// Build one encoding map per column of `columns_to_encode`.
    ///
    /// Rows with a missing target are dropped and a binary categorical
    /// target is turned into 0/1 first. With `fold`, maps are keyed by
    /// (category, fold).
    pub fn prepare_encoding_map(
        &self,
        table: &Table,
        columns_to_encode: &[ColumnRef],
        target: impl Into<ColumnRef>,
        fold: Option<ColumnRef>,
    ) -> Result<EncodingMaps> {
        let target_idx = resolve_target(table, target.into())?;
        if columns_to_encode.is_empty() {
            return Err(EncodingError::invalid(
                "argument `columns_to_encode` is not defined or empty",
            ));
        }
        let mut encode_idx = Vec::with_capacity(columns_to_encode.len());
        for c in columns_to_encode {
            let idx = table.index_of(c)?;
            if !table.columns()[idx].is_categorical() {
                return Err(EncodingError::invalid(NOT_CATEGORICAL));
            }
            encode_idx.push(idx);
        }
        let fold_idx = fold.map(|f| table.index_of(f)).transpose()?;

        let target_name = table.names()[target_idx].clone();
        let fold_name = fold_idx.map(|i| table.names()[i].clone());

        let present = filter_rows(self.runner, table, target_idx, |cell| !cell.is_na())?;
        let present = transform_binary_target(self.runner, &present, target_idx)?;
        let target_col = Arc::clone(&present.columns()[target_idx]);
        let ones = Arc::new(Column::constant(1.0, present.offsets())?);

        let mut maps = Vec::with_capacity(encode_idx.len());
        for &idx in &encode_idx {
            let column = present.names()[idx].clone();
            let mut names = vec![column.clone()];
            let mut columns = vec![Arc::clone(&present.columns()[idx])];
            if let (Some(f), Some(name)) = (fold_idx, &fold_name) {
                names.push(name.clone());
                columns.push(Arc::clone(&present.columns()[f]));
            }
            names.push(NUMERATOR.to_string());
            columns.push(Arc::clone(&target_col));
            names.push(DENOMINATOR.to_string());
            columns.push(Arc::clone(&ones));
            let working = Table::from_shared(names, columns)?;

            let grouped = group_by_and_sum(
                self.runner,
                &working,
                0usize,
                fold_name.as_ref().map(|_| ColumnRef::Index(1)),
                &[NUMERATOR.into(), DENOMINATOR.into()],
            )?;
            let table = rename_sums(grouped)?;

            tracing::info!(
                column = %column,
                target = %target_name,
                entries = table.num_rows(),
                folds = fold_name.is_some(),
                "prepared encoding map"
            );
            maps.push(EncodingMap {
                column,
                fold: fold_name.clone(),
                table,
            });
        }

        Ok(EncodingMaps {
            target: target_name,
            maps,
        })
    }

    /// Append `<column>_te` for every map in `maps`. The result keeps the
    /// row count and order of `table` and all of its columns.
    ///
    /// `target` is read by `LeaveOneOut`; `fold` is required by `KFold`.
    /// With `noise`, every encoded column is perturbed by seeded noise.
    pub fn apply_target_encoding(
        &self,
        table: &Table,
        target: impl Into<ColumnRef>,
        maps: &EncodingMaps,
        holdout: HoldoutType,
        fold: Option<ColumnRef>,
        noise: Option<NoiseSpec>,
    ) -> Result<Table> {
        let runner = self.runner;
        let mut current = table.derive();

        // Leave-one-out subtracts the row's own 0/1 target; the original
        // target column is restored before returning.
        let loo_target = match holdout {
            HoldoutType::LeaveOneOut => {
                let idx = resolve_target(table, target.into())?;
                current = transform_binary_target(runner, &current, idx)?;
                Some(idx)
            }
            _ => None,
        };
        let fold_idx = match (holdout, fold) {
            (HoldoutType::KFold, Some(f)) => Some(table.index_of(f)?),
            (HoldoutType::KFold, None) => {
                return Err(EncodingError::invalid(
                    "k-fold holdout requires a fold column",
                ))
            }
            _ => None,
        };

        for map in maps.iter() {
            let column = map.column();
            let col_idx = current.index_of(column)?;
            if !current.columns()[col_idx].is_categorical() {
                return Err(EncodingError::invalid(NOT_CATEGORICAL));
            }
            let mean = global_mean(runner, map.table(), NUMERATOR, DENOMINATOR)?;

            let num_name = pulled_name(&current, NUMERATOR);
            let den_name = pulled_name(&current, DENOMINATOR);

            let mut merged = match holdout {
                HoldoutType::KFold => {
                    let map_fold = map.fold_column().ok_or_else(|| {
                        EncodingError::invalid(format!(
                            "encoding map of '{}' was prepared without a fold column",
                            column
                        ))
                    })?;
                    let base_fold = fold_idx.ok_or_else(|| {
                        EncodingError::invalid("k-fold holdout requires a fold column")
                    })?;
                    let oof = self.out_of_fold_map(map, map_fold)?;
                    merge_plain_and_fold(runner, &current, &oof, column, column, base_fold, map_fold)?
                }
                HoldoutType::None | HoldoutType::LeaveOneOut => {
                    let collapsed = self.collapse_folds(map)?;
                    merge_plain(runner, &current, &collapsed, column, column)?
                }
            };

            if let Some(t) = loo_target {
                runner.transform_in_place(
                    "leave_one_out",
                    &mut merged,
                    &[num_name.as_str().into(), den_name.as_str().into()],
                    &[ColumnRef::Index(t)],
                    |_, segs, inputs| {
                        let target = inputs[0];
                        let (num, den) = segs.split_at_mut(1);
                        for i in 0..target.len() {
                            if target.is_na(i) || num[0].is_na(i) {
                                continue;
                            }
                            let n = num[0].num(i);
                            let d = den[0].num(i);
                            num[0].set_num(i, n - target.num(i))?;
                            den[0].set_num(i, d - 1.0)?;
                        }
                        Ok(())
                    },
                )?;
            }

            let out_name = format!("{}{}", column, ENCODED_SUFFIX);
            let mut encoded = match &self.blending {
                Some(params) => blended_encoding(
                    runner, &merged, &num_name, &den_name, mean, params, &out_name,
                )?,
                None => unblended_encoding(runner, &merged, &num_name, &den_name, mean, &out_name)?,
            };
            encoded.remove_column(&num_name)?;
            encoded.remove_column(&den_name)?;

            if let Some(spec) = noise {
                add_noise(runner, &mut encoded, &out_name, spec)?;
            }

            tracing::info!(
                column = %column,
                holdout = holdout.as_str(),
                rows = encoded.num_rows(),
                "applied target encoding"
            );
            current = encoded;
        }

        if let Some(t) = loo_target {
            current.columns_mut()[t] = Arc::clone(&table.columns()[t]);
        }
        Ok(current)
    }

    /// Map summed over folds: one row per category.
    fn collapse_folds(&self, map: &EncodingMap) -> Result<Table> {
        if map.fold_column().is_none() {
            return Ok(map.table().clone());
        }
        let grouped = group_by_and_sum(
            self.runner,
            map.table(),
            map.column(),
            None,
            &[NUMERATOR.into(), DENOMINATOR.into()],
        )?;
        rename_sums(grouped)
    }

    /// For every fold k, the aggregates of all other folds tagged with k.
    fn out_of_fold_map(&self, map: &EncodingMap, fold_name: &str) -> Result<Table> {
        let table = map.table();
        let fold_col = Arc::clone(table.column(fold_name)?);
        let mut folds = BTreeSet::new();
        for seg in fold_col.segments() {
            for i in 0..seg.len() {
                if let Some(f) = FoldValue::read(seg, i)? {
                    folds.insert(f);
                }
            }
        }

        let mut oof: Option<Table> = None;
        for fold in folds {
            let others = filter_rows(self.runner, table, fold_name, |cell| match fold {
                FoldValue::Int(k) => cell.as_num() != Some(k as f64),
                FoldValue::Code(code) => {
                    cell.as_label() != fold_col.domain().and_then(|d| d.label(code))
                }
            })?;
            let grouped = group_by_and_sum(
                self.runner,
                &others,
                map.column(),
                None,
                &[NUMERATOR.into(), DENOMINATOR.into()],
            )?;
            let mut tagged = rename_sums(grouped)?;
            let tag = constant_fold(&fold_col, fold, tagged.offsets())?;
            tagged.add_column(fold_name, tag)?;
            let tagged = reorder(tagged, &[map.column(), fold_name, NUMERATOR, DENOMINATOR])?;
            oof = Some(rbind(self.runner, oof.as_ref(), &tagged)?);
        }

        match oof {
            Some(t) => Ok(t),
            None => Ok(map.table().derive()),
        }
    }
}

/// Resolve the target reference; an unset or unknown target is an invalid
/// argument rather than a missing column.
fn resolve_target(table: &Table, target: ColumnRef) -> Result<usize> {
    if matches!(&target, ColumnRef::Name(n) if n.is_empty()) {
        return Err(EncodingError::invalid("argument `target` is missing"));
    }
    table
        .index_of(&target)
        .map_err(|_| EncodingError::invalid(format!("argument `target` {} is not in the table", target)))
}

/// Name a pulled map column gets when merged into `base`.
fn pulled_name(base: &Table, name: &str) -> String {
    if base.names().iter().any(|n| n == name) {
        format!("{}{}", name, COLLISION_SUFFIX)
    } else {
        name.to_string()
    }
}

fn rename_sums(mut grouped: Table) -> Result<Table> {
    grouped.rename_column(format!("{}{}", SUM_PREFIX, NUMERATOR), NUMERATOR)?;
    grouped.rename_column(format!("{}{}", SUM_PREFIX, DENOMINATOR), DENOMINATOR)?;
    Ok(grouped)
}

fn reorder(table: Table, order: &[&str]) -> Result<Table> {
    let mut names = Vec::with_capacity(order.len());
    let mut columns = Vec::with_capacity(order.len());
    for name in order {
        names.push(name.to_string());
        columns.push(Arc::clone(table.column(*name)?));
    }
    Ok(Table::from_shared(names, columns)?.with_key(table.key()))
}

/// Column shaped like `template` holding fold `value` in every row.
fn constant_fold(template: &Column, value: FoldValue, offsets: &[u64]) -> Result<Column> {
    match value {
        FoldValue::Int(k) => Column::constant(k as f64, offsets),
        FoldValue::Code(code) => {
            let segments = offsets
                .windows(2)
                .map(|w| {
                    let len = (w[1] - w[0]) as usize;
                    let mut b = SegmentBuilder::with_capacity(ColumnType::Categorical, len);
                    for _ in 0..len {
                        b.push_code(code)?;
                    }
                    Ok(Arc::new(b.finish()))
                })
                .collect::<Result<Vec<_>>>()?;
            Column::from_shared(ColumnType::Categorical, template.shared_domain(), segments)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::builder::TableBuilder;

    fn nums(t: &Table, col: &str) -> Vec<f64> {
        let c = t.column(col).unwrap();
        (0..c.len() as i64).map(|r| c.at(r).unwrap()).collect()
    }

    fn abc() -> Table {
        TableBuilder::new()
            .with_name("testFrame")
            .categorical("ColA", &["a", "b"])
            .numeric("ColB", &[0.0, 1.0])
            .categorical("ColC", &["1", "6"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_encode_columns_must_be_categorical() {
        let runner = TaskRunner::sequential();
        let tec = TargetEncoder::new(&runner);
        let err = tec
            .prepare_encoding_map(&abc(), &[0usize.into(), 1usize.into()], 2usize, None)
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid argument: {}", NOT_CATEGORICAL));

        let all_categorical = TableBuilder::new()
            .categorical("ColA", &["1", "0"])
            .categorical("ColB", &["a", "b"])
            .categorical("ColC", &["1", "6"])
            .build()
            .unwrap();
        let maps = tec
            .prepare_encoding_map(&all_categorical, &[0usize.into(), 1usize.into()], 2usize, None)
            .unwrap();
        assert_eq!(maps.columns(), vec!["ColA", "ColB"]);
    }

    #[test]
    fn test_empty_columns_and_missing_target_rejected() {
        let runner = TaskRunner::sequential();
        let tec = TargetEncoder::new(&runner);
        let t = abc();
        assert!(matches!(
            tec.prepare_encoding_map(&t, &[], "ColC", None),
            Err(EncodingError::InvalidArgument(_))
        ));
        assert!(matches!(
            tec.prepare_encoding_map(&t, &["ColA".into()], "", None),
            Err(EncodingError::InvalidArgument(_))
        ));
        assert!(matches!(
            tec.prepare_encoding_map(&t, &["ColA".into()], "Nope", None),
            Err(EncodingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_prepare_encoding_map_without_folds() {
        let t = TableBuilder::new()
            .with_rows_per_segment(3)
            .categorical("ColA", &["a", "b", "b", "b"])
            .numeric("ColB", &[1.0, 1.0, 4.0, 7.0])
            .categorical("ColC", &["2", "6", "6", "6"])
            .build()
            .unwrap();
        let runner = TaskRunner::new(2).unwrap();
        let maps = TargetEncoder::new(&runner)
            .prepare_encoding_map(&t, &[0usize.into()], 2usize, None)
            .unwrap();
        let map = maps.get("ColA").unwrap();
        assert_eq!(map.table().names(), &["ColA", NUMERATOR, DENOMINATOR]);
        assert_eq!(nums(map.table(), NUMERATOR), vec![0.0, 3.0]);
        assert_eq!(nums(map.table(), DENOMINATOR), vec![1.0, 3.0]);
        assert_eq!(maps.target(), "ColC");
    }

    #[test]
    fn test_prepare_with_folds() {
        let t = TableBuilder::new()
            .categorical("ColA", &["a", "b", "a", "a"])
            .numeric("fold", &[1.0, 1.0, 2.0, 2.0])
            .numeric("y", &[1.0, 0.0, 0.0, 1.0])
            .build()
            .unwrap();
        let runner = TaskRunner::sequential();
        let maps = TargetEncoder::new(&runner)
            .prepare_encoding_map(&t, &["ColA".into()], "y", Some("fold".into()))
            .unwrap();
        let map = maps.get("ColA").unwrap();
        assert_eq!(map.fold_column(), Some("fold"));
        assert_eq!(map.table().names(), &["ColA", "fold", NUMERATOR, DENOMINATOR]);
        assert_eq!(nums(map.table(), "fold"), vec![1.0, 2.0, 1.0]);
        assert_eq!(nums(map.table(), NUMERATOR), vec![1.0, 1.0, 0.0]);
        assert_eq!(nums(map.table(), DENOMINATOR), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_kfold_uses_other_folds_only() {
        let t = TableBuilder::new()
            .with_rows_per_segment(2)
            .categorical("ColA", &["a", "a", "a", "b"])
            .numeric("fold", &[1.0, 2.0, 2.0, 1.0])
            .numeric("y", &[1.0, 0.0, 0.0, 1.0])
            .build()
            .unwrap();
        let runner = TaskRunner::new(2).unwrap();
        let tec = TargetEncoder::new(&runner).without_blending();
        let maps = tec
            .prepare_encoding_map(&t, &["ColA".into()], "y", Some("fold".into()))
            .unwrap();
        let out = tec
            .apply_target_encoding(&t, "y", &maps, HoldoutType::KFold, Some("fold".into()), None)
            .unwrap();

        assert_eq!(out.names(), &["ColA", "fold", "y", "ColA_te"]);
        let te = nums(&out, "ColA_te");
        // Row 0 (a, fold 1) sees fold 2 only: 0 / 2.
        assert_eq!(te[0], 0.0);
        // Rows 1 and 2 (a, fold 2) see fold 1 only: 1 / 1.
        assert_eq!(te[1], 1.0);
        assert_eq!(te[2], 1.0);
        // Row 3 (b, fold 1): no b in fold 2, falls back to the global mean.
        assert_eq!(te[3], 0.5);
    }

    #[test]
    fn test_leave_one_out_excludes_own_row() {
        let t = TableBuilder::new()
            .categorical("ColA", &["a", "a", "a", "b"])
            .categorical("y", &["yes", "no", "no", "yes"])
            .build()
            .unwrap();
        let runner = TaskRunner::sequential();
        let tec = TargetEncoder::new(&runner).without_blending();
        let maps = tec.prepare_encoding_map(&t, &["ColA".into()], "y", None).unwrap();
        let out = tec
            .apply_target_encoding(&t, "y", &maps, HoldoutType::LeaveOneOut, None, None)
            .unwrap();

        let te = nums(&out, "ColA_te");
        assert_eq!(te[0], 0.0);
        assert_eq!(te[1], 0.5);
        assert_eq!(te[2], 0.5);
        // Single-row category: nothing left after exclusion.
        assert_eq!(te[3], 0.5);
        assert!(out.column("y").unwrap().is_categorical());
    }

    #[test]
    fn test_apply_without_holdout_drops_temporaries() {
        let t = TableBuilder::new()
            .categorical("ColA", &["a", "b", "a"])
            .categorical("ColB", &["yes", "no", "yes"])
            .build()
            .unwrap();
        let runner = TaskRunner::sequential();
        let tec = TargetEncoder::new(&runner);
        let maps = tec.prepare_encoding_map(&t, &["ColA".into()], "ColB", None).unwrap();
        let out = tec
            .apply_target_encoding(&t, "ColB", &maps, HoldoutType::None, None, None)
            .unwrap();
        assert_eq!(out.names(), &["ColA", "ColB", "ColA_te"]);
        assert_eq!(out.num_rows(), 3);
        assert_ne!(out.key(), t.key());
    }

    #[test]
    fn test_kfold_requires_fold_column() {
        let t = abc();
        let runner = TaskRunner::sequential();
        let tec = TargetEncoder::new(&runner);
        let maps = tec.prepare_encoding_map(&t, &["ColA".into()], "ColC", None).unwrap();
        assert!(tec
            .apply_target_encoding(&t, "ColC", &maps, HoldoutType::KFold, None, None)
            .is_err());
        assert!(tec
            .apply_target_encoding(&t, "ColC", &maps, HoldoutType::KFold, Some("ColB".into()), None)
            .is_err());
    }

    #[test]
    fn test_publish_and_release() {
        let store = KeyedStore::new();
        let runner = TaskRunner::sequential();
        let maps = TargetEncoder::new(&runner)
            .prepare_encoding_map(&abc(), &["ColA".into()], "ColC", None)
            .unwrap();
        let keys = maps.publish(&store);
        assert_eq!(keys.len(), 1);
        assert!(store.get_table(keys[0]).is_ok());
        maps.release(&store).unwrap();
        assert!(store.is_empty());
    }
}
