//! Left outer joins of a base table against an encoding map.
//!
//! The join key is the category label (never the code, since the two sides
//! carry independently built domains), optionally paired with a fold id.
//! The map side is indexed once; base segments are then probed in parallel,
//! one output row per base row, so the base row count and order are kept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::domain::Domain;
use crate::frame::segment::{ColumnType, Segment};
use crate::frame::table::{ColumnRef, Table};
use crate::task::{OutputSpec, TaskRunner};

use super::aggregate::FoldValue;

/// Suffix given to pulled map columns whose name the base already uses.
pub const COLLISION_SUFFIX: &str = "_right";

/// Join `base` against `map` on `base_col` = `map_col`. Rows without a match
/// get missing values in the pulled columns.
pub fn merge_plain(
    runner: &TaskRunner,
    base: &Table,
    map: &Table,
    base_col: impl Into<ColumnRef>,
    map_col: impl Into<ColumnRef>,
) -> Result<Table> {
    let keys = JoinKeys {
        base_key: base.index_of(base_col)?,
        map_key: map.index_of(map_col)?,
        folds: None,
    };
    merge(runner, base, map, keys)
}

/// Join on the pair (category, fold): `base_fold` of a base row must equal
/// `map_fold` of the map row.
pub fn merge_plain_and_fold(
    runner: &TaskRunner,
    base: &Table,
    map: &Table,
    base_col: impl Into<ColumnRef>,
    map_col: impl Into<ColumnRef>,
    base_fold: impl Into<ColumnRef>,
    map_fold: impl Into<ColumnRef>,
) -> Result<Table> {
    let keys = JoinKeys {
        base_key: base.index_of(base_col)?,
        map_key: map.index_of(map_col)?,
        folds: Some((base.index_of(base_fold)?, map.index_of(map_fold)?)),
    };
    merge(runner, base, map, keys)
}

struct JoinKeys {
    base_key: usize,
    map_key: usize,
    /// (base fold index, map fold index)
    folds: Option<(usize, usize)>,
}

/// Translates row values of one side into the label space of the map side.
struct KeyCoder {
    space: Arc<Domain>,
    /// Code translation for categorical columns; `None` when the column
    /// already uses `space` or is a string column.
    remap: Option<Vec<Option<u32>>>,
}

impl KeyCoder {
    /// Label space of a map-side key column.
    fn space_of(column: &Column) -> Result<Arc<Domain>> {
        match column.column_type() {
            ColumnType::Categorical => column
                .shared_domain()
                .ok_or_else(|| EncodingError::invalid("categorical column requires a domain")),
            ColumnType::Text => {
                let labels: Vec<&str> = column
                    .segments()
                    .iter()
                    .flat_map(|seg| (0..seg.len()).filter_map(move |i| seg.text(i)))
                    .collect();
                Ok(Arc::new(Domain::from_labels(labels)))
            }
            ColumnType::Numeric => Err(EncodingError::invalid(
                "join key must be a categorical or string column",
            )),
        }
    }

    fn new(column: &Column, space: Arc<Domain>) -> Result<Self> {
        let remap = match (column.column_type(), column.domain()) {
            (ColumnType::Categorical, Some(d)) if *d == *space => None,
            (ColumnType::Categorical, Some(d)) => Some(d.remap_into(&space)),
            (ColumnType::Text, _) => None,
            _ => {
                return Err(EncodingError::invalid(
                    "join key must be a categorical or string column",
                ))
            }
        };
        Ok(Self { space, remap })
    }

    fn code(&self, seg: &Segment, i: usize) -> Option<u32> {
        match seg.column_type() {
            ColumnType::Categorical => {
                let code = seg.code(i)?;
                match &self.remap {
                    Some(m) => m.get(code as usize).copied().flatten(),
                    None => Some(code),
                }
            }
            ColumnType::Text => seg.text(i).and_then(|l| self.space.code_of(l)),
            ColumnType::Numeric => None,
        }
    }
}

/// Fold reader producing comparable ids for both sides.
enum FoldCoder {
    Numeric,
    Categorical(KeyCoder),
}

impl FoldCoder {
    fn read(&self, seg: &Segment, i: usize) -> Result<Option<FoldValue>> {
        match self {
            FoldCoder::Numeric => FoldValue::read(seg, i),
            FoldCoder::Categorical(coder) => Ok(coder.code(seg, i).map(FoldValue::Code)),
        }
    }
}

fn fold_coders(base: &Column, map: &Column) -> Result<(FoldCoder, FoldCoder)> {
    match (base.column_type(), map.column_type()) {
        (ColumnType::Numeric, ColumnType::Numeric) => Ok((FoldCoder::Numeric, FoldCoder::Numeric)),
        (ColumnType::Categorical, ColumnType::Categorical) => {
            let space = KeyCoder::space_of(map)?;
            Ok((
                FoldCoder::Categorical(KeyCoder::new(base, Arc::clone(&space))?),
                FoldCoder::Categorical(KeyCoder::new(map, space)?),
            ))
        }
        (b, m) => Err(EncodingError::invalid(format!(
            "fold columns must both be numeric or both categorical, got {} and {}",
            b, m
        ))),
    }
}

type JoinKey = (u32, Option<FoldValue>);

fn merge(runner: &TaskRunner, base: &Table, map: &Table, keys: JoinKeys) -> Result<Table> {
    let map_key_col = &map.columns()[keys.map_key];
    let space = KeyCoder::space_of(map_key_col)?;
    let map_coder = KeyCoder::new(map_key_col, Arc::clone(&space))?;
    let base_key_col = &base.columns()[keys.base_key];
    let base_coder = KeyCoder::new(base_key_col, space)?;

    let folds = match keys.folds {
        Some((b, m)) => {
            let (bc, mc) = fold_coders(&base.columns()[b], &map.columns()[m])?;
            Some((b, m, bc, mc))
        }
        None => None,
    };

    // Index the map side: join key -> (segment, row).
    let mut index: HashMap<JoinKey, (usize, usize)> = HashMap::with_capacity(map.num_rows() as usize);
    for s in 0..map.segment_count() {
        let key_seg = map_key_col.segment(s);
        for i in 0..key_seg.len() {
            let code = match map_coder.code(key_seg, i) {
                Some(c) => c,
                None => continue,
            };
            let fold = match &folds {
                Some((_, m, _, coder)) => match coder.read(map.columns()[*m].segment(s), i)? {
                    Some(f) => Some(f),
                    None => continue,
                },
                None => None,
            };
            if index.insert((code, fold), (s, i)).is_some() {
                return Err(EncodingError::invalid(format!(
                    "encoding map has more than one row for category '{}'{}",
                    map_key_col.cell_in(key_seg, i).as_label().unwrap_or_default(),
                    fold.map(|f| format!(" in fold {:?}", f)).unwrap_or_default()
                )));
            }
        }
    }

    // Pulled columns: everything but the join keys.
    let map_fold = folds.as_ref().map(|(_, m, _, _)| *m);
    let pulled: Vec<usize> = (0..map.num_cols())
        .filter(|&c| c != keys.map_key && Some(c) != map_fold)
        .collect();
    let mut outputs = Vec::with_capacity(pulled.len());
    for &c in &pulled {
        let name = &map.names()[c];
        let out_name = if base.names().contains(name) {
            format!("{}{}", name, COLLISION_SUFFIX)
        } else {
            name.clone()
        };
        outputs.push(OutputSpec::like(out_name, &map.columns()[c]));
    }

    let mut merged = base.derive();
    if pulled.is_empty() {
        return Ok(merged);
    }

    let mut inputs: Vec<&Column> = vec![base_key_col.as_ref()];
    if let Some((b, _, _, _)) = &folds {
        inputs.push(base.columns()[*b].as_ref());
    }
    let unmatched = AtomicU64::new(0);

    let joined = runner.produce("merge", &inputs, &outputs, |_, segs, outs| {
        let key_seg = segs[0];
        for i in 0..key_seg.len() {
            let code = base_coder.code(key_seg, i);
            let fold = match &folds {
                Some((_, _, coder, _)) => coder.read(segs[1], i)?,
                None => None,
            };
            let hit = match (code, &folds, fold) {
                (Some(code), None, _) => index.get(&(code, None)),
                (Some(code), Some(_), Some(fold)) => index.get(&(code, Some(fold))),
                _ => None,
            };
            match hit {
                Some(&(s, row)) => {
                    for (out, &c) in outs.iter_mut().zip(&pulled) {
                        out.push_from(map.columns()[c].segment(s), row)?;
                    }
                }
                None => {
                    unmatched.fetch_add(1, Ordering::Relaxed);
                    for out in outs.iter_mut() {
                        out.push_na();
                    }
                }
            }
        }
        Ok(())
    })?;

    let unmatched = unmatched.into_inner();
    if unmatched > 0 {
        tracing::warn!(
            base = %base.key(),
            map = %map.key(),
            rows = unmatched,
            "merge left rows without a matching encoding map entry"
        );
    }

    for (name, column) in joined.names().iter().zip(joined.columns()) {
        merged.add_shared(name.clone(), Arc::clone(column))?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::builder::TableBuilder;

    fn label(t: &Table, col: &str, row: i64) -> Option<String> {
        t.column(col)
            .unwrap()
            .cell(row)
            .unwrap()
            .as_label()
            .map(str::to_string)
    }

    #[test]
    fn test_merge_plain_joins_by_label() {
        let base = TableBuilder::new()
            .with_rows_per_segment(2)
            .categorical("ColA", &["a", "c", "b", "a"])
            .numeric("x", &[1.0, 2.0, 3.0, 4.0])
            .build()
            .unwrap();
        // Map domain {a, b} differs from base domain {a, b, c}.
        let map = TableBuilder::new()
            .categorical("ColA", &["b", "a"])
            .numeric("numerator", &[0.0, 2.0])
            .numeric("denominator", &[1.0, 2.0])
            .build()
            .unwrap();

        let runner = TaskRunner::new(2).unwrap();
        let merged = merge_plain(&runner, &base, &map, "ColA", "ColA").unwrap();
        assert_eq!(merged.num_rows(), 4);
        assert_eq!(merged.names(), &["ColA", "x", "numerator", "denominator"]);
        let num = merged.column("numerator").unwrap();
        assert_eq!(num.at(0).unwrap(), 2.0);
        assert!(num.is_na(1).unwrap());
        assert_eq!(num.at(2).unwrap(), 0.0);
        assert_eq!(num.at(3).unwrap(), 2.0);
        assert_eq!(merged.column("x").unwrap().key(), base.column("x").unwrap().key());
    }

    #[test]
    fn test_merge_plain_and_fold_preserves_order() {
        let base = TableBuilder::new()
            .categorical("ColA", &["a", "b", "a"])
            .numeric("ColB", &[1.0, 1.0, 2.0])
            .build()
            .unwrap();
        let map = TableBuilder::new()
            .categorical("ColA", &["a", "b", "a"])
            .text("ColC", &["yes", "no", "yes"])
            .numeric("foldValueForMerge", &[1.0, 2.0, 2.0])
            .build()
            .unwrap();

        let merged = merge_plain_and_fold(
            &TaskRunner::sequential(),
            &base,
            &map,
            "ColA",
            "ColA",
            "ColB",
            "foldValueForMerge",
        )
        .unwrap();
        assert_eq!(merged.num_rows(), 3);
        assert_eq!(merged.names(), &["ColA", "ColB", "ColC"]);
        assert_eq!(label(&merged, "ColC", 0).as_deref(), Some("yes"));
        assert_eq!(label(&merged, "ColC", 1), None);
        assert_eq!(label(&merged, "ColC", 2).as_deref(), Some("yes"));
        assert_eq!(label(&merged, "ColA", 1).as_deref(), Some("b"));
    }

    #[test]
    fn test_categorical_folds_join_by_label() {
        let base = TableBuilder::new()
            .categorical("c", &["a", "a"])
            .categorical("fold", &["f2", "f1"])
            .build()
            .unwrap();
        let map = TableBuilder::new()
            .categorical("c", &["a"])
            .categorical("fold", &["f1"])
            .numeric("numerator", &[5.0])
            .build()
            .unwrap();
        let merged =
            merge_plain_and_fold(&TaskRunner::sequential(), &base, &map, "c", "c", "fold", "fold")
                .unwrap();
        let num = merged.column("numerator").unwrap();
        assert!(num.is_na(0).unwrap());
        assert_eq!(num.at(1).unwrap(), 5.0);
    }

    #[test]
    fn test_string_base_key() {
        let base = TableBuilder::new().text("c", &["b", "z"]).build().unwrap();
        let map = TableBuilder::new()
            .categorical("c", &["a", "b"])
            .numeric("v", &[1.0, 2.0])
            .build()
            .unwrap();
        let merged = merge_plain(&TaskRunner::sequential(), &base, &map, "c", "c").unwrap();
        let v = merged.column("v").unwrap();
        assert_eq!(v.at(0).unwrap(), 2.0);
        assert!(v.is_na(1).unwrap());
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let base = TableBuilder::new()
            .categorical("c", &["a"])
            .numeric("v", &[0.0])
            .build()
            .unwrap();
        let map = TableBuilder::new()
            .categorical("c", &["a"])
            .numeric("v", &[7.0])
            .build()
            .unwrap();
        let merged = merge_plain(&TaskRunner::sequential(), &base, &map, "c", "c").unwrap();
        assert_eq!(merged.names(), &["c", "v", "v_right"]);
        assert_eq!(merged.column("v_right").unwrap().at(0).unwrap(), 7.0);
    }

    #[test]
    fn test_duplicate_map_keys_rejected() {
        let base = TableBuilder::new().categorical("c", &["a"]).build().unwrap();
        let map = TableBuilder::new()
            .categorical("c", &["a", "a"])
            .numeric("v", &[1.0, 2.0])
            .build()
            .unwrap();
        assert!(merge_plain(&TaskRunner::sequential(), &base, &map, "c", "c").is_err());
    }

    #[test]
    fn test_mixed_fold_types_rejected() {
        let base = TableBuilder::new()
            .categorical("c", &["a"])
            .numeric("fold", &[1.0])
            .build()
            .unwrap();
        let map = TableBuilder::new()
            .categorical("c", &["a"])
            .categorical("fold", &["1"])
            .numeric("v", &[1.0])
            .build()
            .unwrap();
        assert!(
            merge_plain_and_fold(&TaskRunner::sequential(), &base, &map, "c", "c", "fold", "fold")
                .is_err()
        );
    }
}
