//! Columns: ordered sequences of segments addressed through an offset table.
//!
//! `offsets[i]` is the global row index of the first row of segment `i`;
//! the final entry is the row count. Global row lookup is a binary search
//! over the offset table.

use std::sync::Arc;

use crate::error::{EncodingError, Result};
use crate::frame::domain::Domain;
use crate::frame::segment::{ColumnType, Segment, SegmentBuilder};
use crate::store::Key;

/// One resolved cell. Categorical cells resolve to their domain label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Na,
    Num(f64),
    Label(&'a str),
}

impl<'a> Cell<'a> {
    pub fn is_na(&self) -> bool {
        matches!(self, Cell::Na)
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Cell::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&'a str> {
        match self {
            Cell::Label(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    key: Key,
    column_type: ColumnType,
    /// Present iff the column is categorical.
    domain: Option<Arc<Domain>>,
    segments: Vec<Arc<Segment>>,
    offsets: Vec<u64>,
}

impl Column {
    /// Assemble a column from segments, in order, under a fresh key.
    pub fn from_segments(
        column_type: ColumnType,
        domain: Option<Domain>,
        segments: Vec<Segment>,
    ) -> Result<Self> {
        Self::from_shared(
            column_type,
            domain.map(Arc::new),
            segments.into_iter().map(Arc::new).collect(),
        )
    }

    pub(crate) fn from_shared(
        column_type: ColumnType,
        domain: Option<Arc<Domain>>,
        segments: Vec<Arc<Segment>>,
    ) -> Result<Self> {
        match (column_type, &domain) {
            (ColumnType::Categorical, None) => {
                return Err(EncodingError::invalid("categorical column requires a domain"));
            }
            (ColumnType::Numeric | ColumnType::Text, Some(_)) => {
                return Err(EncodingError::invalid(format!(
                    "{} column cannot carry a domain",
                    column_type
                )));
            }
            _ => {}
        }
        for (i, seg) in segments.iter().enumerate() {
            if seg.column_type() != column_type {
                return Err(EncodingError::invalid(format!(
                    "segment {} is {} but column is {}",
                    i,
                    seg.column_type(),
                    column_type
                )));
            }
        }
        let offsets = crate::frame::planner::offsets_from_lengths(segments.iter().map(|s| s.len()));
        Ok(Self {
            key: Key::make(),
            column_type,
            domain,
            segments,
            offsets,
        })
    }

    /// Numeric column holding `value` in every row, partitioned by `offsets`.
    pub fn constant(value: f64, offsets: &[u64]) -> Result<Self> {
        let segments = offsets
            .windows(2)
            .map(|w| {
                let len = (w[1] - w[0]) as usize;
                let mut b = SegmentBuilder::with_capacity(ColumnType::Numeric, len);
                for _ in 0..len {
                    b.push_num(value)?;
                }
                Ok(b.finish())
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(ColumnType::Numeric, None, segments)
    }

    // -- Identity -------------------------------------------------------------

    pub fn key(&self) -> Key {
        self.key
    }

    pub(crate) fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    /// Store key of segment `i` of this column.
    pub fn segment_key(&self, i: usize) -> Key {
        Key::derive(self.key, i)
    }

    // -- Type -----------------------------------------------------------------

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_numeric(&self) -> bool {
        self.column_type == ColumnType::Numeric
    }

    pub fn is_categorical(&self) -> bool {
        self.column_type == ColumnType::Categorical
    }

    pub fn is_string(&self) -> bool {
        self.column_type == ColumnType::Text
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.domain.as_deref()
    }

    pub(crate) fn shared_domain(&self) -> Option<Arc<Domain>> {
        self.domain.clone()
    }

    /// Number of levels for categorical columns.
    pub fn cardinality(&self) -> Option<usize> {
        self.domain.as_ref().map(|d| d.len())
    }

    /// Two-level categorical, or numeric with only 0/1 non-missing values.
    pub fn is_binary(&self) -> bool {
        match self.column_type {
            ColumnType::Categorical => self.cardinality().is_some_and(|c| c <= 2),
            ColumnType::Numeric => self.segments.iter().all(|seg| {
                (0..seg.len()).all(|i| seg.is_na(i) || seg.num(i) == 0.0 || seg.num(i) == 1.0)
            }),
            ColumnType::Text => false,
        }
    }

    // -- Layout ---------------------------------------------------------------

    /// Total row count.
    pub fn len(&self) -> u64 {
        *self.offsets.last().unwrap_or(&0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, i: usize) -> &Segment {
        &self.segments[i]
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    pub(crate) fn replace_segment(&mut self, i: usize, segment: Segment) {
        self.segments[i] = Arc::new(segment);
    }

    pub fn same_layout(&self, other: &Column) -> bool {
        self.offsets == other.offsets
    }

    pub fn na_count(&self) -> usize {
        self.segments.iter().map(|s| s.na_count()).sum()
    }

    // -- Row access -----------------------------------------------------------

    /// Resolve a global row index to (segment index, row within segment).
    pub fn locate(&self, row: i64) -> Result<(usize, usize)> {
        let len = self.len();
        if row < 0 || row as u64 >= len {
            return Err(EncodingError::RowOutOfRange { row, len });
        }
        let row = row as u64;
        let seg = self.offsets.partition_point(|&o| o <= row) - 1;
        Ok((seg, (row - self.offsets[seg]) as usize))
    }

    /// Numeric value at `row`; NaN when missing.
    pub fn at(&self, row: i64) -> Result<f64> {
        let (seg, i) = self.locate(row)?;
        Ok(self.segments[seg].num(i))
    }

    pub fn is_na(&self, row: i64) -> Result<bool> {
        let (seg, i) = self.locate(row)?;
        Ok(self.segments[seg].is_na(i))
    }

    pub fn cell(&self, row: i64) -> Result<Cell<'_>> {
        let (seg, i) = self.locate(row)?;
        Ok(self.cell_in(&self.segments[seg], i))
    }

    /// Resolve row `i` of `segment`, which must belong to this column
    /// (or share its type and domain).
    pub fn cell_in<'a>(&'a self, segment: &'a Segment, i: usize) -> Cell<'a> {
        if segment.is_na(i) {
            return Cell::Na;
        }
        match self.column_type {
            ColumnType::Numeric => Cell::Num(segment.num(i)),
            ColumnType::Categorical => match (segment.code(i), self.domain()) {
                (Some(code), Some(domain)) => domain.label(code).map_or(Cell::Na, Cell::Label),
                _ => Cell::Na,
            },
            ColumnType::Text => segment.text(i).map_or(Cell::Na, Cell::Label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_segment(values: &[f64]) -> Segment {
        let mut b = SegmentBuilder::new(ColumnType::Numeric);
        for &v in values {
            b.push_num(v).unwrap();
        }
        b.finish()
    }

    fn two_segment_column() -> Column {
        Column::from_segments(
            ColumnType::Numeric,
            None,
            vec![numeric_segment(&[1.0, 2.0]), numeric_segment(&[3.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let col = two_segment_column();
        assert_eq!(col.offsets(), &[0, 2, 3]);
        assert_eq!(col.len(), 3);
        assert_eq!(col.segment_count(), 2);
    }

    #[test]
    fn test_at_resolves_across_segments() {
        let col = two_segment_column();
        assert_eq!(col.at(0).unwrap(), 1.0);
        assert_eq!(col.at(1).unwrap(), 2.0);
        assert_eq!(col.at(2).unwrap(), 3.0);
        assert_eq!(col.locate(2).unwrap(), (1, 0));
    }

    #[test]
    fn test_out_of_range_rows_are_rejected() {
        let col = two_segment_column();
        assert!(matches!(
            col.at(-1),
            Err(EncodingError::RowOutOfRange { row: -1, len: 3 })
        ));
        assert!(matches!(col.at(3), Err(EncodingError::RowOutOfRange { .. })));
    }

    #[test]
    fn test_locate_skips_empty_segments() {
        let col = Column::from_segments(
            ColumnType::Numeric,
            None,
            vec![numeric_segment(&[1.0]), numeric_segment(&[]), numeric_segment(&[9.0])],
        )
        .unwrap();
        assert_eq!(col.locate(1).unwrap(), (2, 0));
        assert_eq!(col.at(1).unwrap(), 9.0);
    }

    #[test]
    fn test_categorical_requires_domain() {
        let mut b = SegmentBuilder::new(ColumnType::Categorical);
        b.push_code(0).unwrap();
        let err = Column::from_segments(ColumnType::Categorical, None, vec![b.finish()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_cell_resolves_labels() {
        let mut b = SegmentBuilder::new(ColumnType::Categorical);
        b.push_code(1).unwrap();
        b.push_na();
        let col = Column::from_segments(
            ColumnType::Categorical,
            Some(Domain::from_labels(["NO", "YES"])),
            vec![b.finish()],
        )
        .unwrap();
        assert_eq!(col.cell(0).unwrap(), Cell::Label("YES"));
        assert!(col.cell(1).unwrap().is_na());
        assert!(col.is_binary());
        assert_eq!(col.cardinality(), Some(2));
    }

    #[test]
    fn test_is_binary_numeric() {
        let binary = Column::from_segments(
            ColumnType::Numeric,
            None,
            vec![numeric_segment(&[0.0, 1.0, f64::NAN])],
        )
        .unwrap();
        assert!(binary.is_binary());

        let fractional = Column::from_segments(
            ColumnType::Numeric,
            None,
            vec![numeric_segment(&[0.0, 0.5, 1.0])],
        )
        .unwrap();
        assert!(!fractional.is_binary());
    }

    #[test]
    fn test_constant_matches_layout() {
        let col = Column::constant(1.0, &[0, 2, 5]).unwrap();
        assert_eq!(col.offsets(), &[0, 2, 5]);
        assert_eq!(col.at(4).unwrap(), 1.0);
    }
}
