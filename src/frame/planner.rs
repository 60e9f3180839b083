//! Deterministic row partitioning into segments.
//!
//! Maps a row count to a cumulative offset table (`offsets[0] = 0`,
//! `offsets[i + 1] = offsets[i] + len(segment i)`). Every segment except
//! possibly the last holds exactly `rows_per_segment` rows, so the same row
//! count always yields the same boundaries.

/// Deterministic segment planner: row count -> offset table.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPlanner {
    rows_per_segment: usize,
}

impl SegmentPlanner {
    /// Create a planner producing segments of `rows_per_segment` rows.
    ///
    /// # Panics
    ///
    /// Panics if `rows_per_segment` is 0.
    pub fn new(rows_per_segment: usize) -> Self {
        assert!(rows_per_segment > 0, "rows_per_segment must be > 0");
        Self { rows_per_segment }
    }

    pub fn rows_per_segment(&self) -> usize {
        self.rows_per_segment
    }

    /// Number of segments needed for `total_rows` rows.
    pub fn segment_count(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.rows_per_segment)
    }

    /// Offset table for `total_rows` rows. Zero rows yields `[0]`.
    pub fn plan(&self, total_rows: usize) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(self.segment_count(total_rows) + 1);
        offsets.push(0u64);
        let mut start = 0usize;
        while start < total_rows {
            let end = (start + self.rows_per_segment).min(total_rows);
            offsets.push(end as u64);
            start = end;
        }
        offsets
    }

    /// Row ranges `[start, end)` of each planned segment.
    pub fn ranges(&self, total_rows: usize) -> Vec<std::ops::Range<usize>> {
        self.plan(total_rows)
            .windows(2)
            .map(|w| w[0] as usize..w[1] as usize)
            .collect()
    }
}

/// Offset table for already-materialized segment lengths.
pub fn offsets_from_lengths<I: IntoIterator<Item = usize>>(lengths: I) -> Vec<u64> {
    let mut offsets = vec![0u64];
    let mut acc = 0u64;
    for len in lengths {
        acc += len as u64;
        offsets.push(acc);
    }
    offsets
}
