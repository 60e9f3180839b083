//! Map-reduce task runner.
//!
//! Per-segment work fans out over a dedicated rayon pool; results are
//! collected in segment order, so output row `i` always corresponds to input
//! row `i` and reductions fold deterministically. A failing segment fails
//! the whole task: nothing the task built is returned, and in-place
//! transforms only swap their staged segments in once every segment has
//! succeeded.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::error::{EncodingError, Result};
use crate::frame::column::Column;
use crate::frame::domain::Domain;
use crate::frame::segment::{ColumnType, Segment, SegmentBuilder};
use crate::frame::table::{ColumnRef, Table};
use crate::store::Key;
use crate::task::metrics::TaskMetrics;
use crate::task::resource::ResourceManager;
use crate::task::TaskKind;

/// Position of the segment a per-segment function is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCtx {
    pub index: usize,
    /// Global row index of the segment's first row.
    pub start_row: u64,
}

/// Declared shape of one output column of a producing task.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub domain: Option<Arc<Domain>>,
}

impl OutputSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Numeric,
            domain: None,
        }
    }

    pub fn categorical(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Categorical,
            domain: Some(Arc::new(domain)),
        }
    }

    /// Same type and domain as `column`.
    pub fn like(name: impl Into<String>, column: &Column) -> Self {
        Self {
            name: name.into(),
            column_type: column.column_type(),
            domain: column.shared_domain(),
        }
    }
}

pub struct TaskRunner {
    pool: Option<Arc<rayon::ThreadPool>>,
    threads: usize,
    metrics: Arc<TaskMetrics>,
}

impl TaskRunner {
    /// Runner with `threads` workers. One thread runs every task inline.
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_metrics(threads, Arc::new(TaskMetrics::new()))
    }

    pub fn with_metrics(threads: usize, metrics: Arc<TaskMetrics>) -> Result<Self> {
        let threads = threads.max(1);
        let pool = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("foldcast-worker-{}", i))
                .build()
                .map_err(|e| EncodingError::Runtime(format!("thread pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };
        Ok(Self {
            pool,
            threads,
            metrics,
        })
    }

    /// Runner sized from the probed system resources.
    pub fn auto() -> Result<Self> {
        Self::new(ResourceManager::auto_tune().worker_threads)
    }

    pub fn sequential() -> Self {
        Self {
            pool: None,
            threads: 1,
            metrics: Arc::new(TaskMetrics::new()),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn metrics(&self) -> &Arc<TaskMetrics> {
        &self.metrics
    }

    // ── Reduce ──────────────────────────────────────────────────────

    /// Run `map` over every segment of `columns` and fold the partial results
    /// with `combine`, starting from `identity`. `combine` must be
    /// associative; partials are folded in segment order.
    pub fn reduce<A, M, C>(
        &self,
        name: &str,
        columns: &[&Column],
        identity: A,
        map: M,
        combine: C,
    ) -> Result<A>
    where
        A: Send,
        M: Fn(SegmentCtx, &[&Segment]) -> Result<A> + Sync,
        C: Fn(A, A) -> A,
    {
        let offsets = common_offsets(name, columns)?;
        let count = offsets.len() - 1;
        self.timed(name, TaskKind::Reduce, count, || {
            let partials = self.run_segments(name, count, |i| {
                let inputs: Vec<&Segment> = columns.iter().map(|c| c.segment(i)).collect();
                map(ctx(offsets, i), &inputs)
            })?;
            Ok(partials.into_iter().fold(identity, combine))
        })
    }

    // ── Produce ─────────────────────────────────────────────────────

    /// Run `map` over every segment of `columns`, appending to one fresh
    /// builder per entry of `outputs`. The finished segments are assembled,
    /// in segment order, into a new table under a fresh key. Every output
    /// must receive the same number of rows within a segment.
    pub fn produce<M>(
        &self,
        name: &str,
        columns: &[&Column],
        outputs: &[OutputSpec],
        map: M,
    ) -> Result<Table>
    where
        M: Fn(SegmentCtx, &[&Segment], &mut [SegmentBuilder]) -> Result<()> + Sync,
    {
        if outputs.is_empty() {
            return Err(EncodingError::invalid(format!(
                "task '{}' declares no output columns",
                name
            )));
        }
        let offsets = common_offsets(name, columns)?;
        let count = offsets.len() - 1;
        self.timed(name, TaskKind::Produce, count, || {
            let produced = self.run_segments(name, count, |i| {
                let inputs: Vec<&Segment> = columns.iter().map(|c| c.segment(i)).collect();
                let hint = inputs.first().map_or(0, |s| s.len());
                let mut builders: Vec<SegmentBuilder> = outputs
                    .iter()
                    .map(|o| SegmentBuilder::with_capacity(o.column_type, hint))
                    .collect();
                map(ctx(offsets, i), &inputs, &mut builders)?;

                let rows = builders[0].len();
                if let Some(pos) = builders.iter().position(|b| b.len() != rows) {
                    return Err(EncodingError::LayoutMismatch(format!(
                        "output '{}' received {} rows, output '{}' received {}",
                        outputs[pos].name,
                        builders[pos].len(),
                        outputs[0].name,
                        rows
                    )));
                }
                Ok(builders.into_iter().map(SegmentBuilder::finish).collect::<Vec<_>>())
            })?;

            let mut per_output: Vec<Vec<Arc<Segment>>> =
                outputs.iter().map(|_| Vec::with_capacity(count)).collect();
            for segments in produced {
                for (slot, seg) in per_output.iter_mut().zip(segments) {
                    slot.push(Arc::new(seg));
                }
            }

            let mut names = Vec::with_capacity(outputs.len());
            let mut built = Vec::with_capacity(outputs.len());
            for (spec, segments) in outputs.iter().zip(per_output) {
                names.push(spec.name.clone());
                built.push(Arc::new(Column::from_shared(
                    spec.column_type,
                    spec.domain.clone(),
                    segments,
                )?));
            }
            Table::from_shared(names, built)
        })
    }

    // ── Transform in place ──────────────────────────────────────────

    /// Overwrite values of the `targets` columns of `table`, segment by
    /// segment. `map` receives staged copies of the target segments and
    /// read-only `inputs` segments; row count and type must not change.
    /// Targets shared with other holders are copied first and get a fresh
    /// key, so other holders keep seeing the old values.
    pub fn transform_in_place<M>(
        &self,
        name: &str,
        table: &mut Table,
        targets: &[ColumnRef],
        inputs: &[ColumnRef],
        map: M,
    ) -> Result<()>
    where
        M: Fn(SegmentCtx, &mut [Segment], &[&Segment]) -> Result<()> + Sync,
    {
        let target_idx = targets
            .iter()
            .map(|t| table.index_of(t))
            .collect::<Result<Vec<_>>>()?;
        for (i, idx) in target_idx.iter().enumerate() {
            if target_idx[..i].contains(idx) {
                return Err(EncodingError::invalid(format!(
                    "task '{}' names column '{}' twice",
                    name,
                    table.name_of(*idx).unwrap_or_default()
                )));
            }
        }
        let input_idx = inputs
            .iter()
            .map(|t| table.index_of(t))
            .collect::<Result<Vec<_>>>()?;

        let count = table.segment_count();
        let staged = {
            let target_cols: Vec<&Column> =
                target_idx.iter().map(|&i| table.columns()[i].as_ref()).collect();
            let input_cols: Vec<&Column> =
                input_idx.iter().map(|&i| table.columns()[i].as_ref()).collect();
            let offsets = table.offsets();

            self.timed(name, TaskKind::TransformInPlace, count, || {
                self.run_segments(name, count, |i| {
                    let mut working: Vec<Segment> =
                        target_cols.iter().map(|c| c.segment(i).clone()).collect();
                    let read: Vec<&Segment> = input_cols.iter().map(|c| c.segment(i)).collect();
                    map(ctx(offsets, i), &mut working, &read)?;

                    for (seg, col) in working.iter().zip(&target_cols) {
                        let original = col.segment(i);
                        if seg.len() != original.len() || seg.column_type() != original.column_type() {
                            return Err(EncodingError::LayoutMismatch(format!(
                                "in-place transform changed a {} segment of {} rows into a {} segment of {} rows",
                                original.column_type(),
                                original.len(),
                                seg.column_type(),
                                seg.len()
                            )));
                        }
                    }
                    Ok(working)
                })
            })?
        };

        let mut per_target: Vec<Vec<Segment>> =
            target_idx.iter().map(|_| Vec::with_capacity(count)).collect();
        for segments in staged {
            for (slot, seg) in per_target.iter_mut().zip(segments) {
                slot.push(seg);
            }
        }

        let columns = table.columns_mut();
        for (&idx, segments) in target_idx.iter().zip(per_target) {
            let shared = Arc::get_mut(&mut columns[idx]).is_none();
            let column = Arc::make_mut(&mut columns[idx]);
            if shared {
                column.set_key(Key::make());
            }
            for (i, seg) in segments.into_iter().enumerate() {
                column.replace_segment(i, seg);
            }
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn timed<T>(
        &self,
        name: &str,
        kind: TaskKind,
        segments: usize,
        run: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = run();
        let elapsed = start.elapsed();
        self.metrics.record_task(
            name,
            kind,
            segments,
            elapsed.as_millis() as u64,
            result.is_ok(),
        );
        match &result {
            Ok(_) => tracing::debug!(
                task = name,
                kind = kind.as_str(),
                segments,
                elapsed_us = elapsed.as_micros() as u64,
                "task completed"
            ),
            Err(e) => tracing::debug!(task = name, kind = kind.as_str(), error = %e, "task failed"),
        }
        result
    }

    /// Run `f` for every segment index and collect the results in order.
    /// The first failing segment (lowest index) fails the task.
    fn run_segments<T, F>(&self, name: &str, count: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let results: Vec<Result<T>> = match &self.pool {
            Some(pool) if count > 1 => pool.install(|| (0..count).into_par_iter().map(&f).collect()),
            _ => (0..count).map(&f).collect(),
        };

        let mut out = Vec::with_capacity(count);
        for (segment, result) in results.into_iter().enumerate() {
            match result {
                Ok(v) => out.push(v),
                Err(source) => {
                    return Err(EncodingError::TaskFailed {
                        task: name.to_string(),
                        segment,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(out)
    }
}

fn ctx(offsets: &[u64], index: usize) -> SegmentCtx {
    SegmentCtx {
        index,
        start_row: offsets[index],
    }
}

/// Shared offset table of `columns`; every input must be partitioned alike.
fn common_offsets<'a>(name: &str, columns: &[&'a Column]) -> Result<&'a [u64]> {
    let first = columns.first().ok_or_else(|| {
        EncodingError::invalid(format!("task '{}' needs at least one input column", name))
    })?;
    for col in &columns[1..] {
        if !col.same_layout(first) {
            return Err(EncodingError::LayoutMismatch(format!(
                "task '{}' inputs {} and {} are partitioned differently",
                name,
                first.key(),
                col.key()
            )));
        }
    }
    Ok(first.offsets())
}
