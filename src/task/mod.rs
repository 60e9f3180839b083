//! Segment-parallel map-reduce over columns.
//!
//! Every task runs a per-segment function over identically partitioned
//! input columns on the runner's rayon pool. The three operation kinds are
//! distinct entry points on [`TaskRunner`]: reduce to an accumulator,
//! produce fresh output columns, or transform existing columns in place.

pub mod metrics;
pub mod resource;
pub mod runner;

use std::fmt;

pub use metrics::{MetricsSnapshot, TaskMetrics};
pub use resource::{ResourceManager, SystemResources, TuningProfile};
pub use runner::{OutputSpec, SegmentCtx, TaskRunner};

/// Operation kind of a map-reduce task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Read-only pass folding per-segment partials with an associative reducer.
    Reduce,
    /// Read-only inputs, freshly built output segments.
    Produce,
    /// Overwrites values of existing columns without changing row count.
    TransformInPlace,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Reduce => "reduce",
            TaskKind::Produce => "produce",
            TaskKind::TransformInPlace => "transform_in_place",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
