//! Column/table model: segments, categorical domains, segmented columns and
//! identically partitioned tables.

pub mod builder;
pub mod column;
pub mod domain;
pub mod ops;
pub mod planner;
pub mod segment;
pub mod table;

pub use builder::TableBuilder;
pub use column::{Cell, Column};
pub use domain::Domain;
pub use planner::SegmentPlanner;
pub use segment::{ColumnType, Segment, SegmentBuilder, SegmentValues};
pub use table::{ColumnRef, Table};
