//! foldcast - segmented columnar tables with out-of-fold target encoding
//!
//! Tables are split into row segments that map-reduce tasks process in
//! parallel. Objects live in a [`KeyedStore`] under stable [`Key`]s. The
//! [`encoding`] module builds per-category target statistics and applies
//! them with k-fold or leave-one-out holdout.

pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod store;
pub mod task;

pub use config::EncoderConfig;
pub use context::Context;
pub use encoding::{BlendingParams, EncodingMap, EncodingMaps, HoldoutType, NoiseSpec, TargetEncoder};
pub use error::{EncodingError, Result};
pub use frame::{Column, ColumnRef, ColumnType, Table, TableBuilder};
pub use store::{Key, KeyedStore, Scope};
pub use task::{TaskRunner, TuningProfile};
