//! Target encoding: replace each category by a (blended) mean of the target
//! over the rows of that category, optionally out-of-fold.

pub mod aggregate;
pub mod blend;
pub mod encoder;
pub mod merge;
pub mod params;
pub mod prepare;

pub use aggregate::{global_mean, group_by_and_sum, sum_and_count, FoldValue};
pub use blend::{add_noise, blend, blended_encoding, unblended, unblended_encoding};
pub use encoder::{EncodingMap, EncodingMaps, TargetEncoder};
pub use merge::{merge_plain, merge_plain_and_fold};
pub use params::{BlendingParams, HoldoutType, NoiseSpec};
pub use prepare::{
    ensure_binary_or_numeric, filter_out_missing_target, impute_numeric_mean,
    transform_binary_target,
};
