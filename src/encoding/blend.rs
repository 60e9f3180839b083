//! Blended encoding and seeded noise.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{EncodingError, Result};
use crate::frame::table::{ColumnRef, Table};
use crate::task::{OutputSpec, TaskRunner};

use super::params::{BlendingParams, NoiseSpec};

/// Odd 64-bit constant spreading row indices across the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Encoding of a category with `denominator` rows summing to `numerator`,
/// shrunk toward `global_mean` by the logistic weight of `params`.
///
/// An empty or missing category yields `global_mean` exactly.
pub fn blend(numerator: f64, denominator: f64, global_mean: f64, params: &BlendingParams) -> f64 {
    if denominator.is_nan() || numerator.is_nan() || denominator == 0.0 {
        return global_mean;
    }
    let lambda = params.lambda(denominator);
    (1.0 - lambda) * global_mean + lambda * (numerator / denominator)
}

/// Raw category mean, `global_mean` for empty or missing categories.
pub fn unblended(numerator: f64, denominator: f64, global_mean: f64) -> f64 {
    if denominator.is_nan() || numerator.is_nan() || denominator == 0.0 {
        return global_mean;
    }
    numerator / denominator
}

/// Append column `out_name` holding [`blend`] of every row.
pub fn blended_encoding(
    runner: &TaskRunner,
    table: &Table,
    numerator: impl Into<ColumnRef>,
    denominator: impl Into<ColumnRef>,
    global_mean: f64,
    params: &BlendingParams,
    out_name: &str,
) -> Result<Table> {
    let params = *params;
    encode_rows(runner, table, numerator, denominator, out_name, move |n, d| {
        blend(n, d, global_mean, &params)
    })
}

/// Append column `out_name` holding [`unblended`] of every row.
pub fn unblended_encoding(
    runner: &TaskRunner,
    table: &Table,
    numerator: impl Into<ColumnRef>,
    denominator: impl Into<ColumnRef>,
    global_mean: f64,
    out_name: &str,
) -> Result<Table> {
    encode_rows(runner, table, numerator, denominator, out_name, move |n, d| {
        unblended(n, d, global_mean)
    })
}

fn encode_rows<F>(
    runner: &TaskRunner,
    table: &Table,
    numerator: impl Into<ColumnRef>,
    denominator: impl Into<ColumnRef>,
    out_name: &str,
    encode: F,
) -> Result<Table>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    let num = table.column(numerator)?;
    let den = table.column(denominator)?;
    if !num.is_numeric() || !den.is_numeric() {
        return Err(EncodingError::invalid(
            "numerator and denominator must be numeric columns",
        ));
    }
    let encoded = runner.produce(
        "blended_encoding",
        &[num.as_ref(), den.as_ref()],
        &[OutputSpec::numeric(out_name)],
        |_, segs, outs| {
            for i in 0..segs[0].len() {
                outs[0].push_num(encode(segs[0].num(i), segs[1].num(i)))?;
            }
            Ok(())
        },
    )?;
    let mut out = table.derive();
    out.add_shared(out_name.to_string(), Arc::clone(&encoded.columns()[0]))?;
    Ok(out)
}

/// Perturb numeric `column` in place by uniform noise in
/// `[-noise.level, +noise.level]`. Each row's draw is seeded by
/// `(noise.seed, global row index)` alone, so equal inputs reproduce
/// bit-identical output however they are segmented. Missing rows stay missing.
pub fn add_noise(
    runner: &TaskRunner,
    table: &mut Table,
    column: impl Into<ColumnRef>,
    noise: NoiseSpec,
) -> Result<()> {
    let noise = NoiseSpec::new(noise.level, noise.seed)?;
    let idx = table.index_of(column)?;
    if !table.columns()[idx].is_numeric() {
        return Err(EncodingError::invalid(format!(
            "cannot add noise to {} column '{}'",
            table.columns()[idx].column_type(),
            table.names()[idx]
        )));
    }
    if noise.level == 0.0 {
        return Ok(());
    }
    runner.transform_in_place(
        "add_noise",
        table,
        &[ColumnRef::Index(idx)],
        &[],
        |ctx, segs, _| {
            let seg = &mut segs[0];
            for i in 0..seg.len() {
                if seg.is_na(i) {
                    continue;
                }
                let draw = row_draw(noise.seed, ctx.start_row + i as u64);
                let v = seg.num(i);
                seg.set_num(i, v + draw * noise.level)?;
            }
            Ok(())
        },
    )
}

/// Uniform draw in `[-1, 1)` for global `row` under `seed`.
fn row_draw(seed: u64, row: u64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed ^ row.wrapping_mul(SEED_STRIDE));
    rng.random::<f64>() * 2.0 - 1.0
}
