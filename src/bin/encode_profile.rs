//! Encode profile: wall time of target encoding at various table sizes.
//!
//! Builds synthetic tables (one categorical feature, a numeric fold column
//! and a binary target), then prepares and applies encodings with every
//! holdout strategy. Prints a timing table to stdout and the task metrics
//! of the last run to stderr.
//!
//! Run: cargo run --release --bin encode_profile [config-dir]

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context as _, Result};
use foldcast::{Context, EncoderConfig, HoldoutType, Table};

const CATEGORIES: usize = 50;
const FOLDS: usize = 5;

// ── Data generation ─────────────────────────────────────────────────

fn make_table(ctx: &Context, rows: usize) -> Result<Table> {
    let labels: Vec<String> = (0..rows).map(|i| format!("cat_{}", (i * 7) % CATEGORIES)).collect();
    let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
    let folds: Vec<f64> = (0..rows).map(|i| (i % FOLDS) as f64).collect();
    let target: Vec<&str> = (0..rows)
        .map(|i| if (i * 31 + i / 3) % 5 < 2 { "yes" } else { "no" })
        .collect();

    let table = ctx
        .table_builder()
        .categorical("feature", &label_refs)
        .numeric("fold", &folds)
        .categorical("target", &target)
        .build()?;
    Ok(table)
}

// ── Main ────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let ctx = match std::env::args().nth(1).map(PathBuf::from) {
        Some(dir) => Context::open(&dir).with_context(|| format!("loading config from {}", dir.display()))?,
        None => Context::new(EncoderConfig::default())?,
    };
    let noise = ctx.config().noise(42)?;
    let encoder = ctx.encoder();

    println!("foldcast encode profile");
    println!(
        "workers: {}  rows/segment: {}",
        ctx.runner().threads(),
        ctx.tuning().rows_per_segment
    );
    println!();
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:>12}",
        "Rows", "prepare ms", "none ms", "kfold ms", "loo ms"
    );
    println!("{:-<62}", "");

    for rows in [10_000, 100_000, 1_000_000] {
        let table = make_table(&ctx, rows)?;

        let start = Instant::now();
        let maps = encoder.prepare_encoding_map(&table, &["feature".into()], "target", Some("fold".into()))?;
        let prepare_ms = start.elapsed().as_millis();

        let mut timings = Vec::new();
        for holdout in [HoldoutType::None, HoldoutType::KFold, HoldoutType::LeaveOneOut] {
            let fold = (holdout == HoldoutType::KFold).then(|| "fold".into());
            let start = Instant::now();
            let encoded = encoder.apply_target_encoding(&table, "target", &maps, holdout, fold, noise)?;
            timings.push(start.elapsed().as_millis());
            anyhow::ensure!(encoded.num_rows() == table.num_rows(), "row count changed");
        }

        println!(
            "{:<10} {:>12} {:>12} {:>12} {:>12}",
            rows, prepare_ms, timings[0], timings[1], timings[2]
        );
    }

    let snapshot = ctx.runner().metrics().snapshot();
    eprintln!();
    eprintln!("=== Task metrics ===");
    eprintln!("Tasks: {} ({} failed)", snapshot.task_count(), snapshot.failed_count);
    eprintln!(
        "Reduce/produce/transform: {}/{}/{}",
        snapshot.reduce_count, snapshot.produce_count, snapshot.transform_count
    );
    eprintln!("Segments processed: {}", snapshot.segments_processed);
    eprintln!("Total task time: {}ms", snapshot.total_ms);
    for slow in &snapshot.slow_tasks {
        eprintln!("  slow: {} ({}) {}ms over {} segments", slow.name, slow.kind, slow.duration_ms, slow.segments);
    }
    Ok(())
}
