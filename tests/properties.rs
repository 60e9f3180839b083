//! Property tests: invariants of domains, aggregation, blending and noise
//! over randomly generated tables.

use foldcast::encoding::encoder::{DENOMINATOR, NUMERATOR};
use foldcast::encoding::{
    add_noise, blend, global_mean, group_by_and_sum, BlendingParams, NoiseSpec, TargetEncoder,
};
use foldcast::frame::ops::filter_by_label;
use foldcast::frame::Domain;
use foldcast::{Table, TableBuilder, TaskRunner};
use proptest::prelude::*;

const LABELS: [&str; 5] = ["e", "a", "d", "b", "c"];

fn table(cats: &[usize], values: &[f64], rows_per_segment: usize) -> Table {
    let labels: Vec<&str> = cats.iter().map(|&c| LABELS[c]).collect();
    TableBuilder::new()
        .with_rows_per_segment(rows_per_segment)
        .categorical("cat", &labels)
        .numeric("v", values)
        .build()
        .unwrap()
}

fn rows() -> impl Strategy<Value = (Vec<usize>, Vec<f64>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            proptest::collection::vec(0usize..LABELS.len(), n),
            proptest::collection::vec(-100i32..100, n)
                .prop_map(|v| v.into_iter().map(f64::from).collect()),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn domain_ignores_label_order(labels in proptest::collection::vec("[a-f]{1,3}", 0..20)) {
        let forward = Domain::from_labels(&labels);
        let backward = Domain::from_labels(labels.iter().rev());
        prop_assert_eq!(&forward, &backward);
        let mut sorted = forward.labels().to_vec();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(forward.labels(), sorted.as_slice());
    }

    #[test]
    fn group_sums_conserve_total((cats, values) in rows(), rows_per_segment in 1usize..16) {
        let t = table(&cats, &values, rows_per_segment);
        let runner = TaskRunner::new(3).unwrap();
        let grouped = group_by_and_sum(&runner, &t, "cat", None, &["v".into()]).unwrap();

        let sums = grouped.column("sum_v").unwrap();
        let total: f64 = (0..sums.len() as i64).map(|r| sums.at(r).unwrap()).sum();
        let expected: f64 = values.iter().sum();
        prop_assert!((total - expected).abs() < 1e-6);

        let mut distinct = cats.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(grouped.num_rows(), distinct.len() as u64);
    }

    #[test]
    fn filter_keeps_exactly_matching_rows((cats, values) in rows(), rows_per_segment in 1usize..16) {
        let t = table(&cats, &values, rows_per_segment);
        let runner = TaskRunner::new(2).unwrap();
        let kept = filter_by_label(&runner, &t, "cat", "a").unwrap();
        let expected: Vec<f64> = cats
            .iter()
            .zip(&values)
            .filter(|(c, _)| LABELS[**c] == "a")
            .map(|(_, &v)| v)
            .collect();
        let v = kept.column("v").unwrap();
        let actual: Vec<f64> = (0..v.len() as i64).map(|r| v.at(r).unwrap()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn blend_lies_between_means(
        numerator in 0u32..500,
        extra in 0u32..500,
        global_mean in 0.0f64..1.0,
        k in 0.0f64..50.0,
        f in 0.1f64..30.0,
    ) {
        let denominator = f64::from(numerator + extra);
        let numerator = f64::from(numerator);
        let params = BlendingParams::new(k, f).unwrap();
        let value = blend(numerator, denominator, global_mean, &params);
        if denominator == 0.0 {
            prop_assert_eq!(value, global_mean);
        } else {
            let mean = numerator / denominator;
            let lo = mean.min(global_mean) - 1e-12;
            let hi = mean.max(global_mean) + 1e-12;
            prop_assert!(value >= lo && value <= hi);
        }
    }

    #[test]
    fn noise_is_bounded_and_reproducible(
        (cats, values) in rows(),
        rows_per_segment in 1usize..16,
        other_rows_per_segment in 1usize..16,
        seed in any::<u64>(),
        level in 0.0f64..1.0,
    ) {
        let spec = NoiseSpec::new(level, seed).unwrap();
        let mut a = table(&cats, &values, rows_per_segment);
        let mut b = table(&cats, &values, other_rows_per_segment);
        add_noise(&TaskRunner::new(2).unwrap(), &mut a, "v", spec).unwrap();
        add_noise(&TaskRunner::sequential(), &mut b, "v", spec).unwrap();

        let (va, vb) = (a.column("v").unwrap(), b.column("v").unwrap());
        for (row, original) in values.iter().enumerate() {
            let x = va.at(row as i64).unwrap();
            prop_assert_eq!(x.to_bits(), vb.at(row as i64).unwrap().to_bits());
            prop_assert!((x - original).abs() <= level + 1e-9);
        }
    }

    #[test]
    fn map_global_mean_is_target_mean((cats, values) in rows(), rows_per_segment in 1usize..16) {
        let t = table(&cats, &values, rows_per_segment);
        let runner = TaskRunner::new(2).unwrap();
        let maps = TargetEncoder::new(&runner)
            .prepare_encoding_map(&t, &["cat".into()], "v", None)
            .unwrap();
        let map = maps.get("cat").unwrap();
        let gm = global_mean(&runner, map.table(), NUMERATOR, DENOMINATOR).unwrap();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        prop_assert!((gm - expected).abs() < 1e-9);
    }

    #[test]
    fn blend_converges_to_category_mean(rate in 0.0f64..1.0, global_mean in 0.0f64..1.0) {
        let params = BlendingParams::default();
        let denominator = 1.0e6;
        let value = blend(rate * denominator, denominator, global_mean, &params);
        prop_assert!((value - rate).abs() < 1e-9);
    }
}
