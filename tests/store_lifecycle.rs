//! Integration test: keyed store bookkeeping around encoding runs.
//!
//! Validates that:
//! - Encoding never binds intermediate tables in the store
//! - Published maps and scoped tables are fully released afterwards
//! - Columns shared between bindings survive until the last one goes
//! - Referenced columns cannot be removed out from under a table

use foldcast::store::StoreStats;
use foldcast::{
    Context, EncoderConfig, EncodingError, HoldoutType, Key, KeyedStore, Table, TableBuilder,
    TuningProfile,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn context() -> Context {
    let profile = TuningProfile {
        worker_threads: 2,
        rows_per_segment: 2,
        memory_pressure: 0.0,
    };
    Context::with_profile(EncoderConfig::default(), profile).unwrap()
}

fn training(ctx: &Context) -> Table {
    ctx.table_builder()
        .categorical("ColA", &["a", "b", "a", "c", "b"])
        .numeric("fold", &[1.0, 1.0, 2.0, 2.0, 1.0])
        .categorical("y", &["yes", "no", "no", "yes", "yes"])
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn encoding_leaves_store_empty() {
    let ctx = context();
    let t = training(&ctx);
    let encoder = ctx.encoder();
    let maps = encoder
        .prepare_encoding_map(&t, &["ColA".into()], "y", Some("fold".into()))
        .unwrap();
    encoder
        .apply_target_encoding(&t, "y", &maps, HoldoutType::KFold, Some("fold".into()), None)
        .unwrap();
    assert!(ctx.store().is_empty());
    assert_eq!(ctx.store().stats(), StoreStats::default());
}

#[test]
fn scope_releases_inputs_maps_and_outputs() {
    let ctx = context();
    {
        let mut scope = ctx.scope();
        let t = training(&ctx);
        scope.put_table(t.clone());

        let encoder = ctx.encoder();
        let maps = encoder.prepare_encoding_map(&t, &["ColA".into()], "y", None).unwrap();
        for key in maps.publish(ctx.store()) {
            scope.track(key);
        }
        let out = encoder
            .apply_target_encoding(&t, "y", &maps, HoldoutType::LeaveOneOut, None, None)
            .unwrap();
        scope.put_table(out);

        assert_eq!(ctx.store().stats().tables, 3);
        assert!(ctx.store().stats().columns > 0);
    }
    assert!(ctx.store().is_empty());
}

#[test]
fn kept_key_outlives_scope() {
    let ctx = context();
    let kept = {
        let mut scope = ctx.scope();
        let t = training(&ctx);
        let key = scope.put_table(t.derive());
        scope.put_table(t);
        scope.keep(key);
        key
    };
    let table = ctx.store().get_table(kept).unwrap();
    assert_eq!(table.num_rows(), 5);
    ctx.store().remove(kept).unwrap();
    assert!(ctx.store().is_empty());
}

#[test]
fn maps_release_is_idempotent() {
    let ctx = context();
    let t = training(&ctx);
    let maps = ctx
        .encoder()
        .prepare_encoding_map(&t, &["ColA".into()], "y", None)
        .unwrap();
    maps.publish(ctx.store());
    maps.release(ctx.store()).unwrap();
    maps.release(ctx.store()).unwrap();
    assert!(ctx.store().is_empty());
}

#[test]
fn shared_columns_survive_until_last_binding() {
    let store = KeyedStore::new();
    let t = TableBuilder::new()
        .with_rows_per_segment(2)
        .numeric("x", &[1.0, 2.0, 3.0])
        .build()
        .unwrap();
    let derived = t.derive();
    let column_key = t.columns()[0].key();

    store.put_table(t.clone());
    store.put_table(derived.clone());
    assert_eq!(store.holders(column_key), 2);
    let with_both = store.stats();

    store.remove(t.key()).unwrap();
    assert_eq!(store.holders(column_key), 1);
    assert_eq!(store.stats().columns, with_both.columns);
    assert!(store.get_column(column_key).is_ok());

    store.remove(derived.key()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn referenced_column_cannot_be_removed() {
    let store = KeyedStore::new();
    let t = TableBuilder::new().numeric("x", &[1.0]).build().unwrap();
    let column_key = t.columns()[0].key();
    store.put_table(t.clone());

    let err = store.remove(column_key).unwrap_err();
    assert!(matches!(err, EncodingError::KeyInUse { holders: 1, .. }));
    assert_eq!(err.code(), "KEY_IN_USE");

    let missing = store.remove(Key::named("never-bound")).unwrap_err();
    assert_eq!(missing.code(), "KEY_NOT_FOUND");

    store.remove(t.key()).unwrap();
    assert!(store.is_empty());
}
