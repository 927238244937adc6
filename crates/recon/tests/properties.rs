use proptest::prelude::*;
use serde_json::json;

use kpi_recon::config::CheckConfig;
use kpi_recon::engine::run;
use kpi_recon::migrate::migrate_collection;
use kpi_recon::model::Snapshot;

const CODES: [&str; 3] = ["a", "b", "c"];

fn formula_strategy() -> impl Strategy<Value = String> {
    let atom = prop_oneof![
        prop::sample::select(CODES.to_vec()).prop_map(str::to_string),
        (0u32..200).prop_map(|n| n.to_string()),
        Just("100".to_string()),
    ];
    let op = prop::sample::select(vec!["+", "-", "*", "/"]);
    (atom.clone(), prop::collection::vec((op, atom), 0..5)).prop_map(|(first, rest)| {
        rest.into_iter().fold(first, |acc, (op, atom)| format!("{acc} {op} {atom}"))
    })
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    let period = (
        prop::option::of(-1000.0f64..1000.0),
        prop::collection::vec((0usize..3, -50.0f64..50.0), 0..3),
    );
    let entity = (
        prop::option::of(formula_strategy()),
        prop::collection::vec(period, 0..4),
        any::<bool>(),
    );
    prop::collection::vec(entity, 0..8).prop_map(|entities| {
        let entities: Vec<serde_json::Value> = entities
            .into_iter()
            .enumerate()
            .map(|(i, (formula, periods, deleted))| {
                let periods: Vec<serde_json::Value> = periods
                    .into_iter()
                    .enumerate()
                    .map(|(j, (calculated, values))| {
                        let values: Vec<serde_json::Value> = values
                            .into_iter()
                            .map(|(var, value)| json!({"variable_id": format!("v{var}"), "value": value}))
                            .collect();
                        json!({
                            "id": format!("p{j}"),
                            "start": "2025-01-01T00:00:00Z",
                            "end": "2025-04-01T00:00:00Z",
                            "calculated_value": calculated,
                            "values": values,
                        })
                    })
                    .collect();
                json!({
                    "key": format!("kpi-{i}"),
                    "formula": formula,
                    "deleted_at": deleted.then_some("2025-06-01T00:00:00Z"),
                    "variables": [
                        {"id": "v0", "code": "a"},
                        {"id": "v1", "code": "b"},
                        {"id": "v2", "code": "c"},
                    ],
                    "periods": periods,
                })
            })
            .collect();
        Snapshot::from_json(&json!({ "entities": entities }).to_string()).unwrap()
    })
}

proptest! {
    #[test]
    fn parallel_and_sequential_batches_agree(snapshot in snapshot_strategy()) {
        let mut sequential = CheckConfig::default();
        sequential.batch.parallel = false;

        let a = run(&CheckConfig::default(), &snapshot);
        let b = run(&sequential, &snapshot);
        prop_assert_eq!(a.rows, b.rows);
        prop_assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn summary_buckets_cover_every_row(snapshot in snapshot_strategy()) {
        let s = run(&CheckConfig::default(), &snapshot).summary;
        prop_assert_eq!(
            s.consistent + s.mismatch + s.missing_inputs + s.no_formula + s.errored,
            s.total_rows
        );
        prop_assert_eq!(s.entities_checked + s.entities_skipped_deleted, snapshot.entities.len());
    }

    #[test]
    fn migration_is_idempotent(
        formulas in prop::collection::vec(formula_strategy(), 1..6),
        unit in prop::sample::select(vec!["%", "percent", "SAR", ""]),
    ) {
        let entities: Vec<serde_json::Value> = formulas
            .iter()
            .enumerate()
            .map(|(i, f)| json!({"key": format!("k{i}"), "formula": f, "unit": unit}))
            .collect();
        let mut doc = serde_json::Value::Array(entities);

        let first = migrate_collection(&mut doc).unwrap();
        if unit == "SAR" || unit.is_empty() {
            prop_assert!(first.changed.is_empty());
        }
        let once = doc.clone();

        let second = migrate_collection(&mut doc).unwrap();
        prop_assert!(second.changed.is_empty());
        prop_assert_eq!(doc, once);
    }
}
