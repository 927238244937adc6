use kpi_engine::{parse, unresolved_codes, EvalError, EvalOptions, Expr};
use rayon::prelude::*;

use crate::classify::{check_parsed, values_by_code, ReconciliationResult};
use crate::config::{CheckConfig, ToleranceConfig};
use crate::evidence::compute_summary;
use crate::model::{BatchMeta, BatchReport, BatchRow, Entity, RowOutcome, Snapshot, ValuePeriod};

/// One unit of batch work. Formulas are parsed once per entity and shared.
struct Job<'a> {
    entity: &'a Entity,
    period: Option<&'a ValuePeriod>,
    formula: Option<&'a Result<Expr, EvalError>>,
}

/// Check every period of every entity in the snapshot.
///
/// Rows come back in snapshot order whether or not the batch runs in parallel.
/// A failing (entity, period) pair becomes an `Errored` row; the run continues.
pub fn run(config: &CheckConfig, snapshot: &Snapshot) -> BatchReport {
    let include_deleted = config.batch.include_deleted;
    let (entities, skipped): (Vec<&Entity>, Vec<&Entity>) = snapshot
        .entities
        .iter()
        .partition(|e| include_deleted || !e.is_deleted());

    for e in &skipped {
        log::debug!("{}: deleted, skipped", e.key);
    }

    let parsed: Vec<(&Entity, Option<Result<Expr, EvalError>>)> = entities
        .iter()
        .map(|e| (*e, e.formula().map(parse)))
        .collect();

    let mut jobs = Vec::new();
    for (entity, formula) in &parsed {
        let entity: &Entity = entity;
        match formula {
            None => jobs.push(Job { entity, period: None, formula: None }),
            Some(formula) => {
                if entity.periods.is_empty() {
                    log::debug!("{}: formula but no periods, nothing to check", entity.key);
                }
                for period in &entity.periods {
                    jobs.push(Job { entity, period: Some(period), formula: Some(formula) });
                }
            }
        }
    }

    let tolerance = config.tolerance;
    let options = config.evaluation.options();
    let rows: Vec<BatchRow> = if config.batch.parallel {
        jobs.par_iter().map(|job| run_job(job, &tolerance, options)).collect()
    } else {
        jobs.iter().map(|job| run_job(job, &tolerance, options)).collect()
    };

    let mut summary = compute_summary(&rows);
    summary.entities_checked = entities.len();
    summary.entities_skipped_deleted = skipped.len();

    log::info!(
        "checked {} entities ({} rows): {} consistent, {} mismatch, {} missing inputs, {} no formula, {} errored",
        summary.entities_checked,
        summary.total_rows,
        summary.consistent,
        summary.mismatch,
        summary.missing_inputs,
        summary.no_formula,
        summary.errored,
    );

    BatchReport {
        meta: BatchMeta {
            config_name: config.display_name().to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            parallel: config.batch.parallel,
        },
        summary,
        rows,
    }
}

fn run_job(job: &Job<'_>, tolerance: &ToleranceConfig, options: EvalOptions) -> BatchRow {
    let entity = job.entity;
    let mut unresolved = Vec::new();

    let outcome = match (job.period, job.formula) {
        (Some(period), Some(formula)) => {
            if period.calculated_value.is_none() {
                log::warn!(
                    "{} / {}: no stored calculated value, comparing against 0",
                    entity.key,
                    period.id
                );
            }
            match check_parsed(entity, period, formula.as_ref(), tolerance, options) {
                Ok(result) => {
                    if matches!(
                        result,
                        ReconciliationResult::Consistent { .. } | ReconciliationResult::Mismatch { .. }
                    ) {
                        unresolved = unresolved_for(entity, period);
                    }
                    RowOutcome::from(result)
                }
                Err(err) => {
                    log::warn!("{} / {}: {err}", entity.key, period.id);
                    RowOutcome::from(&err)
                }
            }
        }
        _ => RowOutcome::NoFormula,
    };

    BatchRow {
        entity_key: entity.key.clone(),
        period_id: job.period.map(|p| p.id.clone()),
        outcome,
        unresolved,
    }
}

fn unresolved_for(entity: &Entity, period: &ValuePeriod) -> Vec<String> {
    let Some(formula) = entity.formula() else {
        return Vec::new();
    };
    values_by_code(entity, period)
        .ok()
        .and_then(|values| unresolved_codes(formula, &values).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{entity, period, variable};
    use crate::model::Bucket;

    fn snapshot() -> Snapshot {
        let mut ok = entity("ok", Some("a + b"), vec![variable("a1", "a"), variable("b1", "b")]);
        ok.periods = vec![
            period("q1", Some(3.0), &[("a1", 1.0), ("b1", 2.0)]),
            period("q2", Some(9.0), &[("a1", 4.0)]),
            period("q3", None, &[]),
        ];

        let mut broken = entity("broken", Some("a / b"), vec![variable("a1", "a"), variable("b1", "b")]);
        broken.periods = vec![period("q1", Some(0.0), &[("a1", 1.0), ("b1", 0.0)])];

        let mut bad_syntax = entity("syntax", Some("a +"), vec![variable("a1", "a")]);
        bad_syntax.periods = vec![
            period("q1", Some(0.0), &[("a1", 1.0)]),
            period("q2", Some(0.0), &[]),
        ];

        let plain = entity("plain", None, vec![]);

        let mut deleted = entity("deleted", Some("a"), vec![variable("a1", "a")]);
        deleted.deleted_at = Some(crate::model::fixtures::ts(2));
        deleted.periods = vec![period("q1", Some(1.0), &[("a1", 1.0)])];

        Snapshot { entities: vec![ok, broken, bad_syntax, plain, deleted] }
    }

    #[test]
    fn run_classifies_every_period() {
        let report = run(&CheckConfig::default(), &snapshot());
        let buckets: Vec<(String, Option<String>, Bucket)> = report
            .rows
            .iter()
            .map(|r| (r.entity_key.clone(), r.period_id.clone(), r.outcome.bucket()))
            .collect();

        assert_eq!(
            buckets,
            vec![
                ("ok".into(), Some("q1".into()), Bucket::Consistent),
                ("ok".into(), Some("q2".into()), Bucket::Mismatch),
                ("ok".into(), Some("q3".into()), Bucket::MissingInputs),
                ("broken".into(), Some("q1".into()), Bucket::Errored),
                ("syntax".into(), Some("q1".into()), Bucket::Errored),
                ("syntax".into(), Some("q2".into()), Bucket::MissingInputs),
                ("plain".into(), None, Bucket::NoFormula),
            ]
        );

        let s = &report.summary;
        assert_eq!(s.total_rows, 7);
        assert_eq!(s.entities_checked, 4);
        assert_eq!(s.entities_skipped_deleted, 1);
        assert_eq!((s.consistent, s.mismatch, s.missing_inputs, s.no_formula, s.errored), (1, 1, 2, 1, 2));
    }

    #[test]
    fn run_reports_unresolved_codes() {
        let report = run(&CheckConfig::default(), &snapshot());
        let q2 = &report.rows[1];
        assert_eq!(q2.unresolved, vec!["b"]);
        assert!(report.rows[0].unresolved.is_empty());
    }

    #[test]
    fn run_errored_rows_carry_kind() {
        let report = run(&CheckConfig::default(), &snapshot());
        match &report.rows[3].outcome {
            RowOutcome::Errored { error_kind, .. } => assert_eq!(error_kind, "divide_by_zero"),
            other => panic!("expected Errored, got {:?}", other),
        }
        match &report.rows[4].outcome {
            RowOutcome::Errored { error_kind, .. } => assert_eq!(error_kind, "syntax_error"),
            other => panic!("expected Errored, got {:?}", other),
        }
    }

    #[test]
    fn run_survives_oversized_formula() {
        let deep = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        let long = vec!["a"; 20_000].join(" + ");
        let mut entities = Vec::new();
        for (key, formula) in [("deep", deep.as_str()), ("long", long.as_str())] {
            let mut e = entity(key, Some(formula), vec![variable("a1", "a")]);
            e.periods = vec![period("q1", Some(1.0), &[("a1", 1.0)])];
            entities.push(e);
        }
        let mut fine = entity("fine", Some("a"), vec![variable("a1", "a")]);
        fine.periods = vec![period("q1", Some(1.0), &[("a1", 1.0)])];
        entities.push(fine);

        let report = run(&CheckConfig::default(), &Snapshot { entities });
        let outcomes: Vec<Bucket> = report.rows.iter().map(|r| r.outcome.bucket()).collect();
        assert_eq!(outcomes, vec![Bucket::Errored, Bucket::Errored, Bucket::Consistent]);
        match &report.rows[0].outcome {
            RowOutcome::Errored { error_kind, .. } => assert_eq!(error_kind, "syntax_error"),
            other => panic!("expected Errored, got {:?}", other),
        }
    }

    #[test]
    fn run_includes_deleted_when_configured() {
        let mut config = CheckConfig::default();
        config.batch.include_deleted = true;
        let report = run(&config, &snapshot());
        assert_eq!(report.summary.entities_skipped_deleted, 0);
        assert_eq!(report.rows.last().unwrap().entity_key, "deleted");
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut sequential = CheckConfig::default();
        sequential.batch.parallel = false;
        let a = run(&CheckConfig::default(), &snapshot());
        let b = run(&sequential, &snapshot());
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.summary, b.summary);
        assert!(a.meta.parallel);
        assert!(!b.meta.parallel);
    }

    #[test]
    fn row_json_shape() {
        let report = run(&CheckConfig::default(), &snapshot());
        let json = serde_json::to_value(&report.rows[1]).unwrap();
        assert_eq!(json["entity_key"], "ok");
        assert_eq!(json["period_id"], "q2");
        assert_eq!(json["outcome"], "mismatch");
        assert_eq!(json["unresolved"], serde_json::json!(["b"]));

        let json = serde_json::to_value(&report.rows[6]).unwrap();
        assert_eq!(json, serde_json::json!({"entity_key": "plain", "outcome": "no_formula"}));
    }
}
