use crate::model::{BatchRow, BatchSummary, Bucket};

/// Tally batch rows by bucket. Entity counts are filled in by the caller.
pub fn compute_summary(rows: &[BatchRow]) -> BatchSummary {
    let mut summary = BatchSummary { total_rows: rows.len(), ..Default::default() };

    for row in rows {
        match row.outcome.bucket() {
            Bucket::Consistent => summary.consistent += 1,
            Bucket::Mismatch => summary.mismatch += 1,
            Bucket::MissingInputs => summary.missing_inputs += 1,
            Bucket::NoFormula => summary.no_formula += 1,
            Bucket::Errored => summary.errored += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RowOutcome;

    fn row(outcome: RowOutcome) -> BatchRow {
        BatchRow {
            entity_key: "k".into(),
            period_id: Some("p".into()),
            outcome,
            unresolved: vec![],
        }
    }

    #[test]
    fn summary_counts() {
        let rows = vec![
            row(RowOutcome::Consistent { expected: 1.0, actual: 1.0 }),
            row(RowOutcome::Consistent { expected: 2.0, actual: 2.0 }),
            row(RowOutcome::Mismatch { expected: 1.0, actual: 3.0, delta: 2.0 }),
            row(RowOutcome::MissingInputs),
            row(RowOutcome::Errored { error_kind: "divide_by_zero".into(), error: "division by zero".into() }),
        ];
        let summary = compute_summary(&rows);
        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.consistent, 2);
        assert_eq!(summary.mismatch, 1);
        assert_eq!(summary.missing_inputs, 1);
        assert_eq!(summary.no_formula, 0);
        assert_eq!(summary.errored, 1);
    }

    #[test]
    fn summary_empty() {
        assert_eq!(compute_summary(&[]), BatchSummary::default());
    }
}
