//! `kpictl check`, `kpictl lint` and `kpictl config validate`.

use std::path::{Path, PathBuf};

use kpi_engine::MissingVariablePolicy;
use kpi_recon::config::ToleranceMode;
use kpi_recon::model::RowOutcome;
use kpi_recon::{CheckConfig, ReconError, Snapshot};

use crate::exit_codes::{
    EXIT_CHECK_INCOMPLETE, EXIT_CHECK_INVALID_CONFIG, EXIT_CHECK_MISMATCH, EXIT_CHECK_SNAPSHOT,
    EXIT_ERROR, EXIT_LINT_FINDINGS, EXIT_USAGE,
};
use crate::CliError;

const LOCAL_CONFIG: &str = "kpictl.toml";

fn config_err(err: ReconError) -> CliError {
    match err {
        ReconError::Io(msg) => CliError::new(EXIT_USAGE, msg),
        other => CliError::new(EXIT_CHECK_INVALID_CONFIG, other.to_string())
            .with_hint("run `kpictl config validate <FILE>` for details"),
    }
}

/// `--config` if given, else `./kpictl.toml`, else `<config dir>/kpictl/config.toml`.
fn config_candidates(explicit: Option<PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path];
    }
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("kpictl").join("config.toml"));
    }
    candidates
}

fn resolve_config(explicit: Option<PathBuf>) -> Result<CheckConfig, CliError> {
    let required = explicit.is_some();

    for path in config_candidates(explicit) {
        if !required && !path.is_file() {
            continue;
        }
        log::info!("using config {}", path.display());
        return CheckConfig::from_path(&path).map_err(config_err);
    }

    log::debug!("no config file found, using defaults");
    Ok(CheckConfig::default())
}

fn load_snapshot(path: &Path) -> Result<Snapshot, CliError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_CHECK_SNAPSHOT, format!("cannot read {}: {e}", path.display()))
    })?;
    Snapshot::from_json(&data).map_err(|e| {
        CliError::new(EXIT_CHECK_SNAPSHOT, format!("{}: {e}", path.display()))
            .with_hint("expected {\"entities\": [...]} or a JSON array of entities")
    })
}

fn write_output(path: &Path, json: &str) -> Result<(), CliError> {
    std::fs::write(path, json)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

pub fn cmd_check(
    snapshot_path: PathBuf,
    config_path: Option<PathBuf>,
    json_output: bool,
    output_file: Option<PathBuf>,
    sequential: bool,
    include_deleted: bool,
) -> Result<(), CliError> {
    let mut config = resolve_config(config_path)?;
    if sequential {
        config.batch.parallel = false;
    }
    if include_deleted {
        config.batch.include_deleted = true;
    }

    let snapshot = load_snapshot(&snapshot_path)?;
    let report = kpi_recon::run(&config, &snapshot);

    let json_str = to_json(&report)?;
    if let Some(ref path) = output_file {
        write_output(path, &json_str)?;
    }
    if json_output {
        println!("{json_str}");
    } else {
        for row in &report.rows {
            let at = match &row.period_id {
                Some(period) => format!("{} / {}", row.entity_key, period),
                None => row.entity_key.clone(),
            };
            match &row.outcome {
                RowOutcome::Consistent { .. } | RowOutcome::NoFormula => {}
                RowOutcome::Mismatch { expected, actual, delta } => {
                    eprintln!("  mismatch        {at}: formula gives {expected}, stored {actual} (off by {delta})");
                }
                RowOutcome::MissingInputs => eprintln!("  missing inputs  {at}"),
                RowOutcome::Errored { error, .. } => eprintln!("  errored         {at}: {error}"),
            }
            if !row.unresolved.is_empty() {
                eprintln!("  note            {at}: evaluated {} as 0", row.unresolved.join(", "));
            }
        }
    }

    let s = &report.summary;
    eprintln!(
        "{}: {} entities, {} periods: {} consistent, {} mismatch, {} missing inputs, {} no formula, {} errored",
        report.meta.config_name,
        s.entities_checked,
        s.total_rows,
        s.consistent,
        s.mismatch,
        s.missing_inputs,
        s.no_formula,
        s.errored,
    );
    if s.entities_skipped_deleted > 0 {
        eprintln!("skipped {} deleted entities (use --include-deleted)", s.entities_skipped_deleted);
    }

    if s.mismatch > 0 {
        return Err(CliError::new(EXIT_CHECK_MISMATCH, "mismatches found"));
    }
    if s.missing_inputs > 0 || s.errored > 0 {
        return Err(CliError::new(EXIT_CHECK_INCOMPLETE, "some periods could not be checked"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// lint
// ---------------------------------------------------------------------------

pub fn cmd_lint(snapshot_path: PathBuf, json_output: bool, include_deleted: bool) -> Result<(), CliError> {
    let snapshot = load_snapshot(&snapshot_path)?;
    let report = kpi_recon::lint_snapshot(&snapshot, include_deleted);

    if json_output {
        println!("{}", to_json(&report)?);
    } else {
        for finding in &report.findings {
            eprintln!("  {}: {}", finding.entity_key, finding.kind);
        }
    }
    eprintln!("linted {} entities: {} findings", report.entities, report.findings.len());

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::new(EXIT_LINT_FINDINGS, "lint findings reported"))
    }
}

// ---------------------------------------------------------------------------
// config validate
// ---------------------------------------------------------------------------

pub fn cmd_config_validate(path: PathBuf) -> Result<(), CliError> {
    let config = CheckConfig::from_path(&path).map_err(|e| match e {
        ReconError::Io(msg) => CliError::new(EXIT_USAGE, msg),
        other => CliError::new(EXIT_CHECK_INVALID_CONFIG, other.to_string()),
    })?;

    let t = &config.tolerance;
    let tolerance = match t.mode {
        ToleranceMode::Absolute => format!("absolute {}", t.absolute),
        ToleranceMode::Relative => format!("relative {} (floor {})", t.relative, t.absolute),
    };
    let missing = match config.evaluation.missing_variables {
        MissingVariablePolicy::Zero => "zero",
        MissingVariablePolicy::Error => "error",
    };
    eprintln!(
        "valid: '{}' with tolerance {}, missing variables {}, {} batch{}",
        config.display_name(),
        tolerance,
        missing,
        if config.batch.parallel { "parallel" } else { "sequential" },
        if config.batch.include_deleted { ", including deleted" } else { "" },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_is_the_only_candidate() {
        let path = PathBuf::from("/tmp/custom.toml");
        assert_eq!(config_candidates(Some(path.clone())), vec![path]);
    }

    #[test]
    fn default_candidates_start_with_local_file() {
        let candidates = config_candidates(None);
        assert_eq!(candidates[0], PathBuf::from(LOCAL_CONFIG));
        assert!(candidates.len() <= 2);
    }

    #[test]
    fn missing_explicit_config_is_usage_error() {
        let err = resolve_config(Some(PathBuf::from("/definitely/not/here.toml"))).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }

    #[test]
    fn invalid_config_maps_to_config_code() {
        let err = config_err(ReconError::ConfigValidation("bad".into()));
        assert_eq!(err.code, EXIT_CHECK_INVALID_CONFIG);
        assert!(err.hint.is_some());
    }
}
