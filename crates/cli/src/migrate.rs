//! `kpictl migrate` - one-time percent-scaling fix over an entity export.

use std::path::PathBuf;

use serde_json::Value;

use crate::exit_codes::{EXIT_ERROR, EXIT_MIGRATE_IO};
use crate::CliError;

fn migrate_err(msg: impl Into<String>) -> CliError {
    CliError::new(EXIT_MIGRATE_IO, msg)
}

pub fn cmd_migrate(
    input: PathBuf,
    output: Option<PathBuf>,
    dry_run: bool,
    json_output: bool,
) -> Result<(), CliError> {
    let data = std::fs::read_to_string(&input)
        .map_err(|e| migrate_err(format!("cannot read {}: {e}", input.display())))?;
    let mut doc: Value = serde_json::from_str(&data)
        .map_err(|e| migrate_err(format!("{}: invalid JSON: {e}", input.display())))?;

    let report = kpi_recon::migrate_collection(&mut doc)
        .map_err(|e| migrate_err(format!("{}: {e}", input.display())))?;

    if json_output {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{out}");
    } else {
        for change in &report.changed {
            eprintln!("  {} [{}]: {}  ->  {}", change.key, change.unit, change.before, change.after);
        }
    }

    let verb = if dry_run { "would change" } else { "changed" };
    eprintln!("examined {} entities, {} {}", report.examined, verb, report.changed.len());

    if dry_run {
        return Ok(());
    }

    // An unchanged document is left alone unless a separate output was asked for
    let target = match output {
        Some(path) => path,
        None if report.changed.is_empty() => return Ok(()),
        None => input,
    };

    let mut text = serde_json::to_string_pretty(&doc)
        .map_err(|e| migrate_err(format!("JSON serialization error: {e}")))?;
    text.push('\n');
    std::fs::write(&target, text)
        .map_err(|e| migrate_err(format!("cannot write {}: {e}", target.display())))?;
    eprintln!("wrote {}", target.display());

    Ok(())
}
