// kpictl - KPI formula evaluation and stored-value reconciliation

mod check;
mod exit_codes;
mod migrate;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kpi_engine::{evaluate_with, unresolved_codes, EvalError, EvalOptions};

use exit_codes::{EXIT_EVAL_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "kpictl")]
#[command(about = "Evaluate KPI formulas and reconcile stored calculated values")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one formula against variables given on the command line
    #[command(after_help = "\
Examples:
  kpictl eval 'A + B * C' --var A=1 --var B=2 --var C=3
  kpictl eval '(done / total) * 100' --var done=45 --var total=60 --json
  kpictl eval 'revenue - cost' --var revenue=1000 --strict")]
    Eval {
        /// Arithmetic formula over variable codes (+ - * / and parentheses)
        formula: String,

        /// Variable value as CODE=VALUE (repeatable)
        #[arg(long = "var", value_name = "CODE=VALUE", value_parser = parse_var)]
        vars: Vec<(String, f64)>,

        /// Fail on variables with no value instead of substituting 0
        #[arg(long)]
        strict: bool,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Re-evaluate every period in a snapshot and compare with stored values
    #[command(after_help = "\
Examples:
  kpictl check snapshot.json
  kpictl check snapshot.json --config kpictl.toml --json
  kpictl check snapshot.json --output report.json
  kpictl check snapshot.json --include-deleted --sequential

Exit codes:
  0   every period consistent
  10  at least one mismatch
  11  no mismatches, but missing inputs or errored rows")]
    Check {
        /// Snapshot JSON: {\"entities\": [...]} or a bare array of entities
        snapshot: PathBuf,

        /// Config file (default: ./kpictl.toml, then the user config dir)
        #[arg(long, env = "KPICTL_CONFIG")]
        config: Option<PathBuf>,

        /// Output the JSON report to stdout instead of a human summary
        #[arg(long)]
        json: bool,

        /// Write the JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Check entities one at a time on the current thread
        #[arg(long)]
        sequential: bool,

        /// Also check soft-deleted entities
        #[arg(long)]
        include_deleted: bool,
    },

    /// Report formula/variable drift and data-model problems in a snapshot
    #[command(after_help = "\
Examples:
  kpictl lint snapshot.json
  kpictl lint snapshot.json --json")]
    Lint {
        /// Snapshot JSON file
        snapshot: PathBuf,

        /// Output findings as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Also lint soft-deleted entities
        #[arg(long)]
        include_deleted: bool,
    },

    /// Remove redundant `* 100` from formulas whose unit is already a percentage
    #[command(after_help = "\
Examples:
  kpictl migrate entities.json --dry-run
  kpictl migrate entities.json --output entities.migrated.json
  kpictl migrate entities.json            # rewrites in place")]
    Migrate {
        /// Entity collection JSON (array, or object with an \"entities\" array)
        input: PathBuf,

        /// Write the migrated collection here instead of overwriting INPUT
        #[arg(long)]
        output: Option<PathBuf>,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Output the change report as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Parse and validate a config file without running a check
    #[command(after_help = "\
Examples:
  kpictl config validate kpictl.toml")]
    Validate {
        /// Path to the TOML config file
        file: PathBuf,
    },
}

fn parse_var(s: &str) -> Result<(String, f64), String> {
    let (code, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=VALUE, got {s:?}"))?;
    let code = code.trim();
    if code.is_empty() {
        return Err(format!("missing variable code in {s:?}"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("value for '{code}' is not a number: {:?}", value.trim()))?;
    if !value.is_finite() {
        return Err(format!("value for '{code}' must be finite"));
    }
    Ok((code.to_string(), value))
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("KPICTL_COMMIT"), ")",
        "\nengine:  kpi-engine ", env!("CARGO_PKG_VERSION"),
        "\nbuild:   ", env!("KPICTL_PROFILE"),
        "\ntarget:  ", env!("KPICTL_TARGET"),
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Eval { formula, vars, strict, json } => cmd_eval(formula, vars, strict, json),
        Commands::Check { snapshot, config, json, output, sequential, include_deleted } => {
            check::cmd_check(snapshot, config, json, output, sequential, include_deleted)
        }
        Commands::Lint { snapshot, json, include_deleted } => {
            check::cmd_lint(snapshot, json, include_deleted)
        }
        Commands::Migrate { input, output, dry_run, json } => {
            migrate::cmd_migrate(input, output, dry_run, json)
        }
        Commands::Config { command } => match command {
            ConfigCommands::Validate { file } => check::cmd_config_validate(file),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn eval(msg: impl Into<String>) -> Self {
        Self::new(EXIT_EVAL_ERROR, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn cmd_eval(formula: String, vars: Vec<(String, f64)>, strict: bool, json: bool) -> Result<(), CliError> {
    let mut values: HashMap<String, f64> = HashMap::with_capacity(vars.len());
    for (code, value) in vars {
        if values.insert(code.clone(), value).is_some() {
            return Err(CliError::args(format!("variable '{code}' given more than once")));
        }
    }

    let options = if strict { EvalOptions::strict() } else { EvalOptions::default() };
    let value = evaluate_with(&formula, &values, options).map_err(|e| {
        let err = CliError::eval(e.to_string());
        match e {
            EvalError::UnknownVariable { code } => {
                err.with_hint(format!("pass it with --var {code}=VALUE, or drop --strict to use 0"))
            }
            _ => err,
        }
    })?;

    // Parsed fine above, so lexing cannot fail here
    let unresolved = unresolved_codes(&formula, &values).unwrap_or_default();

    if json {
        let out = serde_json::json!({
            "formula": formula,
            "value": value,
            "unresolved": unresolved,
        });
        println!("{out}");
    } else {
        println!("{value}");
        if !unresolved.is_empty() {
            eprintln!("note: no value for {}; evaluated as 0", unresolved.join(", "));
        }
    }

    Ok(())
}
