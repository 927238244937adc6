//! `kpi-recon`: KPI reconciliation checker.
//!
//! Pure engine crate: receives pre-fetched entity snapshots, returns classified
//! results. No CLI or database dependencies.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod lint;
pub mod migrate;
pub mod model;

pub use classify::{check, check_with, ReconciliationResult};
pub use config::{CheckConfig, ToleranceConfig, DEFAULT_TOLERANCE};
pub use engine::run;
pub use error::{CheckError, ReconError};
pub use lint::{lint_snapshot, LintReport};
pub use migrate::{migrate_collection, MigrationReport};
pub use model::{BatchReport, BatchRow, Bucket, Entity, RowOutcome, Snapshot, ValuePeriod};
