//! CLI Exit Code Registry
//!
//! Single source of truth for `kpictl` exit codes. Scripts and CI jobs gate on
//! these, so a code never changes meaning once released.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                  |
//! |---------|-----------|----------------------------------------------|
//! | 0       | Universal | Success                                      |
//! | 1       | Universal | General error (unspecified)                  |
//! | 2       | Universal | CLI usage error (bad args, missing file)     |
//! | 3-9     | eval      | Single-formula evaluation                    |
//! | 10-19   | check     | Batch check, lint, config, migration         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed, nothing to report.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure (e.g. cannot write `--output`).
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Eval (3-9)
// =============================================================================

/// Formula failed to parse or evaluate (syntax, division by zero, strict miss).
pub const EXIT_EVAL_ERROR: u8 = 3;

// =============================================================================
// Check (10-19)
// =============================================================================

/// At least one period's stored value disagrees with its formula.
pub const EXIT_CHECK_MISMATCH: u8 = 10;

/// No mismatches, but some periods had no inputs or could not be evaluated.
pub const EXIT_CHECK_INCOMPLETE: u8 = 11;

/// Config file failed to parse or validate.
pub const EXIT_CHECK_INVALID_CONFIG: u8 = 12;

/// Snapshot could not be read or is not valid snapshot JSON.
pub const EXIT_CHECK_SNAPSHOT: u8 = 13;

/// `lint` reported at least one finding.
pub const EXIT_LINT_FINDINGS: u8 = 14;

/// Migration input could not be read, parsed, or written back.
pub const EXIT_MIGRATE_IO: u8 = 15;
