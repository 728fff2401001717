//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: batch schedulers rely on them.
//!
//! | Code | Meaning                                                      |
//! |------|--------------------------------------------------------------|
//! | 0    | Success                                                      |
//! | 1    | General error (unspecified)                                  |
//! | 2    | CLI usage error (bad args; raised by clap before any work)   |
//! | 3    | Configuration failure (bad config, missing credential, unreadable catalog or exclusion list) |
//! | 4    | Output failure (cannot create or write an artifact)          |
//! | 5    | Review issues present and `--fail-on-issues` was given       |
//!
//! Degraded lookups, retrieval gaps and structural issues are not errors
//! on their own: the run completes and lists them in the issues report.

/// Success - run completed, artifacts written.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Configuration failure, raised before any output is written.
pub const EXIT_CONFIG: u8 = 3;

/// An output artifact could not be written.
pub const EXIT_OUTPUT: u8 = 4;

/// Lookup failures, retrieval gaps or structural issues were found and the
/// caller asked to fail on them.
pub const EXIT_ISSUES: u8 = 5;
