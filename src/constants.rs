//! Global constants for the recolte application.
//!
//! This module centralizes hardcoded values to make configuration
//! changes easier.

/// Maximum bytes of stdout/stderr retained per command invocation.
/// Only the tail is kept; earlier output is discarded as it streams in.
pub const OUTPUT_TAIL_LIMIT: usize = 8 * 1024;

/// Default number of parallel source pipelines.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Name of the per-source subdirectory holding files whose postcollect failed.
pub const ERRORS_DIR: &str = "errors";

/// Synthesized environment variable: first segment of the collector path.
pub const VAR_SOURCE: &str = "SOURCE";

/// Synthesized environment variable: full dotted collector path.
pub const VAR_COLLECTOR: &str = "COLLECTOR";

/// Synthesized environment variable: the run's root directory.
pub const VAR_ROOT: &str = "ROOT";

/// Synthesized environment variable: working directory of the command
/// (temporary workspace for collect, persistent source directory otherwise).
pub const VAR_DIR: &str = "DIR";

/// Synthesized environment variable: active log level name.
pub const VAR_LOG_LEVEL: &str = "LOG_LEVEL";

/// Collectack-only: path of the (already removed) temporary workspace.
pub const VAR_TMPDIR: &str = "TMPDIR";

/// Collectack-only: space-joined paths of files whose postcollect failed.
pub const VAR_ERROR_FILES: &str = "ERROR_FILES";

/// Collectack-only: space-joined paths of files whose postcollect succeeded.
pub const VAR_SUCCESS_FILES: &str = "SUCCESS_FILES";
