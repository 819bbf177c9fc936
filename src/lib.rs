//! # recolte
//!
//! Command line tool and library to collect distant data and do something
//! about it.
//!
//! ## Overview
//!
//! A run is driven by a sources definition YAML file. Each source either
//! groups sub-sources or is a leaf with a `collect` command acquiring
//! files and/or `postcollect` commands ingesting each collected file.
//! Collection happens inside a temporary workspace; files are promoted
//! into the mirrored hierarchy under the configured root only once
//! collected, and a file whose postcollect fails is moved into the
//! source's `errors/` subdirectory. An optional `collectack` command is
//! told, once per source, which files succeeded and which failed.
//!
//! Commands are opaque executables: templates expand `{NAME}` placeholders
//! against the built environment and the resulting argument vector is
//! spawned directly, never through a shell.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! use recolte::config::{RunContext, SourcesConfig};
//! use recolte::walker;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = SourcesConfig::from_yaml_file(Path::new("sources.yml"))?;
//! let ctx = Arc::new(RunContext::new(&config, log::LevelFilter::Info, 4));
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let summary = runtime.block_on(walker::collect_run(
//!     ctx,
//!     &config.tree,
//!     &[],
//!     &CancellationToken::new(),
//! ));
//! println!("{} file(s) failed", summary.files_failed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Sources definition loading and the validated source tree
//! - [`env`]: Environment composition for invoked commands
//! - [`template`]: `{NAME}` template expansion and argv tokenization
//! - [`runner`]: Scoped execution of external commands
//! - [`stages`]: Collection, postcollection and acknowledgment stages
//! - [`walker`]: Tree walking and bounded-concurrency scheduling
//! - [`models`]: File outcomes and the run summary
//! - [`errors`]: Failure taxonomy
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Sources definition loading and the validated source tree
pub mod config;

/// Application constants
pub mod constants;

/// Environment composition for invoked commands
pub mod env;

/// Failure taxonomy
pub mod errors;

/// File outcomes and run summary
pub mod models;

/// Scoped execution of external commands
pub mod runner;

/// Collection, postcollection and acknowledgment stages
pub mod stages;

/// Command template expansion and tokenization
pub mod template;

/// Source tree walking and pipeline scheduling
pub mod walker;
