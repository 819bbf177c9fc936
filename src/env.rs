use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{CollectorPath, RunContext};
use crate::constants::{
    VAR_COLLECTOR, VAR_DIR, VAR_ERROR_FILES, VAR_LOG_LEVEL, VAR_ROOT, VAR_SOURCE,
    VAR_SUCCESS_FILES, VAR_TMPDIR,
};

/// Which stage a command is being built for.
///
/// `Collectack` carries the extra acknowledgment context: the path of the
/// removed temporary workspace and the outcome file sets.
#[derive(Debug, Clone, Copy)]
pub enum Phase<'a> {
    Collect,
    Postcollect,
    Collectack {
        tmpdir: &'a Path,
        success_files: &'a [PathBuf],
        error_files: &'a [PathBuf],
    },
}

/// Compose the variable set visible to an invoked command.
///
/// Precedence, lowest first: inherited process environment, the configured
/// per-run `environment` block, synthesized variables. A synthesized name
/// always wins over a user-defined one.
pub fn build_env(
    ctx: &RunContext,
    collector: &CollectorPath,
    dir: &Path,
    phase: Phase<'_>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();

    for (key, value) in &ctx.environment {
        env.insert(key.clone(), value.clone());
    }

    env.insert(VAR_SOURCE.to_string(), collector.source().to_string());
    env.insert(VAR_COLLECTOR.to_string(), collector.dotted());
    env.insert(VAR_ROOT.to_string(), ctx.root.display().to_string());
    env.insert(VAR_DIR.to_string(), dir.display().to_string());
    env.insert(VAR_LOG_LEVEL.to_string(), ctx.log_level.to_string());

    if let Phase::Collectack {
        tmpdir,
        success_files,
        error_files,
    } = phase
    {
        env.insert(VAR_TMPDIR.to_string(), tmpdir.display().to_string());
        env.insert(VAR_SUCCESS_FILES.to_string(), join_paths(success_files));
        env.insert(VAR_ERROR_FILES.to_string(), join_paths(error_files));
    }

    env
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
