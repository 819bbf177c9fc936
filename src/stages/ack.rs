//! Acknowledgment stage: tell a source's collectack command how its
//! chained collect+postcollect cycle went, once per source per run.
//!
//! Typical use is committing an external index transactionally: the
//! command sees exactly which files made it and which did not, and can
//! decide whether to confirm.

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::config::{CollectorPath, RunContext};
use crate::env::{build_env, Phase};
use crate::errors::CollectError;
use crate::models::{FileOutcome, FileStatus};
use crate::runner::run_command;
use crate::template::expand_command;

/// Invoke the collectack command with the accumulated outcome sets.
///
/// `workspace` is the path of the already-removed temporary workspace,
/// passed for reference as `TMPDIR`. A non-zero exit is a source-level
/// error; it never reclassifies files or moves anything back.
pub async fn run_collectack(
    ctx: &RunContext,
    path: &CollectorPath,
    template: &str,
    dir: &Path,
    workspace: &Path,
    outcomes: &[FileOutcome],
) -> Result<(), CollectError> {
    let mut success_files: Vec<PathBuf> = Vec::new();
    let mut error_files: Vec<PathBuf> = Vec::new();
    for outcome in outcomes {
        match outcome.status {
            FileStatus::Success => success_files.push(outcome.path.clone()),
            FileStatus::Failed => error_files.push(outcome.path.clone()),
        }
    }

    let env = build_env(
        ctx,
        path,
        dir,
        Phase::Collectack {
            tmpdir: workspace,
            success_files: &success_files,
            error_files: &error_files,
        },
    );

    let argv = expand_command(template, &env)?;
    let display = argv.join(" ");

    info!(
        "{path}: acknowledging {} succeeded / {} failed file(s)",
        success_files.len(),
        error_files.len()
    );
    let output = run_command(&argv, dir, &env, ctx.command_timeout).await?;
    if !output.success() {
        if !output.stderr_tail.is_empty() {
            error!(
                "{path}: collectack stderr: {}",
                output.stderr_tail.trim_end()
            );
        }
        return Err(output.exit_error(&display));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use log::LevelFilter;
    use tempfile::TempDir;

    fn ctx(root: &Path) -> RunContext {
        RunContext {
            root: root.to_path_buf(),
            environment: BTreeMap::new(),
            log_level: LevelFilter::Info,
            max_workers: 1,
            command_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_collectack_sees_outcome_sets() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("s1");
        fs::create_dir_all(&dir).unwrap();

        let outcomes = vec![
            FileOutcome::success(dir.join("ok.csv")),
            FileOutcome::failed(dir.join("errors/bad.csv"), "exit 1".to_string()),
        ];

        // `sh -c` here stands in for an arbitrary user executable dumping
        // its environment; the orchestrator itself never uses a shell.
        let template = r#"sh -c 'echo "$SUCCESS_FILES|$ERROR_FILES|$TMPDIR" > ack.out'"#;
        run_collectack(
            &ctx(root.path()),
            &CollectorPath::new(vec!["s1".to_string()]),
            template,
            &dir,
            Path::new("/tmp/gone-workspace"),
            &outcomes,
        )
        .await
        .unwrap();

        let recorded = fs::read_to_string(dir.join("ack.out")).unwrap();
        let recorded = recorded.trim();
        assert_eq!(
            recorded,
            format!(
                "{}|{}|/tmp/gone-workspace",
                dir.join("ok.csv").display(),
                dir.join("errors/bad.csv").display()
            )
        );
    }

    #[tokio::test]
    async fn test_collectack_failure_is_reported() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("s1");
        fs::create_dir_all(&dir).unwrap();

        let err = run_collectack(
            &ctx(root.path()),
            &CollectorPath::new(vec!["s1".to_string()]),
            "false",
            &dir,
            Path::new("/tmp/gone"),
            &[],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CollectError::Exit { .. }), "{err}");
    }
}
