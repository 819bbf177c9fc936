//! Collection stage: run a source's collect command in a fresh temporary
//! workspace and promote the files it produced into the source's
//! persistent directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::config::{CollectorPath, RunContext, SourceLeaf};
use crate::env::{build_env, Phase};
use crate::errors::CollectError;
use crate::models::FileOutcome;
use crate::runner::run_command;
use crate::stages::postcollect::leaf_files;
use crate::template::expand_command;

/// Result of a completed collection stage for one source.
#[derive(Debug)]
pub struct CollectedSet {
    /// Files now sitting in the persistent directory, awaiting postcollect.
    pub files: Vec<PathBuf>,
    /// Promotion failures (collisions); these files were not promoted and
    /// are gone with the workspace.
    pub failures: Vec<FileOutcome>,
    /// Path of the now-removed temporary workspace, kept for the
    /// acknowledgment stage's `TMPDIR`. `None` for manual-drop sources.
    pub workspace: Option<PathBuf>,
}

/// Run the collect command of `leaf` and promote its output into `destdir`.
///
/// On a non-zero exit or launch failure the workspace and any partial
/// files are discarded and the error propagates; the caller skips
/// postcollection for this source.
pub async fn run_collect(
    ctx: &RunContext,
    path: &CollectorPath,
    leaf: &SourceLeaf,
    destdir: &Path,
) -> Result<CollectedSet, CollectError> {
    let Some(template) = &leaf.collect else {
        // Manual-drop source: files arrive by external means, the existing
        // persistent directory is the input set as-is.
        debug!("{path}: no collect command, using files already in place");
        return Ok(CollectedSet {
            files: leaf_files(destdir),
            failures: Vec::new(),
            workspace: None,
        });
    };

    let workspace = tempfile::tempdir().map_err(|source| CollectError::Io {
        path: std::env::temp_dir(),
        source,
    })?;

    let env = build_env(ctx, path, workspace.path(), Phase::Collect);
    let argv = expand_command(template, &env)?;
    let display = argv.join(" ");

    info!("{path}: collecting with `{display}`");
    let output = run_command(&argv, workspace.path(), &env, ctx.command_timeout).await?;
    if !output.success() {
        if !output.stderr_tail.is_empty() {
            error!("{path}: collect stderr: {}", output.stderr_tail.trim_end());
        }
        // Workspace and partial files are dropped with `workspace`.
        return Err(output.exit_error(&display));
    }

    let (files, failures) = promote_files(workspace.path(), destdir, path)?;

    let workspace_path = workspace.path().to_path_buf();
    if let Err(err) = workspace.close() {
        warn!("{path}: could not remove workspace: {err}");
    }

    Ok(CollectedSet {
        files,
        failures,
        workspace: Some(workspace_path),
    })
}

/// Move every regular file of `workspace` into `destdir`.
///
/// Each move is a single rename (atomic on the same volume, with a
/// copy+remove fallback across volumes). An existing target is never
/// overwritten: the collision is recorded as a failed outcome and the
/// file stays behind in the workspace.
fn promote_files(
    workspace: &Path,
    destdir: &Path,
    path: &CollectorPath,
) -> Result<(Vec<PathBuf>, Vec<FileOutcome>), CollectError> {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    let mut entries: Vec<_> = fs::read_dir(workspace)
        .map_err(|source| CollectError::Io {
            path: workspace.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let source_path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            warn!(
                "{path}: ignoring non-regular entry {} in workspace",
                source_path.display()
            );
            continue;
        }

        let target = destdir.join(entry.file_name());
        if target.exists() {
            let err = CollectError::Collision {
                target: target.clone(),
            };
            error!("{path}: {err}");
            failures.push(FileOutcome::failed(target, err.to_string()));
            continue;
        }

        match move_file(&source_path, &target) {
            Ok(()) => {
                debug!("{path}: promoted {}", target.display());
                files.push(target);
            }
            Err(err) => {
                error!("{path}: promoting {} failed: {err}", source_path.display());
                failures.push(FileOutcome::failed(target, err.to_string()));
            }
        }
    }

    Ok((files, failures))
}

/// Rename, falling back to copy+remove when source and target live on
/// different volumes.
pub(crate) fn move_file(source: &Path, target: &Path) -> Result<(), CollectError> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == Some(cross_device_errno()) => {
            fs::copy(source, target).map_err(|source_err| CollectError::Io {
                path: target.to_path_buf(),
                source: source_err,
            })?;
            fs::remove_file(source).map_err(|source_err| CollectError::Io {
                path: source.to_path_buf(),
                source: source_err,
            })
        }
        Err(source_err) => Err(CollectError::Io {
            path: target.to_path_buf(),
            source: source_err,
        }),
    }
}

#[cfg(unix)]
const fn cross_device_errno() -> i32 {
    18 // EXDEV
}

#[cfg(not(unix))]
const fn cross_device_errno() -> i32 {
    17 // ERROR_NOT_SAME_DEVICE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
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

    fn leaf(collect: &str) -> SourceLeaf {
        SourceLeaf {
            collect: Some(collect.to_string()),
            postcollect: vec![],
            collectack: None,
        }
    }

    fn source_path(name: &str) -> CollectorPath {
        CollectorPath::new(vec![name.to_string()])
    }

    #[tokio::test]
    async fn test_collect_promotes_file_and_removes_workspace() {
        let root = TempDir::new().unwrap();
        let destdir = root.path().join("meteofrance");
        fs::create_dir_all(&destdir).unwrap();

        let set = run_collect(
            &ctx(root.path()),
            &source_path("meteofrance"),
            &leaf("touch a.csv"),
            &destdir,
        )
        .await
        .unwrap();

        assert_eq!(set.files, vec![destdir.join("a.csv")]);
        assert!(destdir.join("a.csv").exists());
        assert!(set.failures.is_empty());

        // Workspace is gone, no residue anywhere else.
        let workspace = set.workspace.unwrap();
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_failed_collect_discards_workspace() {
        let root = TempDir::new().unwrap();
        let destdir = root.path().join("s1");
        fs::create_dir_all(&destdir).unwrap();

        let err = run_collect(
            &ctx(root.path()),
            &source_path("s1"),
            &leaf("false"),
            &destdir,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CollectError::Exit { .. }), "{err}");
        assert!(fs::read_dir(&destdir).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_collision_reported_not_overwritten() {
        let root = TempDir::new().unwrap();
        let destdir = root.path().join("s1");
        fs::create_dir_all(&destdir).unwrap();
        fs::write(destdir.join("a.csv"), "keep me").unwrap();

        let set = run_collect(
            &ctx(root.path()),
            &source_path("s1"),
            &leaf("touch a.csv"),
            &destdir,
        )
        .await
        .unwrap();

        assert!(set.files.is_empty());
        assert_eq!(set.failures.len(), 1);
        assert!(set.failures[0].is_failed());
        assert_eq!(fs::read_to_string(destdir.join("a.csv")).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_manual_source_uses_existing_files() {
        let root = TempDir::new().unwrap();
        let destdir = root.path().join("manual");
        fs::create_dir_all(destdir.join("errors")).unwrap();
        fs::write(destdir.join("f1.csv"), "x").unwrap();
        fs::write(destdir.join("errors/old.csv"), "x").unwrap();

        let set = run_collect(
            &ctx(root.path()),
            &source_path("manual"),
            &SourceLeaf {
                collect: None,
                postcollect: vec!["true".to_string()],
                collectack: None,
            },
            &destdir,
        )
        .await
        .unwrap();

        assert_eq!(set.files, vec![destdir.join("f1.csv")]);
        assert!(set.workspace.is_none());
    }

    #[tokio::test]
    async fn test_undefined_variable_fails_before_launch() {
        let root = TempDir::new().unwrap();
        let destdir = root.path().join("s1");
        fs::create_dir_all(&destdir).unwrap();

        let err = run_collect(
            &ctx(root.path()),
            &source_path("s1"),
            &leaf("prog {UNKNOWN}"),
            &destdir,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CollectError::UndefinedVariable { .. }), "{err}");
    }
}
