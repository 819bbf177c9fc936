//! Postcollection stage: run a source's ingestion commands against each
//! collected file and classify it, relocating failures under `errors/`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use walkdir::WalkDir;

use crate::config::{CollectorPath, RunContext, SourceLeaf, SourceNode, SourceTree};
use crate::constants::ERRORS_DIR;
use crate::env::{build_env, Phase};
use crate::errors::CollectError;
use crate::models::FileOutcome;
use crate::runner::run_command;
use crate::stages::collect::move_file;
use crate::template::expand_command;

/// Run the postcollect sequence against every file of `files`, relocating
/// failures into `errors/`. Files are processed one after the other; the
/// command sequence within one file short-circuits on the first failure.
pub async fn run_postcollect(
    ctx: &RunContext,
    path: &CollectorPath,
    leaf: &SourceLeaf,
    dir: &Path,
    files: &[PathBuf],
) -> Vec<FileOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let mut outcome = postcollect_file(ctx, path, leaf, dir, file).await;
        if outcome.is_failed() {
            match relocate_failed(dir, file) {
                Ok(new_path) => {
                    info!(
                        "{path}: moved failed file to {}",
                        new_path.display()
                    );
                    outcome.path = new_path;
                }
                Err(err) => error!(
                    "{path}: could not move failed file {}: {err}",
                    file.display()
                ),
            }
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Run the ordered postcollect commands for one file.
///
/// Each command receives the file path as its trailing argument and runs
/// in the persistent source directory. The sequence stops at the first
/// command that exits non-zero.
pub async fn postcollect_file(
    ctx: &RunContext,
    path: &CollectorPath,
    leaf: &SourceLeaf,
    dir: &Path,
    file: &Path,
) -> FileOutcome {
    let env = build_env(ctx, path, dir, Phase::Postcollect);

    for template in &leaf.postcollect {
        let mut argv = match expand_command(template, &env) {
            Ok(argv) => argv,
            Err(err) => {
                error!("{path}: {err}");
                return FileOutcome::failed(file.to_path_buf(), err.to_string());
            }
        };
        argv.push(file.display().to_string());
        let display = argv.join(" ");

        debug!("{path}: running `{display}`");
        match run_command(&argv, dir, &env, ctx.command_timeout).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                let err = output.exit_error(&display);
                error!("{path}: error running `{display}`: {err}");
                let mut detail = err.to_string();
                if !output.stderr_tail.is_empty() {
                    detail.push_str(": ");
                    detail.push_str(output.stderr_tail.trim_end());
                }
                return FileOutcome::failed(file.to_path_buf(), detail);
            }
            Err(err) => {
                error!("{path}: error running `{display}`: {err}");
                return FileOutcome::failed(file.to_path_buf(), err.to_string());
            }
        }
    }

    FileOutcome::success(file.to_path_buf())
}

/// Move a failed file under `<dir>/errors/`, preserving its path relative
/// to `dir`. Never overwrites: a collision leaves the file where it is.
pub fn relocate_failed(dir: &Path, file: &Path) -> Result<PathBuf, CollectError> {
    let relative = file.strip_prefix(dir).unwrap_or_else(|_| {
        // A file outside `dir` keeps only its name.
        Path::new(file.file_name().unwrap_or(file.as_os_str()))
    });
    let target = dir.join(ERRORS_DIR).join(relative);

    if target.exists() {
        return Err(CollectError::Collision { target });
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| CollectError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    move_file(file, &target)?;
    Ok(target)
}

/// Every regular file under a leaf source's persistent directory,
/// excluding the `errors/` subtree, in deterministic order.
pub fn leaf_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && entry.file_name() == ERRORS_DIR)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// One source's worth of standalone postcollection work.
#[derive(Debug)]
pub struct PostcollectTarget {
    pub path: CollectorPath,
    pub leaf: SourceLeaf,
    pub files: Vec<PathBuf>,
}

/// Enumerate postcollection targets by walking the whole hierarchy under
/// `root`, cross-referencing directories against the source tree.
///
/// Directories with no matching source and files sitting at grouping
/// levels are reported and skipped, mirroring the collect-time layout
/// contract; they never abort the run.
pub fn standalone_targets(ctx: &RunContext, tree: &SourceTree) -> Vec<PostcollectTarget> {
    let mut targets = Vec::new();
    descend_groups(&tree.roots, &ctx.root, &[], &mut targets);
    targets
}

fn descend_groups(
    children: &[(String, SourceNode)],
    dir: &Path,
    segments: &[String],
    targets: &mut Vec<PostcollectTarget>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("cannot read {}: {err}", dir.display());
            return;
        }
    };
    let mut entries: Vec<_> = entries.filter_map(|entry| entry.ok()).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let entry_path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            error!(
                "no postcollect command to handle {}",
                entry_path.display()
            );
            continue;
        }

        match children.iter().find(|(child, _)| *child == name) {
            None => {
                if name != ERRORS_DIR {
                    error!("no source matching {} directory", entry_path.display());
                }
            }
            Some((_, SourceNode::Group { children })) => {
                let mut child_segments = segments.to_vec();
                child_segments.push(name);
                descend_groups(children, &entry_path, &child_segments, targets);
            }
            Some((_, SourceNode::Leaf(leaf))) => {
                let mut child_segments = segments.to_vec();
                child_segments.push(name);
                let path = CollectorPath::new(child_segments);
                if leaf.postcollect.is_empty() {
                    error!("source {path} has no postcollect command");
                    continue;
                }
                let files = leaf_files(&entry_path);
                if !files.is_empty() {
                    targets.push(PostcollectTarget {
                        path,
                        leaf: leaf.clone(),
                        files,
                    });
                }
            }
        }
    }
}

/// Resolve an explicit file list into postcollection targets.
///
/// Each file must live under `root` and its directory must identify a
/// leaf source with a postcollect command; files failing either check are
/// reported and skipped.
pub fn explicit_targets(
    ctx: &RunContext,
    tree: &SourceTree,
    files: &[PathBuf],
) -> Vec<PostcollectTarget> {
    let mut targets: Vec<PostcollectTarget> = Vec::new();

    for file in files {
        let file = absolutize(file);
        let relative = match file.strip_prefix(&ctx.root) {
            Ok(relative) => relative,
            Err(_) => {
                error!(
                    "file {} isn't under root ({})",
                    file.display(),
                    ctx.root.display()
                );
                continue;
            }
        };

        let segments: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        match tree.find(&segments) {
            Some(SourceNode::Leaf(leaf)) if !leaf.postcollect.is_empty() => {
                let path = CollectorPath::new(segments);
                match targets.iter_mut().find(|t| t.path == path) {
                    Some(target) => target.files.push(file),
                    None => targets.push(PostcollectTarget {
                        path,
                        leaf: leaf.clone(),
                        files: vec![file],
                    }),
                }
            }
            Some(SourceNode::Leaf(_)) => {
                error!(
                    "source for file {} has no postcollect command",
                    file.display()
                );
            }
            _ => error!("can't find source for file {}", file.display()),
        }
    }

    targets
}

fn absolutize(file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(file))
            .unwrap_or_else(|_| file.to_path_buf())
    }
}
