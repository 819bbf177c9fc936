//! Source tree walking and pipeline scheduling.
//!
//! Leaf sources are independent: each one's pipeline runs as its own task,
//! bounded by a semaphore of `max_workers` permits. One worker owns a
//! leaf's persistent directory for the duration of its pipeline, so
//! cross-source concurrency is safe by construction. Cancellation stops
//! dispatching new pipelines; in-flight commands run to completion.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{CollectorPath, RunContext, SourceLeaf, SourceTree};
use crate::models::RunSummary;
use crate::stages;

enum SourceJob {
    /// Full chained cycle: collect, postcollect, collectack.
    Chained {
        path: CollectorPath,
        leaf: SourceLeaf,
    },
    /// Postcollect an already-known file set, no collect, no ack.
    Standalone {
        path: CollectorPath,
        leaf: SourceLeaf,
        files: Vec<PathBuf>,
    },
}

impl SourceJob {
    fn path(&self) -> &CollectorPath {
        match self {
            SourceJob::Chained { path, .. } => path,
            SourceJob::Standalone { path, .. } => path,
        }
    }
}

/// Run the chained pipeline for every leaf source, or only for the leaves
/// selected by `selected` dotted paths (a selector also matches every leaf
/// beneath it).
pub async fn collect_run(
    ctx: Arc<RunContext>,
    tree: &SourceTree,
    selected: &[String],
    cancel: &CancellationToken,
) -> RunSummary {
    let leaves = tree.leaves();

    for selector in selected {
        if !leaves
            .iter()
            .any(|(path, _)| matches_selector(path, selector))
        {
            warn!("selector '{selector}' matches no source");
        }
    }

    let jobs: Vec<SourceJob> = leaves
        .into_iter()
        .filter(|(path, _)| is_selected(path, selected))
        .map(|(path, leaf)| SourceJob::Chained {
            path,
            leaf: leaf.clone(),
        })
        .collect();

    execute(ctx, jobs, cancel.clone()).await
}

/// Run standalone postcollection: over `files` when given, otherwise over
/// every file found under the root hierarchy.
pub async fn postcollect_run(
    ctx: Arc<RunContext>,
    tree: &SourceTree,
    files: &[PathBuf],
    cancel: &CancellationToken,
) -> RunSummary {
    let targets = if files.is_empty() {
        stages::postcollect::standalone_targets(&ctx, tree)
    } else {
        stages::postcollect::explicit_targets(&ctx, tree, files)
    };

    let jobs = targets
        .into_iter()
        .map(|target| SourceJob::Standalone {
            path: target.path,
            leaf: target.leaf,
            files: target.files,
        })
        .collect();

    execute(ctx, jobs, cancel.clone()).await
}

fn is_selected(path: &CollectorPath, selected: &[String]) -> bool {
    selected.is_empty() || selected.iter().any(|s| matches_selector(path, s))
}

fn matches_selector(path: &CollectorPath, selector: &str) -> bool {
    let dotted = path.dotted();
    dotted == selector || dotted.starts_with(&format!("{selector}."))
}

/// Dispatch one task per job, gated by the worker semaphore, and fold the
/// reports into a run summary. Per-source failures are accumulated, never
/// raised.
async fn execute(
    ctx: Arc<RunContext>,
    jobs: Vec<SourceJob>,
    cancel: CancellationToken,
) -> RunSummary {
    let semaphore = Arc::new(Semaphore::new(ctx.max_workers));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            if cancel.is_cancelled() {
                debug!("{}: not dispatched, run cancelled", job.path());
                return None;
            }
            Some(match job {
                SourceJob::Chained { path, leaf } => {
                    stages::run_source_pipeline(&ctx, &path, &leaf).await
                }
                SourceJob::Standalone { path, leaf, files } => {
                    stages::run_standalone(&ctx, &path, &leaf, &files).await
                }
            })
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(report)) => {
                summary.sources_run += 1;
                if report.source_failed {
                    summary.sources_failed += 1;
                }
                for outcome in &report.outcomes {
                    summary.record_outcome(outcome);
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!("source pipeline task failed: {err}");
                summary.sources_failed += 1;
            }
        }
    }
    summary
}
