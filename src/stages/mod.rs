//! Per-source pipeline stages.
//!
//! For one leaf source the stages run strictly in order: Collection
//! acquires and promotes files, Postcollection ingests and classifies
//! them, Acknowledgment reports the outcome sets. Failures stay scoped to
//! their source or file; sibling sources are unaffected.

pub mod ack;
pub mod collect;
pub mod postcollect;

use std::path::PathBuf;

use log::{debug, error};

use crate::config::{CollectorPath, RunContext, SourceLeaf};
use crate::models::FileOutcome;

/// What one source pipeline produced.
#[derive(Debug, Default)]
pub struct SourceReport {
    pub outcomes: Vec<FileOutcome>,
    /// True when the source itself failed (collect command, collectack
    /// command, or an unusable directory), as opposed to individual files.
    pub source_failed: bool,
}

impl SourceReport {
    fn failed() -> Self {
        Self {
            outcomes: Vec::new(),
            source_failed: true,
        }
    }
}

/// Run the full chained cycle for one leaf source: collect, then
/// postcollect each promoted file, then collectack.
pub async fn run_source_pipeline(
    ctx: &RunContext,
    path: &CollectorPath,
    leaf: &SourceLeaf,
) -> SourceReport {
    let destdir = path.dir_under(&ctx.root);
    if let Err(err) = std::fs::create_dir_all(&destdir) {
        error!("{path}: cannot create {}: {err}", destdir.display());
        return SourceReport::failed();
    }

    let collected = match collect::run_collect(ctx, path, leaf, &destdir).await {
        Ok(collected) => collected,
        Err(err) => {
            error!("{path}: collect failed: {err}");
            return SourceReport::failed();
        }
    };

    let mut outcomes =
        postcollect::run_postcollect(ctx, path, leaf, &destdir, &collected.files).await;
    outcomes.extend(collected.failures);

    let mut source_failed = false;
    // Acknowledgment only makes sense after a real collect cycle: it
    // references the workspace the files came through.
    match (&leaf.collectack, &collected.workspace) {
        (Some(template), Some(workspace)) => {
            if let Err(err) =
                ack::run_collectack(ctx, path, template, &destdir, workspace, &outcomes).await
            {
                error!("{path}: collectack failed: {err}");
                source_failed = true;
            }
        }
        (Some(_), None) => {
            debug!("{path}: no collect cycle ran, skipping collectack");
        }
        (None, _) => {}
    }

    SourceReport {
        outcomes,
        source_failed,
    }
}

/// Run standalone postcollection for one source over an already-known
/// file set. Never triggers acknowledgment: there is no workspace to
/// reference.
pub async fn run_standalone(
    ctx: &RunContext,
    path: &CollectorPath,
    leaf: &SourceLeaf,
    files: &[PathBuf],
) -> SourceReport {
    let destdir = path.dir_under(&ctx.root);
    let outcomes = postcollect::run_postcollect(ctx, path, leaf, &destdir, files).await;
    SourceReport {
        outcomes,
        source_failed: false,
    }
}
