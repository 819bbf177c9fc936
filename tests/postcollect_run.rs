//! Integration tests for standalone postcollection: reprocessing files
//! already sitting in the hierarchy under root, without any collect.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use recolte::config::{RunContext, SourcesConfig};
use recolte::models::RunSummary;
use recolte::walker;

async fn postcollect_with_sources(
    root: &Path,
    sources_yaml: &str,
    files: &[PathBuf],
) -> Result<RunSummary> {
    let sources_file = root.join("sources.yml");
    fs::write(
        &sources_file,
        format!("root: {}\n{}", root.join("data").display(), sources_yaml),
    )?;

    let config = SourcesConfig::from_yaml_file(&sources_file)?;
    let ctx = Arc::new(RunContext::new(&config, log::LevelFilter::Info, 4));
    Ok(walker::postcollect_run(ctx, &config.tree, files, &CancellationToken::new()).await)
}

const COUNTING_SOURCES: &str = r#"
sources:
  be:
    postcollect: sh -c 'echo once >> "$0.log"'
"#;

#[tokio::test]
async fn test_every_file_postcollected_exactly_once() -> Result<()> {
    let sandbox = TempDir::new()?;
    let be = sandbox.path().join("data/be");
    fs::create_dir_all(be.join("errors"))?;
    fs::write(be.join("f1.csv"), "x")?;
    fs::write(be.join("f2.csv"), "y")?;
    fs::write(be.join("errors/old.csv"), "z")?;

    let summary = postcollect_with_sources(sandbox.path(), COUNTING_SOURCES, &[]).await?;

    assert_eq!(summary.files_succeeded, 2);
    assert_eq!(
        fs::read_to_string(be.join("f1.csv.log"))?,
        "once\n",
        "file must be processed exactly once"
    );
    assert!(be.join("f2.csv.log").exists());
    assert!(
        !be.join("errors/old.csv.log").exists(),
        "errors/ must be excluded from the walk"
    );
    Ok(())
}

#[tokio::test]
async fn test_explicit_file_list_restricts_the_run() -> Result<()> {
    let sandbox = TempDir::new()?;
    let be = sandbox.path().join("data/be");
    fs::create_dir_all(&be)?;
    fs::write(be.join("wanted.csv"), "x")?;
    fs::write(be.join("ignored.csv"), "y")?;

    let summary = postcollect_with_sources(
        sandbox.path(),
        COUNTING_SOURCES,
        &[be.join("wanted.csv")],
    )
    .await?;

    assert_eq!(summary.files_succeeded, 1);
    assert!(be.join("wanted.csv.log").exists());
    assert!(!be.join("ignored.csv.log").exists());
    Ok(())
}

#[tokio::test]
async fn test_files_outside_root_or_without_source_are_skipped() -> Result<()> {
    let sandbox = TempDir::new()?;
    fs::create_dir_all(sandbox.path().join("data/be"))?;
    let elsewhere = sandbox.path().join("elsewhere.csv");
    fs::write(&elsewhere, "x")?;

    let summary = postcollect_with_sources(
        sandbox.path(),
        COUNTING_SOURCES,
        &[
            elsewhere,
            sandbox.path().join("data/nosuchsource/f.csv"),
        ],
    )
    .await?;

    // Both files are reported and skipped; nothing ran, nothing failed.
    assert_eq!(summary.sources_run, 0);
    assert!(!summary.has_errors());
    Ok(())
}

#[tokio::test]
async fn test_standalone_failure_moves_file_to_errors() -> Result<()> {
    let sandbox = TempDir::new()?;
    let be = sandbox.path().join("data/be");
    fs::create_dir_all(&be)?;
    fs::write(be.join("bad.csv"), "x")?;

    let sources = r#"
sources:
  be:
    postcollect: "false"
"#;
    let summary = postcollect_with_sources(sandbox.path(), sources, &[]).await?;

    assert_eq!(summary.files_failed, 1);
    assert!(be.join("errors/bad.csv").exists());
    assert!(!be.join("bad.csv").exists());

    // A second pass sees nothing left to process.
    let summary = postcollect_with_sources(sandbox.path(), sources, &[]).await?;
    assert_eq!(summary.files_failed + summary.files_succeeded, 0);
    Ok(())
}

#[tokio::test]
async fn test_idempotent_standalone_runs() -> Result<()> {
    let sandbox = TempDir::new()?;
    let be = sandbox.path().join("data/be");
    fs::create_dir_all(&be)?;
    fs::write(be.join("f1.csv"), "x")?;
    fs::write(be.join("f2.csv"), "y")?;

    let sources = r#"
sources:
  be:
    postcollect: "true"
"#;
    let first = postcollect_with_sources(sandbox.path(), sources, &[]).await?;
    let second = postcollect_with_sources(sandbox.path(), sources, &[]).await?;

    assert_eq!(first.files_succeeded, 2);
    assert_eq!(second.files_succeeded, 2);
    assert_eq!(first.files_failed, 0);
    assert_eq!(second.files_failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_nested_hierarchy_walk() -> Result<()> {
    let sandbox = TempDir::new()?;
    let bill = sandbox.path().join("data/conso/bill");
    let index = sandbox.path().join("data/conso/index");
    fs::create_dir_all(&bill)?;
    fs::create_dir_all(&index)?;
    fs::write(bill.join("b.pdf"), "x")?;
    fs::write(index.join("i.xls"), "y")?;

    let sources = r#"
sources:
  conso:
    bill:
      collect: "true"
      postcollect: sh -c 'echo once >> "$0.log"'
    index:
      collect: "true"
      postcollect: sh -c 'echo once >> "$0.log"'
"#;
    let summary = postcollect_with_sources(sandbox.path(), sources, &[]).await?;

    assert_eq!(summary.files_succeeded, 2);
    assert!(bill.join("b.pdf.log").exists());
    assert!(index.join("i.xls.log").exists());
    Ok(())
}
