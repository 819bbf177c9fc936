use std::path::PathBuf;

/// Terminal classification of one postcollected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Success,
    Failed,
}

/// One collected file's terminal state for the current run.
///
/// `path` is the file's current location: the persistent source directory
/// for successes, the `errors/` subdirectory for failures. The physical
/// location is the durable record; outcomes are not persisted beyond the run.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    pub error_detail: Option<String>,
}

impl FileOutcome {
    pub fn success(path: PathBuf) -> Self {
        Self {
            path,
            status: FileStatus::Success,
            error_detail: None,
        }
    }

    pub fn failed(path: PathBuf, detail: String) -> Self {
        Self {
            path,
            status: FileStatus::Failed,
            error_detail: Some(detail),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == FileStatus::Failed
    }
}

/// Aggregated counts for a whole run, used for the final log line and the
/// process exit code.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub sources_run: usize,
    pub sources_failed: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
}

impl RunSummary {
    pub fn record_outcome(&mut self, outcome: &FileOutcome) {
        match outcome.status {
            FileStatus::Success => self.files_succeeded += 1,
            FileStatus::Failed => self.files_failed += 1,
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.sources_run += other.sources_run;
        self.sources_failed += other.sources_failed;
        self.files_succeeded += other.files_succeeded;
        self.files_failed += other.files_failed;
    }

    pub fn has_errors(&self) -> bool {
        self.sources_failed > 0 || self.files_failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut summary = RunSummary::default();
        summary.record_outcome(&FileOutcome::success(PathBuf::from("a")));
        summary.record_outcome(&FileOutcome::failed(
            PathBuf::from("b"),
            "boom".to_string(),
        ));
        assert_eq!(summary.files_succeeded, 1);
        assert_eq!(summary.files_failed, 1);
        assert!(summary.has_errors());

        let mut total = RunSummary {
            sources_run: 2,
            ..Default::default()
        };
        total.merge(&summary);
        assert_eq!(total.sources_run, 2);
        assert_eq!(total.files_failed, 1);
    }

    #[test]
    fn test_failed_outcome_carries_detail() {
        let outcome = FileOutcome::failed(PathBuf::from("x"), "exit 1".to_string());
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_detail.as_deref(), Some("exit 1"));
    }
}
