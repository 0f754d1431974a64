//! Per-run metrics and the append-only exporter log.
//!
//! The report is an explicit value owned by the orchestrator and returned to
//! the caller at run end; the log file ships inside the interchange archive
//! so the import side can see what the export observed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

/// Metrics for one repository.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoReport {
    pub slug: String,
    pub empty: bool,
    pub pull_requests: usize,
    pub comments: usize,
    pub branch_rules: usize,
    pub webhooks: usize,
    pub labels: usize,
    pub unknown_emails: usize,
}

impl RepoReport {
    pub(crate) fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            ..Self::default()
        }
    }
}

/// Aggregated metrics for one export run.
#[derive(Debug, Default, Serialize)]
pub struct ExportReport {
    pub repos: Vec<RepoReport>,
}

impl ExportReport {
    pub fn total_pull_requests(&self) -> usize {
        self.repos.iter().map(|r| r.pull_requests).sum()
    }

    pub fn total_comments(&self) -> usize {
        self.repos.iter().map(|r| r.comments).sum()
    }

    pub fn total_unknown_emails(&self) -> usize {
        self.repos.iter().map(|r| r.unknown_emails).sum()
    }

    pub(crate) fn log_summary(&self) {
        tracing::info!(
            repos = self.repos.len(),
            pull_requests = self.total_pull_requests(),
            comments = self.total_comments(),
            unknown_emails = self.total_unknown_emails(),
            "export finished"
        );
        for repo in &self.repos {
            tracing::info!(
                slug = %repo.slug,
                empty = repo.empty,
                pull_requests = repo.pull_requests,
                comments = repo.comments,
                branch_rules = repo.branch_rules,
                webhooks = repo.webhooks,
                labels = repo.labels,
                unknown_emails = repo.unknown_emails,
                "repository report"
            );
        }
    }
}

/// Append-only run log written into the working tree.
#[derive(Debug)]
pub(crate) struct RunLog {
    file: Mutex<File>,
}

impl RunLog {
    pub(crate) fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one timestamped line. Log-file write failures never abort the
    /// run.
    pub(crate) fn event(&self, message: &str) {
        let line = format!("{} {message}\n", chrono::Utc::now().to_rfc3339());
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to append to exporter log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_across_repositories() {
        let report = ExportReport {
            repos: vec![
                RepoReport {
                    slug: "a".to_string(),
                    pull_requests: 2,
                    comments: 5,
                    unknown_emails: 1,
                    ..RepoReport::default()
                },
                RepoReport {
                    slug: "b".to_string(),
                    pull_requests: 3,
                    comments: 1,
                    ..RepoReport::default()
                },
            ],
        };
        assert_eq!(report.total_pull_requests(), 5);
        assert_eq!(report.total_comments(), 6);
        assert_eq!(report.total_unknown_emails(), 1);
    }

    #[test]
    fn run_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.log");

        let log = RunLog::open(&path).unwrap();
        log.event("repo app start");
        log.event("repo app done");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("repo app start"));
        assert!(lines[1].ends_with("repo app done"));
    }
}
