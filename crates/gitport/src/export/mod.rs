//! The export orchestrator: the top-level state machine for one export run.
//!
//! Sequence: list repositories, then per repository clone and collect
//! metadata (webhooks, branch rules, labels, pull requests with comments
//! fanned out through the task pool), then write the interchange tree, zip
//! it, clean up the checkpoint, and delete the working tree. Every paginated
//! listing is checkpointed so an interrupted run resumes without refetching
//! completed pages.

mod archive;
mod pull_requests;
mod report;
mod resources;
mod users;
mod writer;

pub use report::{ExportReport, RepoReport};
pub use writer::MAX_CHUNK_BYTES;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::gitexec::{CloneOutcome, GitError, GitRunner};
use crate::provider::{Provider, ProviderError, Repository};

use report::{RepoReport as RepoRecord, RunLog};
use users::UserDirectory;
use writer::InterchangeWriter;

/// Default comment-fetch parallelism.
pub const DEFAULT_WORKERS: usize = 20;

/// Fixed page size for all listings.
pub const PAGE_SIZE: u32 = 100;

/// Errors that terminate an export run.
///
/// The checkpoint file survives every variant here, so `--resume` is always
/// the recovery path.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("export cancelled")]
    Cancelled,

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Organization to export.
    pub org: String,
    /// Working directory; also where the archive lands.
    pub export_dir: PathBuf,
    /// Resume from an existing checkpoint instead of starting fresh.
    pub resume: bool,
    pub skip_pull_requests: bool,
    pub skip_comments: bool,
    pub skip_webhooks: bool,
    pub skip_branch_rules: bool,
    pub skip_labels: bool,
    pub skip_lfs: bool,
    /// Comment-fetch parallelism.
    pub workers: usize,
}

impl ExportOptions {
    pub fn new(org: impl Into<String>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            org: org.into(),
            export_dir: export_dir.into(),
            resume: false,
            skip_pull_requests: false,
            skip_comments: false,
            skip_webhooks: false,
            skip_branch_rules: false,
            skip_labels: false,
            skip_lfs: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct ExportSummary {
    /// Path of the interchange archive.
    pub archive: PathBuf,
    /// Per-repository metrics.
    pub report: ExportReport,
}

/// Drives one export run end to end.
pub struct Exporter<P> {
    provider: P,
    options: ExportOptions,
    checkpoint: Arc<CheckpointStore>,
    cancel: CancellationToken,
}

impl<P> Exporter<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(provider: P, options: ExportOptions, cancel: CancellationToken) -> Self {
        let checkpoint = Arc::new(CheckpointStore::new(
            options.export_dir.join("checkpoint.ckpt"),
        ));
        Self {
            provider,
            options,
            checkpoint,
            cancel,
        }
    }

    /// Run the export. On error the checkpoint file is left in place and a
    /// rerun with `resume` picks up where this one stopped.
    pub async fn run(&self) -> Result<ExportSummary, ExportError> {
        let opts = &self.options;
        fs::create_dir_all(&opts.export_dir)?;

        if opts.resume {
            self.checkpoint.load()?;
        } else {
            self.checkpoint.reset()?;
        }

        let log = RunLog::open(&opts.export_dir.join("exporter.log"))?;
        let writer = InterchangeWriter::new(&opts.export_dir, &opts.org);

        tracing::info!(
            org = %opts.org,
            platform = self.provider.name(),
            resume = opts.resume,
            "starting export"
        );
        let repos = resources::fetch_paginated(&self.checkpoint, &self.cancel, "repos", PAGE_SIZE, |o| {
            self.provider.list_repositories(&opts.org, o)
        })
        .await?;
        log.event(&format!(
            "discovered {} repositories in {}",
            repos.len(),
            opts.org
        ));

        let mut report = ExportReport::default();
        let mut user_directory = UserDirectory::default();

        for repo in &repos {
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            let record = self
                .export_repository(repo, &writer, &log, &mut user_directory)
                .await?;
            report.repos.push(record);
        }

        user_directory.write(&opts.export_dir)?;
        log.event(&format!(
            "collected {} distinct user emails",
            user_directory.len()
        ));
        log.event("export complete, archiving");

        let archive = archive::create_archive(&opts.export_dir, &opts.org)?;
        if let Err(e) = self.checkpoint.cleanup() {
            tracing::warn!(error = %e, "failed to remove checkpoint after success");
        }
        archive::remove_working_tree(&opts.export_dir, &archive);

        report.log_summary();
        Ok(ExportSummary { archive, report })
    }

    async fn export_repository(
        &self,
        repo: &Repository,
        writer: &InterchangeWriter,
        log: &RunLog,
        user_directory: &mut UserDirectory,
    ) -> Result<RepoRecord, ExportError> {
        let opts = &self.options;
        let slug = repo.slug.as_str();
        let mut record = RepoRecord::new(slug);

        tracing::info!(slug, "exporting repository");
        log.event(&format!("repo {slug} start"));
        writer.write_info(repo)?;

        // A repo with no history cannot meaningfully have branch rules or
        // pull requests relative to it in this pipeline's model.
        if repo.is_empty {
            record.empty = true;
            tracing::info!(slug, "repository is empty, skipping");
            log.event(&format!("repo {slug} empty, skipped"));
            return Ok(record);
        }

        let refspec = self.provider.pull_request_refs();
        let dest = writer.repo_dir(slug).join("git");
        let (outcome, _git) =
            GitRunner::clone_from(&repo.clone_url, &dest, Some(&refspec), !opts.skip_lfs).await?;
        if outcome == CloneOutcome::AlreadyCloned {
            log.event(&format!("repo {slug} already cloned"));
        }

        if !opts.skip_webhooks {
            let hooks =
                resources::fetch_paginated(&self.checkpoint, &self.cancel, &format!("{slug}/webhook"), PAGE_SIZE, |o| {
                    self.provider.list_webhooks(slug, o)
                })
                .await?;
            record.webhooks = hooks.len();
            writer.write_webhooks(slug, &hooks)?;
        }

        let rules = if opts.skip_branch_rules {
            Vec::new()
        } else {
            resources::fetch_paginated(&self.checkpoint, &self.cancel, &format!("{slug}/rule"), PAGE_SIZE, |o| {
                self.provider.list_branch_rules(slug, o)
            })
            .await?
        };
        record.branch_rules = rules.len();
        writer.write_branch_rules(slug, &rules)?;

        if !opts.skip_labels {
            let labels =
                resources::fetch_paginated(&self.checkpoint, &self.cancel, &format!("{slug}/label"), PAGE_SIZE, |o| {
                    self.provider.list_labels(slug, o)
                })
                .await?;
            record.labels = labels.len();
            writer.write_labels(slug, &labels)?;
        }

        let prs = if opts.skip_pull_requests {
            Vec::new()
        } else {
            pull_requests::collect_pull_requests(
                &self.provider,
                &self.checkpoint,
                &self.cancel,
                opts.workers,
                PAGE_SIZE,
                slug,
                !opts.skip_comments,
            )
            .await?
        };
        record.pull_requests = prs.len();
        record.comments = prs.iter().map(|p| p.comments.len()).sum();
        writer.write_pull_requests(slug, &prs)?;

        record.unknown_emails = user_directory.add_repo(&prs, &rules);

        log.event(&format!(
            "repo {slug} done: {} PRs, {} comments, {} rules, {} webhooks, {} labels",
            record.pull_requests, record.comments, record.branch_rules, record.webhooks,
            record.labels
        ));
        Ok(record)
    }
}
