//! Gitport - a resumable source-control migration engine.
//!
//! This library provides the orchestration core for migrating an
//! organization's source-control metadata (repositories, pull requests,
//! comments, branch rules, webhooks, labels, and the underlying git data)
//! from one hosting platform to another:
//!
//! - a checkpointed pagination store so interrupted exports resume without
//!   re-downloading already-fetched pages ([`checkpoint`]),
//! - a bounded task pool for fanning out nested per-resource fetches such as
//!   "comments for every pull request" ([`pool`]),
//! - the export orchestrator that sequences repository discovery, git clone,
//!   metadata collection, and archival ([`export`]),
//! - an incremental-migration handler that merges a second migration pass
//!   into an already-populated target repository without reference
//!   collisions ([`incremental`]).
//!
//! Platform-specific adapters (GitHub, GitLab, Bitbucket, ...) implement the
//! [`provider::Provider`] trait and are supplied by the embedding
//! application; this crate only depends on the contract.
//!
//! # Example
//!
//! ```ignore
//! use gitport::export::{ExportOptions, Exporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let options = ExportOptions::new("my-org", "/tmp/export");
//! let exporter = Exporter::new(adapter, options, CancellationToken::new());
//! let summary = exporter.run().await?;
//! println!("archive at {}", summary.archive.display());
//! ```

pub mod checkpoint;
pub mod export;
pub mod gitexec;
pub mod incremental;
pub mod pool;
pub mod provider;
pub mod retry;

pub use checkpoint::{CheckpointError, CheckpointStore, DRAINED_CURSOR};
pub use export::{ExportError, ExportOptions, ExportSummary, Exporter};
pub use gitexec::{CloneOutcome, GitError, GitRunner};
pub use incremental::{
    IncrementalError, IncrementalMigration, RemapStats, RepoSettings, TargetClient,
    TargetRepository, update_pr_references,
};
pub use pool::{PoolError, Task, TaskError, TaskPool, TaskResult, execute_batch};
pub use provider::{ListOptions, Page, Provider, ProviderError, fallback_email, is_fallback_email};
