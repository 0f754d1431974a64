//! Platform-agnostic contract for source-platform adapters.
//!
//! This module defines the [`Provider`] trait that the export orchestrator
//! consumes without knowing which platform backs it (GitHub, GitLab,
//! Bitbucket Cloud, Bitbucket Server, ...), plus the common data model the
//! adapters translate platform responses into.
//!
//! # Example
//!
//! ```ignore
//! use gitport::provider::{ListOptions, Provider};
//!
//! async fn first_page<P: Provider>(adapter: &P, org: &str) -> Result<(), ProviderError> {
//!     let page = adapter.list_repositories(org, ListOptions::first(100)).await?;
//!     for repo in page.values {
//!         println!("{}", repo.slug);
//!     }
//!     Ok(())
//! }
//! ```

mod errors;
mod types;

pub use errors::{ProviderError, Result, short_error_message};
pub use types::{
    BranchRule, Comment, Label, ListOptions, Page, Provider, PullRequest, PullRequestData,
    PullRequestState, Repository, User, Webhook, fallback_email, is_fallback_email,
};
