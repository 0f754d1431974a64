use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Reserved suffix tagging synthesized fallback emails.
///
/// Emails carrying this suffix are counted as a distinct "unknown email"
/// metric in the export report rather than silently mixed into the resolved
/// user set.
pub const FALLBACK_EMAIL_SUFFIX: &str = "@unknownaccount.invalid";

/// Pagination options for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Page number to fetch (1-indexed).
    pub page: u32,
    /// Page size.
    pub size: u32,
}

impl ListOptions {
    /// Options for the first page at the given size.
    #[inline]
    #[must_use]
    pub fn first(size: u32) -> Self {
        Self { page: 1, size }
    }
}

/// One page of a paginated listing.
///
/// `next == 0` means the listing is exhausted, mirrored by the checkpoint
/// cursor convention (`-1` once the terminal marker is recorded).
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The items on this page, in provider order.
    pub values: Vec<T>,
    /// Next page to fetch, or `0` when exhausted.
    pub next: u32,
}

impl<T> Page<T> {
    /// Whether this is the final page.
    #[inline]
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next == 0
    }
}

/// A repository as reported by the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Repository identifier within the organization (e.g. `"backend-api"`).
    pub slug: String,
    /// URL used for `git clone`.
    pub clone_url: String,
    /// Default branch name.
    pub default_branch: String,
    /// Whether the repository has no git history.
    pub is_empty: bool,
    /// Whether the repository is private.
    pub is_private: bool,
    /// When the repo was created (if the platform reports it).
    pub created_at: Option<DateTime<Utc>>,
}

/// A user reference attached to pull requests and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform login/username.
    pub login: String,
    /// Display name (if available).
    pub name: Option<String>,
    /// Email, possibly empty when the platform does not return it inline.
    pub email: String,
}

/// Pull request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// A pull request from any platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// Platform-assigned number, unique per repository.
    pub number: u64,
    /// Title line.
    pub title: String,
    /// Description body (may be empty).
    pub body: String,
    /// Author of the pull request.
    pub author: User,
    /// Source branch name.
    pub source_branch: String,
    /// Target branch name.
    pub target_branch: String,
    /// Lifecycle state.
    pub state: PullRequestState,
    /// When the pull request was created.
    pub created_at: Option<DateTime<Utc>>,
    /// When the pull request was last updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A comment on a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Platform-assigned comment id.
    pub id: u64,
    /// Comment text.
    pub body: String,
    /// Comment author.
    pub author: User,
    /// When the comment was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// A pull request together with its lazily-fetched attachments.
///
/// The element's position in its containing slice is stable and equals the
/// originating request index, even though comments for different pull
/// requests resolve out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestData {
    /// The pull request itself.
    pub pull_request: PullRequest,
    /// All comments, in provider order.
    pub comments: Vec<Comment>,
    /// Requested reviewers; empty when the platform lacks the concept.
    pub reviewers: Vec<User>,
}

/// A branch protection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRule {
    /// Branch name or pattern the rule applies to.
    pub pattern: String,
    /// Whether deletion of matching branches is blocked.
    pub block_deletion: bool,
    /// Whether force pushes to matching branches are blocked.
    pub block_force_push: bool,
    /// Emails of users allowed to bypass the rule.
    pub bypass_emails: Vec<String>,
}

/// A repository webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Platform-assigned identifier.
    pub id: String,
    /// Delivery URL.
    pub url: String,
    /// Subscribed event names in platform vocabulary.
    pub events: Vec<String>,
    /// Whether the hook is enabled.
    pub active: bool,
}

/// An issue/pull-request label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Hex color without the leading `#`.
    pub color: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Synthesize a deterministic fallback email for a user whose address the
/// platform would not reveal.
///
/// The local part is the display name lowercased with runs of
/// non-alphanumeric characters collapsed to single dots; the reserved
/// [`FALLBACK_EMAIL_SUFFIX`] tags the result so the report can count these
/// separately. Adapters log each time this fires.
#[must_use]
pub fn fallback_email(display_name: &str) -> String {
    let mut local = String::with_capacity(display_name.len());
    let mut last_was_dot = true; // suppress a leading dot
    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            local.push(c.to_ascii_lowercase());
            last_was_dot = false;
        } else if !last_was_dot {
            local.push('.');
            last_was_dot = true;
        }
    }
    while local.ends_with('.') {
        local.pop();
    }
    if local.is_empty() {
        local.push_str("unknown");
    }
    format!("{local}{FALLBACK_EMAIL_SUFFIX}")
}

/// Check whether an email was synthesized by [`fallback_email`].
#[inline]
#[must_use]
pub fn is_fallback_email(email: &str) -> bool {
    email.ends_with(FALLBACK_EMAIL_SUFFIX)
}

/// Trait for source-platform adapters.
///
/// Each adapter translates one platform's REST/GraphQL responses into the
/// common data model above. List operations are page-at-a-time: the
/// orchestrator owns the pagination loop so every page boundary can be
/// checkpointed.
///
/// # Implementation Notes
///
/// Implementors should:
/// - Return one page per call, honoring [`ListOptions`] and setting
///   [`Page::next`] to `0` on exhaustion
/// - Convert platform-specific errors to [`ProviderError`]
/// - Report missing concepts via `ProviderError::NotSupported` rather than
///   inventing empty answers
///
/// [`ProviderError`]: super::ProviderError
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short platform name for logs (e.g. `"github"`).
    fn name(&self) -> &str;

    /// List repositories in an organization.
    async fn list_repositories(&self, org: &str, opts: ListOptions) -> Result<Page<Repository>>;

    /// List pull requests in a repository, all states.
    async fn list_pull_requests(&self, repo: &str, opts: ListOptions)
    -> Result<Page<PullRequest>>;

    /// List the comments on one pull request.
    async fn list_pull_request_comments(
        &self,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<Comment>>;

    /// List branch protection rules in a repository.
    async fn list_branch_rules(&self, repo: &str, opts: ListOptions) -> Result<Page<BranchRule>>;

    /// List webhooks in a repository.
    async fn list_webhooks(&self, repo: &str, opts: ListOptions) -> Result<Page<Webhook>>;

    /// List labels in a repository.
    async fn list_labels(&self, repo: &str, opts: ListOptions) -> Result<Page<Label>>;

    /// Requested reviewers for one pull request.
    ///
    /// Platforms without the concept return `ProviderError::NotSupported`;
    /// the orchestrator treats that as "no reviewers" and moves on.
    ///
    /// [`ProviderError::NotSupported`]: super::ProviderError::NotSupported
    async fn pull_request_reviewers(&self, repo: &str, number: u64) -> Result<Vec<User>>;

    /// The refspec used when cloning so pull-request heads land under the
    /// common namespace, e.g. `refs/pull/*/head:refs/pullreq/*/head`.
    fn pull_request_refs(&self) -> String;

    /// Best-effort email resolution for a login the platform did not inline.
    ///
    /// Implementations fall back to [`fallback_email`] (and log it) when the
    /// platform refuses to reveal an address.
    async fn resolve_user_email(&self, login: &str) -> Result<String>;
}

// Lets callers pass `Arc<dyn Provider>` wherever a cloneable adapter is
// required.
#[async_trait]
impl<P: Provider + ?Sized> Provider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn list_repositories(&self, org: &str, opts: ListOptions) -> Result<Page<Repository>> {
        (**self).list_repositories(org, opts).await
    }

    async fn list_pull_requests(
        &self,
        repo: &str,
        opts: ListOptions,
    ) -> Result<Page<PullRequest>> {
        (**self).list_pull_requests(repo, opts).await
    }

    async fn list_pull_request_comments(
        &self,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<Comment>> {
        (**self).list_pull_request_comments(repo, number, opts).await
    }

    async fn list_branch_rules(&self, repo: &str, opts: ListOptions) -> Result<Page<BranchRule>> {
        (**self).list_branch_rules(repo, opts).await
    }

    async fn list_webhooks(&self, repo: &str, opts: ListOptions) -> Result<Page<Webhook>> {
        (**self).list_webhooks(repo, opts).await
    }

    async fn list_labels(&self, repo: &str, opts: ListOptions) -> Result<Page<Label>> {
        (**self).list_labels(repo, opts).await
    }

    async fn pull_request_reviewers(&self, repo: &str, number: u64) -> Result<Vec<User>> {
        (**self).pull_request_reviewers(repo, number).await
    }

    fn pull_request_refs(&self) -> String {
        (**self).pull_request_refs()
    }

    async fn resolve_user_email(&self, login: &str) -> Result<String> {
        (**self).resolve_user_email(login).await
    }
}
