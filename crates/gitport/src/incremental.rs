//! Incremental migration: merging a second export into a populated target.
//!
//! When a repository has already been migrated once, the target platform has
//! assigned its own pull-request numbers. A follow-up migration must shift
//! every incoming pull-request reference by the count of pull requests the
//! target already holds, so `refs/pullreq/<n>/head` becomes
//! `refs/pullreq/<n + offset>/head` without any source number colliding with
//! a target number.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::gitexec::{GitError, GitRunner};
use crate::provider::ProviderError;

/// Namespace holding migrated pull-request head references.
pub const PR_REF_PREFIX: &str = "refs/pullreq/";

/// Errors from the incremental migration flow.
#[derive(Debug, Error)]
pub enum IncrementalError {
    /// The repository does not exist on the target.
    #[error("repository {0} not found on target")]
    RepoMissing(String),

    /// The target platform API failed.
    #[error(transparent)]
    Target(#[from] ProviderError),

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// What the reference remap did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapStats {
    /// References moved to their shifted name.
    pub moved: usize,
    /// References left in place because they did not parse or could not be
    /// moved.
    pub skipped: usize,
}

/// Minimal view of the target platform needed to compute the offset.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Look up the target repository's settings, or `None` when the
    /// repository does not exist there.
    async fn find_repo_settings(&self, repo: &str) -> Result<Option<RepoSettings>, ProviderError>;

    /// Fetch the target repository's current state, including the highest
    /// pull-request number it has assigned.
    async fn get_repository(&self, repo: &str) -> Result<TargetRepository, ProviderError>;
}

#[async_trait]
impl<C: TargetClient + ?Sized> TargetClient for std::sync::Arc<C> {
    async fn find_repo_settings(&self, repo: &str) -> Result<Option<RepoSettings>, ProviderError> {
        (**self).find_repo_settings(repo).await
    }

    async fn get_repository(&self, repo: &str) -> Result<TargetRepository, ProviderError> {
        (**self).get_repository(repo).await
    }
}

/// Target-side repository settings, used for the existence preflight.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// Target-side repository identifier.
    pub identifier: String,
    /// Default branch on the target.
    pub default_branch: String,
}

/// Target-side repository state relevant to incremental migration.
#[derive(Debug, Clone)]
pub struct TargetRepository {
    /// Target-side repository identifier.
    pub identifier: String,
    /// Highest pull-request number already assigned on the target.
    pub max_pull_request_number: u64,
}

/// The pull-request head reference for number `n`.
#[must_use]
pub fn pr_ref(n: u64) -> String {
    format!("{PR_REF_PREFIX}{n}/head")
}

/// Extract the pull-request number from a reference name, or `None` when the
/// name is not of the `refs/pullreq/<n>/head` shape.
#[must_use]
pub fn parse_pr_number(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(PR_REF_PREFIX)?;
    let n = rest.strip_suffix("/head")?;
    n.parse().ok()
}

/// Shift every pull-request reference in the repository by `offset`.
///
/// The move runs in two phases through a staging namespace: first every
/// `refs/pullreq/<n>/head` moves to a staging number above both the source
/// and final ranges, then each staged reference moves to its final
/// `n + offset` name. Without staging, a direct move could overwrite a
/// not-yet-moved reference whenever the source and final ranges overlap.
///
/// A reference that fails to move is logged and counted as skipped; the
/// remap continues with the rest.
pub async fn update_pr_references(git: &GitRunner, offset: u64) -> Result<RemapStats, GitError> {
    let refs = git.list_refs(Some(PR_REF_PREFIX)).await?;

    let mut numbered = Vec::with_capacity(refs.len());
    let mut stats = RemapStats::default();
    for r in refs {
        match parse_pr_number(&r.name) {
            Some(n) => numbered.push((n, r)),
            None => {
                tracing::warn!(name = %r.name, "unrecognized pull-request ref, leaving in place");
                stats.skipped += 1;
            }
        }
    }
    if numbered.is_empty() || offset == 0 {
        return Ok(stats);
    }

    // Staged numbers start above both the source range and the final range,
    // so neither phase can collide with an unmoved reference.
    let source_max = numbered.iter().map(|(n, _)| *n).max().unwrap_or(0);
    let staging_base = source_max + offset;

    for (n, r) in &numbered {
        let staged = pr_ref(n + staging_base);
        if let Err(e) = move_ref(git, &r.name, &staged, &r.oid).await {
            tracing::warn!(from = %r.name, to = %staged, error = %e, "failed to stage ref, skipping");
            stats.skipped += 1;
        }
    }

    for (n, r) in &numbered {
        let staged = pr_ref(n + staging_base);
        let target = pr_ref(n + offset);
        match move_ref(git, &staged, &target, &r.oid).await {
            Ok(()) => stats.moved += 1,
            Err(e) => {
                tracing::warn!(from = %staged, to = %target, error = %e, "failed to finalize ref, skipping");
                stats.skipped += 1;
            }
        }
    }

    tracing::info!(moved = stats.moved, skipped = stats.skipped, offset, "remapped pull-request refs");
    Ok(stats)
}

async fn move_ref(git: &GitRunner, from: &str, to: &str, oid: &str) -> Result<(), GitError> {
    // Verify the source still points where the listing said before moving.
    let current = git.rev_parse(from).await?;
    if current != oid {
        return Err(GitError::Output {
            command: "rev-parse".to_string(),
            detail: format!("{from} moved during remap"),
        });
    }
    git.update_ref(to, oid).await?;
    git.delete_ref(from).await
}

/// Drives an incremental migration against a target platform.
pub struct IncrementalMigration<C> {
    target: C,
}

impl<C: TargetClient> IncrementalMigration<C> {
    pub fn new(target: C) -> Self {
        Self { target }
    }

    /// Confirm the repository exists on the target. Remapping against a
    /// non-existent repository is meaningless, so this fails fast.
    pub async fn check_repository_exists(
        &self,
        repo: &str,
    ) -> Result<RepoSettings, IncrementalError> {
        self.target
            .find_repo_settings(repo)
            .await?
            .ok_or_else(|| IncrementalError::RepoMissing(repo.to_string()))
    }

    /// The offset incoming pull-request numbers must be shifted by.
    pub async fn pr_offset(&self, repo: &str) -> Result<u64, IncrementalError> {
        let existing = self.target.get_repository(repo).await?;
        Ok(existing.max_pull_request_number)
    }

    /// Run the full incremental flow for one local repository: preflight the
    /// target, compute the offset, then remap the local references.
    pub async fn run(&self, repo: &str, repo_path: &Path) -> Result<RemapStats, IncrementalError> {
        let settings = self.check_repository_exists(repo).await?;
        tracing::debug!(repo = %settings.identifier, "target repository found");
        let offset = self.pr_offset(repo).await?;
        let git = GitRunner::new(repo_path);
        Ok(update_pr_references(&git, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn pr_ref_shape_roundtrips() {
        assert_eq!(pr_ref(7), "refs/pullreq/7/head");
        assert_eq!(parse_pr_number("refs/pullreq/7/head"), Some(7));
        assert_eq!(parse_pr_number("refs/pullreq/7/merge"), None);
        assert_eq!(parse_pr_number("refs/heads/main"), None);
        assert_eq!(parse_pr_number("refs/pullreq/abc/head"), None);
    }

    async fn repo_with_prs(dir: &Path, numbers: &[u64]) -> GitRunner {
        let git = GitRunner::new(dir);
        git.run(&["init", "--initial-branch=main", "."]).await.unwrap();
        git.run(&[
            "-c",
            "user.email=test@example.com",
            "-c",
            "user.name=Test",
            "commit",
            "--allow-empty",
            "-m",
            "init",
        ])
        .await
        .unwrap();
        let head = git.rev_parse("HEAD").await.unwrap();
        for n in numbers {
            git.update_ref(&pr_ref(*n), &head).await.unwrap();
        }
        git
    }

    async fn pr_numbers(git: &GitRunner) -> BTreeSet<u64> {
        git.list_refs(Some(PR_REF_PREFIX))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| parse_pr_number(&r.name))
            .collect()
    }

    #[tokio::test]
    async fn remap_shifts_every_ref_by_the_offset() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_prs(dir.path(), &[1, 2, 3]).await;

        let head = git.rev_parse("HEAD").await.unwrap();
        let stats = update_pr_references(&git, 50).await.unwrap();
        assert_eq!(stats, RemapStats { moved: 3, skipped: 0 });

        let numbers = pr_numbers(&git).await;
        assert_eq!(numbers, BTreeSet::from([51, 52, 53]));

        // Every moved ref still points at the original commit.
        for r in git.list_refs(Some(PR_REF_PREFIX)).await.unwrap() {
            assert_eq!(r.oid, head);
        }
    }

    #[tokio::test]
    async fn overlapping_ranges_do_not_collide() {
        // Offset 2 makes final {3, 4, 5} overlap source {1, 2, 3}; a naive
        // in-place move would clobber ref 3 before it is moved.
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_prs(dir.path(), &[1, 2, 3]).await;

        let stats = update_pr_references(&git, 2).await.unwrap();
        assert_eq!(stats.moved, 3);

        let numbers = pr_numbers(&git).await;
        assert_eq!(numbers, BTreeSet::from([3, 4, 5]));
    }

    #[tokio::test]
    async fn zero_offset_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_prs(dir.path(), &[4, 9]).await;

        let stats = update_pr_references(&git, 0).await.unwrap();
        assert_eq!(stats.moved, 0);
        assert_eq!(pr_numbers(&git).await, BTreeSet::from([4, 9]));
    }

    struct FakeTarget {
        max_pr: Option<u64>,
    }

    #[async_trait]
    impl TargetClient for FakeTarget {
        async fn find_repo_settings(
            &self,
            repo: &str,
        ) -> Result<Option<RepoSettings>, ProviderError> {
            Ok(self.max_pr.map(|_| RepoSettings {
                identifier: repo.to_string(),
                default_branch: "main".to_string(),
            }))
        }

        async fn get_repository(&self, repo: &str) -> Result<TargetRepository, ProviderError> {
            match self.max_pr {
                Some(max_pull_request_number) => Ok(TargetRepository {
                    identifier: repo.to_string(),
                    max_pull_request_number,
                }),
                None => Err(ProviderError::not_found(repo)),
            }
        }
    }

    #[tokio::test]
    async fn missing_target_repo_is_an_error() {
        let migration = IncrementalMigration::new(FakeTarget { max_pr: None });
        let err = migration
            .check_repository_exists("org/app")
            .await
            .expect_err("missing repo");
        assert!(matches!(err, IncrementalError::RepoMissing(_)));
    }

    #[tokio::test]
    async fn run_uses_target_pr_count_as_offset() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_prs(dir.path(), &[1, 2]).await;

        let migration = IncrementalMigration::new(FakeTarget { max_pr: Some(10) });
        let stats = migration.run("org/app", dir.path()).await.unwrap();
        assert_eq!(stats.moved, 2);
        assert_eq!(pr_numbers(&git).await, BTreeSet::from([11, 12]));
    }
}
