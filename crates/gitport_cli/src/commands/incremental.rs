use std::path::Path;
use std::sync::Arc;

use gitport::gitexec::GitRunner;
use gitport::incremental::{IncrementalMigration, TargetClient, update_pr_references};
use gitport::provider::ProviderError;

/// Construct the target-system client used to read the PR offset.
///
/// Like the provider adapters, the target client ships separately; with an
/// explicit `--offset` the remap runs fully locally and never needs it.
fn build_target_client() -> Result<Arc<dyn TargetClient>, ProviderError> {
    Err(ProviderError::not_supported(
        "target client (pass --offset to remap without one)",
    ))
}

pub(crate) async fn handle_incremental(
    repo_path: &Path,
    offset: Option<u64>,
    repo: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = match offset {
        Some(offset) => {
            tracing::info!(repo_path = %repo_path.display(), offset, "remapping pull-request refs");
            let git = GitRunner::new(repo_path);
            update_pr_references(&git, offset).await?
        }
        None => {
            let repo = repo.ok_or("either --offset or --repo is required")?;
            let client = build_target_client()?;
            let migration = IncrementalMigration::new(client);
            migration.run(repo, repo_path).await?
        }
    };

    tracing::info!(moved = stats.moved, skipped = stats.skipped, "reference remap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_offset_and_repo_is_a_usage_error() {
        let err = handle_incremental(Path::new("/nonexistent"), None, None)
            .await
            .expect_err("needs --offset or --repo");
        assert!(err.to_string().contains("--offset"));
    }
}
