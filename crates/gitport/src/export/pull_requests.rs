//! Pull-request collection with per-request comment fan-out.
//!
//! Pull requests are paginated sequentially through the shared resume
//! algorithm; comment and reviewer fetches fan out through the task pool in
//! batches of one listing page, so concurrent outbound calls stay bounded by
//! the worker count no matter how many pull requests a page holds.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::pool::{Task, TaskError, execute_batch};
use crate::provider::{
    Provider, PullRequest, PullRequestData, User, fallback_email, is_fallback_email,
};

use super::ExportError;
use super::resources::fetch_paginated;

/// Fetch all pull requests for `slug`, expanding comments and reviewers for
/// each. Output order matches the provider's pull-request order.
pub(crate) async fn collect_pull_requests<P>(
    provider: &P,
    checkpoint: &Arc<CheckpointStore>,
    cancel: &CancellationToken,
    workers: usize,
    page_size: u32,
    slug: &str,
    fetch_comments: bool,
) -> Result<Vec<PullRequestData>, ExportError>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    let prs = fetch_paginated(checkpoint, cancel, &format!("{slug}/pr"), page_size, |opts| {
        provider.list_pull_requests(slug, opts)
    })
    .await?;

    let mut out = Vec::with_capacity(prs.len());
    for batch in prs.chunks(page_size.max(1) as usize) {
        let tasks: Vec<Task<PullRequestData, ExportError>> = batch
            .iter()
            .enumerate()
            .map(|(i, pr)| {
                let provider = provider.clone();
                let checkpoint = Arc::clone(checkpoint);
                let slug = slug.to_string();
                let pr = pr.clone();
                Task::new(i, move |cancel| async move {
                    expand_pull_request(
                        &provider,
                        &checkpoint,
                        &cancel,
                        &slug,
                        page_size,
                        pr,
                        fetch_comments,
                    )
                    .await
                })
            })
            .collect();

        let expanded = execute_batch(cancel, workers, tasks)
            .await
            .map_err(|e| match e {
                TaskError::Cancelled => ExportError::Cancelled,
                TaskError::Failed(e) => e,
            })?;
        out.extend(expanded);
    }
    Ok(out)
}

async fn expand_pull_request<P: Provider>(
    provider: &P,
    checkpoint: &CheckpointStore,
    cancel: &CancellationToken,
    slug: &str,
    page_size: u32,
    mut pr: PullRequest,
    fetch_comments: bool,
) -> Result<PullRequestData, ExportError> {
    let number = pr.number;

    let mut comments = if fetch_comments {
        fetch_paginated(
            checkpoint,
            cancel,
            &format!("{slug}/pr/{number}/comment"),
            page_size,
            |opts| provider.list_pull_request_comments(slug, number, opts),
        )
        .await?
    } else {
        Vec::new()
    };

    let reviewers = match provider.pull_request_reviewers(slug, number).await {
        Ok(reviewers) => reviewers,
        Err(e) if e.is_not_supported() => {
            tracing::debug!(slug, number, "platform does not report reviewers");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    ensure_email(provider, &mut pr.author).await;
    for comment in &mut comments {
        ensure_email(provider, &mut comment.author).await;
    }

    Ok(PullRequestData {
        pull_request: pr,
        comments,
        reviewers,
    })
}

/// Backfill an author email the platform did not return inline.
async fn ensure_email<P: Provider>(provider: &P, user: &mut User) {
    if !user.email.is_empty() {
        return;
    }
    match provider.resolve_user_email(&user.login).await {
        Ok(email) => user.email = email,
        Err(e) => {
            tracing::warn!(login = %user.login, error = %e, "email lookup failed, synthesizing");
            user.email = fallback_email(user.name.as_deref().unwrap_or(&user.login));
        }
    }
    if is_fallback_email(&user.email) {
        tracing::debug!(login = %user.login, email = %user.email, "using synthesized fallback email");
    }
}
