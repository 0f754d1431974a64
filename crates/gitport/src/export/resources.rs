//! The per-resource resume algorithm shared by every paginated listing.
//!
//! Each resource (repositories, webhooks, branch rules, labels, pull
//! requests, comments) is checkpointed under two keys: `<key>` holds the
//! page cursor and `<key>/data` the accumulated items. Data is re-saved
//! before the cursor after every page, so a crash between the two saves only
//! refetches one page on resume, never skips one.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointStore, DRAINED_CURSOR, save_or_warn};
use crate::provider::{ListOptions, Page, ProviderError};
use crate::retry::fetch_with_retry;

use super::ExportError;

/// Fetch all pages of one resource, resuming from checkpointed state.
///
/// When the cursor is already the drained marker, `fetch` is never called
/// and the cached data is returned as-is. Cancellation is honored between
/// pages; the checkpoint stays resumable.
pub(crate) async fn fetch_paginated<T, F, Fut>(
    checkpoint: &CheckpointStore,
    cancel: &CancellationToken,
    key: &str,
    page_size: u32,
    mut fetch: F,
) -> Result<Vec<T>, ExportError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>, ProviderError>>,
{
    let data_key = format!("{key}/data");

    let mut items: Vec<T> = checkpoint.get(&data_key)?.unwrap_or_default();
    let mut cursor: i64 = checkpoint.get(key)?.unwrap_or(1);

    if cursor == DRAINED_CURSOR {
        tracing::debug!(key, cached = items.len(), "resource already drained, using cache");
        return Ok(items);
    }

    loop {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let page_number = u32::try_from(cursor).map_err(|_| {
            ExportError::Internal(format!("checkpoint cursor for {key} out of range: {cursor}"))
        })?;
        let opts = ListOptions {
            page: page_number,
            size: page_size,
        };
        let page = fetch_with_retry(key, || fetch(opts)).await?;

        items.extend(page.values);
        save_or_warn(checkpoint, &data_key, &items);

        if page.next == 0 {
            save_or_warn(checkpoint, key, &DRAINED_CURSOR);
            break;
        }
        cursor = i64::from(page.next);
        save_or_warn(checkpoint, key, &cursor);
    }

    tracing::debug!(key, total = items.len(), "resource pagination drained");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("checkpoint.ckpt"))
    }

    fn three_pages(calls: &Arc<AtomicU32>, opts: ListOptions) -> Result<Page<u32>, ProviderError> {
        calls.fetch_add(1, Ordering::SeqCst);
        match opts.page {
            1 => Ok(Page { values: vec![1, 2], next: 2 }),
            2 => Ok(Page { values: vec![3, 4], next: 3 }),
            3 => Ok(Page { values: vec![5], next: 0 }),
            n => Err(ProviderError::internal(format!("unexpected page {n}"))),
        }
    }

    #[tokio::test]
    async fn pages_accumulate_in_provider_order() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = store(&dir);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_ref = Arc::clone(&calls);
        let items = fetch_paginated(&ckpt, &CancellationToken::new(), "repo/pr", 2, |opts| {
            let result = three_pages(&calls_ref, opts);
            async move { result }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(ckpt.get::<i64>("repo/pr").unwrap(), Some(DRAINED_CURSOR));
    }

    #[tokio::test]
    async fn drained_resource_never_fetches_again() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = store(&dir);
        ckpt.save("repo/pr/data", &vec![9u32, 8]).unwrap();
        ckpt.save("repo/pr", &DRAINED_CURSOR).unwrap();

        let items: Vec<u32> = fetch_paginated(&ckpt, &CancellationToken::new(), "repo/pr", 2, |_| async {
            panic!("fetch must not be called for a drained resource")
        })
        .await
        .unwrap();

        assert_eq!(items, vec![9, 8]);
    }

    #[tokio::test]
    async fn resume_continues_from_saved_cursor_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        // First run dies after page 2: data for pages 1-2 and cursor 3 are
        // checkpointed.
        {
            let ckpt = store(&dir);
            ckpt.save("repo/pr/data", &vec![1u32, 2, 3, 4]).unwrap();
            ckpt.save("repo/pr", &3i64).unwrap();
        }

        let ckpt = store(&dir);
        ckpt.load().unwrap();
        let calls_ref = Arc::clone(&calls);
        let items = fetch_paginated(&ckpt, &CancellationToken::new(), "repo/pr", 2, |opts| {
            let result = three_pages(&calls_ref, opts);
            async move { result }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        // Only the final page was refetched.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_checkpoint_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = store(&dir);

        let err = fetch_paginated::<u32, _, _>(&ckpt, &CancellationToken::new(), "repo/pr", 2, |opts| async move {
            match opts.page {
                1 => Ok(Page { values: vec![1, 2], next: 2 }),
                _ => Err(ProviderError::api("provider outage")),
            }
        })
        .await
        .expect_err("page 2 fails");
        assert!(matches!(err, ExportError::Provider(_)));

        // Page 1 survived, cursor points at the failed page.
        assert_eq!(ckpt.get::<Vec<u32>>("repo/pr/data").unwrap(), Some(vec![1, 2]));
        assert_eq!(ckpt.get::<i64>("repo/pr").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn cancellation_stops_the_listing_between_pages() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = store(&dir);
        let cancel = CancellationToken::new();

        let cancel_ref = cancel.clone();
        let err = fetch_paginated::<u32, _, _>(&ckpt, &cancel, "repo/pr", 2, |opts| {
            // Cancel mid-listing: page 2 must never be requested.
            cancel_ref.cancel();
            async move {
                assert_eq!(opts.page, 1);
                Ok(Page { values: vec![1, 2], next: 2 })
            }
        })
        .await
        .expect_err("cancelled after page 1");
        assert!(matches!(err, ExportError::Cancelled));

        // The page that completed stays checkpointed for resume.
        assert_eq!(ckpt.get::<Vec<u32>>("repo/pr/data").unwrap(), Some(vec![1, 2]));
        assert_eq!(ckpt.get::<i64>("repo/pr").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn out_of_range_cursor_is_rejected_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = store(&dir);
        // A page number this large cannot come from a healthy run.
        ckpt.save("repo/pr", &(u64::from(u32::MAX) as i64 + 1)).unwrap();

        let err = fetch_paginated::<u32, _, _>(
            &ckpt,
            &CancellationToken::new(),
            "repo/pr",
            2,
            |opts| async move { panic!("must not fetch page {}", opts.page) },
        )
        .await
        .expect_err("corrupt cursor");
        assert!(matches!(err, ExportError::Internal(_)));
    }
}
