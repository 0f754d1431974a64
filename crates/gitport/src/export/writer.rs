//! Interchange-tree writer.
//!
//! Lays out `<exportDir>/<org>/<slug>/{info.json, webhooks.json,
//! branchrules.json, labels.json, pr/pr<N>.json...}`. Resource files are
//! only written when the resource list is non-empty; `info.json` is written
//! for every repository including empty ones. Pull requests are split into
//! chunks whose serialized size stays under a fixed bound so no single file
//! becomes too large to transfer or re-parse.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::provider::{BranchRule, Label, PullRequestData, Repository, Webhook};

use super::ExportError;

/// Serialized-size bound for one pull-request chunk file.
pub const MAX_CHUNK_BYTES: usize = 25 * 1024 * 1024;

/// Writes the per-organization interchange tree.
#[derive(Debug)]
pub(crate) struct InterchangeWriter {
    org_root: PathBuf,
}

impl InterchangeWriter {
    pub(crate) fn new(export_dir: &Path, org: &str) -> Self {
        Self {
            org_root: export_dir.join(org),
        }
    }

    /// Directory holding one repository's files.
    pub(crate) fn repo_dir(&self, slug: &str) -> PathBuf {
        self.org_root.join(slug)
    }

    pub(crate) fn write_info(&self, repo: &Repository) -> Result<(), ExportError> {
        self.write_json(&self.repo_dir(&repo.slug).join("info.json"), repo)
    }

    pub(crate) fn write_webhooks(&self, slug: &str, hooks: &[Webhook]) -> Result<(), ExportError> {
        if hooks.is_empty() {
            return Ok(());
        }
        self.write_json(&self.repo_dir(slug).join("webhooks.json"), hooks)
    }

    pub(crate) fn write_branch_rules(
        &self,
        slug: &str,
        rules: &[BranchRule],
    ) -> Result<(), ExportError> {
        if rules.is_empty() {
            return Ok(());
        }
        self.write_json(&self.repo_dir(slug).join("branchrules.json"), rules)
    }

    pub(crate) fn write_labels(&self, slug: &str, labels: &[Label]) -> Result<(), ExportError> {
        if labels.is_empty() {
            return Ok(());
        }
        self.write_json(&self.repo_dir(slug).join("labels.json"), labels)
    }

    /// Write pull requests as `pr/pr<N>.json` chunk files, returning the
    /// number of chunks written. Writes nothing (not even the `pr/`
    /// directory) when the list is empty.
    pub(crate) fn write_pull_requests(
        &self,
        slug: &str,
        prs: &[PullRequestData],
    ) -> Result<usize, ExportError> {
        if prs.is_empty() {
            return Ok(0);
        }
        let pr_dir = self.repo_dir(slug).join("pr");
        let chunks = chunk_by_size(prs, MAX_CHUNK_BYTES)?;
        for (n, chunk) in chunks.iter().enumerate() {
            self.write_json(&pr_dir.join(format!("pr{n}.json")), chunk)?;
        }
        Ok(chunks.len())
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(value)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Split `items` into consecutive subslices whose JSON-array serialization
/// each stays within `max_bytes`.
///
/// A single oversized item still gets its own chunk, since records cannot be
/// split; that case is logged.
pub(crate) fn chunk_by_size<T: Serialize>(
    items: &[T],
    max_bytes: usize,
) -> Result<Vec<&[T]>, serde_json::Error> {
    let mut chunks = Vec::new();
    let mut start = 0;
    // Array overhead: two brackets plus one comma per item after the first.
    let mut size = 2;

    for (i, item) in items.iter().enumerate() {
        let item_len = serde_json::to_vec(item)?.len();
        let sep = if i > start { 1 } else { 0 };
        if i > start && size + sep + item_len > max_bytes {
            chunks.push(&items[start..i]);
            start = i;
            size = 2;
        }
        if item_len + 2 > max_bytes {
            tracing::warn!(index = i, bytes = item_len, "single record exceeds chunk bound");
        }
        size += item_len + if i > start { 1 } else { 0 };
    }
    if start < items.len() {
        chunks.push(&items[start..]);
    }
    Ok(chunks)
}
