use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gitport::export::{ExportOptions, Exporter};
use gitport::provider::{Provider, ProviderError};

use super::Platform;
use crate::ExportArgs;
use crate::config::Config;

/// Construct the adapter for the selected platform.
///
/// Adapters ship separately from the engine; this build bundles none, so the
/// factory reports which one was requested.
fn build_provider(
    platform: Platform,
    _config: &Config,
) -> Result<Arc<dyn Provider>, ProviderError> {
    Err(ProviderError::not_supported(format!(
        "{platform} adapter (platform adapters ship separately from this build)"
    )))
}

pub(crate) async fn handle_export(
    org: &str,
    args: &ExportArgs,
    config: &Config,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = args.out.clone().unwrap_or_else(|| config.export_dir());

    let mut options = ExportOptions::new(org, export_dir);
    options.resume = args.resume;
    options.skip_pull_requests = args.no_pr;
    options.skip_comments = args.no_comment;
    options.skip_webhooks = args.no_webhook;
    options.skip_branch_rules = args.no_rule;
    options.skip_labels = args.no_label;
    options.skip_lfs = args.no_lfs;

    tracing::info!(
        org,
        platform = %args.platform,
        dir = %options.export_dir.display(),
        resume = options.resume,
        "starting export"
    );

    let adapter = build_provider(args.platform, config)?;
    let exporter = Exporter::new(adapter, options, cancel);
    let summary = exporter.run().await?;

    tracing::info!(archive = %summary.archive.display(), "export complete");
    Ok(())
}
