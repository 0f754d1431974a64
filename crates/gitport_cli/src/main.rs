//! Gitport CLI - command-line interface for the migration engine.

mod commands;
mod config;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::Platform;

#[derive(Parser)]
#[command(name = "gitport")]
#[command(version)]
#[command(about = "A resumable source-control migration engine")]
#[command(
    long_about = "Gitport exports an organization's source-control metadata (repositories, \
pull requests, comments, branch rules, webhooks, labels, and git data) from a \
hosting platform into a self-contained interchange archive, and remaps \
pull-request references when merging a second migration pass into an \
already-populated target repository."
)]
#[command(after_long_help = r#"EXAMPLES
    Export an organization:
        $ gitport export my-org --out /data/export

    Resume an interrupted export:
        $ gitport export my-org --out /data/export --resume

    Export without pull-request comments or webhooks:
        $ gitport export my-org --no-comment --no-webhook

    Remap pull-request refs for a second migration pass:
        $ gitport incremental /data/clones/my-repo --offset 317

    Generate shell completions:
        $ gitport completions bash > ~/.local/share/bash-completion/completions/gitport

CONFIGURATION
    Gitport reads configuration from:
      1. ~/.config/gitport/config.toml (or $XDG_CONFIG_HOME/gitport/config.toml)
      2. ./gitport.toml
      3. Environment variables (GITPORT_* prefix, e.g., GITPORT_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITPORT_EXPORT_DIR        Default export directory
    GITPORT_GITHUB_TOKEN      GitHub personal access token
    GITPORT_GITLAB_TOKEN      GitLab personal access token
    GITPORT_GITLAB_HOST       GitLab host (default: gitlab.com)
    GITPORT_BITBUCKET_TOKEN   Bitbucket Cloud app password
    GITPORT_STASH_TOKEN       Bitbucket Server/Stash token
    GITPORT_STASH_HOST        Bitbucket Server/Stash host URL
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export an organization into an interchange archive
    Export {
        /// Organization to export
        org: String,

        #[command(flatten)]
        export_opts: ExportArgs,
    },
    /// Remap pull-request refs in a local clone for a follow-up migration
    Incremental {
        /// Path to the local working clone
        repo_path: PathBuf,

        /// Shift every pull-request ref by this amount; when omitted, the
        /// offset is read from the target platform
        #[arg(short, long)]
        offset: Option<u64>,

        /// Repository identifier on the target (required without --offset)
        #[arg(short, long)]
        repo: Option<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Export options shared between platforms.
#[derive(Debug, Clone, clap::Args)]
struct ExportArgs {
    /// Export directory (default from config or ./gitport-export)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Resume from an existing checkpoint instead of starting fresh
    #[arg(short, long)]
    resume: bool,

    /// Skip pull requests entirely
    #[arg(long)]
    no_pr: bool,

    /// Skip pull-request comments
    #[arg(long)]
    no_comment: bool,

    /// Skip webhooks
    #[arg(long)]
    no_webhook: bool,

    /// Skip branch protection rules
    #[arg(long)]
    no_rule: bool,

    /// Skip labels
    #[arg(long)]
    no_label: bool,

    /// Skip fetching git-lfs objects after clone
    #[arg(long)]
    no_lfs: bool,

    /// Source platform
    #[arg(short, long, value_enum, default_value_t = Platform::Github)]
    platform: Platform,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cancel = shutdown::setup_shutdown_handler();

    // Structured logging; quieter defaults when attached to a terminal.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("gitport=info,gitport_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(Term::stdout().is_term())
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export { org, export_opts } => {
            commands::export::handle_export(&org, &export_opts, &config, cancel).await?;
        }
        Commands::Incremental {
            repo_path,
            offset,
            repo,
        } => {
            commands::incremental::handle_incremental(&repo_path, offset, repo.as_deref()).await?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
    }

    Ok(())
}
