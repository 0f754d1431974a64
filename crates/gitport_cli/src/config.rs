//! Configuration file support for gitport.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `GITPORT_`, e.g., `GITPORT_GITHUB_TOKEN`)
//! 3. Config file (~/.config/gitport/config.toml or ./gitport.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [export]
//! dir = "/data/gitport-export"
//!
//! [github]
//! token = "ghp_..."  # or use GITPORT_GITHUB_TOKEN env var
//!
//! [gitlab]
//! host = "gitlab.com"  # or self-hosted instance
//! token = "glpat-..."  # or use GITPORT_GITLAB_TOKEN env var
//!
//! [bitbucket]
//! username = "..."
//! token = "..."  # app password; or use GITPORT_BITBUCKET_TOKEN env var
//!
//! [stash]
//! host = "https://stash.example.com"
//! token = "..."  # or use GITPORT_STASH_TOKEN env var
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Export defaults.
    pub export: ExportConfig,
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// GitLab configuration.
    pub gitlab: GitLabConfig,
    /// Bitbucket Cloud configuration.
    pub bitbucket: BitbucketConfig,
    /// Bitbucket Server/Stash configuration.
    pub stash: StashConfig,
}

/// Export defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default export directory.
    /// Can also be set via GITPORT_EXPORT_DIR environment variable.
    pub dir: Option<PathBuf>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via GITPORT_GITHUB_TOKEN environment variable.
    pub token: Option<String>,
}

/// GitLab configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// GitLab host (e.g., "gitlab.com" or "https://gitlab.example.com").
    /// Can also be set via GITPORT_GITLAB_HOST environment variable.
    pub host: Option<String>,
    /// GitLab API token (personal access token).
    /// Can also be set via GITPORT_GITLAB_TOKEN environment variable.
    pub token: Option<String>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            host: Some("gitlab.com".to_string()),
            token: None,
        }
    }
}

/// Bitbucket Cloud configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BitbucketConfig {
    /// Bitbucket username.
    pub username: Option<String>,
    /// Bitbucket app password.
    /// Can also be set via GITPORT_BITBUCKET_TOKEN environment variable.
    pub token: Option<String>,
}

/// Bitbucket Server/Stash configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    /// Stash host URL (e.g., "https://stash.example.com").
    /// Can also be set via GITPORT_STASH_HOST environment variable.
    pub host: Option<String>,
    /// Stash API token.
    /// Can also be set via GITPORT_STASH_TOKEN environment variable.
    pub token: Option<String>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gitport/config.toml)
    /// 3. Local config file (./gitport.toml)
    /// 4. Environment variables with GITPORT_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        // Add XDG config file if it exists
        if let Some(proj_dirs) = ProjectDirs::from("", "", "gitport") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        // Add local config file (higher priority than XDG)
        let local_config = PathBuf::from("gitport.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitport.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // Add GITPORT_ prefixed environment variables
        // e.g., GITPORT_GITHUB_TOKEN -> github.token
        builder = builder.add_source(
            Environment::with_prefix("GITPORT")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// The export directory, falling back to `./gitport-export`.
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("gitport-export"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_export_dir_is_relative_fallback() {
        let config = Config::default();
        assert_eq!(config.export_dir(), PathBuf::from("gitport-export"));
    }

    #[test]
    fn configured_export_dir_wins() {
        let config = Config {
            export: ExportConfig {
                dir: Some(PathBuf::from("/data/export")),
            },
            ..Config::default()
        };
        assert_eq!(config.export_dir(), PathBuf::from("/data/export"));
    }
}
