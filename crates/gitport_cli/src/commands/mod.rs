pub(crate) mod export;
pub(crate) mod incremental;
pub(crate) mod meta;

/// Supported source platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Platform {
    Github,
    Gitlab,
    Bitbucket,
    /// Bitbucket Server
    Stash,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Stash => "stash",
        };
        f.write_str(name)
    }
}
