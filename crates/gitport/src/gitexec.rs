//! Git operations via the system `git` binary.
//!
//! All repository manipulation (mirror clones, LFS fetches, reference
//! listing and rewriting) shells out to `git` rather than linking a git
//! implementation, so the behavior matches what an operator would get
//! running the same commands by hand.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;

/// Errors from invoking git.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git binary could not be spawned.
    #[error("failed to spawn git: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    /// Git ran but exited non-zero.
    #[error("git {command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Git produced output the caller could not interpret.
    #[error("unexpected git output from {command}: {detail}")]
    Output { command: String, detail: String },

    /// An incomplete clone destination could not be removed.
    #[error("failed to reset clone destination {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a clone request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// A fresh clone was created.
    Cloned,
    /// The destination already held a repository, so cloning was skipped.
    AlreadyCloned,
}

/// One git reference: object id plus fully qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub oid: String,
    pub name: String,
}

/// Runs git commands against one repository directory.
#[derive(Debug, Clone)]
pub struct GitRunner {
    repo: PathBuf,
}

impl GitRunner {
    /// Create a runner for the repository at `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// The repository directory this runner targets.
    pub fn repo_path(&self) -> &Path {
        &self.repo
    }

    /// Clone `url` into `dest`, optionally mapping extra refs via `refspec`.
    ///
    /// An existing, intact repository at `dest` short-circuits to
    /// [`CloneOutcome::AlreadyCloned`] so resumed runs never re-download git
    /// data; a partial clone left by a killed run is deleted and cloned
    /// again. When `fetch_lfs` is set, LFS objects are fetched best-effort
    /// after the clone; a missing `git-lfs` never fails the run.
    pub async fn clone_from(
        url: &str,
        dest: &Path,
        refspec: Option<&str>,
        fetch_lfs: bool,
    ) -> Result<(CloneOutcome, Self), GitError> {
        if dest.join(".git").exists() || dest.join("HEAD").exists() {
            // HEAD must resolve before the clone counts as complete; a run
            // killed mid-clone leaves the git directory without its refs.
            let existing = Self::new(dest);
            if existing.rev_parse("HEAD").await.is_ok() {
                tracing::info!(dest = %dest.display(), "repository already cloned, skipping");
                return Ok((CloneOutcome::AlreadyCloned, existing));
            }
            tracing::warn!(dest = %dest.display(), "destination holds an incomplete clone, recloning");
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|source| GitError::Cleanup {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }

        let fetch_arg = refspec.map(|spec| format!("remote.origin.fetch=+{spec}"));
        let dest_str = dest.to_string_lossy();
        let mut args: Vec<&str> = vec!["clone", url, &dest_str];
        if let Some(fetch_arg) = fetch_arg.as_deref() {
            args.splice(1..1, ["-c", fetch_arg]);
        }
        run_git(None, &args).await?;

        let runner = Self::new(dest);
        if refspec.is_some() {
            // The configured refspec only applies to fetches, so pull the
            // extra refs down explicitly after the initial clone.
            runner.run(&["fetch", "origin"]).await?;
        }
        if fetch_lfs {
            match runner.run(&["lfs", "fetch", "--all"]).await {
                Ok(_) => tracing::debug!(dest = %dest.display(), "fetched LFS objects"),
                Err(e) => {
                    tracing::warn!(dest = %dest.display(), error = %e, "LFS fetch failed, continuing");
                }
            }
        }

        Ok((CloneOutcome::Cloned, runner))
    }

    /// Run `git <args>` in this repository, returning trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        run_git(Some(&self.repo), args).await
    }

    /// List all references, optionally limited to a prefix such as
    /// `refs/pullreq/`.
    pub async fn list_refs(&self, prefix: Option<&str>) -> Result<Vec<GitRef>, GitError> {
        let mut args = vec!["for-each-ref", "--format=%(objectname) %(refname)"];
        if let Some(prefix) = prefix {
            args.push(prefix);
        }
        let stdout = self.run(&args).await?;

        let mut refs = Vec::new();
        for line in stdout.lines() {
            let Some((oid, name)) = line.split_once(' ') else {
                return Err(GitError::Output {
                    command: "for-each-ref".to_string(),
                    detail: format!("unparseable line: {line}"),
                });
            };
            refs.push(GitRef {
                oid: oid.to_string(),
                name: name.to_string(),
            });
        }
        Ok(refs)
    }

    /// Resolve a reference name to an object id.
    pub async fn rev_parse(&self, name: &str) -> Result<String, GitError> {
        self.run(&["rev-parse", "--verify", name]).await
    }

    /// Point `name` at `oid`, creating the reference if needed.
    pub async fn update_ref(&self, name: &str, oid: &str) -> Result<(), GitError> {
        self.run(&["update-ref", name, oid]).await.map(|_| ())
    }

    /// Delete the reference `name`.
    pub async fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        self.run(&["update-ref", "-d", name]).await.map(|_| ())
    }
}

async fn run_git(cwd: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
    let mut cmd = Command::new("git");
    if let Some(cwd) = cwd {
        cmd.arg("-C").arg(cwd);
    }
    cmd.args(args);
    cmd.kill_on_drop(true);

    tracing::trace!(?args, "running git");
    let output = cmd
        .output()
        .await
        .map_err(|source| GitError::Spawn { source })?;

    if !output.status.success() {
        return Err(GitError::Command {
            command: args.join(" "),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
