//! Git checkout management for the primary and secondary projects.

use crate::error::{Result, UpdateError};
use crate::runner::{exists, CommandSpec, ProcessRunner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Directory whose presence marks a completed clone.
pub const GIT_MARKER: &str = ".git";

const LOG_FORMAT: &str = "--pretty=%h|%an|%ad|%s";

/// A local checkout and the remote it tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub local_path: PathBuf,
    pub remote_url: String,
}

impl RepoTarget {
    pub fn new(local_path: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_url: remote_url.into(),
        }
    }

    /// Whether the local path already holds a clone.
    pub fn is_synchronized(&self) -> bool {
        self.local_path.join(GIT_MARKER).exists()
    }
}

/// The most recent commit of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Abbreviated hash.
    pub hash: String,
    pub author: String,
    /// ISO-style commit date as printed by `git log --date=iso`.
    pub date: String,
    pub subject: String,
}

impl CommitInfo {
    /// Parse one `hash|author|date|subject` line.
    ///
    /// The subject is the remainder of the line and may itself contain `|`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(4, '|');
        let hash = parts.next()?;
        let author = parts.next()?;
        let date = parts.next()?;
        let subject = parts.next()?;

        Some(Self {
            hash: hash.to_string(),
            author: author.to_string(),
            date: date.to_string(),
            subject: subject.to_string(),
        })
    }

    /// `"<hash> - <subject>"`, the form shown in the final report.
    pub fn summary(&self) -> String {
        format!("{} - {}", self.hash, self.subject)
    }
}

/// Branch and head-commit details of a checkout. Either part may be missing
/// when git could not report it; that is never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub branch: Option<String>,
    pub commit: Option<CommitInfo>,
}

/// Clones and inspects checkouts.
pub struct RepoSyncer;

impl RepoSyncer {
    /// Confirm `git` is runnable and return its version line.
    pub async fn check_git_available() -> Result<String> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        let spec = CommandSpec::git(["--version"], cwd)
            .quiet()
            .with_timeout(Duration::from_secs(10));

        let result = ProcessRunner::run(&spec).await;
        if !result.succeeded {
            error!("ERROR: Git not found in PATH");
            return Err(UpdateError::GitUnavailable);
        }

        let version = result.stdout_text();
        info!("Git found: {}", version);
        Ok(version)
    }

    /// Make sure `target.local_path` is a clone of `target.remote_url`.
    ///
    /// An existing clone is left as is. An empty or absent directory is
    /// cloned into. Anything else at the path is a conflict: user data is
    /// never removed.
    pub async fn ensure(target: &RepoTarget) -> Result<RepoMetadata> {
        let path = &target.local_path;

        if target.is_synchronized() {
            info!("Git repo already exists {} [{}]...", path.display(), target.remote_url);
            return Ok(Self::collect_metadata(path).await);
        }

        if exists(path) && !is_empty_dir(path) {
            warn!("{} exists but is not a git repository", path.display());
            return Err(UpdateError::RepoConflict(path.clone()));
        }

        let clone_failed = || UpdateError::CloneFailed {
            url: target.remote_url.clone(),
            path: path.clone(),
        };

        info!("Cloning {} to {}...", target.remote_url, path.display());
        if let Err(err) = tokio::fs::create_dir_all(path).await {
            error!("ERROR: could not create {}: {}", path.display(), err);
            return Err(clone_failed());
        }

        let clone = CommandSpec::git(["clone", target.remote_url.as_str(), "."], path)
            .described("Git Clone");
        if !ProcessRunner::run(&clone).await.succeeded {
            warn!("Failed to clone {} {}", path.display(), target.remote_url);
            return Err(clone_failed());
        }

        if !target.is_synchronized() {
            warn!("Clone appeared to succeed but .git folder is missing");
            return Err(UpdateError::CloneIncomplete {
                url: target.remote_url.clone(),
                path: path.clone(),
            });
        }

        info!("Repository cloned successfully {}", path.display());
        Ok(Self::collect_metadata(path).await)
    }

    /// Query the current branch and the latest commit of a checkout.
    pub async fn collect_metadata(path: &Path) -> RepoMetadata {
        let branch = ProcessRunner::run(&CommandSpec::git(["branch", "--show-current"], path).quiet()).await;
        // Empty on a detached HEAD, which is where the primary project ends up.
        let branch = Some(branch.stdout_text()).filter(|b| branch.succeeded && !b.is_empty());
        if let Some(name) = &branch {
            info!("Current branch: {}", name);
        }

        let log = CommandSpec::git(["log", "-1", LOG_FORMAT, "--date=iso"], path).quiet();
        let log = ProcessRunner::run(&log).await;
        let commit = log
            .stdout_lines
            .first()
            .filter(|_| log.succeeded)
            .and_then(|line| CommitInfo::parse(line));

        match &commit {
            Some(commit) => {
                info!("Latest commit: {}", commit.summary());
                info!("Author: {}", commit.author);
                info!("Date: {}", commit.date);
            }
            None => debug!("No commit metadata available for {}", path.display()),
        }

        RepoMetadata { branch, commit }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
