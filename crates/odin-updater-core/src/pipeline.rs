//! Pull, pin and build sequences for both projects.
//!
//! The primary project (the compiler) is pinned to the newest monthly release
//! tag. The secondary project (the language server) follows its default
//! branch with a plain pull. Every step must succeed before the next runs.

use crate::error::{Result, UpdateError};
use crate::info::BuildInfo;
use crate::runner::{absolute, exists, CommandSpec, ProcessRunner};
use crate::tag::{Tag, TagSelector};
use std::path::Path;
use tracing::{info, warn};

/// Branch the primary project is synced on before pinning a tag.
pub const BASE_BRANCH: &str = "master";

pub const REMOTE: &str = "origin";

/// Argument passed to the primary build script.
pub const RELEASE_ARG: &str = "release";

/// Git steps run by the pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitStep {
    /// `git checkout master`
    CheckoutBase,
    /// `git checkout -b master origin/master`, the fallback when the local
    /// branch is missing.
    CreateBase,
    /// `git pull origin master`
    PullBase,
    /// `git pull`
    Pull,
    /// `git fetch --tags`
    FetchTags,
    /// `git tag -l`
    ListTags,
    /// `git checkout <tag>`, leaving a detached HEAD.
    CheckoutTag(String),
}

impl GitStep {
    pub fn description(&self) -> String {
        match self {
            GitStep::CheckoutBase => format!("Checkout {BASE_BRANCH} branch"),
            GitStep::CreateBase => {
                format!("Create {BASE_BRANCH} branch from {REMOTE}/{BASE_BRANCH}")
            }
            GitStep::PullBase => format!("Git pull from {REMOTE} {BASE_BRANCH}"),
            GitStep::Pull => "Git pull".to_string(),
            GitStep::FetchTags => "Fetch tags".to_string(),
            GitStep::ListTags => "List tags".to_string(),
            GitStep::CheckoutTag(tag) => format!("Checkout latest dev tag: {tag}"),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let upstream = format!("{REMOTE}/{BASE_BRANCH}");
        let args: Vec<&str> = match self {
            GitStep::CheckoutBase => vec!["checkout", BASE_BRANCH],
            GitStep::CreateBase => vec!["checkout", "-b", BASE_BRANCH, &upstream],
            GitStep::PullBase => vec!["pull", REMOTE, BASE_BRANCH],
            GitStep::Pull => vec!["pull"],
            GitStep::FetchTags => vec!["fetch", "--tags"],
            GitStep::ListTags => vec!["tag", "-l"],
            GitStep::CheckoutTag(tag) => vec!["checkout", tag.as_str()],
        };
        args.into_iter().map(str::to_string).collect()
    }

    pub fn command(&self, repo: &Path) -> CommandSpec {
        let spec = CommandSpec::git(self.args(), repo).described(self.description());
        match self {
            GitStep::ListTags => spec.quiet(),
            _ => spec,
        }
    }

    async fn run(&self, repo: &Path) -> Result<Vec<String>> {
        let result = ProcessRunner::run(&self.command(repo)).await;
        if result.succeeded {
            Ok(result.stdout_lines)
        } else {
            Err(UpdateError::step(self.description(), repo))
        }
    }
}

/// Drives the primary and secondary sequences.
#[derive(Debug, Clone, Default)]
pub struct BuildPipeline {
    selector: TagSelector,
}

impl BuildPipeline {
    pub fn new(selector: TagSelector) -> Self {
        Self { selector }
    }

    /// Sync the primary checkout to the newest release tag and build it.
    ///
    /// Records the selected tag in `info` as soon as it is known. Returns the
    /// tag that was built.
    pub async fn run_primary(
        &self,
        repo: &Path,
        build_script: &str,
        info: &mut BuildInfo,
    ) -> Result<Tag> {
        if !exists(repo) {
            warn!("Folder {} does not exist", repo.display());
            return Err(UpdateError::step("Update", repo));
        }

        if let Err(err) = GitStep::CheckoutBase.run(repo).await {
            warn!("{}; trying to create it from {}", err, REMOTE);
            if let Err(err) = GitStep::CreateBase.run(repo).await {
                warn!("Failed to checkout {} branch", BASE_BRANCH);
                return Err(err);
            }
        }

        GitStep::PullBase.run(repo).await.inspect_err(|_| warn!("Failed to Git Pull"))?;
        GitStep::FetchTags.run(repo).await.inspect_err(|_| warn!("Failed to Fetch Tags"))?;

        let tag = self.select_tag(repo).await?;
        info.primary_tag = tag.raw.clone();

        GitStep::CheckoutTag(tag.raw.clone())
            .run(repo)
            .await
            .inspect_err(|_| warn!("Failed to checkout tag: {}", tag))?;

        Self::run_build_script(repo, build_script, &[RELEASE_ARG])
            .await
            .inspect_err(|_| warn!("Failed building Odin"))?;

        info!("Odin build completed");
        Ok(tag)
    }

    /// Pull the secondary checkout and build it.
    pub async fn run_secondary(&self, repo: &Path, build_script: &str) -> Result<()> {
        GitStep::Pull.run(repo).await?;
        Self::run_build_script(repo, build_script, &[]).await?;
        info!("Language server build completed");
        Ok(())
    }

    async fn select_tag(&self, repo: &Path) -> Result<Tag> {
        let listing = GitStep::ListTags.run(repo).await?;
        match self.selector.latest_tag(&listing) {
            Some(tag) => {
                info!("Found latest dev tag: {}", tag);
                Ok(tag)
            }
            None => {
                warn!(
                    "No dev tags found matching format {}-YYYY-MM",
                    self.selector.prefix()
                );
                Err(UpdateError::NoMatchingTag(self.selector.prefix().to_string()))
            }
        }
    }

    /// Run a project's build script. Only its presence is checked; the exit
    /// code is ignored because these scripts exit non-zero on warnings.
    async fn run_build_script(repo: &Path, script: &str, args: &[&str]) -> Result<()> {
        let path = repo.join(script);
        if !path.is_file() {
            warn!("{} not found in {}", script, repo.display());
            return Err(UpdateError::BuildScriptMissing {
                script: script.to_string(),
                path: repo.to_path_buf(),
            });
        }

        let label = std::iter::once(script)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let spec = CommandSpec::new(absolute(&path), args.iter().copied(), repo)
            .described(format!("`{label}`"))
            .tolerant();

        if ProcessRunner::run(&spec).await.succeeded {
            Ok(())
        } else {
            Err(UpdateError::step(format!("`{label}`"), repo))
        }
    }
}
