//! Error taxonomy for the updater.

use std::path::PathBuf;

/// Errors raised while resolving layered configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors that end an update run.
///
/// The `Display` text is what the user sees, so variants carry enough context
/// to act on without reading the log.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// `git --version` did not succeed.
    #[error("could not find Git, make sure Git is installed and available in system paths and try again")]
    GitUnavailable,

    /// A required editor package is not installed.
    #[error("The '{0}' package is not installed. Install it using 'Package Control: Install Package'. Run Odin Updater after that.")]
    MissingPackage(String),

    /// The target folder exists but is not a git checkout.
    #[error("ERROR: {0} already exists and does not contain a valid .git repository. If this is an existing OLS or Odin installation it has to be a source build with a .git repository for this update script to work.\n\nRemove the folder and try again. The script will do a checkout from the official repository.")]
    RepoConflict(PathBuf),

    #[error("failed to clone {url} into {path}")]
    CloneFailed { url: String, path: PathBuf },

    /// Clone reported success but produced no `.git` directory.
    #[error("clone of {url} appeared to succeed but {path} has no .git folder")]
    CloneIncomplete { url: String, path: PathBuf },

    /// A git or build command in a pipeline sequence failed.
    #[error("{step} failed in {path}")]
    Step { step: String, path: PathBuf },

    #[error("no tags found matching format {0}-YYYY-MM")]
    NoMatchingTag(String),

    #[error("{script} not found in {path}")]
    BuildScriptMissing { script: String, path: PathBuf },

    #[error("✗ ERROR: {} not found at {}", .0.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(), .0.display())]
    ArtifactMissing(PathBuf),

    #[error("✗ Built Odin executable failed to run: {0}")]
    ArtifactBroken(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Any fault not covered above, including a panicked run task.
    #[error("Update failed: {0}")]
    Internal(String),
}

impl UpdateError {
    pub(crate) fn step(step: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        UpdateError::Step {
            step: step.into(),
            path: path.into(),
        }
    }
}

/// Result type for updater operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_conflict_tells_user_to_remove_folder() {
        let err = UpdateError::RepoConflict(PathBuf::from("/tmp/odin"));
        let text = err.to_string();
        assert!(text.contains("/tmp/odin"));
        assert!(text.contains("Remove the folder"));
    }

    #[test]
    fn artifact_missing_names_the_file() {
        let err = UpdateError::ArtifactMissing(PathBuf::from("/opt/odin/odin"));
        assert_eq!(err.to_string(), "✗ ERROR: odin not found at /opt/odin/odin");
    }

    #[test]
    fn step_error_includes_folder() {
        let err = UpdateError::step("Fetch tags", "/src/odin");
        assert_eq!(err.to_string(), "Fetch tags failed in /src/odin");
    }
}
