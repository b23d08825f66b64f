//! Per-run status record.

use crate::repo::RepoMetadata;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_TAG: &str = "unknown-tag";
pub const UNKNOWN_COMMIT: &str = "unknown-commit";
pub const UNKNOWN_AUTHOR: &str = "unknown-author";
pub const UNKNOWN_DATE: &str = "unknown-date";
pub const UNKNOWN_VERSION: &str = "unknown-version";

/// What one run learned about both projects.
///
/// Starts at sentinel values. Stages overwrite fields as they succeed and
/// nothing is reset during a run. `last_error` is empty unless the run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub primary_tag: String,
    pub primary_commit: String,
    pub primary_author: String,
    pub primary_date: String,
    pub verify_advisory: Option<String>,
    pub build_version: String,
    pub secondary_commit: String,
    pub secondary_author: String,
    pub secondary_date: String,
    pub last_error: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            primary_tag: UNKNOWN_TAG.to_string(),
            primary_commit: UNKNOWN_COMMIT.to_string(),
            primary_author: UNKNOWN_AUTHOR.to_string(),
            primary_date: UNKNOWN_DATE.to_string(),
            verify_advisory: None,
            build_version: UNKNOWN_VERSION.to_string(),
            secondary_commit: UNKNOWN_COMMIT.to_string(),
            secondary_author: UNKNOWN_AUTHOR.to_string(),
            secondary_date: UNKNOWN_DATE.to_string(),
            last_error: String::new(),
        }
    }
}

impl BuildInfo {
    pub fn record_primary(&mut self, metadata: &RepoMetadata) {
        if let Some(commit) = &metadata.commit {
            self.primary_commit = commit.summary();
            self.primary_author = commit.author.clone();
            self.primary_date = commit.date.clone();
        }
    }

    pub fn record_secondary(&mut self, metadata: &RepoMetadata) {
        if let Some(commit) = &metadata.commit {
            self.secondary_commit = commit.summary();
            self.secondary_author = commit.author.clone();
            self.secondary_date = commit.date.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::CommitInfo;

    #[test]
    fn test_defaults_are_sentinels() {
        let info = BuildInfo::default();
        assert_eq!(info.primary_tag, UNKNOWN_TAG);
        assert_eq!(info.secondary_commit, UNKNOWN_COMMIT);
        assert_eq!(info.build_version, UNKNOWN_VERSION);
        assert!(info.verify_advisory.is_none());
        assert!(info.last_error.is_empty());
    }

    #[test]
    fn test_missing_commit_keeps_sentinels() {
        let mut info = BuildInfo::default();
        info.record_primary(&RepoMetadata {
            branch: Some("master".to_string()),
            commit: None,
        });
        assert_eq!(info.primary_commit, UNKNOWN_COMMIT);
        assert_eq!(info.primary_author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_record_secondary_leaves_primary_alone() {
        let mut info = BuildInfo::default();
        info.record_secondary(&RepoMetadata {
            branch: None,
            commit: Some(CommitInfo {
                hash: "9f8e7d6".to_string(),
                author: "Daniel".to_string(),
                date: "2025-01-02 03:04:05 +0100".to_string(),
                subject: "Improve hover".to_string(),
            }),
        });
        assert_eq!(info.secondary_commit, "9f8e7d6 - Improve hover");
        assert_eq!(info.secondary_author, "Daniel");
        assert_eq!(info.primary_commit, UNKNOWN_COMMIT);
    }
}
