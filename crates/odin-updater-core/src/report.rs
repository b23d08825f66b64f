//! Run outcome and the text shown to the user at the end of a run.

use crate::config::{Platform, UpdaterConfig};
use crate::info::BuildInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stages of an update run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preflight,
    SyncPrimary,
    SyncSecondary,
    BuildPrimary,
    BuildSecondary,
    Verify,
    /// Not a real stage: a fault outside the normal error paths.
    Internal,
}

impl Stage {
    /// First line of the error shown when this stage fails.
    pub fn headline(&self, platform: Platform) -> String {
        match self {
            Stage::Preflight => "Odin Update failed:".to_string(),
            Stage::SyncPrimary => "Failed to checkout git repo for Odin:".to_string(),
            Stage::SyncSecondary => {
                "Failed to checkout git repo for Odin Language Server:".to_string()
            }
            Stage::BuildPrimary => {
                let mut text = "Failed to pull latest and build the Odin compiler, see the log for details.".to_string();
                if platform == Platform::Windows {
                    text.push_str(WINDOWS_TOOLCHAIN_HINT);
                }
                text
            }
            Stage::BuildSecondary => {
                "Failed to pull latest and build the Odin Language Server, see the log for details"
                    .to_string()
            }
            Stage::Verify => "Odin build failed validation".to_string(),
            Stage::Internal => "Update failed:".to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight checks",
            Stage::SyncPrimary => "sync Odin",
            Stage::SyncSecondary => "sync Odin Language Server",
            Stage::BuildPrimary => "build Odin",
            Stage::BuildSecondary => "build Odin Language Server",
            Stage::Verify => "verify Odin",
            Stage::Internal => "internal",
        };
        f.write_str(name)
    }
}

const WINDOWS_TOOLCHAIN_HINT: &str = "

Make sure you have the MSVC compiler installed, it's required to build Odin from source.

Full Visual Studio installer
https://visualstudio.microsoft.com/

MSVC only (PortableBuildTools)
https://github.com/Data-Oriented-House/PortableBuildTools

MSVC only (python script)
https://gist.github.com/mmozeiko/7f3162ec2988e81e56d5c4e22cde9977";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// Success with one informational note for the user.
    Advisory { note: String },
    Failure { stage: Stage, message: String },
}

/// Everything a caller needs to present a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: UpdaterConfig,
    pub info: BuildInfo,
    /// Stages that finished before the run ended.
    pub completed: Vec<Stage>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, RunOutcome::Failure { .. })
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Completion text listing the versions of both projects.
    pub fn summary(&self) -> String {
        let config = &self.config;
        let info = &self.info;

        let mut message = format!(
            "Update complete.\n\n-Odin {}\n{} {}\n{}\n{}\nCommit: {}",
            info.primary_tag,
            config.primary_folder.display(),
            config.primary_repo_url,
            info.primary_author,
            info.primary_date,
            info.primary_commit,
        );

        if config.update_secondary {
            message.push_str(&format!(
                "\n\n-Odin Language Server\n{} {}\n{}\n{}\nCommit: {}",
                config.secondary_folder.display(),
                config.secondary_repo_url,
                info.secondary_author,
                info.secondary_date,
                info.secondary_commit,
            ));
        } else {
            message.push_str("\n\n-Odin Language Server\nSkipped (update_secondary = false)");
        }

        message
    }

    /// Failure text: the failing stage's error plus what had already finished.
    /// `None` for successful runs.
    pub fn failure_text(&self) -> Option<String> {
        let RunOutcome::Failure { message, .. } = &self.outcome else {
            return None;
        };

        let mut text = message.clone();
        let done: Vec<String> = self
            .completed
            .iter()
            .map(|stage| match stage {
                Stage::BuildPrimary => format!("{} ({})", stage, self.info.primary_tag),
                _ => stage.to_string(),
            })
            .collect();
        if !done.is_empty() {
            text.push_str(&format!("\n\nCompleted before the failure: {}", done.join(", ")));
        }
        Some(text)
    }
}
