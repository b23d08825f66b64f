//! One end-to-end update run.
//!
//! Order: preflight checks, sync both checkouts, build the compiler, build
//! the language server, verify the compiler. Each stage gates the next and
//! the first failure ends the run.

use crate::config::{Platform, UpdaterConfig};
use crate::error::UpdateError;
use crate::host::{Host, HostCommand, LSP_PACKAGE, ODIN_PACKAGE};
use crate::info::BuildInfo;
use crate::pipeline::BuildPipeline;
use crate::repo::{RepoSyncer, RepoTarget};
use crate::report::{RunOutcome, RunReport, Stage};
use crate::tag::TagSelector;
use crate::verify::ArtifactVerifier;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

type StageResult = std::result::Result<(), (Stage, UpdateError)>;

fn at(stage: Stage) -> impl FnOnce(UpdateError) -> (Stage, UpdateError) {
    move |err| (stage, err)
}

/// A configured update run.
pub struct UpdateRun {
    config: UpdaterConfig,
    platform: Platform,
    host: Arc<dyn Host>,
}

impl UpdateRun {
    /// Relative and `~` folders in `config` are resolved here.
    pub fn new(mut config: UpdaterConfig, host: Arc<dyn Host>) -> Self {
        config.normalize_folders();
        Self {
            config,
            platform: Platform::current(),
            host,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Execute the run on its own task and present the result through the
    /// host.
    ///
    /// Precondition: no other run targets the same folders at the same time.
    /// Nothing here enforces that; the caller must not start a second run
    /// while one is active.
    ///
    /// Never fails. Every error, including a panic inside the run, ends up in
    /// the returned report as [`RunOutcome::Failure`].
    pub async fn execute(self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let config = self.config.clone();
        let platform = self.platform;
        let host = Arc::clone(&self.host);
        let span = info_span!("updater.run", run_id = %run_id);

        let task = tokio::spawn(self.drive().instrument(span.clone()));
        let (mut info, completed, result) = match task.await {
            Ok(finished) => finished,
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                let err = UpdateError::Internal(reason);
                (BuildInfo::default(), Vec::new(), Err((Stage::Internal, err)))
            }
        };

        let outcome = match result {
            Ok(()) => match &info.verify_advisory {
                Some(note) => RunOutcome::Advisory { note: note.clone() },
                None => RunOutcome::Success,
            },
            Err((stage, err)) => {
                let message = format!("{}\n\n{}", stage.headline(platform), err);
                span.in_scope(|| error!("ERROR: {} failed: {}", stage, err));
                info.last_error = message.clone();
                RunOutcome::Failure { stage, message }
            }
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            config,
            info,
            completed,
            outcome,
        };

        present(host.as_ref(), &report).instrument(span).await;
        report
    }

    /// A panic inside a stage is caught here so that what the run had
    /// recorded up to that point survives into the report.
    async fn drive(self) -> (BuildInfo, Vec<Stage>, StageResult) {
        let mut info = BuildInfo::default();
        let mut completed = Vec::new();
        let result = AssertUnwindSafe(self.run_stages(&mut info, &mut completed))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err((Stage::Internal, UpdateError::Internal(panic_message(payload))))
            });
        (info, completed, result)
    }

    async fn run_stages(&self, info: &mut BuildInfo, completed: &mut Vec<Stage>) -> StageResult {
        let config = &self.config;

        info!("Updating/Installing Odin compiler and Odin Language Server...");
        info!("Odin: {} {}", config.primary_folder.display(), config.primary_repo_url);
        if config.update_secondary {
            info!("OLS: {} {}", config.secondary_folder.display(), config.secondary_repo_url);
        } else {
            info!("OLS: Skipped (update_secondary = false)");
        }

        self.preflight().await.map_err(at(Stage::Preflight))?;
        completed.push(Stage::Preflight);

        if config.update_secondary {
            info!("Disabling LSP globally...");
            self.host.notify(HostCommand::DisableLanguageServer);
        }

        let primary = RepoTarget::new(&config.primary_folder, &config.primary_repo_url);
        let metadata = RepoSyncer::ensure(&primary).await.map_err(at(Stage::SyncPrimary))?;
        info.record_primary(&metadata);
        completed.push(Stage::SyncPrimary);

        if config.update_secondary {
            let secondary = RepoTarget::new(&config.secondary_folder, &config.secondary_repo_url);
            let metadata = RepoSyncer::ensure(&secondary)
                .await
                .map_err(at(Stage::SyncSecondary))?;
            info.record_secondary(&metadata);
            completed.push(Stage::SyncSecondary);
        }

        let pipeline = BuildPipeline::new(TagSelector::new(&config.tag_prefix, config.tag_policy));

        info!("Updating {}...", config.primary_folder.display());
        pipeline
            .run_primary(&config.primary_folder, &config.primary_build_script, info)
            .await
            .map_err(at(Stage::BuildPrimary))?;
        // The checkout moved to the release tag; report that commit.
        info.record_primary(&RepoSyncer::collect_metadata(&config.primary_folder).await);
        completed.push(Stage::BuildPrimary);

        if config.update_secondary {
            info!("Updating {}...", config.secondary_folder.display());
            pipeline
                .run_secondary(&config.secondary_folder, &config.secondary_build_script)
                .await
                .map_err(at(Stage::BuildSecondary))?;
            info.record_secondary(&RepoSyncer::collect_metadata(&config.secondary_folder).await);
            completed.push(Stage::BuildSecondary);

            info!("Enabling LSP globally...");
            self.host.notify(HostCommand::EnableLanguageServer);
        }

        ArtifactVerifier::new(&config.artifact_name, self.platform)
            .verify(&config.primary_folder, info)
            .await
            .map_err(at(Stage::Verify))?;
        completed.push(Stage::Verify);

        Ok(())
    }

    async fn preflight(&self) -> crate::error::Result<()> {
        let mut required = Vec::new();
        if self.config.update_secondary {
            required.push(LSP_PACKAGE);
        }
        required.push(ODIN_PACKAGE);

        for package in required {
            if !self.host.is_package_installed(package).await {
                info!("✗ Package '{}' is not installed", package);
                return Err(UpdateError::MissingPackage(package.to_string()));
            }
            info!("✓ Package '{}' is installed", package);
        }

        RepoSyncer::check_git_available().await?;
        Ok(())
    }
}

async fn present(host: &dyn Host, report: &RunReport) {
    match &report.outcome {
        RunOutcome::Failure { .. } => {
            if let Some(text) = report.failure_text() {
                host.show_error(&text).await;
            }
        }
        RunOutcome::Advisory { note } => {
            host.show_message(note).await;
            let summary = report.summary();
            info!("{}", summary);
            host.show_message(&summary).await;
        }
        RunOutcome::Success => {
            let summary = report.summary();
            info!("{}", summary);
            host.show_message(&summary).await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "run task panicked".to_string()),
    }
}
