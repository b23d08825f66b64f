//! Post-build checks on the compiler executable.

use crate::config::Platform;
use crate::error::{Result, UpdateError};
use crate::info::BuildInfo;
use crate::runner::{absolute, CommandSpec, ProcessRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Argument that makes the compiler print its version.
pub const VERSION_ARG: &str = "version";

/// Confirms the primary build produced a working executable.
#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    artifact_name: String,
    platform: Platform,
}

impl ArtifactVerifier {
    pub fn new(artifact_name: impl Into<String>, platform: Platform) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            platform,
        }
    }

    /// Where the build script leaves the executable.
    pub fn artifact_path(&self, repo: &Path) -> PathBuf {
        repo.join(&self.artifact_name)
    }

    /// Executable name without extension, as typed on a command line.
    pub fn logical_name(&self) -> String {
        Path::new(&self.artifact_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.artifact_name.clone())
    }

    /// Check the built executable runs and record its version.
    ///
    /// Not finding the executable on `PATH` is not an error: it sets
    /// `info.verify_advisory` instead.
    pub async fn verify(&self, repo: &Path, info: &mut BuildInfo) -> Result<()> {
        let exe = self.artifact_path(repo);
        if !exe.is_file() {
            let err = UpdateError::ArtifactMissing(exe);
            error!("{}", err);
            return Err(err);
        }

        let probe = CommandSpec::new(absolute(&exe), [VERSION_ARG], repo)
            .described(format!("{} {}", self.artifact_name, VERSION_ARG))
            .quiet()
            .with_timeout(PROBE_TIMEOUT);
        let result = ProcessRunner::run(&probe).await;

        if !result.succeeded {
            let detail = match result.exit_code {
                Some(code) => format!("{} exited with code {}", exe.display(), code),
                None => format!("{} could not be started", exe.display()),
            };
            let err = UpdateError::ArtifactBroken(detail);
            error!("{}", err);
            return Err(err);
        }

        let version = result.stdout_text();
        info!("✓ Built Odin executable works: {}", version);
        info.build_version = version;

        match self.locate_on_path().await {
            Some(location) => {
                info!("✓ Odin is also available in system PATH");
                info!("  Odin location: {}", location);
            }
            None => {
                warn!("⚠ Odin built successfully but not in system PATH");
                warn!("  Consider adding {} to your PATH environment variable", repo.display());
                info.verify_advisory = Some(format!(
                    "Odin built successfully but not in system PATH.\nConsider adding {} to your PATH environment variable.",
                    repo.display()
                ));
            }
        }

        Ok(())
    }

    /// Resolve the executable through `PATH` with the platform locate tool.
    pub async fn locate_on_path(&self) -> Option<String> {
        // Run outside the checkout: `where` also searches the current directory.
        let spec = CommandSpec::new(
            self.platform.locate_command(),
            [self.logical_name()],
            std::env::temp_dir(),
        )
        .quiet()
        .with_timeout(PROBE_TIMEOUT);

        let result = ProcessRunner::run(&spec).await;
        result
            .stdout_lines
            .first()
            .filter(|_| result.succeeded)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_name_strips_extension() {
        assert_eq!(ArtifactVerifier::new("odin.exe", Platform::Windows).logical_name(), "odin");
        assert_eq!(ArtifactVerifier::new("odin", Platform::Linux).logical_name(), "odin");
    }

    #[tokio::test]
    async fn test_missing_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = BuildInfo::default();

        let err = ArtifactVerifier::new("odin", Platform::current())
            .verify(dir.path(), &mut info)
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::ArtifactMissing(_)));
        assert_eq!(info.build_version, crate::info::UNKNOWN_VERSION);
    }

    #[cfg(unix)]
    fn write_exe(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_artifact_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        write_exe(&dir.path().join("odin"), "#!/bin/sh\nexit 2\n");
        let mut info = BuildInfo::default();

        let err = ArtifactVerifier::new("odin", Platform::Linux)
            .verify(dir.path(), &mut info)
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::ArtifactBroken(ref d) if d.contains("code 2")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_artifact_off_path_gets_advisory() {
        let dir = tempfile::tempdir().unwrap();
        let name = "odin-updater-test-artifact";
        write_exe(&dir.path().join(name), "#!/bin/sh\necho \"odin version dev-2024-12\"\n");
        let mut info = BuildInfo::default();

        ArtifactVerifier::new(name, Platform::Linux)
            .verify(dir.path(), &mut info)
            .await
            .unwrap();

        assert_eq!(info.build_version, "odin version dev-2024-12");
        let advisory = info.verify_advisory.expect("advisory should be set");
        assert!(advisory.contains("not in system PATH"));
        assert!(advisory.contains(&dir.path().display().to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_ignores_stderr_output() {
        let dir = tempfile::tempdir().unwrap();
        write_exe(
            &dir.path().join("odin"),
            "#!/bin/sh\necho 'warning: deprecated flag' >&2\necho \"odin version dev-2024-12\"\n",
        );
        let mut info = BuildInfo::default();

        ArtifactVerifier::new("odin", Platform::Linux)
            .verify(dir.path(), &mut info)
            .await
            .unwrap();

        assert_eq!(info.build_version, "odin version dev-2024-12");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_checkout_path_runs_the_artifact() {
        let dir = tempfile::Builder::new()
            .prefix("verify-relative-")
            .tempdir_in(".")
            .unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        write_exe(&relative.join("odin"), "#!/bin/sh\necho \"odin version dev-2025-01\"\n");
        let mut info = BuildInfo::default();

        ArtifactVerifier::new("odin", Platform::Linux)
            .verify(&relative, &mut info)
            .await
            .unwrap();

        assert_eq!(info.build_version, "odin version dev-2025-01");
    }
}
