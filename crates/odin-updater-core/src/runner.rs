//! External process execution with live output relay.
//!
//! Every git and build invocation goes through [`ProcessRunner::run`]. Output
//! is pulled line by line from the child's merged stdout/stderr and relayed to
//! the log as it arrives, so a multi-minute compiler build shows progress
//! while it runs.

use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Log target for relayed child output, so it can be filtered on its own.
pub const OUTPUT_TARGET: &str = "odin_updater::output";

/// Log level used when relaying a command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// Relay every line at `info`; used for clone, pull and build steps.
    Info,
    /// Relay at `debug`; used for queries whose output is parsed.
    Debug,
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: PathBuf,

    /// Arguments passed verbatim.
    pub args: Vec<String>,

    /// Working directory; must already exist.
    pub working_dir: PathBuf,

    /// Human-readable label used in log lines.
    pub description: String,

    /// Succeed regardless of exit code.
    pub tolerate_non_zero_exit: bool,

    pub relay: Relay,

    /// Kill the child and fail once this elapses.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let description = std::iter::once(program.to_string_lossy().into_owned())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            program,
            args,
            working_dir: working_dir.into(),
            description,
            tolerate_non_zero_exit: false,
            relay: Relay::Info,
            timeout: None,
        }
    }

    /// Shorthand for a `git` invocation.
    pub fn git<I, S>(args: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("git", args, working_dir)
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Ignore the exit status. Build scripts exit non-zero on warnings.
    pub fn tolerant(mut self) -> Self {
        self.tolerate_non_zero_exit = true;
        self
    }

    /// Relay output at `debug` instead of `info`.
    pub fn quiet(mut self) -> Self {
        self.relay = Relay::Debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a [`ProcessRunner::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command counts as successful under its exit policy.
    pub succeeded: bool,

    /// Exit code, `None` if the process never ran or was killed by a signal.
    pub exit_code: Option<i32>,

    /// Non-blank output lines from both streams, trimmed, in the order they
    /// were read.
    pub lines: Vec<String>,

    /// The subset of `lines` that came from stdout.
    pub stdout_lines: Vec<String>,
}

impl CommandResult {
    fn not_run() -> Self {
        Self::default()
    }

    /// All captured lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Stdout lines joined with newlines. Used where the output is a value,
    /// such as a version string, and stderr chatter must not leak into it.
    pub fn stdout_text(&self) -> String {
        self.stdout_lines.join("\n")
    }
}

/// Which pipe a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Lazy, finite sequence of output lines from a running child.
///
/// Stdout and stderr are merged in arrival order; lines from a single stream
/// keep the order the process wrote them. The sequence ends once both streams
/// close and cannot be restarted.
pub struct OutputLines {
    inner: BoxStream<'static, io::Result<OutputLine>>,
}

impl OutputLines {
    /// Take the child's piped stdout and stderr.
    pub fn from_child(child: &mut Child) -> Self {
        let stdout = child
            .stdout
            .take()
            .map(|pipe| line_stream(pipe, StreamKind::Stdout));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| line_stream(pipe, StreamKind::Stderr));

        let inner = match (stdout, stderr) {
            (Some(out), Some(err)) => stream::select(out, err).boxed(),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => stream::empty().boxed(),
        };

        Self { inner }
    }

    /// Block until the next line is available; `None` once the output ends.
    pub async fn next_line(&mut self) -> Option<io::Result<OutputLine>> {
        self.inner.next().await
    }
}

fn line_stream<R>(reader: R, kind: StreamKind) -> BoxStream<'static, io::Result<OutputLine>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Build tools do not always emit UTF-8, so decode lossily per line.
    stream::unfold(Some(BufReader::new(reader)), move |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                Some((Ok(OutputLine { stream: kind, text }), Some(reader)))
            }
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}

/// Runs external commands and relays their output.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run a command to completion.
    ///
    /// Never returns an error: a missing working directory, a missing
    /// executable, an I/O failure or a timeout are logged and reported as an
    /// unsuccessful [`CommandResult`].
    pub async fn run(spec: &CommandSpec) -> CommandResult {
        let dir = spec.working_dir.display();

        if !spec.working_dir.is_dir() {
            warn!("Folder {} does not exist", dir);
            return CommandResult::not_run();
        }

        match spec.relay {
            Relay::Info => info!("Running {} in {}...", spec.description, dir),
            Relay::Debug => debug!("Running {} in {}...", spec.description, dir),
        }

        match Self::execute(spec).await {
            Ok(Some((status, captured))) => Self::judge(spec, status, captured),
            Ok(None) => {
                warn!(
                    "{} timed out in {} after {}s",
                    spec.description,
                    dir,
                    spec.timeout.map(|t| t.as_secs()).unwrap_or_default()
                );
                CommandResult::not_run()
            }
            Err(err) => {
                error!("ERROR: could not run {} in {}: {}", spec.description, dir, err);
                CommandResult::not_run()
            }
        }
    }

    /// `Ok(None)` means the timeout fired and the child was killed.
    async fn execute(spec: &CommandSpec) -> io::Result<Option<(ExitStatus, Captured)>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut output = OutputLines::from_child(&mut child);

        let drive = async {
            let mut captured = Captured::default();
            while let Some(line) = output.next_line().await {
                let line = line?;
                let text = line.text.trim();
                if text.is_empty() {
                    continue;
                }
                match spec.relay {
                    Relay::Info => info!(target: OUTPUT_TARGET, "  {}", text),
                    Relay::Debug => debug!(target: OUTPUT_TARGET, "  {}", text),
                }
                if line.stream == StreamKind::Stdout {
                    captured.stdout.push(text.to_string());
                }
                captured.all.push(text.to_string());
            }
            let status = child.wait().await?;
            Ok::<_, io::Error>((status, captured))
        };

        match spec.timeout {
            None => drive.await.map(Some),
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, drive).await;
                match outcome {
                    Ok(finished) => finished.map(Some),
                    Err(_) => {
                        child.start_kill().ok();
                        Ok(None)
                    }
                }
            }
        }
    }

    fn judge(spec: &CommandSpec, status: ExitStatus, captured: Captured) -> CommandResult {
        let exit_code = status.code();
        let Captured { all: lines, stdout: stdout_lines } = captured;

        if !spec.tolerate_non_zero_exit && !status.success() {
            warn!(
                "{} failed in {} (return code: {})",
                spec.description,
                spec.working_dir.display(),
                exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            );
            return CommandResult {
                succeeded: false,
                exit_code,
                lines,
                stdout_lines,
            };
        }

        match spec.relay {
            Relay::Info => info!("{} completed in {}", spec.description, spec.working_dir.display()),
            Relay::Debug => debug!("{} completed in {}", spec.description, spec.working_dir.display()),
        }

        CommandResult {
            succeeded: true,
            exit_code,
            lines,
            stdout_lines,
        }
    }
}

#[derive(Default)]
struct Captured {
    all: Vec<String>,
    stdout: Vec<String>,
}

/// True when `path` exists as a directory or file.
pub(crate) fn exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

/// `path` made absolute against the current directory.
///
/// A program spawned with a working directory must not be named by a path
/// relative to the parent's cwd, or it resolves against the wrong folder.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &Path) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script], dir)
    }

    #[test]
    fn test_description_defaults_to_command_line() {
        let spec = CommandSpec::git(["fetch", "--tags"], "/tmp");
        assert_eq!(spec.description, "git fetch --tags");
        assert!(!spec.tolerate_non_zero_exit);
        assert_eq!(spec.relay, Relay::Info);
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        // `touch` would create a file in the working dir if it were spawned.
        let spec = CommandSpec::new("touch", ["marker"], &missing);
        let result = ProcessRunner::run(&spec).await;

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
        assert!(!missing.exists(), "runner must not create the directory");
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("definitely-not-a-real-binary-xyz", Vec::<String>::new(), dir.path());

        let result = ProcessRunner::run(&spec).await;
        assert!(!result.succeeded);
        assert!(result.lines.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tolerant_run_ignores_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessRunner::run(&sh("exit 7", dir.path()).tolerant()).await;

        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(7));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_strict_run_fails_on_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessRunner::run(&sh("echo partial; exit 7", dir.path())).await;

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(7));
        assert_eq!(result.lines, vec!["partial".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_trimmed_and_blank_lines_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessRunner::run(&sh("printf 'one\\n\\n   \\n  two  \\nthree'", dir.path())).await;

        assert!(result.succeeded);
        assert_eq!(result.lines, vec!["one", "two", "three"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_order_is_preserved_and_stderr_merged() {
        let dir = tempfile::tempdir().unwrap();
        let script = "for i in 1 2 3 4 5; do echo out$i; done; echo err >&2";
        let result = ProcessRunner::run(&sh(script, dir.path())).await;

        assert!(result.succeeded);
        let stdout: Vec<_> = result.lines.iter().filter(|l| l.starts_with("out")).collect();
        assert_eq!(stdout, vec!["out1", "out2", "out3", "out4", "out5"]);
        assert!(result.lines.contains(&"err".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_lines_exclude_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 'warning: deprecated flag' >&2; echo 'odin version dev-2024-12'";
        let result = ProcessRunner::run(&sh(script, dir.path())).await;

        assert!(result.succeeded);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.stdout_lines, vec!["odin version dev-2024-12"]);
        assert_eq!(result.stdout_text(), "odin version dev-2024-12");
    }

    #[test]
    fn test_absolute_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("odin/build.sh")), cwd.join("odin/build.sh"));
        assert_eq!(absolute(Path::new("/opt/odin")), PathBuf::from("/opt/odin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessRunner::run(&sh("touch here", dir.path())).await;

        assert!(result.succeeded);
        assert!(dir.path().join("here").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("sleep 5", dir.path()).with_timeout(Duration::from_millis(100));

        let result = ProcessRunner::run(&spec).await;
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
    }
}
