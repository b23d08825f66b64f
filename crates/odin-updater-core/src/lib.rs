//! odin-updater core library
//!
//! Keeps a local source build of the Odin compiler and the Odin Language
//! Server up to date:
//! - clones or reuses the two checkouts
//! - pins the compiler to its newest `dev-YYYY-MM` release tag and builds it
//! - pulls and builds the language server
//! - verifies the compiler binary and reports the result to the editor host

pub mod config;
pub mod error;
pub mod fakes;
pub mod host;
pub mod info;
pub mod pipeline;
pub mod repo;
pub mod report;
pub mod runner;
pub mod tag;
pub mod telemetry;
pub mod update;
pub mod verify;

pub use config::{ConfigLoader, PartialConfig, Platform, UpdaterConfig};
pub use error::{ConfigError, Result, UpdateError};
pub use host::{Host, HostCommand};
pub use info::BuildInfo;
pub use pipeline::{BuildPipeline, GitStep};
pub use repo::{CommitInfo, RepoMetadata, RepoSyncer, RepoTarget};
pub use report::{RunOutcome, RunReport, Stage};
pub use runner::{
    CommandResult, CommandSpec, OutputLine, OutputLines, ProcessRunner, StreamKind, OUTPUT_TARGET,
};
pub use tag::{Tag, TagPolicy, TagSelector};
pub use telemetry::init_tracing;
pub use update::UpdateRun;
pub use verify::ArtifactVerifier;

/// odin-updater version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
