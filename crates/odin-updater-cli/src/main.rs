//! odin-updater CLI
//!
//! Keeps source builds of the Odin compiler and the Odin Language Server up
//! to date for editor integration.
//!
//! ## Commands
//!
//! - `update`: clone or pull both projects, pin Odin to its newest release
//!   tag, build both and verify the compiler
//! - `init`: write the user settings template
//! - `config`: print the resolved configuration
//! - `latest-tag`: show which release tag `update` would pick in a checkout

mod terminal;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use odin_updater_core::{
    ConfigLoader, GitStep, PartialConfig, Platform, ProcessRunner, TagPolicy, TagSelector,
    UpdateRun,
};
use std::path::PathBuf;
use std::sync::Arc;
use terminal::TerminalHost;
use tracing::Level;

#[derive(Parser)]
#[command(name = "odin-updater")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch, build and verify the Odin compiler and Odin Language Server", long_about = None)]
struct Cli {
    /// Enable verbose output (includes git query output)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding settings.toml, settings.<platform>.toml and user.toml
    #[arg(long, global = true, env = "ODIN_UPDATER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update or install Odin and the Odin Language Server
    Update {
        #[command(flatten)]
        overrides: Overrides,

        /// Run even if user.toml does not exist yet
        #[arg(long)]
        skip_setup: bool,

        /// Print the run report as JSON when done
        #[arg(long)]
        report_json: bool,
    },

    /// Write the user settings template if it does not exist
    Init,

    /// Print the resolved configuration
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the newest release tag in an existing checkout
    LatestTag {
        /// Checkout to inspect (default: configured Odin folder)
        path: Option<PathBuf>,

        /// Accept any two-digit month, e.g. dev-2024-13
        #[arg(long)]
        digits_only: bool,
    },
}

/// Call-time settings; they override every settings file.
#[derive(Args, Default)]
struct Overrides {
    /// Odin repository URL
    #[arg(long)]
    odin_repo_url: Option<String>,

    /// Where Odin is installed
    #[arg(long)]
    odin_folder: Option<PathBuf>,

    /// Odin Language Server repository URL
    #[arg(long)]
    ols_repo_url: Option<String>,

    /// Where the Odin Language Server is installed
    #[arg(long)]
    ols_folder: Option<PathBuf>,

    /// Whether to install or update the Odin Language Server
    #[arg(long)]
    update_ols: Option<bool>,

    /// Comma-separated editor packages that are installed
    #[arg(long, value_delimiter = ',')]
    installed_packages: Option<Vec<String>>,
}

impl From<Overrides> for PartialConfig {
    fn from(o: Overrides) -> Self {
        PartialConfig {
            primary_repo_url: o.odin_repo_url,
            primary_folder: o.odin_folder,
            secondary_repo_url: o.ols_repo_url,
            secondary_folder: o.ols_folder,
            update_secondary: o.update_ols,
            installed_packages: o.installed_packages,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    odin_updater_core::init_tracing(cli.json, level);

    let config_dir = cli
        .config_dir
        .or_else(ConfigLoader::default_dir)
        .context("Could not determine a config directory, pass --config-dir")?;
    let loader = ConfigLoader::new(config_dir, Platform::current());

    match cli.command {
        Commands::Update {
            overrides,
            skip_setup,
            report_json,
        } => cmd_update(&loader, overrides, skip_setup, report_json).await,
        Commands::Init => cmd_init(&loader),
        Commands::Config { overrides } => cmd_config(&loader, overrides),
        Commands::LatestTag { path, digits_only } => {
            cmd_latest_tag(&loader, path, digits_only).await
        }
    }
}

async fn cmd_update(
    loader: &ConfigLoader,
    overrides: Overrides,
    skip_setup: bool,
    report_json: bool,
) -> Result<()> {
    if !skip_setup && !loader.user_file().exists() {
        let path = loader
            .write_user_template()
            .context("Failed to create user settings")?;
        println!("Initial Setup");
        println!();
        println!(
            "User settings created for Odin Updater at {}. Please check that all folders in the settings are correct for your system and then run Odin Updater again.",
            path.display()
        );
        return Ok(());
    }

    let config = loader
        .resolve(overrides.into())
        .context("Failed to load settings")?;
    let host = Arc::new(TerminalHost::new(config.installed_packages.clone()));

    let report = UpdateRun::new(config, host).execute().await;

    if report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if !report.succeeded() {
        anyhow::bail!("Update failed after {}ms", report.duration_ms());
    }
    Ok(())
}

fn cmd_init(loader: &ConfigLoader) -> Result<()> {
    let existed = loader.user_file().exists();
    let path = loader
        .write_user_template()
        .context("Failed to create user settings")?;

    if existed {
        println!("User settings already exist: {}", path.display());
    } else {
        println!("User settings created: {}", path.display());
    }
    Ok(())
}

fn cmd_config(loader: &ConfigLoader, overrides: Overrides) -> Result<()> {
    let config = loader
        .resolve(overrides.into())
        .context("Failed to load settings")?;

    println!("Config directory: {}", loader.dir().display());
    for path in loader.layer_files() {
        let state = if path.exists() { "✓" } else { "-" };
        println!("  {} {}", state, path.display());
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn cmd_latest_tag(
    loader: &ConfigLoader,
    path: Option<PathBuf>,
    digits_only: bool,
) -> Result<()> {
    let config = loader
        .resolve(PartialConfig::default())
        .context("Failed to load settings")?;
    let repo = path.unwrap_or(config.primary_folder);
    let policy = if digits_only {
        TagPolicy::DigitsOnly
    } else {
        config.tag_policy
    };

    let listing = ProcessRunner::run(&GitStep::ListTags.command(&repo)).await;
    if !listing.succeeded {
        anyhow::bail!("Could not list tags in {}", repo.display());
    }

    let selector = TagSelector::new(&config.tag_prefix, policy);
    match selector.latest_tag(&listing.stdout_lines) {
        Some(tag) => {
            println!("{}", tag);
            Ok(())
        }
        None => anyhow::bail!(
            "No tags in {} match {}-YYYY-MM",
            repo.display(),
            config.tag_prefix
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_update_overrides() {
        let cli = Cli::try_parse_from([
            "odin-updater",
            "update",
            "--odin-folder",
            "/src/odin",
            "--update-ols",
            "false",
            "--installed-packages",
            "Odin,LSP",
        ])
        .unwrap();

        let Commands::Update { overrides, .. } = cli.command else {
            panic!("expected update command");
        };
        let partial = PartialConfig::from(overrides);
        assert_eq!(partial.primary_folder, Some(PathBuf::from("/src/odin")));
        assert_eq!(partial.update_secondary, Some(false));
        assert_eq!(
            partial.installed_packages,
            Some(vec!["Odin".to_string(), "LSP".to_string()])
        );
        assert!(partial.primary_repo_url.is_none());
    }

    #[test]
    fn test_overrides_win_over_user_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("user.toml"),
            "primary_folder = \"/from/file\"\nupdate_secondary = false\n",
        )
        .unwrap();
        let loader = ConfigLoader::new(dir.path(), Platform::Linux);

        let overrides = Overrides {
            odin_folder: Some(PathBuf::from("/from/cli")),
            ..Default::default()
        };
        let config = loader.resolve(overrides.into()).unwrap();

        assert_eq!(config.primary_folder, PathBuf::from("/from/cli"));
        assert!(!config.update_secondary);
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "odin-updater",
            "--verbose",
            "--config-dir",
            "/etc/odin-updater",
            "latest-tag",
            "--digits-only",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/etc/odin-updater")));
        assert!(matches!(
            cli.command,
            Commands::LatestTag {
                path: None,
                digits_only: true
            }
        ));
    }

    #[tokio::test]
    async fn test_update_writes_template_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("cfg"), Platform::current());

        cmd_update(&loader, Overrides::default(), false, false)
            .await
            .unwrap();

        assert!(loader.user_file().is_file());
    }
}
