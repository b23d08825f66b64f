//! Layered configuration.
//!
//! Resolved once per run, lowest precedence first:
//!
//! 1. built-in defaults for the current [`Platform`]
//! 2. `settings.toml`
//! 3. `settings.<platform>.toml`
//! 4. `user.toml`
//! 5. call-time overrides (CLI flags)
//!
//! Every file layer is optional and may set any subset of fields.

use crate::error::ConfigError;
use crate::runner::absolute;
use crate::tag::{TagPolicy, DEFAULT_TAG_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ODIN_REPO_URL: &str = "https://github.com/odin-lang/Odin.git";
pub const OLS_REPO_URL: &str = "https://github.com/DanielGavin/ols.git";

const BASE_FILE: &str = "settings.toml";
const USER_FILE: &str = "user.toml";

/// Host platform, used to pick defaults and the platform settings layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        }
    }

    /// Command that resolves an executable name against `PATH`.
    pub fn locate_command(&self) -> &'static str {
        match self {
            Platform::Windows => "where",
            Platform::Macos | Platform::Linux => "which",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Compiler repository.
    pub primary_repo_url: String,
    pub primary_folder: PathBuf,

    /// Language server repository.
    pub secondary_repo_url: String,
    pub secondary_folder: PathBuf,

    /// Whether the language server is synced and built at all.
    pub update_secondary: bool,

    /// Build script file names, relative to each project root.
    pub primary_build_script: String,
    pub secondary_build_script: String,

    /// Executable produced by the primary build.
    pub artifact_name: String,

    pub tag_prefix: String,
    pub tag_policy: TagPolicy,

    /// Editor packages known to be installed; `None` skips the check.
    pub installed_packages: Option<Vec<String>>,
}

impl UpdaterConfig {
    /// Built-in defaults for `platform`.
    pub fn defaults(platform: Platform) -> Self {
        let (primary_folder, secondary_folder) = match platform {
            Platform::Windows => (PathBuf::from(r"C:\odin"), PathBuf::from(r"C:\ols")),
            Platform::Macos | Platform::Linux => {
                let home = dirs::home_dir().unwrap_or_default();
                (home.join("odin"), home.join("ols"))
            }
        };

        let (primary_build_script, secondary_build_script, artifact_name) = match platform {
            Platform::Windows => ("build.bat", "build.bat", "odin.exe"),
            Platform::Macos | Platform::Linux => ("build_odin.sh", "build.sh", "odin"),
        };

        Self {
            primary_repo_url: ODIN_REPO_URL.to_string(),
            primary_folder,
            secondary_repo_url: OLS_REPO_URL.to_string(),
            secondary_folder,
            update_secondary: true,
            primary_build_script: primary_build_script.to_string(),
            secondary_build_script: secondary_build_script.to_string(),
            artifact_name: artifact_name.to_string(),
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            tag_policy: TagPolicy::default(),
            installed_packages: None,
        }
    }

    /// Overwrite every field that `layer` sets.
    pub fn apply(&mut self, layer: PartialConfig) {
        macro_rules! take {
            ($dst:expr, $src:expr; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $src.$field {
                    $dst.$field = value;
                })*
            };
        }

        take!(self, layer;
            primary_repo_url,
            primary_folder,
            secondary_repo_url,
            secondary_folder,
            update_secondary,
            primary_build_script,
            secondary_build_script,
            artifact_name,
            tag_prefix,
            tag_policy,
        );

        if layer.installed_packages.is_some() {
            self.installed_packages = layer.installed_packages;
        }
    }

    /// Expand a leading `~` in both project folders and anchor relative
    /// folders at the current directory. Commands run with the project folder
    /// as their working directory, so the folders must not depend on it.
    pub fn normalize_folders(&mut self) {
        self.primary_folder = normalize_folder(&self.primary_folder);
        self.secondary_folder = normalize_folder(&self.secondary_folder);
    }
}

fn normalize_folder(path: &Path) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };
    absolute(&expanded)
}

/// One configuration layer; unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialConfig {
    pub primary_repo_url: Option<String>,
    pub primary_folder: Option<PathBuf>,
    pub secondary_repo_url: Option<String>,
    pub secondary_folder: Option<PathBuf>,
    pub update_secondary: Option<bool>,
    pub primary_build_script: Option<String>,
    pub secondary_build_script: Option<String>,
    pub artifact_name: Option<String>,
    pub tag_prefix: Option<String>,
    pub tag_policy: Option<TagPolicy>,
    pub installed_packages: Option<Vec<String>>,
}

impl PartialConfig {
    /// Read a layer file. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config layer {} not present", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let layer = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config layer {}", path.display());
        Ok(Some(layer))
    }
}

/// Locates and merges the configuration files in one directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
    platform: Platform,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            dir: dir.into(),
            platform,
        }
    }

    /// `<config dir>/odin-updater`, if the OS reports a config dir.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("odin-updater"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn user_file(&self) -> PathBuf {
        self.dir.join(USER_FILE)
    }

    /// File layers in ascending precedence.
    pub fn layer_files(&self) -> [PathBuf; 3] {
        [
            self.dir.join(BASE_FILE),
            self.dir.join(format!("settings.{}.toml", self.platform)),
            self.user_file(),
        ]
    }

    /// Merge defaults, file layers and `call_time` into one config.
    pub fn resolve(&self, call_time: PartialConfig) -> Result<UpdaterConfig, ConfigError> {
        let mut config = UpdaterConfig::defaults(self.platform);
        for path in self.layer_files() {
            if let Some(layer) = PartialConfig::load(&path)? {
                config.apply(layer);
            }
        }
        config.apply(call_time);
        // Folders written for another platform cannot be anchored here.
        if self.platform == Platform::current() {
            config.normalize_folders();
        }
        Ok(config)
    }

    /// Write a commented `user.toml` holding the platform defaults.
    ///
    /// Returns the path written. Existing files are left alone.
    pub fn write_user_template(&self) -> Result<PathBuf, ConfigError> {
        let path = self.user_file();
        if path.exists() {
            return Ok(path);
        }

        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        std::fs::write(&path, render_template(&UpdaterConfig::defaults(self.platform)))
            .map_err(io_err)?;
        Ok(path)
    }
}

fn render_template(defaults: &UpdaterConfig) -> String {
    let value = |s: &str| toml::Value::String(s.to_string()).to_string();
    let tag_policy = match defaults.tag_policy {
        TagPolicy::Strict => "strict",
        TagPolicy::DigitsOnly => "digits_only",
    };

    format!(
        "# Official source code for Odin
primary_repo_url = {}

# Source code for the Odin Language Server
secondary_repo_url = {}

# Where Odin will be installed on your system
primary_folder = {}

# Where the Odin Language Server will be installed on your system
secondary_folder = {}

# Whether the Odin Language Server should be installed or updated
update_secondary = {}

# Month validation for dev-YYYY-MM tags: \"strict\" or \"digits_only\"
tag_policy = {}
",
        value(&defaults.primary_repo_url),
        value(&defaults.secondary_repo_url),
        value(&defaults.primary_folder.to_string_lossy()),
        value(&defaults.secondary_folder.to_string_lossy()),
        defaults.update_secondary,
        value(tag_policy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_defaults() {
        let config = UpdaterConfig::defaults(Platform::Windows);
        assert_eq!(config.primary_folder, PathBuf::from(r"C:\odin"));
        assert_eq!(config.primary_build_script, "build.bat");
        assert_eq!(config.artifact_name, "odin.exe");
        assert!(config.update_secondary);
        assert_eq!(config.tag_policy, TagPolicy::Strict);
    }

    #[test]
    fn test_unix_defaults() {
        let config = UpdaterConfig::defaults(Platform::Linux);
        assert!(config.primary_folder.ends_with("odin"));
        assert_eq!(config.primary_build_script, "build_odin.sh");
        assert_eq!(config.secondary_build_script, "build.sh");
        assert_eq!(config.artifact_name, "odin");
    }

    #[test]
    fn test_missing_layers_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path(), Platform::Linux);

        let config = loader.resolve(PartialConfig::default()).unwrap();
        assert_eq!(config, UpdaterConfig::defaults(Platform::Linux));
    }

    #[test]
    fn test_layers_override_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.toml"),
            "primary_folder = \"/base/odin\"\nsecondary_folder = \"/base/ols\"\nupdate_secondary = false\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("settings.linux.toml"),
            "primary_folder = \"/linux/odin\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("settings.windows.toml"),
            "primary_folder = \"C:/ignored\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("user.toml"), "update_secondary = true\n").unwrap();

        let loader = ConfigLoader::new(dir.path(), Platform::Linux);
        let config = loader
            .resolve(PartialConfig {
                secondary_folder: Some(PathBuf::from("/cli/ols")),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.primary_folder, PathBuf::from("/linux/odin"));
        assert_eq!(config.secondary_folder, PathBuf::from("/cli/ols"));
        assert!(config.update_secondary);
        assert_eq!(config.primary_repo_url, ODIN_REPO_URL);
    }

    #[test]
    fn test_relative_and_home_folders_are_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("user.toml"),
            "primary_folder = \"odin\"\nsecondary_folder = \"~/src/ols\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path(), Platform::current())
            .resolve(PartialConfig::default())
            .unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.primary_folder, cwd.join("odin"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.secondary_folder, home.join("src").join("ols"));
        }
        assert!(config.secondary_folder.is_absolute());
    }

    #[test]
    fn test_call_time_relative_folder_is_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new(dir.path(), Platform::current())
            .resolve(PartialConfig {
                primary_folder: Some(PathBuf::from("build/odin")),
                ..Default::default()
            })
            .unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.primary_folder, cwd.join("build/odin"));
    }

    #[test]
    fn test_malformed_layer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user.toml"), "update_secondary = \"maybe\"").unwrap();

        let err = ConfigLoader::new(dir.path(), Platform::Linux)
            .resolve(PartialConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_user_template_round_trips_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("nested"), Platform::Windows);

        let path = loader.write_user_template().unwrap();
        assert_eq!(path, loader.user_file());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# Where Odin will be installed"));

        let config = loader.resolve(PartialConfig::default()).unwrap();
        assert_eq!(config, UpdaterConfig::defaults(Platform::Windows));
    }

    #[test]
    fn test_user_template_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user.toml"), "update_secondary = false\n").unwrap();

        let loader = ConfigLoader::new(dir.path(), Platform::Linux);
        loader.write_user_template().unwrap();

        let text = std::fs::read_to_string(loader.user_file()).unwrap();
        assert_eq!(text, "update_secondary = false\n");
    }
}
