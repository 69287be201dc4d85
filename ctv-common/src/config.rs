//! Configuration loading and root folder resolution
//!
//! Resolution follows a four-tier priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "CTV_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "ctv.db";

/// Default transition buffer applied at every phase boundary (seconds)
pub const DEFAULT_TRANSITION_BUFFER_SECS: f64 = 1.5;

/// Default duration of the "high" countdown overlay (milliseconds)
pub const DEFAULT_HIGH_COUNTDOWN_MS: u64 = 4500;

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Engine calibration section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds added per phase boundary crossed when computing set durations
    #[serde(default = "default_transition_buffer")]
    pub transition_buffer_secs: f64,

    /// Length of the high-energy countdown overlay
    #[serde(default = "default_high_countdown")]
    pub high_countdown_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transition_buffer_secs: default_transition_buffer(),
            high_countdown_ms: default_high_countdown(),
        }
    }
}

fn default_transition_buffer() -> f64 {
    DEFAULT_TRANSITION_BUFFER_SECS
}

fn default_high_countdown() -> u64 {
    DEFAULT_HIGH_COUNTDOWN_MS
}

/// Contents of `ctv/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP port override
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path` if given, else from the platform config location.
    ///
    /// Never fails: missing or malformed files produce defaults plus a warning.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file(),
        };

        let Some(config_path) = candidate else {
            info!("No config file location available, using compiled defaults");
            return Self::default();
        };

        if !config_path.exists() {
            info!(
                "Config file {} not found, using compiled defaults",
                config_path.display()
            );
            return Self::default();
        }

        match Self::load(&config_path) {
            Ok(config) => {
                info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load config {}: {} (using compiled defaults)",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

/// Platform config file path: `<config_dir>/ctv/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ctv").join("config.toml"))
}

/// Compiled fallbacks for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/ctv
            dirs::data_local_dir()
                .map(|d| d.join("ctv"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/ctv"))
        } else if cfg!(target_os = "macos") {
            // ~/Library/Application Support/ctv
            dirs::data_dir()
                .map(|d| d.join("ctv"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ctv"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("ctv"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ctv"))
        } else {
            PathBuf::from("./ctv_data")
        };

        Self {
            root_folder,
            log_level: default_log_level(),
        }
    }
}

/// Resolves the root folder for a service module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml: None,
        }
    }

    /// Highest-priority override from the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Already-loaded TOML config (third tier)
    pub fn with_toml(mut self, config: TomlConfig) -> Self {
        self.toml = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.toml.as_ref().and_then(|c| c.root_folder.clone()) {
            info!("{}: root folder from config file", self.module_name);
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}
