//! Bootstrap configuration and root folder resolution
//!
//! Configuration is resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ROYALTY_ROOT_FOLDER`)
//! 3. TOML config file (`~/.config/royalty/<module>.toml`, then `/etc/royalty/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ROYALTY_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "royalties.db";

/// Bootstrap configuration loaded from TOML
///
/// Read once at startup. Changing the file requires a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path, overriding `<root_folder>/royalties.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settlement tuning (batch sizes, timeouts, publisher allow-list)
    #[serde(default)]
    pub settlement: SettlementConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Raw `[settlement]` section
///
/// All fields are optional here; validation and defaults live with the
/// engine, which also layers environment overrides on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Ledger entries inserted per batch statement
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Upper bound for one publish or payment run, in seconds
    #[serde(default)]
    pub transaction_timeout_secs: Option<u64>,

    /// Concurrent post-commit side effects (notifications, milestones)
    #[serde(default)]
    pub side_effect_concurrency: Option<usize>,

    /// Maximum time spent retrying on "database is locked"
    #[serde(default)]
    pub max_lock_wait_ms: Option<u64>,

    /// Publisher IPIs the platform represents; empty means no publisher gate
    #[serde(default)]
    pub platform_publisher_ipis: Vec<String>,

    /// Number of unassigned rows echoed back when publish is blocked
    #[serde(default)]
    pub unassigned_sample_size: Option<usize>,
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/royalty (or /var/lib/royalty system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("royalty"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/royalty"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("royalty"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/royalty"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("royalty"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\royalty"))
        } else {
            PathBuf::from("./royalty_data")
        };

        Self {
            root_folder,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolves the root folder and the bootstrap TOML for one module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_path: None,
        }
    }

    /// Root folder passed on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Explicit config file, bypassing platform lookup
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Load the module TOML, or defaults when no file is present
    pub fn load_config(&self) -> TomlConfig {
        let Some(path) = self.config_file_path() else {
            debug!(module = %self.module_name, "No config file found, using defaults");
            return TomlConfig::default();
        };

        match load_toml_config(&path) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded config file");
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                TomlConfig::default()
            }
        }
    }

    /// Resolve root folder using CLI → ENV → TOML → compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.load_config().root_folder {
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }

    /// Locate the config file for this module, if any exists
    pub fn config_file_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return path.exists().then(|| path.clone());
        }

        let file_name = format!("{}.toml", self.module_name);
        let user_config = dirs::config_dir().map(|d| d.join("royalty").join(&file_name));
        let system_config = PathBuf::from("/etc/royalty").join(&file_name);

        user_config
            .into_iter()
            .chain(std::iter::once(system_config))
            .find(|p| p.exists())
    }
}

/// Creates the root folder and derives file locations inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
