//! Configuration loading and root folder resolution
//!
//! Every QMS service reads a small TOML bootstrap file. Nothing in it can
//! change while a service is running; restart to pick up edits.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`QMS_ROOT_FOLDER`)
//! 3. TOML configuration file
//! 4. Compiled defaults (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and
//! starts with compiled defaults. A TOML file that exists but does not parse
//! is a configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "QMS_ROOT_FOLDER";

/// File name of the local record blob inside the root folder
pub const BLOB_FILE_NAME: &str = "qms_data.json";

/// File name of the SQLite table store inside the root folder
pub const DATABASE_FILE_NAME: &str = "qms.db";

/// Default maximum upload size (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the blob, the database and the upload directory
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port (service default applies when absent)
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upload sidecar settings (optional)
    #[serde(default)]
    pub upload: UploadConfig,

    /// Record store settings (optional)
    #[serde(default)]
    pub store: StoreConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

/// Upload sidecar configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Directory name (under the root folder) where uploads are stored
    #[serde(default = "default_upload_dir")]
    pub directory: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            directory: default_upload_dir(),
        }
    }
}

/// Which backend serves record operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single JSON blob in the root folder
    #[default]
    Local,
    /// SQLite table store in the root folder
    Table,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local),
            "table" => Ok(StoreBackend::Table),
            other => Err(Error::Config(format!(
                "Unknown store backend '{}' (expected 'local' or 'table')",
                other
            ))),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Backend used by the record store service
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of a remote record store service; when set, clients go
    /// remote first and fall back to the local blob
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

impl TomlConfig {
    /// Load the bootstrap file for `service` from the platform config location.
    ///
    /// Returns compiled defaults (with a warning) when no file exists.
    pub fn load(service: &str) -> Result<Self> {
        match config_file_path(service) {
            Some(path) => Self::load_from_path(&path),
            None => {
                warn!(
                    "No configuration file found for {}, using compiled defaults",
                    service
                );
                Ok(Self::default())
            }
        }
    }

    /// Load and parse a specific TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = toml::from_str::<TomlConfig>(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Locate the TOML file for a service, if one exists
///
/// Linux: `~/.config/qms/<service>.toml`, then `/etc/qms/<service>.toml`.
/// Other platforms: `<config dir>/qms/<service>.toml`.
pub fn config_file_path(service: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", service);
    let user_config = dirs::config_dir().map(|d| d.join("qms").join(&file_name));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/qms").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolves the root folder following the settings priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    service: String,
}

impl RootFolderResolver {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Resolve the root folder: CLI argument, then `QMS_ROOT_FOLDER`,
    /// then the TOML `root_folder` key, then the compiled default.
    pub fn resolve(&self, cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
        if let Some(path) = cli_arg {
            info!("{}: root folder from command line", self.service);
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("{}: root folder from {}", self.service, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &toml.root_folder {
            info!("{}: root folder from configuration file", self.service);
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qms"))
        .unwrap_or_else(|| PathBuf::from("./qms_data"))
}

/// Creates the root folder layout and hands out the well-known paths in it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.root.join(BLOB_FILE_NAME)
    }

    /// Upload directory (created on demand)
    pub fn upload_dir(&self, upload: &UploadConfig) -> Result<PathBuf> {
        let dir = self.root.join(&upload.directory);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_defaults_when_sections_missing() {
        let config: TomlConfig = toml::from_str("port = 6000").unwrap();
        assert_eq!(config.port, Some(6000));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.upload.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.upload.directory, "uploads");
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert!(config.store.remote_url.is_none());
    }

    #[test]
    fn test_toml_full_file() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/srv/qms"
            port = 7000

            [logging]
            level = "debug"

            [upload]
            max_file_size = 1024
            directory = "files"

            [store]
            backend = "table"
            remote_url = "http://127.0.0.1:5731"
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/qms")));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.upload.max_file_size, 1024);
        assert_eq!(config.upload.directory, "files");
        assert_eq!(config.store.backend, StoreBackend::Table);
        assert_eq!(
            config.store.remote_url.as_deref(),
            Some("http://127.0.0.1:5731")
        );
    }

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!("local".parse::<StoreBackend>().unwrap(), StoreBackend::Local);
        assert_eq!("TABLE".parse::<StoreBackend>().unwrap(), StoreBackend::Table);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/qms"));
        assert_eq!(init.database_path(), PathBuf::from("/srv/qms/qms.db"));
        assert_eq!(init.blob_path(), PathBuf::from("/srv/qms/qms_data.json"));
    }
}
