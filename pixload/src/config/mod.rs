//! Configuration file handling for `<config dir>/pixload/config.ini`.
//!
//! ```ini
//! [cache]
//! memory_size = 128MB
//! data_size = 64MB
//! disk_enabled = true
//! disk_directory = ~/.cache/pixload
//! disk_size = 512MB
//!
//! [fetch]
//! timeout = 30
//! max_attempts = 3
//! asset_root = /usr/share/myapp/images
//!
//! [executor]
//! max_concurrent_tasks = 6
//! max_concurrent_decodes = 4
//! max_concurrent_preheating = 2
//!
//! [logging]
//! directory = ~/.local/share/pixload/logs
//! file = pixload.log
//! level = info
//! ```
//!
//! Missing files and missing keys fall back to defaults.

mod size;

pub use size::{format_size, parse_size, SizeParseError};

use crate::executor::RetryPolicy;
use crate::logging::{DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL};
use crate::manager::{
    default_decode_concurrency, DiskCacheConfig, ManagerConfig, DEFAULT_DATA_CACHE_SIZE, DEFAULT_DISK_CACHE_SIZE,
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_MAX_CONCURRENT_PREHEATING, DEFAULT_MEMORY_CACHE_SIZE,
};
use ini::{Ini, Properties};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    Write(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    Directory(std::io::Error),
}

/// `[cache]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub memory_size: usize,
    pub data_size: usize,
    pub disk_enabled: bool,
    pub disk_directory: PathBuf,
    pub disk_size: usize,
}

/// `[fetch]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchSettings {
    /// HTTP timeout in seconds.
    pub timeout: u64,
    pub max_attempts: u32,
    pub asset_root: Option<PathBuf>,
}

/// `[executor]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub max_concurrent_tasks: usize,
    pub max_concurrent_decodes: usize,
    pub max_concurrent_preheating: usize,
}

/// `[logging]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    pub level: String,
}

/// Parsed configuration file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub executor: ExecutorSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                memory_size: DEFAULT_MEMORY_CACHE_SIZE,
                data_size: DEFAULT_DATA_CACHE_SIZE as usize,
                disk_enabled: false,
                disk_directory: default_cache_directory(),
                disk_size: DEFAULT_DISK_CACHE_SIZE as usize,
            },
            fetch: FetchSettings {
                timeout: crate::fetch::DEFAULT_HTTP_TIMEOUT.as_secs(),
                max_attempts: DEFAULT_FETCH_ATTEMPTS,
                asset_root: None,
            },
            executor: ExecutorSettings {
                max_concurrent_tasks: crate::executor::DEFAULT_MAX_CONCURRENT_WORK,
                max_concurrent_decodes: default_decode_concurrency(),
                max_concurrent_preheating: DEFAULT_MAX_CONCURRENT_PREHEATING,
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Loads from the default path, or returns defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`, or returns defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read(ini::Error::Parse(e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("cache")) {
            let s = Section::new("cache", section);
            s.size("memory_size", &mut config.cache.memory_size)?;
            s.size("data_size", &mut config.cache.data_size)?;
            s.value("disk_enabled", "must be true or false", &mut config.cache.disk_enabled)?;
            s.path("disk_directory", &mut config.cache.disk_directory);
            s.size("disk_size", &mut config.cache.disk_size)?;
        }

        if let Some(section) = ini.section(Some("fetch")) {
            let s = Section::new("fetch", section);
            s.value("timeout", "must be a positive integer (seconds)", &mut config.fetch.timeout)?;
            s.value("max_attempts", "must be a positive integer", &mut config.fetch.max_attempts)?;
            let mut root = PathBuf::new();
            if s.path("asset_root", &mut root) {
                config.fetch.asset_root = Some(root);
            }
        }

        if let Some(section) = ini.section(Some("executor")) {
            let s = Section::new("executor", section);
            let reason = "must be a positive integer";
            s.value("max_concurrent_tasks", reason, &mut config.executor.max_concurrent_tasks)?;
            s.value("max_concurrent_decodes", reason, &mut config.executor.max_concurrent_decodes)?;
            s.value(
                "max_concurrent_preheating",
                reason,
                &mut config.executor.max_concurrent_preheating,
            )?;
        }

        if let Some(section) = ini.section(Some("logging")) {
            let s = Section::new("logging", section);
            s.path("directory", &mut config.logging.directory);
            if let Some(v) = s.get("file") {
                config.logging.file = v.to_string();
            }
            if let Some(v) = s.get("level") {
                config.logging.level = v.to_lowercase();
            }
        }

        Ok(config)
    }

    /// Saves to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Directory)?;
        }
        std::fs::write(path, self.to_config_string()).map_err(|e| ConfigError::Write(e.to_string()))
    }

    /// Renders the configuration as INI text.
    pub fn to_config_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("cache"))
            .set("memory_size", format_size(self.cache.memory_size))
            .set("data_size", format_size(self.cache.data_size))
            .set("disk_enabled", self.cache.disk_enabled.to_string())
            .set("disk_directory", self.cache.disk_directory.display().to_string())
            .set("disk_size", format_size(self.cache.disk_size));

        let mut fetch = ini.with_section(Some("fetch"));
        fetch
            .set("timeout", self.fetch.timeout.to_string())
            .set("max_attempts", self.fetch.max_attempts.to_string());
        if let Some(root) = &self.fetch.asset_root {
            fetch.set("asset_root", root.display().to_string());
        }

        ini.with_section(Some("executor"))
            .set("max_concurrent_tasks", self.executor.max_concurrent_tasks.to_string())
            .set("max_concurrent_decodes", self.executor.max_concurrent_decodes.to_string())
            .set(
                "max_concurrent_preheating",
                self.executor.max_concurrent_preheating.to_string(),
            );

        ini.with_section(Some("logging"))
            .set("directory", self.logging.directory.display().to_string())
            .set("file", self.logging.file.clone())
            .set("level", self.logging.level.clone());

        let mut out = Vec::new();
        // Writing to a Vec cannot fail
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Builds the manager configuration.
    pub fn to_manager_config(&self) -> ManagerConfig {
        let retry_policy = if self.fetch.max_attempts <= 1 {
            RetryPolicy::None
        } else {
            RetryPolicy::exponential(self.fetch.max_attempts)
        };

        let mut config = ManagerConfig::default()
            .with_memory_cache_size(self.cache.memory_size)
            .with_data_cache_size(self.cache.data_size as u64)
            .with_max_concurrent_tasks(self.executor.max_concurrent_tasks)
            .with_max_concurrent_decodes(self.executor.max_concurrent_decodes)
            .with_max_concurrent_preheating(self.executor.max_concurrent_preheating)
            .with_retry_policy(retry_policy)
            .with_http_timeout(Duration::from_secs(self.fetch.timeout.max(1)));

        if self.cache.disk_enabled {
            config = config.with_disk_cache(DiskCacheConfig::new(
                self.cache.disk_directory.clone(),
                self.cache.disk_size as u64,
            ));
        }
        if let Some(root) = &self.fetch.asset_root {
            config = config.with_asset_root(root.clone());
        }
        config
    }
}

/// Typed accessors over one INI section.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn size(&self, key: &str, target: &mut usize) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *target = parse_size(v)
                .map_err(|_| self.invalid(key, v, "expected format like '2GB', '500MB', or '1024KB'"))?;
        }
        Ok(())
    }

    fn value<T: FromStr>(&self, key: &str, reason: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *target = v.to_lowercase().parse().map_err(|_| self.invalid(key, v, reason))?;
        }
        Ok(())
    }

    fn path(&self, key: &str, target: &mut PathBuf) -> bool {
        match self.get(key) {
            Some(v) => {
                *target = expand_tilde(v);
                true
            }
            None => false,
        }
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// `<config dir>/pixload`.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pixload")
}

/// `<config dir>/pixload/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// `<cache dir>/pixload`.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pixload")
}

/// `<local data dir>/pixload/logs`.
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pixload")
        .join("logs")
}
