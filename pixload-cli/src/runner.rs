//! CLI runner for common setup.
//!
//! Loads the configuration file, initializes logging and owns the Tokio
//! runtime the image manager runs on.

use crate::error::CliError;
use pixload::config::ConfigFile;
use pixload::logging::{init_logging, LoggingGuard};
use pixload::manager::ImageManager;
use std::future::Future;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::info;

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    // Keeps the file writer flushing until the runner is dropped
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Loads `config_path` (or the default config file) and initializes
    /// logging and the runtime.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;

        let logging_guard = init_logging(
            &config.logging.directory,
            &config.logging.file,
            &config.logging.level,
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(version = env!("CARGO_PKG_VERSION"), command, "pixload CLI starting");
    }

    /// Builds an image manager from the loaded configuration.
    pub fn create_manager(&self) -> Result<ImageManager, CliError> {
        let manager_config = self.config.to_manager_config();
        let manager = self
            .runtime
            .block_on(ImageManager::builder(manager_config).runtime(self.runtime.handle().clone()).build())?;
        info!("Image manager created");
        Ok(manager)
    }

    /// Runs `future` to completion on the runner's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Loads the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::Config(format!("config file not found: {}", path.display())));
            }
            ConfigFile::load_from(path)?
        }
        None => ConfigFile::load()?,
    };
    Ok(config)
}
