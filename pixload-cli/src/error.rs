//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and exit codes.

use pixload::cache::DiskStoreError;
use pixload::config::ConfigError;
use pixload::manager::BuildError;
use pixload::request::ResourceError;
use pixload::ImageError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Resource identifier could not be parsed
    Resource(ResourceError),
    /// Failed to create the image manager
    ManagerCreation(BuildError),
    /// The image request failed
    Load(ImageError),
    /// The request finished without delivering a result
    NoResult,
    /// Failed to clear caches
    Cache(DiskStoreError),
    /// Failed to write the output file
    FileWrite { path: PathBuf, error: String },
}

impl CliError {
    /// Exit the process with an error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Load(ImageError::Network(_)) = self {
            eprintln!();
            eprintln!("Check that the URL is reachable, or raise fetch.timeout in the config file.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Resource(e) => write!(f, "Invalid resource: {}", e),
            CliError::ManagerCreation(e) => write!(f, "Failed to create image manager: {}", e),
            CliError::Load(e) => write!(f, "Failed to load image ({}): {}", e.kind(), e),
            CliError::NoResult => write!(f, "Request finished without a result"),
            CliError::Cache(e) => write!(f, "Failed to clear caches: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Resource(e) => Some(e),
            CliError::ManagerCreation(e) => Some(e),
            CliError::Load(e) => Some(e),
            CliError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ResourceError> for CliError {
    fn from(e: ResourceError) -> Self {
        CliError::Resource(e)
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::ManagerCreation(e)
    }
}

impl From<ImageError> for CliError {
    fn from(e: ImageError) -> Self {
        CliError::Load(e)
    }
}
