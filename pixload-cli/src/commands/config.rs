//! Config command - print the effective configuration.

use std::path::PathBuf;

use pixload::config::config_file_path;

use crate::error::CliError;
use crate::runner::load_config;

/// Arguments for the config command.
pub struct ConfigArgs {
    pub config: Option<PathBuf>,
    pub path_only: bool,
}

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<(), CliError> {
    let path = args.config.clone().unwrap_or_else(config_file_path);
    if args.path_only {
        println!("{}", path.display());
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    if path.exists() {
        println!("# Loaded from {}", path.display());
    } else {
        println!("# {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_config_string());
    Ok(())
}
