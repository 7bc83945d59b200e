//! pixload CLI - Command-line interface
//!
//! Loads images through the pixload image manager and inspects its
//! configuration.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::fetch::ModeArg;

#[derive(Parser)]
#[command(name = "pixload")]
#[command(version, about = "Fetch, decode and resize images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an image and save it as PNG
    Fetch {
        /// URL, file URL or asset name
        resource: String,

        /// Target width in pixels (native size if neither side is given)
        #[arg(long)]
        width: Option<u32>,

        /// Target height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// How the image is mapped onto the target size
        #[arg(long, value_enum, default_value = "fill")]
        mode: ModeArg,

        /// Output PNG file
        #[arg(long, short, default_value = "out.png")]
        out: PathBuf,

        /// Configuration file (defaults to <config dir>/pixload/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only use cached data, never the network
        #[arg(long)]
        offline: bool,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file to read
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only print the configuration file path
        #[arg(long)]
        path: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch {
            resource,
            width,
            height,
            mode,
            out,
            config,
            offline,
        } => commands::fetch::run(commands::fetch::FetchArgs {
            resource,
            width,
            height,
            mode,
            out,
            config,
            offline,
        }),
        Commands::Config { config, path } => commands::config::run(commands::config::ConfigArgs {
            config,
            path_only: path,
        }),
    };

    if let Err(e) = result {
        e.exit();
    }
}
