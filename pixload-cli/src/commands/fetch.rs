//! Fetch command - load one image and write it as PNG.

use std::path::PathBuf;
use std::time::Instant;

use clap::ValueEnum;
use image::ImageFormat;
use tracing::info;

use pixload::{ContentMode, ImageRequest, Priority, RequestOptions, TargetSize};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Content mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Scale to fit inside the target size
    Fit,
    /// Scale to fill the target size, cropping the overflow
    Fill,
}

impl From<ModeArg> for ContentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fit => ContentMode::AspectFit,
            ModeArg::Fill => ContentMode::AspectFill,
        }
    }
}

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub resource: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: ModeArg,
    pub out: PathBuf,
    pub config: Option<PathBuf>,
    pub offline: bool,
}

impl FetchArgs {
    /// Target size from the width/height flags; a missing side copies the
    /// other one.
    fn target_size(&self) -> TargetSize {
        match (self.width, self.height) {
            (Some(w), Some(h)) => TargetSize::pixels(w, h),
            (Some(side), None) | (None, Some(side)) => TargetSize::pixels(side, side),
            (None, None) => TargetSize::Maximum,
        }
    }

    fn to_request(&self) -> Result<ImageRequest, CliError> {
        let options = RequestOptions::default()
            .with_priority(Priority::High)
            .with_network_access(!self.offline);
        Ok(ImageRequest::parse(&self.resource)?
            .with_target_size(self.target_size())
            .with_content_mode(self.mode.into())
            .with_options(options))
    }
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("fetch");

    let request = args.to_request()?;
    let manager = runner.create_manager()?;

    println!("Loading {}", request.resource());
    println!("  Target: {} ({})", request.target_size(), request.content_mode());
    let start = Instant::now();

    let result = runner
        .block_on(manager.request(request).wait())
        .ok_or(CliError::NoResult)?;
    let info = result.info().clone();
    let image = result.into_result()?;

    let (width, height) = image.dimensions();
    println!(
        "Loaded {}x{} in {:.2}s from {}",
        width,
        height,
        start.elapsed().as_secs_f64(),
        info.data_source.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
    );

    image
        .pixels()
        .save_with_format(&args.out, ImageFormat::Png)
        .map_err(|e| CliError::FileWrite {
            path: args.out.clone(),
            error: e.to_string(),
        })?;

    info!(path = %args.out.display(), width, height, "Image saved");
    println!("Saved {}", args.out.display());
    manager.log_stats();
    Ok(())
}
