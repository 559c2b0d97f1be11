//! ProjectPatterns - project sewing patterns onto a cutting mat
//!
//! Renders an SVG pattern through a perspective correction so that it lands
//! true-to-scale on the cutting mat below the projector. The four mat
//! corners are picked interactively on the projector canvas and persisted
//! between runs.

mod calibration;
mod color;
mod config;
mod controller;
mod display;
mod render;
mod source;
mod transform;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::calibration::{CalibrationModel, DisplayGeometry};
use crate::config::ConfigStore;
use crate::controller::Controller;
use crate::display::{DisplaySurface, ProjectorWindow};

/// ProjectPatterns - keystone-corrected pattern projection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SVG pattern to project (width/height must be given in mm, cm or in)
    image: PathBuf,

    /// Configuration file path [default: ~/.config/ProjectPatterns.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_log_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_directive(args.verbose)));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("ProjectPatterns v{}", env!("CARGO_PKG_VERSION"));

    let config_path = match args.config {
        Some(path) => path,
        None => ConfigStore::default_path()?,
    };
    let mut store = ConfigStore::load(&config_path)?;

    let image = source::load_svg(&args.image)
        .with_context(|| format!("Failed to load pattern {:?}", args.image))?;

    let settings = store.settings();
    let geometry = DisplayGeometry::new(
        settings.projector_res,
        settings.cutting_mat,
        image.size_px(),
        image.size_mm,
    );
    info!(
        "Canvas {}x{}, mat {}x{} mm, {:.3}x{:.3} px/mm",
        geometry.canvas_size.0,
        geometry.canvas_size.1,
        geometry.mat_size_mm.0,
        geometry.mat_size_mm.1,
        geometry.pixels_per_mm.0,
        geometry.pixels_per_mm.1
    );

    let model = CalibrationModel::load(&store, geometry);

    // A bad saved calibration is fatal here; in-session it is recoverable
    let first_frame = render::render_model(&image.pixels, &model)
        .context("Saved calibration cannot be rendered")?;

    let (width, height) = geometry.canvas_size;
    let window = ProjectorWindow::open(width, height)?;
    debug_assert_eq!(window.size(), geometry.canvas_size);

    let mut controller = Controller::new(model, image.pixels, window);
    controller.show(&first_frame)?;
    controller.run(&mut store)?;

    info!("Bye");
    Ok(())
}
