use anyhow::{Context, Result};
use noisy_float::prelude::*;
use std::path::PathBuf;
use structopt::StructOpt;
use tma_dl::{decode::DecodeInit, grid::GridInit};
use train::config::Config;

#[derive(Debug, Clone, StructOpt)]
/// Detect tissue cores in an image
struct Args {
    #[structopt(long, default_value = "train.json5")]
    /// training configuration file
    pub config_file: PathBuf,
    #[structopt(long)]
    /// model checkpoint file
    pub checkpoint: PathBuf,
    #[structopt(long)]
    /// input image
    pub input: PathBuf,
    #[structopt(long, default_value = "cores.json")]
    /// output JSON file
    pub output: PathBuf,
    #[structopt(long, default_value = "0.5")]
    /// foreground probability threshold
    pub threshold: f64,
    #[structopt(long, default_value = "1")]
    /// minimum core area in pixels
    pub min_area: usize,
    #[structopt(long)]
    /// maximum core area in pixels
    pub max_area: Option<usize>,
    #[structopt(long)]
    /// split touching cores at distance transform markers above this ratio of the peak
    pub dist_transform_ratio: Option<f64>,
    #[structopt(long)]
    /// write plain cores without arranging them into rows and columns
    pub no_grid: bool,
    #[structopt(long)]
    /// core-to-core spacing in pixels, estimated if absent
    pub spacing: Option<f64>,
}

pub fn main() -> Result<()> {
    pretty_env_logger::init();

    // parse arguments
    let Args {
        config_file,
        checkpoint,
        input,
        output,
        threshold,
        min_area,
        max_area,
        dist_transform_ratio,
        no_grid,
        spacing,
    } = Args::from_args();
    let config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    let decode = DecodeInit {
        threshold: R64::try_new(threshold)
            .with_context(|| format!("invalid threshold {}", threshold))?,
        min_area,
        max_area,
        dist_transform_ratio: dist_transform_ratio
            .map(|ratio| {
                R64::try_new(ratio).with_context(|| format!("invalid distance ratio {}", ratio))
            })
            .transpose()?,
    };
    let spacing = spacing
        .map(|spacing| R64::try_new(spacing).with_context(|| format!("invalid spacing {}", spacing)))
        .transpose()?;
    let grid = (!no_grid).then(|| GridInit {
        spacing,
        ..Default::default()
    });

    detect::start(&config, &checkpoint, &input, &output, decode, grid)?;

    Ok(())
}
