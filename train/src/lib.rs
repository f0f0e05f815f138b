//! The training program for the core segmentation model.

pub mod common;
pub mod config;
pub mod train;
pub mod utils;

pub use crate::train::{EpochRecord, FoldHistory, History};

use crate::common::*;

/// The entry of training program.
///
/// Creates a timestamped run directory under the logging directory, trains
/// one model per validation fold and writes the per-epoch history there.
pub fn start(config: &config::Config) -> Result<History> {
    config.validate()?;

    let start_time = Local::now();
    let logging_dir = config
        .logging
        .dir
        .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
    let checkpoint_dir = logging_dir.join("checkpoints");

    // create dirs and save config
    {
        fs::create_dir_all(&logging_dir)?;
        fs::create_dir_all(&checkpoint_dir)?;
        let path = logging_dir.join("config.json");
        let text = serde_json::to_string_pretty(config)?;
        fs::write(&path, text)?;
    }
    info!("logging to '{}'", logging_dir.display());

    // load dataset
    info!("loading dataset");
    let dataset = config.dataset.assemble()?;
    ensure!(!dataset.is_empty(), "the dataset is empty");

    // start training
    let history = train::training_worker(config, &dataset, &checkpoint_dir)?;

    let path = logging_dir.join("history.json");
    fs::write(&path, serde_json::to_string_pretty(&history)?)?;
    info!("training history saved to '{}'", path.display());
    if let Some(loss) = history.mean_best_val_loss() {
        info!("mean best validation loss over folds: {:.5}", loss);
    }

    Ok(history)
}
