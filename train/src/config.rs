//! Training program configuration format.

use crate::common::*;

pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: UNetInit,
    pub dataset: AssemblerInit,
    pub logging: LoggingConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }

    /// Checks that the dataset targets and the loss fit the segmentation model.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            matches!(self.dataset.target, Target::Mask),
            "the segmentation model trains on mask targets, but the dataset target is {:?}",
            self.dataset.target
        );
        ensure!(
            !matches!(self.training.loss, LossInit::SmoothL1(_)),
            "the smooth L1 loss applies to box targets and cannot train the segmentation model"
        );
        Ok(())
    }
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// The batch size.
        pub batch_size: NonZeroUsize,
        /// The maximum number of epochs per fold.
        pub epochs: NonZeroUsize,
        /// The learning rate of the Adam optimizer.
        #[serde(default = "default_lr")]
        pub lr: R64,
        /// The loss function options.
        #[serde(default)]
        pub loss: LossInit,
        /// The validation scheme.
        #[serde(default)]
        pub validation: Validation,
        /// Stop a fold after this many epochs without validation loss improvement.
        pub early_stopping_patience: Option<NonZeroUsize>,
        /// Checkpoint file loading method.
        pub load_checkpoint: LoadCheckpoint,
        /// The training device.
        #[serde(with = "tch_serde::serde_device")]
        pub device: Device,
    }

    fn default_lr() -> R64 {
        r64(1e-4)
    }

    /// The split of samples into training and validation sets.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum Validation {
        /// Hold out a fraction of the samples.
        Holdout { ratio: R64, seed: u64 },
        /// K-fold cross validation. Trains one model per fold.
        KFold { k: usize, seed: u64 },
    }

    impl Default for Validation {
        fn default() -> Self {
            Self::Holdout {
                ratio: r64(0.1),
                seed: 0,
            }
        }
    }

    impl Validation {
        pub fn folds(&self, num_samples: usize) -> Result<Vec<Fold>> {
            let folds = match *self {
                Self::Holdout { ratio, seed } => {
                    vec![split::holdout(num_samples, ratio.raw(), seed)?]
                }
                Self::KFold { k, seed } => KFold {
                    k,
                    shuffle: true,
                    seed,
                }
                .split(num_samples)?,
            };
            Ok(folds)
        }

        pub fn seed(&self) -> u64 {
            match *self {
                Self::Holdout { seed, .. } | Self::KFold { seed, .. } => seed,
            }
        }
    }

    /// Checkpoint file loading method.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LoadCheckpoint {
        /// Disable checkpoint file loading.
        Disabled,
        /// Load the most recent checkpoint file.
        FromRecent,
        /// Load the checkpoint file at specified path.
        FromFile { file: PathBuf },
    }
}
