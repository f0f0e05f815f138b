use crate::common::*;

/// Losses and metrics after one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Pixel-wise ROC-AUC on the validation set. Unset when the set has a single class.
    pub val_auc: Option<f64>,
}

/// The training history of one validation fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldHistory {
    pub fold: usize,
    pub epochs: Vec<EpochRecord>,
    pub best_checkpoint: Option<PathBuf>,
    /// Set if training stopped before the configured number of epochs.
    pub early_stopped: bool,
}

impl FoldHistory {
    pub fn best_val_loss(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|record| record.val_loss)
            .filter(|loss| loss.is_finite())
            .min_by(|lhs, rhs| lhs.total_cmp(rhs))
    }
}

/// The training history of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub folds: Vec<FoldHistory>,
}

impl History {
    /// The mean of the best validation losses over folds.
    pub fn mean_best_val_loss(&self) -> Option<f64> {
        let losses: Vec<_> = self
            .folds
            .iter()
            .filter_map(FoldHistory::best_val_loss)
            .collect();
        (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64)
    }
}
