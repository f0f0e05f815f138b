use crate::{
    common::*,
    focal_loss::{FocalLoss, FocalLossInit},
    smooth_l1_loss::{SmoothL1Loss, SmoothL1LossInit},
    weighted_bce_loss::{WeightedBceLoss, WeightedBceLossInit},
};

/// The smallest accepted clipping epsilon. Smaller values vanish in `f32`.
pub const MIN_EPSILON: f64 = 1e-7;

/// The loss function selected in a training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LossInit {
    WeightedBce(WeightedBceLossInit),
    Focal(FocalLossInit),
    SmoothL1(SmoothL1LossInit),
}

impl Default for LossInit {
    fn default() -> Self {
        Self::WeightedBce(Default::default())
    }
}

impl LossInit {
    pub fn build(self) -> Result<Loss> {
        let loss = match self {
            Self::WeightedBce(init) => Loss::WeightedBce(init.build()?),
            Self::Focal(init) => Loss::Focal(init.build()?),
            Self::SmoothL1(init) => Loss::SmoothL1(init.build()?),
        };
        Ok(loss)
    }
}

#[derive(Debug)]
pub enum Loss {
    WeightedBce(WeightedBceLoss),
    Focal(FocalLoss),
    SmoothL1(SmoothL1Loss),
}

impl Loss {
    /// Computes a scalar loss of `y_pred` against `y_true`.
    pub fn forward(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        match self {
            Self::WeightedBce(loss) => loss.forward(y_true, y_pred),
            Self::Focal(loss) => loss.forward(y_true, y_pred),
            Self::SmoothL1(loss) => loss.forward(y_true, y_pred),
        }
    }
}

pub(crate) fn check_shapes(y_true: &Tensor, y_pred: &Tensor) -> Result<()> {
    let true_shape = y_true.size();
    let pred_shape = y_pred.size();
    ensure!(
        true_shape == pred_shape,
        "shape mismatch: y_true has shape {:?}, but y_pred has shape {:?}",
        true_shape,
        pred_shape
    );
    Ok(())
}

pub(crate) fn check_epsilon(epsilon: f64) -> Result<()> {
    ensure!(
        (MIN_EPSILON..0.5).contains(&epsilon),
        "epsilon must be in range [{}, 0.5), but get {}",
        MIN_EPSILON,
        epsilon
    );
    Ok(())
}

pub(crate) fn zero_loss(device: Device) -> Tensor {
    Tensor::zeros(&[], (Kind::Float, device)).set_requires_grad(false)
}
