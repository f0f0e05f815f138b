use crate::{
    common::*,
    loss::{check_shapes, zero_loss},
};

/// Smooth-L1 (Huber) loss on box coordinates.
///
/// Errors below `1 / sigma²` are penalized quadratically, larger ones
/// linearly. The per-box loss sums over the last axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct SmoothL1LossInit {
    #[derivative(Default(value = "r64(3.0)"))]
    pub sigma: R64,
}

impl SmoothL1LossInit {
    pub fn build(self) -> Result<SmoothL1Loss> {
        let Self { sigma } = self;
        ensure!(sigma > 0.0, "sigma must be positive, but get {}", sigma);
        Ok(SmoothL1Loss {
            sigma_squared: sigma.raw().powi(2),
        })
    }
}

#[derive(Debug)]
pub struct SmoothL1Loss {
    sigma_squared: f64,
}

impl SmoothL1Loss {
    /// The mean per-box loss over all boxes.
    pub fn forward(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        check_shapes(y_true, y_pred)?;
        if y_pred.numel() == 0 {
            return Ok(zero_loss(y_pred.device()));
        }
        Ok(self.per_box(y_true, y_pred).mean(Kind::Float))
    }

    /// The mean per-box loss over boxes whose `valid` flag is set.
    ///
    /// `valid` has the shape of the inputs without the last axis. The loss is
    /// zero when no box is valid.
    pub fn forward_masked(&self, y_true: &Tensor, y_pred: &Tensor, valid: &Tensor) -> Result<Tensor> {
        check_shapes(y_true, y_pred)?;
        let box_shape = {
            let mut shape = y_pred.size();
            shape.pop();
            shape
        };
        ensure!(
            valid.size() == box_shape,
            "validity mask must have shape {:?}, but get {:?}",
            box_shape,
            valid.size()
        );
        if y_pred.numel() == 0 {
            return Ok(zero_loss(y_pred.device()));
        }

        let valid = valid.to_kind(Kind::Float);
        let total = (self.per_box(y_true, y_pred) * &valid).sum(Kind::Float);
        Ok(total / valid.sum(Kind::Float).clamp_min(1.0))
    }

    fn per_box(&self, y_true: &Tensor, y_pred: &Tensor) -> Tensor {
        let sigma_squared = self.sigma_squared;
        let diff = (y_true.to_kind(Kind::Float) - y_pred).abs();
        let is_small = diff.lt(1.0 / sigma_squared).to_kind(Kind::Float);
        let quadratic = &diff * &diff * (0.5 * sigma_squared);
        let linear = &diff - 0.5 / sigma_squared;
        let loss = &is_small * quadratic + (1.0 - &is_small) * linear;
        loss.sum_dim_intlist(&[-1], false, Kind::Float)
    }
}
