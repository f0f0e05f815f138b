use crate::{
    common::*,
    loss::{check_epsilon, check_shapes, zero_loss},
};

/// The label layout a focal loss expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocalKind {
    /// Independent 0/1 labels per element. The loss is summed.
    Binary,
    /// One-hot labels along the last axis. The loss is summed along that axis and averaged.
    Categorical,
}

impl Default for FocalKind {
    fn default() -> Self {
        Self::Binary
    }
}

/// Focal loss initializer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct FocalLossInit {
    /// The alpha coefficient.
    #[derivative(Default(value = "r64(0.25)"))]
    pub alpha: R64,
    /// The gamma coefficient.
    #[derivative(Default(value = "r64(2.0)"))]
    pub gamma: R64,
    #[derivative(Default(value = "r64(1e-7)"))]
    pub epsilon: R64,
    pub kind: FocalKind,
}

impl FocalLossInit {
    /// Build a focal loss calculator.
    pub fn build(self) -> Result<FocalLoss> {
        let Self {
            alpha,
            gamma,
            epsilon,
            kind,
        } = self;
        ensure!(
            (0.0..=1.0).contains(&alpha.raw()),
            "alpha must be in range [0, 1], but get {}",
            alpha
        );
        ensure!(gamma >= 0.0, "gamma must be non-negative, but get {}", gamma);
        check_epsilon(epsilon.raw())?;

        Ok(FocalLoss {
            alpha: alpha.raw(),
            gamma: gamma.raw(),
            epsilon: epsilon.raw(),
            kind,
        })
    }
}

/// Focal loss calculator.
#[derive(Debug)]
pub struct FocalLoss {
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    kind: FocalKind,
}

impl FocalLoss {
    /// Compute focal loss of predicted probabilities against the ground truth.
    pub fn forward(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        check_shapes(y_true, y_pred)?;
        if y_pred.numel() == 0 {
            return Ok(zero_loss(y_pred.device()));
        }

        let loss = match self.kind {
            FocalKind::Binary => self.binary(y_true, y_pred),
            FocalKind::Categorical => {
                ensure!(
                    y_pred.dim() >= 1,
                    "categorical focal loss needs at least one dimension"
                );
                self.categorical(y_true, y_pred)
            }
        };
        Ok(loss)
    }

    fn binary(&self, y_true: &Tensor, y_pred: &Tensor) -> Tensor {
        let Self {
            alpha,
            gamma,
            epsilon,
            ..
        } = *self;

        // positives see the prediction, the rest see a perfect score of 1 (resp. 0)
        let is_one = y_true.eq(1.0).to_kind(Kind::Float);
        let is_zero = y_true.eq(0.0).to_kind(Kind::Float);
        let pt_1 = (y_pred * &is_one + (1.0 - &is_one)).clamp(epsilon, 1.0 - epsilon);
        let pt_0 = (y_pred * &is_zero).clamp(epsilon, 1.0 - epsilon);

        let pos = (1.0 - &pt_1).pow(&gamma.into()) * pt_1.log() * alpha;
        let neg = pt_0.pow(&gamma.into()) * (1.0 - &pt_0).log() * (1.0 - alpha);
        -pos.sum(Kind::Float) - neg.sum(Kind::Float)
    }

    fn categorical(&self, y_true: &Tensor, y_pred: &Tensor) -> Tensor {
        let Self {
            alpha,
            gamma,
            epsilon,
            ..
        } = *self;

        let y_true = y_true.to_kind(Kind::Float);
        let prob = y_pred.clamp(epsilon, 1.0 - epsilon);
        let cross_entropy = -(&y_true * prob.log());
        let modulating_factor = (1.0 - &prob).pow(&gamma.into()) * alpha;
        (modulating_factor * cross_entropy)
            .sum_dim_intlist(&[-1], false, Kind::Float)
            .mean(Kind::Float)
    }
}
