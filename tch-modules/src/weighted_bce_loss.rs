use crate::{
    common::*,
    loss::{check_epsilon, check_shapes, zero_loss},
};

/// Binary cross-entropy with separate weights for the two classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct WeightedBceLossInit {
    /// The weight of background pixels.
    #[derivative(Default(value = "r64(1.0)"))]
    pub zero_weight: R64,
    /// The weight of foreground pixels.
    #[derivative(Default(value = "r64(4000.0)"))]
    pub one_weight: R64,
    /// Predictions are clipped into `[epsilon, 1 - epsilon]`.
    #[derivative(Default(value = "r64(1e-7)"))]
    pub epsilon: R64,
}

impl WeightedBceLossInit {
    pub fn build(self) -> Result<WeightedBceLoss> {
        let Self {
            zero_weight,
            one_weight,
            epsilon,
        } = self;
        ensure!(
            zero_weight >= 0.0 && one_weight >= 0.0,
            "class weights must be non-negative"
        );
        check_epsilon(epsilon.raw())?;

        Ok(WeightedBceLoss {
            zero_weight: zero_weight.raw(),
            one_weight: one_weight.raw(),
            epsilon: epsilon.raw(),
        })
    }
}

#[derive(Debug)]
pub struct WeightedBceLoss {
    zero_weight: f64,
    one_weight: f64,
    epsilon: f64,
}

impl WeightedBceLoss {
    /// Mean of the per-element weighted BCE. `y_true` holds 0/1 labels, `y_pred` probabilities.
    pub fn forward(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        check_shapes(y_true, y_pred)?;
        if y_pred.numel() == 0 {
            return Ok(zero_loss(y_pred.device()));
        }

        let Self {
            zero_weight,
            one_weight,
            epsilon,
        } = *self;

        let y_true = y_true.to_kind(Kind::Float);
        let y_pred = y_pred.clamp(epsilon, 1.0 - epsilon);
        let weight = &y_true * one_weight + (1.0 - &y_true) * zero_weight;
        let bce = -(&y_true * y_pred.log() + (1.0 - &y_true) * (1.0 - &y_pred).log());
        Ok((weight * bce).mean(Kind::Float))
    }
}
