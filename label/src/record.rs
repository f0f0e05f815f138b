use crate::common::*;

/// An annotation as stored in the per-image JSON file.
///
/// The radius is absent in older annotation files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreRecord {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

/// An annotation with a resolved, non-negative radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Core {
    x: f64,
    y: f64,
    radius: f64,
}

impl Core {
    pub fn try_new(x: f64, y: f64, radius: f64) -> Result<Self> {
        ensure!(
            x.is_finite() && y.is_finite(),
            "core center must be finite, but get ({}, {})",
            x,
            y
        );
        ensure!(
            radius.is_finite() && radius >= 0.0,
            "core radius must be finite and non-negative, but get {}",
            radius
        );
        Ok(Self { x, y, radius })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// The box enclosing the core circle, in pixel units.
    pub fn to_tlbr(&self) -> Result<TLBR<f64>> {
        TLBR::try_from_circle(self.y, self.x, self.radius)
    }

    pub fn to_record(&self) -> CoreRecord {
        CoreRecord {
            x: self.x,
            y: self.y,
            radius: Some(self.radius),
        }
    }

    /// Moves the center with the transform. The radius follows the horizontal scale only.
    ///
    /// Fails if the result is not a valid core, e.g. when the coordinates overflow.
    pub fn transform(&self, transform: &Transform<f64>) -> Result<Self> {
        let (y, x) = transform.apply_yx(self.y, self.x);
        Self::try_new(x, y, self.radius * transform.sx)
    }
}
