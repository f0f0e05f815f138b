use super::Rect;
use crate::{common::*, HW};

/// Bounding box in TLBR format, that is `[ymin, xmin, ymax, xmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TLBR<T> {
    pub(crate) t: T,
    pub(crate) l: T,
    pub(crate) b: T,
    pub(crate) r: T,
}

impl<T> TLBR<T>
where
    T: Float,
{
    /// The box enclosing a circle at `(cy, cx)`.
    pub fn try_from_circle(cy: T, cx: T, radius: T) -> Result<Self> {
        ensure!(radius >= T::zero(), "radius must be non-negative");
        Ok(Self {
            t: cy - radius,
            l: cx - radius,
            b: cy + radius,
            r: cx + radius,
        })
    }

    /// Divides vertical coordinates by the height and horizontal ones by the width.
    ///
    /// The output is in ratio units but not clipped.
    pub fn to_ratio(&self, size: &HW<T>) -> Self {
        let h = size.h();
        let w = size.w();
        Self {
            t: self.t / h,
            l: self.l / w,
            b: self.b / h,
            r: self.r / w,
        }
    }

    /// Clamps every coordinate into `[0, 1]` independently.
    pub fn clip_unit(&self) -> Self {
        let clip = |v: T| v.max(T::zero()).min(T::one());
        Self {
            t: clip(self.t),
            l: clip(self.l),
            b: clip(self.b),
            r: clip(self.r),
        }
    }

    pub fn is_within_unit(&self) -> bool {
        let unit = T::zero()..=T::one();
        [self.t, self.l, self.b, self.r]
            .iter()
            .all(|v| unit.contains(v))
    }
}

impl<T> Rect for TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        self.t
    }

    fn l(&self) -> Self::Type {
        self.l
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        ensure!(b >= t && r >= l, "b >= t and r >= l must hold");

        Ok(Self { t, l, b, r })
    }
}
