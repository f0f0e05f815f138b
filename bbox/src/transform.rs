use crate::{common::*, HW};

/// Axis-aligned scale and offset, applied as `v * s + t` per axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Maps the `src_size` frame onto the `tgt_size` frame, stretching each axis.
    ///
    /// Both sizes must have positive height and width.
    pub fn from_sizes_exact(src_size: &HW<T>, tgt_size: &HW<T>) -> Result<Self> {
        ensure!(
            src_size.is_positive(),
            "source size must have positive height and width"
        );
        ensure!(
            tgt_size.is_positive(),
            "target size must have positive height and width"
        );
        Ok(Self {
            sy: tgt_size.h() / src_size.h(),
            sx: tgt_size.w() / src_size.w(),
            ty: T::zero(),
            tx: T::zero(),
        })
    }

    /// Transforms a point given in `(y, x)` order.
    pub fn apply_yx(&self, y: T, x: T) -> (T, T) {
        (y * self.sy + self.ty, x * self.sx + self.tx)
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + Neg<Output = T>,
{
    pub fn inverse(&self) -> Self {
        let sy = T::one() / self.sy;
        let sx = T::one() / self.sx;
        let ty = -self.ty / self.sy;
        let tx = -self.tx / self.sx;

        Self { sy, sx, ty, tx }
    }
}
