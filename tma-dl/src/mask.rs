//! Dense binary targets for segmentation training.

use crate::common::*;

/// A per-pixel binary mask in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskRaster {
    size: HW<usize>,
    data: Vec<f32>,
}

impl MaskRaster {
    pub fn zeros(size: &HW<usize>) -> Self {
        Self {
            size: *size,
            data: vec![0.0; size.area()],
        }
    }

    pub fn size(&self) -> HW<usize> {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The value at `(row, col)`, or `None` out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        let [height, width] = self.size.hw();
        (row < height && col < width).then(|| self.data[row * width + col])
    }

    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&value| value > 0.0).count()
    }

    /// A float tensor of shape `[H, W, 1]`.
    pub fn to_tensor(&self) -> Tensor {
        let [height, width] = self.size.hw();
        Tensor::of_slice(&self.data).view([height as i64, width as i64, 1])
    }

    /// Sets every in-bounds pixel within `radius` of the rounded core center.
    pub fn fill_disk(&mut self, core: &Core) {
        let [height, width] = self.size.hw();
        let cy = core.y().round();
        let cx = core.x().round();
        let radius = core.radius();
        let radius_squared = radius * radius;

        let row_min = (cy - radius).floor().max(0.0);
        let row_max = (cy + radius).floor().min(height as f64 - 1.0);
        let col_min = (cx - radius).floor().max(0.0);
        let col_max = (cx + radius).floor().min(width as f64 - 1.0);
        if row_min > row_max || col_min > col_max {
            return;
        }

        for row in (row_min as usize)..=(row_max as usize) {
            let dy = row as f64 - cy;
            for col in (col_min as usize)..=(col_max as usize) {
                let dx = col as f64 - cx;
                if dy * dy + dx * dx <= radius_squared {
                    self.data[row * width + col] = 1.0;
                }
            }
        }
    }
}

/// Draws the filled disk of every core onto an all-zero mask of `size`.
///
/// Centers are rounded to the nearest pixel, halves away from zero. A zero
/// radius marks the center pixel alone. Overlapping disks are merged, so the
/// result does not depend on the order of `cores`.
pub fn rasterize(cores: &[Core], size: &HW<usize>) -> MaskRaster {
    let mut mask = MaskRaster::zeros(size);
    cores.iter().for_each(|core| mask.fill_disk(core));
    mask
}
