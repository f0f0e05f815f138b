use crate::{common::*, Core};

/// Encodes cores as bounding boxes in ratio units of the `size` frame.
///
/// Each coordinate is clamped into `[0, 1]` on its own. Degenerate boxes of
/// cores lying outside the frame are kept, one box per core in input order.
pub fn to_boxes(cores: &[Core], size: &HW<f64>) -> Result<Vec<TLBR<f64>>> {
    ensure!(
        size.is_positive(),
        "image size must be positive to encode boxes"
    );
    cores
        .iter()
        .map(|core| core.to_tlbr().map(|bbox| bbox.to_ratio(size).clip_unit()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn encode_example() -> Result<()> {
        let cores = [Core::try_new(50.0, 50.0, 5.0)?];
        let boxes = to_boxes(&cores, &HW::from_hw([512.0, 512.0]))?;
        let [t, l, b, r] = boxes[0].tlbr();
        assert_abs_diff_eq!(t, 0.0879, epsilon = 1e-4);
        assert_abs_diff_eq!(l, 0.0879, epsilon = 1e-4);
        assert_abs_diff_eq!(b, 0.1074, epsilon = 1e-4);
        assert_abs_diff_eq!(r, 0.1074, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn encode_clips_out_of_frame() -> Result<()> {
        let cores = [
            Core::try_new(-500.0, -500.0, 3.0)?,
            Core::try_new(2000.0, 10.0, 50.0)?,
            Core::try_new(0.0, 0.0, 1e6)?,
        ];
        let boxes = to_boxes(&cores, &HW::from_hw([100.0, 100.0]))?;
        assert_eq!(boxes.len(), 3);
        assert!(boxes.iter().all(|bbox| bbox.is_within_unit()));
        assert_eq!(boxes[0].tlbr(), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(boxes[2].tlbr(), [0.0, 0.0, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn encode_keeps_order() -> Result<()> {
        let size = HW::from_hw([10.0, 20.0]);
        let cores = [Core::try_new(2.0, 5.0, 1.0)?, Core::try_new(18.0, 5.0, 1.0)?];
        let boxes = to_boxes(&cores, &size)?;
        assert!(boxes[0].l() < boxes[1].l());
        assert!(to_boxes(&cores, &HW::from_hw([0.0, 20.0])).is_err());
        Ok(())
    }
}
