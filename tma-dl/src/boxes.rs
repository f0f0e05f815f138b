//! Fixed-size box batches for detection training.

use crate::common::*;

/// Box targets of a batch, padded or truncated to a fixed count per image.
#[derive(Debug)]
pub struct PaddedBoxBatch {
    /// `[N, max_boxes, 4]` float tensor in `[t, l, b, r]` order.
    pub boxes: Tensor,
    /// `[N, max_boxes]` bool tensor. Set for rows holding real boxes.
    pub valid: Tensor,
    /// The number of boxes cut off per image.
    pub num_dropped: Vec<usize>,
}

impl PaddedBoxBatch {
    pub fn total_dropped(&self) -> usize {
        self.num_dropped.iter().sum()
    }
}

/// Packs per-image box lists into a fixed-size batch.
///
/// The first `max_boxes` boxes of each image are kept in order, the rest are
/// dropped and counted. Short lists are filled with `[pad_value; 4]` rows
/// marked invalid.
pub fn pad_boxes<B>(
    boxes_per_image: &[B],
    max_boxes: usize,
    pad_value: f64,
) -> Result<PaddedBoxBatch>
where
    B: Borrow<[TLBR<f64>]>,
{
    ensure!(max_boxes > 0, "max_boxes must be positive");

    let num_images = boxes_per_image.len();
    let mut coords = Vec::with_capacity(num_images * max_boxes * 4);
    let mut valid = Vec::with_capacity(num_images * max_boxes);
    let mut num_dropped = Vec::with_capacity(num_images);

    for (index, boxes) in boxes_per_image.iter().enumerate() {
        let boxes = boxes.borrow();
        let num_kept = boxes.len().min(max_boxes);
        let dropped = boxes.len() - num_kept;
        if dropped > 0 {
            warn!(
                "image {} has {} boxes, dropping {} beyond max_boxes = {}",
                index,
                boxes.len(),
                dropped,
                max_boxes
            );
        }

        boxes[..num_kept].iter().for_each(|bbox| {
            coords.extend(bbox.tlbr().map(|value| value as f32));
            valid.push(true);
        });
        (num_kept..max_boxes).for_each(|_| {
            coords.extend([pad_value as f32; 4]);
            valid.push(false);
        });
        num_dropped.push(dropped);
    }

    let num_images = num_images as i64;
    let max_boxes = max_boxes as i64;
    Ok(PaddedBoxBatch {
        boxes: Tensor::of_slice(&coords).view([num_images, max_boxes, 4]),
        valid: Tensor::of_slice(&valid).view([num_images, max_boxes]),
        num_dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(t: f64, l: f64, b: f64, r: f64) -> TLBR<f64> {
        TLBR::from_tlbr([t, l, b, r])
    }

    #[test]
    fn truncate_keeps_leading_boxes() -> Result<()> {
        let b0 = bbox(0.0, 0.0, 0.1, 0.1);
        let b1 = bbox(0.2, 0.2, 0.3, 0.3);
        let b2 = bbox(0.4, 0.4, 0.5, 0.5);
        let batch = pad_boxes(&[vec![b0, b1, b2]], 2, 0.0)?;

        assert_eq!(batch.boxes.size(), vec![1, 2, 4]);
        assert_eq!(batch.num_dropped, vec![1]);
        let values = Vec::<f32>::from(&batch.boxes.view([-1]));
        assert_eq!(values, vec![0.0, 0.0, 0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
        assert!(bool::from(batch.valid.all()));
        Ok(())
    }

    #[test]
    fn pad_short_lists() -> Result<()> {
        let b0 = bbox(0.1, 0.2, 0.3, 0.4);
        let batch = pad_boxes(&[vec![b0], vec![]], 3, -1.0)?;

        assert_eq!(batch.boxes.size(), vec![2, 3, 4]);
        assert_eq!(batch.valid.size(), vec![2, 3]);
        assert_eq!(batch.total_dropped(), 0);
        assert_eq!(batch.boxes.double_value(&[0, 1, 2]), -1.0);
        assert_eq!(batch.boxes.double_value(&[1, 0, 0]), -1.0);
        assert_eq!(
            Vec::<bool>::from(&batch.valid.view([-1])),
            vec![true, false, false, false, false, false]
        );
        Ok(())
    }

    #[test]
    fn padding_is_deterministic() -> Result<()> {
        let lists = vec![
            vec![bbox(0.0, 0.0, 0.5, 0.5); 4],
            vec![bbox(0.5, 0.5, 1.0, 1.0); 1],
        ];
        let lhs = pad_boxes(&lists, 2, 0.0)?;
        let rhs = pad_boxes(&lists, 2, 0.0)?;
        assert!(lhs.boxes.equal(&rhs.boxes));
        assert!(lhs.valid.equal(&rhs.valid));
        assert_eq!(lhs.num_dropped, vec![2, 0]);
        Ok(())
    }

    #[test]
    fn zero_max_boxes() {
        let lists: Vec<Vec<TLBR<f64>>> = vec![vec![]];
        assert!(pad_boxes(&lists, 0, 0.0).is_err());
    }
}
