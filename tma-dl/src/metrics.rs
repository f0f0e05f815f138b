use crate::common::*;

/// Area under the ROC curve of `scores` against binary `labels`.
///
/// Computed from the Mann-Whitney statistic with tied scores sharing their
/// average rank. Returns `None` when either class is absent. Scores are
/// ranked by their total order, so NaN ranks above every number.
pub fn roc_auc(scores: &[f32], labels: &[bool]) -> Option<f64> {
    if scores.len() != labels.len() {
        return None;
    }
    let num_pos = labels.iter().filter(|&&label| label).count();
    let num_neg = labels.len() - num_pos;
    if num_pos == 0 || num_neg == 0 {
        return None;
    }

    let order: Vec<usize> = (0..scores.len())
        .sorted_by(|&lhs, &rhs| scores[lhs].total_cmp(&scores[rhs]))
        .collect();

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let score = scores[order[start]];
        let end = start
            + order[start..]
                .iter()
                .take_while(|&&index| scores[index].total_cmp(&score).is_eq())
                .count();
        // ranks are 1-based
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let num_pos_in_tie = order[start..end]
            .iter()
            .filter(|&&index| labels[index])
            .count();
        pos_rank_sum += avg_rank * num_pos_in_tie as f64;
        start = end;
    }

    let num_pos = num_pos as f64;
    let num_neg = num_neg as f64;
    let u = pos_rank_sum - num_pos * (num_pos + 1.0) / 2.0;
    Some(u / (num_pos * num_neg))
}

/// Pixel-wise ROC-AUC of a predicted probability map against a binary mask.
pub fn pixel_roc_auc(prob: &Tensor, mask: &Tensor) -> Option<f64> {
    let flatten = |tensor: &Tensor| {
        Vec::<f32>::from(&tensor.to_kind(Kind::Float).to_device(Device::Cpu).flatten(0, -1))
    };
    let scores = flatten(prob);
    let labels: Vec<bool> = flatten(mask).into_iter().map(|value| value > 0.5).collect();
    roc_auc(&scores, &labels)
}
