//! Train/validation index splits.

use crate::common::*;

/// Training and validation indices of one split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffles `0..n` with a seeded RNG and moves `val_ratio` of it to validation.
pub fn holdout(n: usize, val_ratio: f64, seed: u64) -> Result<Fold> {
    ensure!(
        val_ratio > 0.0 && val_ratio < 1.0,
        "validation ratio must be in range (0, 1), but get {}",
        val_ratio
    );
    let num_val = (n as f64 * val_ratio).round() as usize;
    ensure!(
        num_val > 0 && num_val < n,
        "cannot split {} samples with validation ratio {}",
        n,
        val_ratio
    );

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<_> = (0..n).collect();
    indices.shuffle(&mut rng);
    let train = indices.split_off(num_val);

    Ok(Fold {
        train,
        validation: indices,
    })
}

/// K-fold cross validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub k: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl KFold {
    /// Partitions `0..n` into `k` folds whose sizes differ by at most one.
    pub fn split(&self, n: usize) -> Result<Vec<Fold>> {
        let Self { k, shuffle, seed } = *self;
        ensure!(k >= 2, "k must be at least 2, but get {}", k);
        ensure!(k <= n, "k = {} exceeds the number of samples {}", k, n);

        let mut indices: Vec<_> = (0..n).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        // the first n % k folds take one extra sample
        let base = n / k;
        let extra = n % k;
        let bounds: Vec<_> = (0..k)
            .scan(0, |start, fold| {
                let len = base + (fold < extra) as usize;
                let range = *start..(*start + len);
                *start += len;
                Some(range)
            })
            .collect();

        let folds = bounds
            .into_iter()
            .map(|range| {
                let validation = indices[range.clone()].to_vec();
                let train = indices[..range.start]
                    .iter()
                    .chain(&indices[range.end..])
                    .cloned()
                    .collect();
                Fold { train, validation }
            })
            .collect();
        Ok(folds)
    }
}
