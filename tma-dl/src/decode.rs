//! Turns predicted probability maps back into core annotations.

use crate::common::*;

/// Post-processing parameters of a probability map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct DecodeInit {
    /// Pixels with probability at or above the threshold are foreground.
    #[derivative(Default(value = "r64(0.5)"))]
    pub threshold: R64,
    /// The smallest accepted core area in pixels.
    #[derivative(Default(value = "1"))]
    pub min_area: usize,
    /// The largest accepted core area in pixels. Unbounded if unset.
    pub max_area: Option<usize>,
    /// Splits touching cores if set.
    ///
    /// Pixels farther from the background than this ratio of their component's
    /// largest distance become markers. Each marker grows into one core over
    /// the foreground of its component.
    pub dist_transform_ratio: Option<R64>,
}

impl DecodeInit {
    fn validate(&self) -> Result<()> {
        let Self {
            threshold,
            min_area,
            max_area,
            dist_transform_ratio,
        } = *self;
        ensure!(
            (0.0..=1.0).contains(&threshold.raw()),
            "threshold must be in range [0, 1], but get {}",
            threshold
        );
        if let Some(max_area) = max_area {
            ensure!(
                min_area <= max_area,
                "min_area {} exceeds max_area {}",
                min_area,
                max_area
            );
        }
        if let Some(ratio) = dist_transform_ratio {
            ensure!(
                ratio > 0.0 && ratio < 1.0,
                "dist_transform_ratio must be in range (0, 1), but get {}",
                ratio
            );
        }
        Ok(())
    }
}

/// Finds cores in a probability map of shape `[H, W]`, `[H, W, 1]` or `[1, H, W]`.
///
/// Each 8-connected foreground component within the area bounds becomes one
/// core at its pixel centroid, with the radius of a disk of equal area. With
/// `dist_transform_ratio` set, a component holding several markers yields one
/// core per marker instead. Cores are ordered by the first pixel of each
/// component, or of each marker, in row-major order.
pub fn decode_cores(prob: &Tensor, init: &DecodeInit) -> Result<Vec<Core>> {
    init.validate()?;

    let (height, width) = match prob.size().as_slice() {
        &[h, w] | &[h, w, 1] | &[1, h, w] => (h as usize, w as usize),
        shape => bail!(
            "probability map must have shape [H, W], [H, W, 1] or [1, H, W], but get {:?}",
            shape
        ),
    };
    let values = Vec::<f32>::from(
        &prob
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .flatten(0, -1),
    );
    let size = HW::from_hw([height, width]);
    decode_values(&values, &size, init)
}

/// Pixels of one core candidate. `seed` is the row-major first pixel that
/// started the region.
#[derive(Debug)]
struct Region {
    seed: usize,
    pixels: Vec<usize>,
}

fn decode_values(values: &[f32], size: &HW<usize>, init: &DecodeInit) -> Result<Vec<Core>> {
    let width = size.w();
    let threshold = init.threshold.raw() as f32;
    let foreground: Vec<bool> = values.iter().map(|&value| value >= threshold).collect();

    let components = label_components(&foreground, size);
    let mut regions = match init.dist_transform_ratio {
        Some(ratio) => split_by_markers(&foreground, &components, size, ratio.raw()),
        None => components,
    };
    regions.sort_by_key(|region| region.seed);

    let mut cores = vec![];
    for Region { seed, pixels } in regions {
        let area = pixels.len();
        let within_max = init.max_area.map_or(true, |max_area| area <= max_area);
        if area < init.min_area || !within_max {
            debug!("skip region of area {} at pixel {}", area, seed);
            continue;
        }

        let (row_sum, col_sum) = pixels.iter().fold((0.0, 0.0), |(row_sum, col_sum), &index| {
            (row_sum + (index / width) as f64, col_sum + (index % width) as f64)
        });
        let area_f = area as f64;
        let core = Core::try_new(
            col_sum / area_f,
            row_sum / area_f,
            (area_f / PI).sqrt(),
        )?;
        cores.push(core);
    }

    Ok(cores)
}

/// The 8-connected neighbors of a pixel within the frame.
fn neighbors(index: usize, size: &HW<usize>) -> impl Iterator<Item = usize> {
    let [height, width] = size.hw();
    let row = index / width;
    let col = index % width;
    (row.saturating_sub(1)..=(row + 1).min(height - 1))
        .flat_map(move |nrow| {
            (col.saturating_sub(1)..=(col + 1).min(width - 1)).map(move |ncol| nrow * width + ncol)
        })
        .filter(move |&neighbor| neighbor != index)
}

/// Labels 8-connected components of the mask in row-major discovery order.
fn label_components(mask: &[bool], size: &HW<usize>) -> Vec<Region> {
    let mut visited = vec![false; mask.len()];
    let mut stack = vec![];
    let mut regions = vec![];

    for seed in 0..mask.len() {
        if !mask[seed] || visited[seed] {
            continue;
        }

        visited[seed] = true;
        stack.push(seed);
        let mut pixels = vec![];

        while let Some(index) = stack.pop() {
            pixels.push(index);
            for neighbor in neighbors(index, size) {
                if mask[neighbor] && !visited[neighbor] {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }

        regions.push(Region { seed, pixels });
    }

    regions
}

/// Splits components at the markers of the distance transform.
///
/// Every foreground pixel joins the marker it reaches in the fewest
/// 8-connected steps. Ties go to the marker found first.
fn split_by_markers(
    foreground: &[bool],
    components: &[Region],
    size: &HW<usize>,
    ratio: f64,
) -> Vec<Region> {
    let distance = distance_transform(foreground, size);

    // a component always has a marker at its peak
    let mut is_marker = vec![false; foreground.len()];
    for component in components {
        let peak = component
            .pixels
            .iter()
            .map(|&index| distance[index])
            .fold(0.0, f64::max);
        let level = ratio * peak;
        for &index in &component.pixels {
            if distance[index] > level {
                is_marker[index] = true;
            }
        }
    }
    let markers = label_components(&is_marker, size);

    let mut owner: Vec<Option<usize>> = vec![None; foreground.len()];
    let mut queue = VecDeque::new();
    for (label, marker) in markers.iter().enumerate() {
        for &index in &marker.pixels {
            owner[index] = Some(label);
            queue.push_back(index);
        }
    }
    while let Some(index) = queue.pop_front() {
        let label = owner[index];
        for neighbor in neighbors(index, size) {
            if foreground[neighbor] && owner[neighbor].is_none() {
                owner[neighbor] = label;
                queue.push_back(neighbor);
            }
        }
    }

    let mut pixels = vec![vec![]; markers.len()];
    for (index, label) in owner.into_iter().enumerate() {
        if let Some(label) = label {
            pixels[label].push(index);
        }
    }
    markers
        .into_iter()
        .zip(pixels)
        .map(|(marker, pixels)| Region {
            seed: marker.seed,
            pixels,
        })
        .collect()
}

/// The Euclidean distance from each pixel to the nearest background pixel.
///
/// Pixels beyond the frame count as background. Background pixels get zero.
fn distance_transform(foreground: &[bool], size: &HW<usize>) -> Vec<f64> {
    let [height, width] = size.hw();
    let padded_h = height + 2;
    let padded_w = width + 2;
    // exceeds any squared distance within the padded frame
    let far = (padded_h * padded_h + padded_w * padded_w) as f64;

    let mut grid = vec![0.0; padded_h * padded_w];
    for (index, _) in foreground.iter().enumerate().filter(|(_, &fg)| fg) {
        let row = index / width + 1;
        let col = index % width + 1;
        grid[row * padded_w + col] = far;
    }

    let mut column = vec![0.0; padded_h];
    for col in 0..padded_w {
        for row in 0..padded_h {
            column[row] = grid[row * padded_w + col];
        }
        let squared = squared_distance_1d(&column);
        for row in 0..padded_h {
            grid[row * padded_w + col] = squared[row];
        }
    }
    for row in 0..padded_h {
        let line = &mut grid[row * padded_w..(row + 1) * padded_w];
        let squared = squared_distance_1d(line);
        line.copy_from_slice(&squared);
    }

    (0..height * width)
        .map(|index| {
            let row = index / width + 1;
            let col = index % width + 1;
            grid[row * padded_w + col].sqrt()
        })
        .collect()
}

/// Lower envelope of parabolas rooted at each sample, i.e. the 1D squared
/// distance transform of the sampled function.
fn squared_distance_1d(values: &[f64]) -> Vec<f64> {
    let len = values.len();
    let mut output = vec![0.0; len];
    if len == 0 {
        return output;
    }

    let mut vertices = vec![0usize; len];
    let mut bounds = vec![0.0; len + 1];
    let mut k = 0;
    bounds[0] = f64::NEG_INFINITY;
    bounds[1] = f64::INFINITY;

    let intersect = |q: usize, p: usize| {
        let qf = q as f64;
        let pf = p as f64;
        ((values[q] + qf * qf) - (values[p] + pf * pf)) / (2.0 * (qf - pf))
    };

    for q in 1..len {
        let mut s = intersect(q, vertices[k]);
        while s <= bounds[k] {
            k -= 1;
            s = intersect(q, vertices[k]);
        }
        k += 1;
        vertices[k] = q;
        bounds[k] = s;
        bounds[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in output.iter_mut().enumerate() {
        while bounds[k + 1] < q as f64 {
            k += 1;
        }
        let p = vertices[k];
        let diff = q as f64 - p as f64;
        *out = diff * diff + values[p];
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::rasterize;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decode_rasterized_disk() -> Result<()> {
        let size = HW::from_hw([64, 64]);
        let cores = [Core::try_new(20.0, 30.0, 6.0)?];
        let prob = rasterize(&cores, &size).to_tensor();

        let decoded = decode_cores(&prob, &DecodeInit::default())?;
        assert_eq!(decoded.len(), 1);
        let core = &decoded[0];
        assert_abs_diff_eq!(core.x(), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(core.y(), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(core.radius(), 6.0, epsilon = 0.3);
        Ok(())
    }

    #[test]
    fn components_in_scan_order() -> Result<()> {
        let size = HW::from_hw([32, 32]);
        let cores = [
            Core::try_new(25.0, 20.0, 3.0)?,
            Core::try_new(5.0, 5.0, 2.0)?,
            Core::try_new(28.0, 3.0, 0.0)?,
        ];
        let prob = rasterize(&cores, &size).to_tensor().view([1, 32, 32]);
        let decoded = decode_cores(&prob, &DecodeInit::default())?;
        let centers: Vec<_> = decoded.iter().map(|core| (core.x(), core.y())).collect();
        assert_eq!(centers, vec![(5.0, 5.0), (28.0, 3.0), (25.0, 20.0)]);
        Ok(())
    }

    #[test]
    fn diagonal_pixels_are_connected() -> Result<()> {
        let prob = Tensor::of_slice(&[
            1f32, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 0.7,
        ])
        .view([3, 3]);
        let decoded = decode_cores(&prob, &DecodeInit::default())?;
        assert_eq!(decoded.len(), 1);
        assert_abs_diff_eq!(decoded[0].x(), 1.0);
        assert_abs_diff_eq!(decoded[0].y(), 1.0);
        assert_abs_diff_eq!(decoded[0].radius(), (3.0 / PI).sqrt());
        Ok(())
    }

    #[test]
    fn area_filter() -> Result<()> {
        let size = HW::from_hw([40, 40]);
        let cores = [
            Core::try_new(5.0, 5.0, 0.0)?,
            Core::try_new(20.0, 20.0, 3.0)?,
            Core::try_new(10.0, 32.0, 6.0)?,
        ];
        let prob = rasterize(&cores, &size).to_tensor();
        let init = DecodeInit {
            min_area: 2,
            max_area: Some(50),
            ..Default::default()
        };
        let decoded = decode_cores(&prob, &init)?;
        assert_eq!(decoded.len(), 1);
        assert_abs_diff_eq!(decoded[0].x(), 20.0);
        Ok(())
    }

    #[test]
    fn threshold_is_inclusive() -> Result<()> {
        let prob = Tensor::of_slice(&[0.25f32, 0.5, 0.49, 0.0]).view([2, 2]);
        let decoded = decode_cores(&prob, &DecodeInit::default())?;
        assert_eq!(decoded.len(), 1);
        assert_eq!((decoded[0].x(), decoded[0].y()), (1.0, 0.0));
        Ok(())
    }

    #[test]
    fn distance_to_background() {
        let size = HW::from_hw([3, 5]);
        let mut foreground = vec![true; 15];
        foreground[7] = false;
        let distance = distance_transform(&foreground, &size);
        // the frame border is background
        assert_eq!(distance[0], 1.0);
        assert_eq!(distance[7], 0.0);
        assert_eq!(distance[6], 1.0);
        assert_abs_diff_eq!(distance[2], 1.0);

        let size = HW::from_hw([7, 7]);
        let distance = distance_transform(&[true; 49], &size);
        assert_eq!(distance[3 * 7 + 3], 4.0);
        assert_eq!(distance[7 + 1], 2.0);
    }

    #[test]
    fn touching_cores_are_split() -> Result<()> {
        let size = HW::from_hw([32, 32]);
        let cores = [Core::try_new(10.0, 10.0, 5.0)?, Core::try_new(20.0, 10.0, 5.0)?];
        let prob = rasterize(&cores, &size).to_tensor();

        let merged = decode_cores(&prob, &DecodeInit::default())?;
        assert_eq!(merged.len(), 1);
        assert_abs_diff_eq!(merged[0].x(), 15.0, epsilon = 1e-9);

        let init = DecodeInit {
            dist_transform_ratio: Some(r64(0.6)),
            ..Default::default()
        };
        let split = decode_cores(&prob, &init)?;
        assert_eq!(split.len(), 2);
        for (core, expect) in split.iter().zip(&cores) {
            assert_abs_diff_eq!(core.x(), expect.x(), epsilon = 0.1);
            assert_abs_diff_eq!(core.y(), expect.y(), epsilon = 1e-9);
            assert_abs_diff_eq!(core.radius(), 5.0, epsilon = 0.2);
        }
        Ok(())
    }

    #[test]
    fn markers_keep_small_cores() -> Result<()> {
        let size = HW::from_hw([32, 32]);
        let cores = [Core::try_new(8.0, 8.0, 6.0)?, Core::try_new(24.0, 24.0, 1.5)?];
        let prob = rasterize(&cores, &size).to_tensor();
        let init = DecodeInit {
            dist_transform_ratio: Some(r64(0.6)),
            ..Default::default()
        };
        let decoded = decode_cores(&prob, &init)?;
        assert_eq!(decoded.len(), 2);
        assert_abs_diff_eq!(decoded[0].x(), 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded[1].x(), 24.0, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded[1].y(), 24.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn reject_bad_parameters() {
        let prob = Tensor::zeros(&[4, 4], (Kind::Float, Device::Cpu));
        let bad_threshold = DecodeInit {
            threshold: r64(1.5),
            ..Default::default()
        };
        assert!(decode_cores(&prob, &bad_threshold).is_err());

        let bad_area = DecodeInit {
            min_area: 10,
            max_area: Some(5),
            ..Default::default()
        };
        assert!(decode_cores(&prob, &bad_area).is_err());

        for ratio in [0.0, 1.0] {
            let bad_ratio = DecodeInit {
                dist_transform_ratio: Some(r64(ratio)),
                ..Default::default()
            };
            assert!(decode_cores(&prob, &bad_ratio).is_err());
        }

        let bad_shape = Tensor::zeros(&[2, 4, 4], (Kind::Float, Device::Cpu));
        assert!(decode_cores(&bad_shape, &DecodeInit::default()).is_err());
        assert!(decode_cores(&prob, &DecodeInit::default()).unwrap().is_empty());
    }
}
