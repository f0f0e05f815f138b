use crate::{common::*, Core};

/// Maps annotations from the `from` resolution to the `to` resolution.
///
/// Centers scale per axis, `x` by `W1 / W0` and `y` by `H1 / H0`. The radius
/// scales by the horizontal factor only, so a circle stays a circle even when
/// the two factors differ slightly. Output index `i` is input index `i`.
pub fn rescale(cores: &[Core], from: &HW<f64>, to: &HW<f64>) -> Result<Vec<Core>> {
    ensure!(
        from.h().is_finite() && from.w().is_finite() && to.h().is_finite() && to.w().is_finite(),
        "rescale sizes must be finite"
    );
    let transform = Transform::from_sizes_exact(from, to)
        .with_context(|| format!("cannot rescale from {:?} to {:?}", from.hw(), to.hw()))?;
    transform_cores(cores, &transform)
}

/// Applies the transform to every core, keeping the order.
pub fn transform_cores(cores: &[Core], transform: &Transform<f64>) -> Result<Vec<Core>> {
    cores
        .iter()
        .enumerate()
        .map(|(index, core)| {
            core.transform(transform)
                .with_context(|| format!("core at index {} leaves the valid range", index))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn size(h: f64, w: f64) -> HW<f64> {
        HW::from_hw([h, w])
    }

    #[test]
    fn rescale_half() -> Result<()> {
        let cores = [Core::try_new(100.0, 100.0, 10.0)?];
        let output = rescale(&cores, &size(1024.0, 1024.0), &size(512.0, 512.0))?;
        assert_eq!(output, vec![Core::try_new(50.0, 50.0, 5.0)?]);
        Ok(())
    }

    #[test]
    fn rescale_anisotropic_radius_uses_x_scale() -> Result<()> {
        let cores = [Core::try_new(40.0, 30.0, 8.0)?];
        let output = rescale(&cores, &size(100.0, 200.0), &size(50.0, 400.0))?;
        let core = &output[0];
        assert_abs_diff_eq!(core.x(), 80.0);
        assert_abs_diff_eq!(core.y(), 15.0);
        assert_abs_diff_eq!(core.radius(), 16.0);
        Ok(())
    }

    #[test]
    fn rescale_round_trip() -> Result<()> {
        let cores = vec![
            Core::try_new(0.0, 0.0, 0.0)?,
            Core::try_new(13.7, 999.1, 4.2)?,
            Core::try_new(1023.0, 7.5, 31.0)?,
        ];
        let a = size(1024.0, 1024.0);
        let b = size(300.0, 300.0);
        let there = rescale(&cores, &a, &b)?;
        let back = rescale(&there, &b, &a)?;
        assert_eq!(back.len(), cores.len());
        for (orig, back) in cores.iter().zip(&back) {
            assert_abs_diff_eq!(orig.x(), back.x(), epsilon = 1e-9);
            assert_abs_diff_eq!(orig.y(), back.y(), epsilon = 1e-9);
            assert_abs_diff_eq!(orig.radius(), back.radius(), epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn rescale_overflow_is_an_error() -> Result<()> {
        let cores = [Core::try_new(1.0, 1.0, 1.0)?, Core::try_new(1e308, 1.0, 1.0)?];
        let err = rescale(&cores, &size(1.0, 1.0), &size(1.0, 1e10)).unwrap_err();
        assert!(format!("{:#}", err).contains("index 1"));
        Ok(())
    }

    #[test]
    fn rescale_rejects_degenerate_sizes() -> Result<()> {
        let cores = [Core::try_new(1.0, 1.0, 1.0)?];
        assert!(rescale(&cores, &size(0.0, 10.0), &size(5.0, 5.0)).is_err());
        assert!(rescale(&cores, &size(10.0, 10.0), &size(5.0, 0.0)).is_err());
        assert!(rescale(&[], &size(10.0, 10.0), &size(f64::INFINITY, 5.0)).is_err());
        Ok(())
    }
}
