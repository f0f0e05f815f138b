use crate::common::*;

/// Detector options, taken from the training configuration.
#[derive(Debug, Clone)]
pub struct DetectorInit {
    pub model: UNetInit,
    /// The model input resolution.
    pub input_size: HW<usize>,
    pub normalization: Normalization,
    pub decode: DecodeInit,
    pub device: Device,
}

impl DetectorInit {
    pub fn from_config(config: &Config, decode: DecodeInit) -> Self {
        Self {
            model: config.model,
            input_size: config.dataset.target_size,
            normalization: config.dataset.normalization,
            decode,
            device: config.training.device,
        }
    }

    /// Builds the model and loads the trained parameters.
    pub fn build(self, checkpoint: &Path) -> Result<Detector> {
        let Self {
            model,
            input_size,
            normalization,
            decode,
            device,
        } = self;

        let mut vs = nn::VarStore::new(device);
        let model = model.build(&vs.root())?;
        info!("load checkpoint file {}", checkpoint.display());
        vs.load(checkpoint)
            .with_context(|| format!("failed to load checkpoint '{}'", checkpoint.display()))?;
        vs.freeze();

        Ok(Detector {
            vs,
            model,
            input_size,
            normalization,
            decode,
        })
    }
}

#[derive(Debug)]
pub struct Detector {
    vs: nn::VarStore,
    model: UNet,
    input_size: HW<usize>,
    normalization: Normalization,
    decode: DecodeInit,
}

impl Detector {
    /// Finds cores in an image file, in pixel units of the file's own resolution.
    pub fn detect_file(&self, path: impl AsRef<Path>) -> Result<Vec<Core>> {
        let image = ImageRaster::load(path, &self.input_size, self.normalization)?;
        let input = image
            .tensor()
            .permute(&[2, 0, 1])
            .unsqueeze(0)
            .to_device(self.vs.device());
        let prob = tch::no_grad(|| self.model.forward_t(&input, false))?;
        decode_resized(&prob.squeeze_dim(0), &image.orig_size(), &self.decode)
    }
}

/// Decodes a `[1, H, W]` probability map and maps the cores to `orig_size`.
pub fn decode_resized(prob: &Tensor, orig_size: &HW<usize>, decode: &DecodeInit) -> Result<Vec<Core>> {
    let size = prob.size();
    ensure!(
        size.len() == 3 && size[0] == 1,
        "expect a [1, H, W] probability map, but get {:?}",
        size
    );
    let prob_size = HW::from_hw([size[1] as f64, size[2] as f64]);
    let resize = Transform::from_sizes_exact(&orig_size.cast(), &prob_size)?;
    let cores = decode_cores(&prob.to_device(Device::Cpu), decode)?;
    label::transform_cores(&cores, &resize.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tch::{vision, Kind};
    use tma_dl::mask::rasterize;

    #[test]
    fn decode_back_to_original_size() -> Result<()> {
        let cores = [Core::try_new(8.0, 12.0, 4.0)?];
        let prob = rasterize(&cores, &HW::from_hw([32, 32]))
            .to_tensor()
            .permute(&[2, 0, 1]);
        let decoded = decode_resized(&prob, &HW::from_hw([64, 128]), &DecodeInit::default())?;

        assert_eq!(decoded.len(), 1);
        assert_abs_diff_eq!(decoded[0].x(), 32.0, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded[0].y(), 24.0, epsilon = 1e-9);
        // radius follows the horizontal scale
        assert_abs_diff_eq!(decoded[0].radius(), 16.0, epsilon = 1.0);
        Ok(())
    }

    #[test]
    fn detect_with_saved_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let model_init = UNetInit {
            num_filters: 2,
            depth: 1,
            ..Default::default()
        };

        let checkpoint = dir.path().join("model.ckpt");
        {
            let vs = nn::VarStore::new(Device::Cpu);
            let _model = model_init.build(&vs.root())?;
            vs.save(&checkpoint)?;
        }

        let input = dir.path().join("slide.png");
        let image = Tensor::full(&[3, 20, 30], 128, (Kind::Uint8, Device::Cpu));
        vision::image::save(&image, &input)?;

        let detector = DetectorInit {
            model: model_init,
            input_size: HW::from_hw([16, 16]),
            normalization: Normalization::ZeroOne,
            decode: DecodeInit::default(),
            device: Device::Cpu,
        }
        .build(&checkpoint)?;
        let cores = detector.detect_file(&input)?;
        assert!(cores.iter().all(|core| core.x() <= 30.0 && core.y() <= 20.0));

        assert!(DetectorInit {
            model: model_init,
            input_size: HW::from_hw([16, 16]),
            normalization: Normalization::ZeroOne,
            decode: DecodeInit::default(),
            device: Device::Cpu,
        }
        .build(&dir.path().join("missing.ckpt"))
        .is_err());
        Ok(())
    }
}
