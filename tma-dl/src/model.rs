//! The U-Net segmentation model.

use crate::common::*;
use tch_modules::{ConvBlock, ConvBlockInit};

/// U-Net initializer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct UNetInit {
    #[derivative(Default(value = "3"))]
    pub input_channels: usize,
    /// Filters of the first level. Level `i` has `num_filters * 2^i` filters.
    #[derivative(Default(value = "32"))]
    pub num_filters: usize,
    /// The number of down-sampling levels.
    #[derivative(Default(value = "3"))]
    pub depth: usize,
    /// Dropout probability after each pooling. Zero disables dropout.
    #[derivative(Default(value = "r64(0.5)"))]
    pub dropout: R64,
    #[derivative(Default(value = "true"))]
    pub batch_norm: bool,
}

impl UNetInit {
    pub fn build<'p, P>(self, path: P) -> Result<UNet>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            input_channels,
            num_filters,
            depth,
            dropout,
            batch_norm,
        } = self;

        ensure!(input_channels > 0, "input_channels must be positive");
        ensure!(num_filters > 0, "num_filters must be positive");
        ensure!(
            (0.0..1.0).contains(&dropout.raw()),
            "dropout must be in range [0, 1), but get {}",
            dropout
        );
        ensure!(
            depth < 16,
            "depth {} is too large for any input size",
            depth
        );

        let filters = |level: usize| num_filters << level;
        let block = |name: String, in_c: usize, out_c: usize| {
            ConvBlockInit {
                batch_norm,
                ..ConvBlockInit::new(in_c, out_c)
            }
            .build(path / name)
        };

        let down: Vec<_> = (0..depth)
            .map(|level| {
                let in_c = if level == 0 {
                    input_channels
                } else {
                    filters(level - 1)
                };
                block(format!("down_{}", level), in_c, filters(level))
            })
            .collect();
        let bottleneck_in_c = match depth {
            0 => input_channels,
            _ => filters(depth - 1),
        };
        let bottleneck = block("bottleneck".into(), bottleneck_in_c, filters(depth));
        let up: Vec<_> = (0..depth)
            .map(|level| {
                let in_c = filters(level + 1) + filters(level);
                block(format!("up_{}", level), in_c, filters(level))
            })
            .collect();
        let head = nn::conv2d(
            path / "head",
            filters(0) as i64,
            1,
            1,
            Default::default(),
        );

        Ok(UNet {
            input_channels,
            depth,
            dropout: dropout.raw(),
            down,
            bottleneck,
            up,
            head,
        })
    }
}

#[derive(Debug)]
pub struct UNet {
    input_channels: usize,
    depth: usize,
    dropout: f64,
    down: Vec<ConvBlock>,
    bottleneck: ConvBlock,
    /// Indexed by level, applied from the deepest level up.
    up: Vec<ConvBlock>,
    head: nn::Conv2D,
}

impl UNet {
    /// The side lengths of an input must be multiples of this value.
    pub fn size_multiple(&self) -> usize {
        1 << self.depth
    }

    /// Maps `[N, C, H, W]` images to `[N, 1, H, W]` foreground probabilities.
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            input_channels,
            dropout,
            ref down,
            ref bottleneck,
            ref up,
            ref head,
            ..
        } = *self;

        let (_, channels, height, width) = input.size4()?;
        ensure!(
            channels == input_channels as i64,
            "expect {} input channels, but get {}",
            input_channels,
            channels
        );
        let multiple = self.size_multiple() as i64;
        ensure!(
            height > 0 && width > 0 && height % multiple == 0 && width % multiple == 0,
            "input size {}x{} is not a positive multiple of {}",
            height,
            width,
            multiple
        );

        let mut skips = Vec::with_capacity(down.len());
        let mut xs = input.shallow_clone();
        for block in down {
            let skip = block.forward_t(&xs, train);
            xs = skip.max_pool2d(&[2, 2], &[2, 2], &[0, 0], &[1, 1], false);
            if dropout > 0.0 {
                xs = xs.dropout(dropout, train);
            }
            skips.push(skip);
        }

        xs = bottleneck.forward_t(&xs, train);

        for (block, skip) in up.iter().zip(&skips).rev() {
            let (_, _, skip_h, skip_w) = skip.size4()?;
            let upsampled = xs.upsample_nearest2d(&[skip_h, skip_w], None, None);
            xs = block.forward_t(&Tensor::cat(&[&upsampled, skip], 1), train);
        }

        Ok(xs.apply(head).sigmoid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_init() -> UNetInit {
        UNetInit {
            num_filters: 4,
            depth: 2,
            ..Default::default()
        }
    }

    #[test]
    fn unet_output_shape() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = small_init().build(&vs.root())?;

        let input = Tensor::rand(&[2, 3, 16, 24], (Kind::Float, Device::Cpu));
        let output = model.forward_t(&input, true)?;
        assert_eq!(output.size(), vec![2, 1, 16, 24]);
        assert!(bool::from(output.ge(0.0).logical_and(&output.le(1.0)).all()));

        let output = tch::no_grad(|| model.forward_t(&input, false))?;
        assert_eq!(output.size(), vec![2, 1, 16, 24]);
        Ok(())
    }

    #[test]
    fn unet_rejects_bad_inputs() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = small_init().build(&vs.root())?;

        let indivisible = Tensor::rand(&[1, 3, 18, 16], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&indivisible, false).is_err());
        let wrong_channels = Tensor::rand(&[1, 1, 16, 16], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&wrong_channels, false).is_err());
        let not_4d = Tensor::rand(&[3, 16, 16], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&not_4d, false).is_err());
        Ok(())
    }

    #[test]
    fn unet_without_batch_norm_or_dropout() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = UNetInit {
            batch_norm: false,
            dropout: r64(0.0),
            ..small_init()
        }
        .build(&vs.root())?;
        let input = Tensor::rand(&[1, 3, 8, 8], (Kind::Float, Device::Cpu));
        let lhs = model.forward_t(&input, true)?;
        let rhs = model.forward_t(&input, true)?;
        assert!(lhs.allclose(&rhs, 1e-6, 1e-6, false));
        Ok(())
    }

    #[test]
    fn unet_config() -> Result<()> {
        let init: UNetInit = serde_json::from_str(r#"{"depth": 4}"#)?;
        assert_eq!(init.depth, 4);
        assert_eq!(init.num_filters, 32);
        assert_eq!(init.dropout, r64(0.5));
        assert!(init.batch_norm);
        assert!(UNetInit {
            dropout: r64(1.0),
            ..init
        }
        .build(&nn::VarStore::new(Device::Cpu).root())
        .is_err());
        Ok(())
    }
}
