use crate::common::*;

/// Two 3x3 same-padding convolutions, each followed by an optional batch norm and ReLU.
#[derive(Debug, Clone)]
pub struct ConvBlockInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub batch_norm: bool,
}

impl ConvBlockInit {
    pub fn new(in_c: usize, out_c: usize) -> Self {
        Self {
            in_c,
            out_c,
            k: 3,
            batch_norm: true,
        }
    }

    pub fn build<'p, P>(self, path: P) -> ConvBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            k,
            batch_norm,
        } = self;

        let conv_config = nn::ConvConfig {
            padding: (k / 2) as i64,
            ws_init: nn::Init::KaimingUniform,
            ..Default::default()
        };
        let conv1 = nn::conv2d(path / "conv1", in_c as i64, out_c as i64, k as i64, conv_config);
        let conv2 = nn::conv2d(path / "conv2", out_c as i64, out_c as i64, k as i64, conv_config);
        let (bn1, bn2) = if batch_norm {
            (
                Some(nn::batch_norm2d(path / "bn1", out_c as i64, Default::default())),
                Some(nn::batch_norm2d(path / "bn2", out_c as i64, Default::default())),
            )
        } else {
            (None, None)
        };

        ConvBlock {
            conv1,
            bn1,
            conv2,
            bn2,
        }
    }
}

#[derive(Debug)]
pub struct ConvBlock {
    conv1: nn::Conv2D,
    bn1: Option<nn::BatchNorm>,
    conv2: nn::Conv2D,
    bn2: Option<nn::BatchNorm>,
}

impl nn::ModuleT for ConvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            conv1,
            bn1,
            conv2,
            bn2,
        } = self;

        let stage = |xs: &Tensor, conv: &nn::Conv2D, bn: &Option<nn::BatchNorm>| {
            let xs = xs.apply(conv);
            let xs = match bn {
                Some(bn) => xs.apply_t(bn, train),
                None => xs,
            };
            xs.relu()
        };

        let xs = stage(xs, conv1, bn1);
        stage(&xs, conv2, bn2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_block_keeps_spatial_size() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        for batch_norm in [true, false] {
            let block = ConvBlockInit {
                batch_norm,
                ..ConvBlockInit::new(3, 8)
            }
            .build(&root / format!("block_{}", batch_norm));
            let input = Tensor::rand(&[2, 3, 16, 12], (Kind::Float, Device::Cpu));
            let output = block.forward_t(&input, true);
            assert_eq!(output.size(), vec![2, 8, 16, 12]);
            assert!(bool::from(output.ge(0.0).all()));
        }
    }
}
