// ============================================================
// Layer 5   Feed-Forward Blocks
// ============================================================
// The three feed-forward transformations the matcher can put
// between its similarity features and the logit:
//
//   fc         stacked dense layers, selu + dropout after each
//   densenet   same layers, but every layer's output is
//              concatenated onto its input
//   resnet     three-layer bottleneck branches with batch norm,
//              summed with a (dense) shortcut
//
// All dense kernels are Glorot-uniform initialised.

use std::str::FromStr;

use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::loss::half_squared_norm;

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

#[derive(Config, Debug, PartialEq, Eq)]
pub enum FcType {
    Fc,
    DenseNet,
    ResNet,
}

impl FromStr for FcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fc" => Ok(Self::Fc),
            "densenet" => Ok(Self::DenseNet),
            "resnet" => Ok(Self::ResNet),
            other => Err(format!("unknown fc type '{other}' (expected fc, densenet or resnet)")),
        }
    }
}

/// Scaled exponential linear unit.
pub fn selu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let positive = x.clone().clamp_min(0.0);
    let negative = x.clamp_max(0.0).exp().sub_scalar(1.0).mul_scalar(SELU_ALPHA);
    (positive + negative).mul_scalar(SELU_SCALE)
}

pub(crate) fn glorot_linear<B: Backend>(d_in: usize, d_out: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(d_in, d_out)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

// ─── Dense / DenseNet ─────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers:   Vec<Linear<B>>,
    dropouts: Vec<Dropout>,
    densenet: bool,
}

impl<B: Backend> DenseBlock<B> {
    pub fn new(
        d_in:         usize,
        hidden_units: &[usize],
        dropouts:     &[f64],
        densenet:     bool,
        device:       &B::Device,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden_units.len());
        let mut width  = d_in;

        for &units in hidden_units {
            layers.push(glorot_linear(width, units, device));
            width = if densenet { width + units } else { units };
        }

        Self {
            layers,
            dropouts: dropouts.iter().map(|&p| DropoutConfig::new(p).init()).collect(),
            densenet,
        }
    }

    pub fn output_dim(d_in: usize, hidden_units: &[usize], densenet: bool) -> usize {
        if densenet {
            d_in + hidden_units.iter().sum::<usize>()
        } else {
            hidden_units.last().copied().unwrap_or(d_in)
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for (layer, dropout) in self.layers.iter().zip(self.dropouts.iter()) {
            let z = dropout.forward(selu(layer.forward(x.clone())));
            x = if self.densenet { Tensor::cat(vec![x, z], 1) } else { z };
        }
        x
    }

    pub fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        self.layers
            .iter()
            .fold(Tensor::zeros([1], device), |acc, l| acc + half_squared_norm(l.weight.val()))
    }
}

/// L2 term for scale and shift; running statistics are not trained.
fn batch_norm_penalty<B: Backend>(norm: &BatchNorm<B, 0>) -> Tensor<B, 1> {
    half_squared_norm(norm.gamma.val()) + half_squared_norm(norm.beta.val())
}

// ─── ResNet ───────────────────────────────────────────────────────────────────

/// dense → BN → relu → dropout → dense → BN → relu → dropout → dense → BN
#[derive(Module, Debug)]
pub struct ResnetBranch<B: Backend> {
    dense1: Linear<B>,
    norm1:  BatchNorm<B, 0>,
    drop1:  Dropout,
    dense2: Linear<B>,
    norm2:  BatchNorm<B, 0>,
    drop2:  Dropout,
    dense3: Linear<B>,
    norm3:  BatchNorm<B, 0>,
}

impl<B: Backend> ResnetBranch<B> {
    fn new(d_in: usize, units: [usize; 3], dropouts: [f64; 2], device: &B::Device) -> Self {
        Self {
            dense1: glorot_linear(d_in, units[0], device),
            norm1:  BatchNormConfig::new(units[0]).init(device),
            drop1:  DropoutConfig::new(dropouts[0]).init(),
            dense2: glorot_linear(units[0], units[1], device),
            norm2:  BatchNormConfig::new(units[1]).init(device),
            drop2:  DropoutConfig::new(dropouts[1]).init(),
            dense3: glorot_linear(units[1], units[2], device),
            norm3:  BatchNormConfig::new(units[2]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let z = self.drop1.forward(relu(self.norm1.forward(self.dense1.forward(x))));
        let z = self.drop2.forward(relu(self.norm2.forward(self.dense2.forward(z))));
        self.norm3.forward(self.dense3.forward(z))
    }

    fn weight_penalty(&self) -> Tensor<B, 1> {
        half_squared_norm(self.dense1.weight.val())
            + half_squared_norm(self.dense2.weight.val())
            + half_squared_norm(self.dense3.weight.val())
            + batch_norm_penalty(&self.norm1)
            + batch_norm_penalty(&self.norm2)
            + batch_norm_penalty(&self.norm3)
    }
}

#[derive(Module, Debug)]
pub struct ResnetBlock<B: Backend> {
    /// `dense → BN` projection onto the branch width; identity when absent
    shortcut:      Option<Linear<B>>,
    shortcut_norm: Option<BatchNorm<B, 0>>,
    branches:      Vec<ResnetBranch<B>>,
    dropout:       Dropout,
}

impl<B: Backend> ResnetBlock<B> {
    /// `hidden_units` and `dropouts` must hold exactly three entries;
    /// without a dense shortcut `d_in` must equal `hidden_units[2]`.
    pub fn new(
        d_in:           usize,
        hidden_units:   [usize; 3],
        dropouts:       [f64; 3],
        cardinality:    usize,
        dense_shortcut: bool,
        device:         &B::Device,
    ) -> Self {
        let (shortcut, shortcut_norm) = if dense_shortcut {
            (
                Some(glorot_linear(d_in, hidden_units[2], device)),
                Some(BatchNormConfig::new(hidden_units[2]).init(device)),
            )
        } else {
            (None, None)
        };

        let branches = (0..cardinality.max(1))
            .map(|_| ResnetBranch::new(d_in, hidden_units, [dropouts[0], dropouts[1]], device))
            .collect();

        Self {
            shortcut,
            shortcut_norm,
            branches,
            dropout: DropoutConfig::new(dropouts[2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut sum = match (&self.shortcut, &self.shortcut_norm) {
            (Some(dense), Some(norm)) => norm.forward(dense.forward(x.clone())),
            _ => x.clone(),
        };
        for branch in &self.branches {
            sum = sum + branch.forward(x.clone());
        }
        self.dropout.forward(relu(sum))
    }

    pub fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        let shortcut = match (&self.shortcut, &self.shortcut_norm) {
            (Some(dense), Some(norm)) => half_squared_norm(dense.weight.val()) + batch_norm_penalty(norm),
            (Some(dense), None) => half_squared_norm(dense.weight.val()),
            _ => Tensor::zeros([1], device),
        };
        self.branches
            .iter()
            .fold(shortcut, |acc, b| acc + b.weight_penalty())
    }
}

// ─── FeedForward ──────────────────────────────────────────────────────────────

/// Whichever block `FcType` selected, with its output width.
#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    dense:      Option<DenseBlock<B>>,
    resnet:     Option<ResnetBlock<B>>,
    output_dim: usize,
}

impl<B: Backend> FeedForward<B> {
    /// Builds the block. Shapes of `hidden_units` / `dropouts` are
    /// checked by `DsmmConfig::validate` before this is called.
    pub fn new(
        fc_type:      &FcType,
        d_in:         usize,
        hidden_units: &[usize],
        dropouts:     &[f64],
        cardinality:  usize,
        device:       &B::Device,
    ) -> Self {
        match fc_type {
            FcType::Fc | FcType::DenseNet => {
                let densenet = *fc_type == FcType::DenseNet;
                Self {
                    dense:      Some(DenseBlock::new(d_in, hidden_units, dropouts, densenet, device)),
                    resnet:     None,
                    output_dim: DenseBlock::<B>::output_dim(d_in, hidden_units, densenet),
                }
            }
            FcType::ResNet => {
                let units = [hidden_units[0], hidden_units[1], hidden_units[2]];
                let drops = [dropouts[0], dropouts[1], dropouts[2]];
                Self {
                    dense:      None,
                    resnet:     Some(ResnetBlock::new(d_in, units, drops, cardinality, true, device)),
                    output_dim: units[2],
                }
            }
        }
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match (&self.dense, &self.resnet) {
            (Some(dense), _) => dense.forward(x),
            (None, Some(resnet)) => resnet.forward(x),
            (None, None) => x,
        }
    }

    pub fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        match (&self.dense, &self.resnet) {
            (Some(dense), _) => dense.weight_penalty(device),
            (None, Some(resnet)) => resnet.weight_penalty(device),
            (None, None) => Tensor::zeros([1], device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_selu_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.0, 2.0], &device);
        let y: Vec<f32> = selu(x).into_data().convert::<f32>().to_vec().unwrap();

        let expected_neg = (SELU_SCALE * SELU_ALPHA * ((-1.0f64).exp() - 1.0)) as f32;
        assert!((y[0] - expected_neg).abs() < 1e-5);
        assert!(y[1].abs() < 1e-6);
        assert!((y[2] - (2.0 * SELU_SCALE) as f32).abs() < 1e-5);
    }

    #[test]
    fn test_fc_output_width() {
        let device = Default::default();
        let ff = FeedForward::<TestBackend>::new(&FcType::Fc, 10, &[8, 4], &[0.0, 0.0], 1, &device);
        let out = ff.forward(Tensor::ones([3, 10], &device));
        assert_eq!(out.dims(), [3, 4]);
        assert_eq!(ff.output_dim(), 4);
    }

    #[test]
    fn test_densenet_concatenates() {
        let device = Default::default();
        let ff = FeedForward::<TestBackend>::new(&FcType::DenseNet, 10, &[8, 4], &[0.0, 0.0], 1, &device);
        let out = ff.forward(Tensor::ones([3, 10], &device));
        assert_eq!(out.dims(), [3, 22]);
        assert_eq!(ff.output_dim(), 22);
    }

    #[test]
    fn test_resnet_output_width() {
        let device = Default::default();
        let ff = FeedForward::<TestBackend>::new(
            &FcType::ResNet, 10, &[16, 8, 6], &[0.0, 0.0, 0.0], 2, &device,
        );
        let out = ff.forward(Tensor::random([4, 10], burn::tensor::Distribution::Default, &device));
        assert_eq!(out.dims(), [4, 6]);
        // Final relu keeps everything non-negative
        let min: f32 = out.min().into_scalar().elem();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_identity_shortcut_requires_matching_width() {
        let device = Default::default();
        let block = ResnetBlock::<TestBackend>::new(6, [12, 8, 6], [0.0; 3], 1, false, &device);
        let out = block.forward(Tensor::ones([2, 6], &device));
        assert_eq!(out.dims(), [2, 6]);
    }

    #[test]
    fn test_fc_type_parsing() {
        assert_eq!("ResNet".parse::<FcType>(), Ok(FcType::ResNet));
        assert_eq!("densenet".parse::<FcType>(), Ok(FcType::DenseNet));
        assert!("mlp".parse::<FcType>().is_err());
    }
}
