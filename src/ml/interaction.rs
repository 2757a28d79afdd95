// ============================================================
// Layer 5   Interaction Features
// ============================================================
// Signals computed from the per-token encodings of both sides.
//
// FM interaction:
//   second-order factorisation-machine sum over all tokens of
//   both texts, ½((Σ x)² − Σ x²), one value per feature.
//
// Match pyramid:
//   enc_l [B, L, D] · enc_rᵀ → grid [B, 1, L, L]
//     → conv2d + relu (one or more layers)
//     → dynamic pooling (gather by dpool index)
//     → max pool to [B, F, p, p]
//     → flatten [B, F·p·p]

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::loss::half_squared_norm;

const COSINE_EPS: f64 = 1e-8;

/// `enc_left`, `enc_right`: `[batch, seq_len, dim]` → `[batch, dim]`
pub fn fm_interaction<B: Backend>(enc_left: Tensor<B, 3>, enc_right: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch_size, _, dim] = enc_left.dims();
    let tokens = Tensor::cat(vec![enc_left, enc_right], 1);

    let sum_squared = tokens.clone().sum_dim(1).powf_scalar(2.0);
    let squared_sum = tokens.powf_scalar(2.0).sum_dim(1);

    (sum_squared - squared_sum).mul_scalar(0.5).reshape([batch_size, dim])
}

#[derive(Debug, Clone)]
pub struct PyramidSettings {
    pub max_len:     usize,
    pub num_filters: Vec<usize>,
    pub filter_size: usize,
    pub pool_size:   usize,
    pub cosine:      bool,
}

impl PyramidSettings {
    pub fn output_dim(&self) -> usize {
        self.num_filters.last().copied().unwrap_or(1) * self.pool_size * self.pool_size
    }

    /// `max_len` must be a multiple of `pool_size`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MatchPyramid<B> {
        let mut convs    = Vec::with_capacity(self.num_filters.len());
        let mut channels = 1;
        for &filters in &self.num_filters {
            convs.push(
                Conv2dConfig::new([channels, filters], [self.filter_size, self.filter_size])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            channels = filters;
        }

        let window = self.max_len / self.pool_size.max(1);
        MatchPyramid {
            convs,
            pool: MaxPool2dConfig::new([window, window]).with_strides([window, window]).init(),
            max_len: self.max_len,
            cosine: self.cosine,
        }
    }
}

#[derive(Module, Debug)]
pub struct MatchPyramid<B: Backend> {
    convs:   Vec<Conv2d<B>>,
    pool:    MaxPool2d,
    max_len: usize,
    cosine:  bool,
}

impl<B: Backend> MatchPyramid<B> {
    /// enc_*: `[batch, max_len, dim]`, dpool_index: `[batch, max_len²]`
    pub fn forward(
        &self,
        enc_left:    Tensor<B, 3>,
        enc_right:   Tensor<B, 3>,
        dpool_index: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, seq_len, _] = enc_left.dims();

        let (left, right) = if self.cosine {
            (l2_normalize(enc_left), l2_normalize(enc_right))
        } else {
            (enc_left, enc_right)
        };

        let grid = left.matmul(right.swap_dims(1, 2)).reshape([batch_size, 1, seq_len, seq_len]);

        let mut x = grid;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        let [_, filters, _, _] = x.dims();

        // Stretch the region covered by real tokens over the whole grid
        let cells = self.max_len * self.max_len;
        let index = dpool_index.reshape([batch_size, 1, cells]).repeat_dim(1, filters);
        let x = x
            .reshape([batch_size, filters, cells])
            .gather(2, index)
            .reshape([batch_size, filters, self.max_len, self.max_len]);

        let pooled = self.pool.forward(x);
        let [_, _, p1, p2] = pooled.dims();
        pooled.reshape([batch_size, filters * p1 * p2])
    }

    pub fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        self.convs
            .iter()
            .fold(Tensor::zeros([1], device), |acc, c| acc + half_squared_norm(c.weight.val()))
    }
}

fn l2_normalize<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(2).add_scalar(COSINE_EPS).sqrt();
    x / norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dpool::dynamic_pooling_index;
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray;

    #[test]
    fn test_fm_matches_pairwise_sum() {
        let device = Default::default();
        // one feature, tokens 1, 2 on the left and 3 on the right
        let left  = Tensor::<TestBackend, 3>::from_floats([[[1.0], [2.0]]], &device);
        let right = Tensor::<TestBackend, 3>::from_floats([[[3.0], [0.0]]], &device);

        let fm: Vec<f32> = fm_interaction(left, right).into_data().convert::<f32>().to_vec().unwrap();
        // 1·2 + 1·3 + 2·3
        assert_eq!(fm, vec![11.0]);
    }

    fn settings(cosine: bool) -> PyramidSettings {
        PyramidSettings {
            max_len:     4,
            num_filters: vec![3, 5],
            filter_size: 3,
            pool_size:   2,
            cosine,
        }
    }

    #[test]
    fn test_pyramid_output_shape() {
        let device = Default::default();
        let cfg = settings(false);
        let mp  = cfg.init::<TestBackend>(&device);

        let left  = Tensor::<TestBackend, 3>::ones([2, 4, 6], &device);
        let right = Tensor::<TestBackend, 3>::ones([2, 4, 6], &device);
        let index: Vec<i64> = [(2, 3), (4, 1)]
            .iter()
            .flat_map(|&(l, r)| dynamic_pooling_index(l, r, 4, 4))
            .collect();
        let index = Tensor::from_data(TensorData::new(index, [2, 16]), &device);

        let out = mp.forward(left, right, index);
        assert_eq!(out.dims(), [2, cfg.output_dim()]);
        assert_eq!(cfg.output_dim(), 20);
    }

    #[test]
    fn test_cosine_grid_ignores_scale() {
        let device = Default::default();
        let mp = settings(true).init::<TestBackend>(&device);

        let base  = Tensor::<TestBackend, 3>::random([1, 4, 3], burn::tensor::Distribution::Default, &device);
        let index = Tensor::from_data(TensorData::new(dynamic_pooling_index(4, 4, 4, 4), [1, 16]), &device);

        let small = mp.forward(base.clone(), base.clone(), index.clone());
        let large = mp.forward(base.clone().mul_scalar(50.0), base.mul_scalar(80.0), index);

        let diff: f32 = (small - large).abs().max().into_scalar().elem();
        assert!(diff < 1e-4, "cosine grid changed with input scale: {diff}");
    }
}
