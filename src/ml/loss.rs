// ============================================================
// Layer 5   Loss
// ============================================================
// Binary log loss computed straight from logits.
//
//   loss(x, z) = max(x, 0) - x·z + log(1 + e^(-|x|))
//
// which equals -z·log σ(x) - (1-z)·log(1-σ(x)) but never
// evaluates exp() of a large positive number.

use burn::prelude::*;

/// Mean sigmoid cross-entropy. `logits` and `labels` are `[batch]`.
pub fn sigmoid_cross_entropy<B: Backend>(logits: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
    let positive_part = logits.clone().clamp_min(0.0);
    let log_term      = logits.clone().abs().neg().exp().log1p();
    (positive_part - logits * labels + log_term).mean()
}

/// `½ Σ w²`, the L2 term for one parameter tensor.
pub fn half_squared_norm<B: Backend, const D: usize>(weights: Tensor<B, D>) -> Tensor<B, 1> {
    weights.powf_scalar(2.0).sum().mul_scalar(0.5)
}
