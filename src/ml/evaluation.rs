// ============================================================
// Layer 5   Evaluation
// ============================================================
// Plain-Rust metrics over collected probabilities. No tensors:
// the trainer and the predict command both hand over Vec<f32>.

/// Probabilities are clipped to [EPS, 1 - EPS] before taking logs.
const LOGLOSS_EPS: f64 = 1e-15;

/// Mean binary log loss. Returns 0.0 for empty input.
pub fn logloss(labels: &[f32], probabilities: &[f32]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = (p as f64).clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
            let y = y as f64;
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// Fraction of pairs where `p >= threshold` agrees with `label > 0.5`.
pub fn accuracy(labels: &[f32], probabilities: &[f32], threshold: f32) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(probabilities)
        .filter(|(&y, &p)| (p >= threshold) == (y > 0.5))
        .count();
    correct as f64 / labels.len() as f64
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
/// Tied scores get their average rank. NaN when either class is absent.
pub fn roc_auc(labels: &[f32], probabilities: &[f32]) -> f64 {
    let n = labels.len().min(probabilities.len());
    let positives = labels[..n].iter().filter(|&&y| y > 0.5).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && probabilities[order[j + 1]] == probabilities[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = (0..n).filter(|&k| labels[k] > 0.5).map(|k| ranks[k]).sum();
    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}

/// Rescales a probability for a shifted class prior:
/// `c·p / (c·p + 1 − p)`. A factor of 1.0 leaves `p` unchanged.
pub fn calibrate(probability: f32, factor: f32) -> f32 {
    if factor == 1.0 {
        return probability;
    }
    let scaled = factor * probability;
    let denom  = scaled + 1.0 - probability;
    if denom <= 0.0 {
        probability
    } else {
        scaled / denom
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub samples:  usize,
    pub logloss:  f64,
    pub accuracy: f64,
    pub auc:      f64,
}

impl ClassificationReport {
    pub fn compute(labels: &[f32], probabilities: &[f32], threshold: f32) -> Self {
        Self {
            samples:  labels.len(),
            logloss:  logloss(labels, probabilities),
            accuracy: accuracy(labels, probabilities, threshold),
            auc:      roc_auc(labels, probabilities),
        }
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "samples={} logloss={:.4} accuracy={:.4} auc={:.4}",
            self.samples, self.logloss, self.accuracy, self.auc
        )
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logloss_perfect_and_uniform() {
        assert!(logloss(&[1.0, 0.0], &[1.0, 0.0]) < 1e-10);
        let uniform = logloss(&[1.0, 0.0], &[0.5, 0.5]);
        assert!((uniform - std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn test_logloss_clips_confident_mistakes() {
        let loss = logloss(&[1.0], &[0.0]);
        assert!(loss.is_finite());
        assert!((loss - 34.538_776).abs() < 1e-3);
    }

    #[test]
    fn test_accuracy_threshold_inclusive() {
        let acc = accuracy(&[1.0, 0.0, 1.0, 0.0], &[0.5, 0.49, 0.2, 0.9], 0.5);
        assert_eq!(acc, 0.5);
    }

    #[test]
    fn test_auc_perfect_inverted_and_ties() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), 0.0);
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]), 0.5);
        // one positive tied with one negative
        assert_eq!(roc_auc(&[0.0, 1.0, 0.0], &[0.3, 0.3, 0.1]), 0.75);
    }

    #[test]
    fn test_auc_single_class_is_nan() {
        assert!(roc_auc(&[1.0, 1.0], &[0.2, 0.7]).is_nan());
        assert!(roc_auc(&[], &[]).is_nan());
    }

    #[test]
    fn test_calibrate() {
        assert_eq!(calibrate(0.3, 1.0), 0.3);
        assert!((calibrate(0.5, 0.5) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(calibrate(0.0, 2.0), 0.0);
        assert_eq!(calibrate(1.0, 2.0), 1.0);
        assert!(calibrate(0.4, 2.0) > 0.4);
    }

    #[test]
    fn test_report() {
        let report = ClassificationReport::compute(&[1.0, 0.0], &[0.9, 0.1], 0.5);
        assert_eq!(report.samples, 2);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.auc, 1.0);
    }
}
