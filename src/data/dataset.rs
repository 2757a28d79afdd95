use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One tokenised pair. Ids are unpadded and each side holds at
/// least one id; the batcher pads to the configured lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSample {
    pub word_left:  Vec<u32>,
    pub word_right: Vec<u32>,
    pub char_left:  Vec<u32>,
    pub char_right: Vec<u32>,
    pub label:      f32,
}

pub struct PairDataset {
    samples: Vec<PairSample>,
}

impl PairDataset {
    pub fn new(samples: Vec<PairSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Fraction of samples labelled as matches.
    pub fn positive_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let positives = self.samples.iter().filter(|s| s.label > 0.5).count();
        positives as f64 / self.samples.len() as f64
    }
}

impl Dataset<PairSample> for PairDataset {
    fn get(&self, index: usize) -> Option<PairSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: f32) -> PairSample {
        PairSample {
            word_left:  vec![2],
            word_right: vec![3],
            char_left:  vec![2],
            char_right: vec![3],
            label,
        }
    }

    #[test]
    fn test_dataset_access() {
        let ds = PairDataset::new(vec![sample(1.0), sample(0.0), sample(0.0), sample(1.0)]);
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.get(0).map(|s| s.label), Some(1.0));
        assert!(ds.get(4).is_none());
        assert!((ds.positive_rate() - 0.5).abs() < 1e-9);
    }
}
