// ============================================================
// Layer 4   Pair Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<PairSample>
// into device tensors.
//
// Per granularity (word, char) and per side (left, right):
//   tokens: [batch, max_len]  Int    ids padded with [PAD] = 0
//   mask:   [batch, max_len]  Float  1 = real token, 0 = padding
//
// Per granularity:
//   dpool_index: [batch, max_len * max_len]  Int
//     gather indices mapping the match-pyramid grid onto the
//     region covered by real tokens (see data::dpool)
//
// Per batch:
//   labels: [batch]  Float  (unlabeled pairs → 0.0)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::{dataset::PairSample, dpool::dynamic_pooling_index};
use crate::infra::tokenizer_store::PAD_ID;

/// One side of a pair at one granularity.
#[derive(Debug, Clone)]
pub struct SideBatch<B: Backend> {
    pub tokens: Tensor<B, 2, Int>,
    pub mask:   Tensor<B, 2>,
}

/// Both sides of a pair at one granularity, plus the
/// dynamic-pooling indices for their interaction grid.
#[derive(Debug, Clone)]
pub struct GranularityBatch<B: Backend> {
    pub left:        SideBatch<B>,
    pub right:       SideBatch<B>,
    pub dpool_index: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct PairBatch<B: Backend> {
    pub word:      GranularityBatch<B>,
    pub character: GranularityBatch<B>,
    pub labels:    Tensor<B, 1>,
}

#[derive(Clone, Debug)]
pub struct PairBatcher<B: Backend> {
    pub device:   B::Device,
    max_len_word: usize,
    max_len_char: usize,
}

impl<B: Backend> PairBatcher<B> {
    pub fn new(device: B::Device, max_len_word: usize, max_len_char: usize) -> Self {
        Self { device, max_len_word, max_len_char }
    }

    fn side(&self, seqs: &[&[u32]], max_len: usize) -> SideBatch<B> {
        let batch_size = seqs.len();
        let mut ids  = Vec::with_capacity(batch_size * max_len);
        let mut mask = Vec::with_capacity(batch_size * max_len);

        for seq in seqs {
            let len = seq.len().min(max_len);
            ids.extend(seq[..len].iter().map(|&id| id as i64));
            ids.extend(std::iter::repeat(PAD_ID as i64).take(max_len - len));
            mask.extend(std::iter::repeat(1.0f32).take(len));
            mask.extend(std::iter::repeat(0.0f32).take(max_len - len));
        }

        SideBatch {
            tokens: Tensor::from_data(TensorData::new(ids, [batch_size, max_len]), &self.device),
            mask:   Tensor::from_data(TensorData::new(mask, [batch_size, max_len]), &self.device),
        }
    }

    fn granularity(&self, left: &[&[u32]], right: &[&[u32]], max_len: usize) -> GranularityBatch<B> {
        let batch_size = left.len();

        let index: Vec<i64> = left
            .iter()
            .zip(right.iter())
            .flat_map(|(l, r)| dynamic_pooling_index(l.len(), r.len(), max_len, max_len))
            .collect();

        GranularityBatch {
            left:  self.side(left, max_len),
            right: self.side(right, max_len),
            dpool_index: Tensor::from_data(
                TensorData::new(index, [batch_size, max_len * max_len]),
                &self.device,
            ),
        }
    }
}

impl<B: Backend> Batcher<PairSample, PairBatch<B>> for PairBatcher<B> {
    fn batch(&self, items: Vec<PairSample>) -> PairBatch<B> {
        let batch_size = items.len();

        let word_left:  Vec<&[u32]> = items.iter().map(|s| s.word_left.as_slice()).collect();
        let word_right: Vec<&[u32]> = items.iter().map(|s| s.word_right.as_slice()).collect();
        let char_left:  Vec<&[u32]> = items.iter().map(|s| s.char_left.as_slice()).collect();
        let char_right: Vec<&[u32]> = items.iter().map(|s| s.char_right.as_slice()).collect();

        let labels: Vec<f32> = items.iter().map(|s| s.label).collect();

        PairBatch {
            word:      self.granularity(&word_left, &word_right, self.max_len_word),
            character: self.granularity(&char_left, &char_right, self.max_len_char),
            labels:    Tensor::from_data(TensorData::new(labels, [batch_size]), &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(word_left: Vec<u32>, word_right: Vec<u32>, label: f32) -> PairSample {
        PairSample {
            char_left:  word_left.clone(),
            char_right: word_right.clone(),
            word_left,
            word_right,
            label,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = PairBatcher::<TestBackend>::new(Default::default(), 4, 6);
        let batch = batcher.batch(vec![
            sample(vec![5, 6], vec![7], 1.0),
            sample(vec![5, 6, 7, 8, 9], vec![7, 8, 9], 0.0),
        ]);

        assert_eq!(batch.word.left.tokens.dims(), [2, 4]);
        assert_eq!(batch.word.right.mask.dims(), [2, 4]);
        assert_eq!(batch.word.dpool_index.dims(), [2, 16]);
        assert_eq!(batch.character.left.tokens.dims(), [2, 6]);
        assert_eq!(batch.character.dpool_index.dims(), [2, 36]);
        assert_eq!(batch.labels.dims(), [2]);
    }

    #[test]
    fn test_padding_and_mask() {
        let batcher = PairBatcher::<TestBackend>::new(Default::default(), 4, 4);
        let batch = batcher.batch(vec![sample(vec![5, 6], vec![7, 8, 9, 10, 11], 1.0)]);

        let tokens: Vec<i64> = batch.word.left.tokens.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(tokens, vec![5, 6, 0, 0]);

        let mask: Vec<f32> = batch.word.left.mask.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 0.0]);

        // Overlong right side is truncated to max_len
        let right_mask: Vec<f32> = batch.word.right.mask.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(right_mask, vec![1.0; 4]);
    }
}
