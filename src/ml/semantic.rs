// ============================================================
// Layer 5   Semantic Feature Layer
// ============================================================
// Turns a padded token sequence into
//
//   encoded:  [batch, seq_len, enc_dim]  one vector per token,
//                                        zero at padding
//   semantic: [batch, enc_dim]           one vector per text
//
// Pipeline:
//   embedding → dropout → mask → encoder → mask → attend
//
// Encoders:
//   fasttext          the embeddings themselves
//   textcnn           same-padded 1-D conv + relu
//   fasttext_textcnn  both, concatenated on the feature axis
//
// Attend (pooling over tokens, padding excluded):
//   mean | max | min | attention (learned scorer + softmax)
//
// One encoder per granularity is shared by the left and right
// side of a pair, so both texts live in the same space.

use std::str::FromStr;

use burn::{
    module::{Ignored, Param},
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, PaddingConfig1d,
    },
    prelude::*,
    tensor::{
        activation::{relu, softmax},
        TensorData,
    },
};

use crate::infra::embedding_store::EmbeddingMatrix;
use crate::ml::{blocks::glorot_linear, loss::half_squared_norm};

/// Added to scores at padding positions so they never win a max
/// or receive attention weight.
const MASK_PENALTY: f64 = 1e9;

#[derive(Config, Debug, PartialEq, Eq)]
pub enum EncodeMethod {
    FastText,
    TextCnn,
    FastTextCnn,
}

impl FromStr for EncodeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fasttext" => Ok(Self::FastText),
            "textcnn" => Ok(Self::TextCnn),
            "fasttext_textcnn" | "fasttext+textcnn" => Ok(Self::FastTextCnn),
            other => Err(format!(
                "unknown encode method '{other}' (expected fasttext, textcnn or fasttext_textcnn)"
            )),
        }
    }
}

#[derive(Config, Debug, PartialEq, Eq)]
pub enum AttendMethod {
    Mean,
    Max,
    Min,
    Attention,
}

impl FromStr for AttendMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "ave" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "attention" => Ok(Self::Attention),
            other => Err(format!(
                "unknown attend method '{other}' (expected mean, max, min or attention)"
            )),
        }
    }
}

/// Settings for one granularity's encoder.
#[derive(Debug, Clone)]
pub struct SemanticSettings {
    pub vocab_size:          usize,
    pub embedding_dim:       usize,
    pub embedding_dropout:   f64,
    pub embedding_trainable: bool,
    pub encode_method:       EncodeMethod,
    pub cnn_num_filters:     usize,
    pub cnn_filter_size:     usize,
    pub attend_method:       AttendMethod,
}

impl SemanticSettings {
    pub fn output_dim(&self) -> usize {
        match self.encode_method {
            EncodeMethod::FastText => self.embedding_dim,
            EncodeMethod::TextCnn => self.cnn_num_filters,
            EncodeMethod::FastTextCnn => self.embedding_dim + self.cnn_num_filters,
        }
    }

    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&EmbeddingMatrix>,
    ) -> SemanticEncoder<B> {
        let mut embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device);
        if let Some(matrix) = pretrained {
            let weights = Tensor::<B, 2>::from_data(
                TensorData::new(matrix.values.clone(), [matrix.rows, matrix.dim]),
                device,
            );
            embedding.weight = Param::from_tensor(weights);
        }
        if !self.embedding_trainable {
            embedding = embedding.no_grad();
        }

        let conv = match self.encode_method {
            EncodeMethod::FastText => None,
            EncodeMethod::TextCnn | EncodeMethod::FastTextCnn => Some(
                Conv1dConfig::new(self.embedding_dim, self.cnn_num_filters, self.cnn_filter_size)
                    .with_padding(PaddingConfig1d::Same)
                    .init(device),
            ),
        };

        let attention = match self.attend_method {
            AttendMethod::Attention => Some(glorot_linear(self.output_dim(), 1, device)),
            _ => None,
        };

        SemanticEncoder {
            embedding,
            embedding_dropout: DropoutConfig::new(self.embedding_dropout).init(),
            conv,
            keep_embedding: self.encode_method != EncodeMethod::TextCnn,
            attention,
            attend: Ignored(self.attend_method.clone()),
            embedding_trainable: self.embedding_trainable,
        }
    }
}

pub struct SemanticOutput<B: Backend> {
    /// `[batch, enc_dim]`
    pub semantic: Tensor<B, 2>,
    /// `[batch, seq_len, enc_dim]`, zero at padding
    pub encoded:  Tensor<B, 3>,
}

#[derive(Module, Debug)]
pub struct SemanticEncoder<B: Backend> {
    embedding:           Embedding<B>,
    embedding_dropout:   Dropout,
    conv:                Option<Conv1d<B>>,
    keep_embedding:      bool,
    attention:           Option<Linear<B>>,
    attend:              Ignored<AttendMethod>,
    embedding_trainable: bool,
}

impl<B: Backend> SemanticEncoder<B> {
    /// tokens: `[batch, seq_len]`, mask: `[batch, seq_len]` (1 real / 0 pad)
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> SemanticOutput<B> {
        let [batch_size, seq_len] = mask.dims();
        let mask3 = mask.clone().reshape([batch_size, seq_len, 1]);

        // Zero the padding rows so conv windows at the edge of the text
        // see the same input whatever the [PAD] embedding holds
        let emb = self.embedding_dropout.forward(self.embedding.forward(tokens)) * mask3.clone();

        let mut parts = Vec::with_capacity(2);
        if self.keep_embedding {
            parts.push(emb.clone());
        }
        if let Some(conv) = &self.conv {
            // Conv1d works on [batch, channels, length]
            let cnn = relu(conv.forward(emb.swap_dims(1, 2))).swap_dims(1, 2);
            parts.push(cnn);
        }
        let encoded = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Tensor::cat(parts, 2)
        };

        let encoded = encoded * mask3.clone();

        let semantic = self.attend(encoded.clone(), mask, mask3);
        SemanticOutput { semantic, encoded }
    }

    fn attend(&self, encoded: Tensor<B, 3>, mask: Tensor<B, 2>, mask3: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, seq_len, dim] = encoded.dims();
        // 0 at real tokens, -1 at padding
        let pad3 = mask3.sub_scalar(1.0);

        match self.attend.0 {
            AttendMethod::Mean => {
                let counts = mask.sum_dim(1).clamp_min(1.0); // [batch, 1]
                encoded.sum_dim(1).reshape([batch_size, dim]) / counts
            }
            AttendMethod::Max => (encoded + pad3.mul_scalar(MASK_PENALTY))
                .max_dim(1)
                .reshape([batch_size, dim]),
            AttendMethod::Min => (encoded - pad3.mul_scalar(MASK_PENALTY))
                .min_dim(1)
                .reshape([batch_size, dim]),
            AttendMethod::Attention => {
                let scores = match &self.attention {
                    Some(scorer) => scorer.forward(encoded.clone()).reshape([batch_size, seq_len]),
                    None => Tensor::zeros([batch_size, seq_len], &encoded.device()),
                };
                let scores  = scores + mask.sub_scalar(1.0).mul_scalar(MASK_PENALTY);
                let weights = softmax(scores, 1).reshape([batch_size, seq_len, 1]);
                (encoded * weights).sum_dim(1).reshape([batch_size, dim])
            }
        }
    }

    /// L2 term over non-bias trainable weights.
    pub fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        let mut total = Tensor::zeros([1], device);
        if self.embedding_trainable {
            total = total + half_squared_norm(self.embedding.weight.val());
        }
        if let Some(conv) = &self.conv {
            total = total + half_squared_norm(conv.weight.val());
        }
        if let Some(scorer) = &self.attention {
            total = total + half_squared_norm(scorer.weight.val());
        }
        total
    }
}
