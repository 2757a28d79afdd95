// ============================================================
// Layer 5   DSMM Model
// ============================================================
//   for granularity in [word, char]:
//     sem_l, enc_l = SemanticEncoder(left)
//     sem_r, enc_r = SemanticEncoder(right)      (shared weights)
//     features     = [product | abs_diff | fm | pyramid | deep]
//                    (whichever signals are enabled)
//
//   x      = concat(word features, char features)
//   x      = FeedForward(x)                      fc | densenet | resnet
//   logits = Linear(x, 1)                        [batch]
//   proba  = sigmoid(logits)
//
//   loss   = mean sigmoid cross-entropy
//          + l2_lambda · Σ ½‖W‖²                 (when l2_lambda > 0)

use anyhow::{bail, ensure, Result};
use burn::{
    nn::Linear,
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::data::batcher::{GranularityBatch, PairBatch};
use crate::infra::embedding_store::{EmbeddingMatrix, PretrainedEmbeddings};
use crate::ml::{
    blocks::{glorot_linear, FcType, FeedForward},
    interaction::{fm_interaction, MatchPyramid, PyramidSettings},
    loss::{half_squared_norm, sigmoid_cross_entropy},
    semantic::{AttendMethod, EncodeMethod, SemanticEncoder, SemanticSettings},
};

/// Which similarity signals each granularity contributes.
#[derive(Config, Debug)]
pub struct SignalConfig {
    /// sem_l ⊙ sem_r
    #[config(default = true)]
    pub product:  bool,
    /// FM interaction over both token encodings
    #[config(default = true)]
    pub fm:       bool,
    /// match pyramid over the token interaction grid
    #[config(default = true)]
    pub pyramid:  bool,
    /// |sem_l − sem_r|
    #[config(default = false)]
    pub abs_diff: bool,
    /// feed-forward over [sem_l, sem_r]
    #[config(default = false)]
    pub deep:     bool,
}

impl SignalConfig {
    pub fn any(&self) -> bool {
        self.product || self.fm || self.pyramid || self.abs_diff || self.deep
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct DsmmConfig {
    /// Set from the word tokenizer before `init`.
    #[config(default = 0)]
    pub word_vocab_size:     usize,
    /// Set from the char tokenizer before `init`.
    #[config(default = 0)]
    pub char_vocab_size:     usize,
    #[config(default = 20)]
    pub max_seq_len_word:    usize,
    #[config(default = 40)]
    pub max_seq_len_char:    usize,

    #[config(default = 100)]
    pub word_embedding_dim:  usize,
    #[config(default = 32)]
    pub char_embedding_dim:  usize,
    #[config(default = 0.2)]
    pub embedding_dropout:   f64,
    #[config(default = true)]
    pub embedding_trainable: bool,

    #[config(default = "EncodeMethod::FastTextCnn")]
    pub encode_method:       EncodeMethod,
    #[config(default = "AttendMethod::Attention")]
    pub attend_method:       AttendMethod,
    #[config(default = 32)]
    pub cnn_num_filters:     usize,
    #[config(default = 3)]
    pub cnn_filter_size:     usize,

    #[config(default = "vec![8]")]
    pub mp_num_filters:      Vec<usize>,
    #[config(default = 3)]
    pub mp_filter_size:      usize,
    #[config(default = 4)]
    pub mp_pool_size_word:   usize,
    #[config(default = 8)]
    pub mp_pool_size_char:   usize,
    #[config(default = false)]
    pub mp_cosine:           bool,

    #[config(default = "FcType::Fc")]
    pub fc_type:             FcType,
    #[config(default = "vec![64, 32]")]
    pub fc_hidden_units:     Vec<usize>,
    #[config(default = "vec![0.2, 0.2]")]
    pub fc_dropouts:         Vec<f64>,
    #[config(default = 1)]
    pub resnet_cardinality:  usize,

    #[config(default = 0.0)]
    pub l2_lambda:           f64,
    #[config(default = 2018)]
    pub random_seed:         u64,

    #[config(default = "SignalConfig::new()")]
    pub signals:             SignalConfig,
}

impl DsmmConfig {
    /// Rejects hyper-parameter combinations the model cannot be built from.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.word_vocab_size > 0 && self.char_vocab_size > 0,
            "vocab sizes must be set (word={}, char={})",
            self.word_vocab_size,
            self.char_vocab_size,
        );
        ensure!(
            self.max_seq_len_word > 0 && self.max_seq_len_char > 0,
            "max sequence lengths must be positive",
        );
        ensure!(
            self.word_embedding_dim > 0 && self.char_embedding_dim > 0,
            "embedding dims must be positive",
        );
        ensure!(self.signals.any(), "at least one similarity signal must be enabled");

        ensure!(!self.fc_hidden_units.is_empty(), "fc_hidden_units is empty");
        ensure!(
            self.fc_hidden_units.len() == self.fc_dropouts.len(),
            "fc_hidden_units has {} entries but fc_dropouts has {}",
            self.fc_hidden_units.len(),
            self.fc_dropouts.len(),
        );
        ensure!(
            self.fc_hidden_units.iter().all(|&u| u > 0),
            "fc_hidden_units must all be positive",
        );
        for &p in self.fc_dropouts.iter().chain(std::iter::once(&self.embedding_dropout)) {
            ensure!((0.0..1.0).contains(&p), "dropout rate {p} outside [0, 1)");
        }
        if self.fc_type == FcType::ResNet && self.fc_hidden_units.len() != 3 {
            bail!(
                "resnet needs exactly 3 hidden units, got {}",
                self.fc_hidden_units.len()
            );
        }

        if self.encode_method != EncodeMethod::FastText {
            ensure!(self.cnn_num_filters > 0, "cnn_num_filters must be positive");
            ensure!(
                self.cnn_filter_size % 2 == 1,
                "cnn_filter_size must be odd, got {}",
                self.cnn_filter_size
            );
        }

        if self.signals.pyramid {
            ensure!(!self.mp_num_filters.is_empty(), "mp_num_filters is empty");
            ensure!(
                self.mp_num_filters.iter().all(|&f| f > 0),
                "mp_num_filters must all be positive",
            );
            ensure!(
                self.mp_filter_size % 2 == 1,
                "mp_filter_size must be odd, got {}",
                self.mp_filter_size
            );
            for (name, len, pool) in [
                ("word", self.max_seq_len_word, self.mp_pool_size_word),
                ("char", self.max_seq_len_char, self.mp_pool_size_char),
            ] {
                ensure!(
                    pool > 0 && len % pool == 0,
                    "{name} max length {len} is not divisible by pool size {pool}",
                );
            }
        }
        Ok(())
    }

    fn semantic(&self, vocab_size: usize, embedding_dim: usize) -> SemanticSettings {
        SemanticSettings {
            vocab_size,
            embedding_dim,
            embedding_dropout:   self.embedding_dropout,
            embedding_trainable: self.embedding_trainable,
            encode_method:       self.encode_method.clone(),
            cnn_num_filters:     self.cnn_num_filters,
            cnn_filter_size:     self.cnn_filter_size,
            attend_method:       self.attend_method.clone(),
        }
    }

    fn pyramid(&self, max_len: usize, pool_size: usize) -> PyramidSettings {
        PyramidSettings {
            max_len,
            num_filters: self.mp_num_filters.clone(),
            filter_size: self.mp_filter_size,
            pool_size,
            cosine:      self.mp_cosine,
        }
    }

    /// Validates, seeds the backend and builds the model.
    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: &PretrainedEmbeddings,
    ) -> Result<DsmmModel<B>> {
        self.validate()?;
        check_pretrained("word", pretrained.word.as_ref(), self.word_vocab_size, self.word_embedding_dim)?;
        check_pretrained("char", pretrained.character.as_ref(), self.char_vocab_size, self.char_embedding_dim)?;

        B::seed(self.random_seed);

        let word = self.granularity(
            self.semantic(self.word_vocab_size, self.word_embedding_dim),
            self.pyramid(self.max_seq_len_word, self.mp_pool_size_word),
            pretrained.word.as_ref(),
            device,
        );
        let character = self.granularity(
            self.semantic(self.char_vocab_size, self.char_embedding_dim),
            self.pyramid(self.max_seq_len_char, self.mp_pool_size_char),
            pretrained.character.as_ref(),
            device,
        );

        let head = FeedForward::new(
            &self.fc_type,
            word.output_dim + character.output_dim,
            &self.fc_hidden_units,
            &self.fc_dropouts,
            self.resnet_cardinality,
            device,
        );
        let logits = glorot_linear(head.output_dim(), 1, device);

        Ok(DsmmModel { word, character, head, logits, l2_lambda: self.l2_lambda })
    }

    fn granularity<B: Backend>(
        &self,
        semantic:   SemanticSettings,
        pyramid:    PyramidSettings,
        pretrained: Option<&EmbeddingMatrix>,
        device:     &B::Device,
    ) -> GranularityNetwork<B> {
        let sem_dim = semantic.output_dim();
        let signals = &self.signals;

        let deep = signals.deep.then(|| {
            FeedForward::new(
                &self.fc_type,
                2 * sem_dim,
                &self.fc_hidden_units,
                &self.fc_dropouts,
                self.resnet_cardinality,
                device,
            )
        });

        let mut output_dim = 0;
        if signals.product  { output_dim += sem_dim; }
        if signals.abs_diff { output_dim += sem_dim; }
        if signals.fm       { output_dim += sem_dim; }
        if signals.pyramid  { output_dim += pyramid.output_dim(); }
        if let Some(ff) = &deep { output_dim += ff.output_dim(); }

        GranularityNetwork {
            encoder:  semantic.init(device, pretrained),
            pyramid:  signals.pyramid.then(|| pyramid.init(device)),
            deep,
            product:  signals.product,
            abs_diff: signals.abs_diff,
            fm:       signals.fm,
            output_dim,
        }
    }
}

fn check_pretrained(
    name:     &str,
    matrix:   Option<&EmbeddingMatrix>,
    vocab:    usize,
    dim:      usize,
) -> Result<()> {
    if let Some(m) = matrix {
        ensure!(
            m.rows == vocab && m.dim == dim,
            "{name} embedding matrix is {}x{}, model expects {vocab}x{dim}",
            m.rows,
            m.dim,
        );
    }
    Ok(())
}

// ─── Granularity network ──────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct GranularityNetwork<B: Backend> {
    encoder:    SemanticEncoder<B>,
    pyramid:    Option<MatchPyramid<B>>,
    deep:       Option<FeedForward<B>>,
    product:    bool,
    abs_diff:   bool,
    fm:         bool,
    output_dim: usize,
}

impl<B: Backend> GranularityNetwork<B> {
    /// → `[batch, output_dim]`
    pub fn forward(&self, batch: &GranularityBatch<B>) -> Tensor<B, 2> {
        let left  = self.encoder.forward(batch.left.tokens.clone(), batch.left.mask.clone());
        let right = self.encoder.forward(batch.right.tokens.clone(), batch.right.mask.clone());

        let mut features = Vec::with_capacity(5);
        if self.product {
            features.push(left.semantic.clone() * right.semantic.clone());
        }
        if self.abs_diff {
            features.push((left.semantic.clone() - right.semantic.clone()).abs());
        }
        if self.fm {
            features.push(fm_interaction(left.encoded.clone(), right.encoded.clone()));
        }
        if let Some(pyramid) = &self.pyramid {
            features.push(pyramid.forward(
                left.encoded.clone(),
                right.encoded.clone(),
                batch.dpool_index.clone(),
            ));
        }
        if let Some(deep) = &self.deep {
            features.push(deep.forward(Tensor::cat(vec![left.semantic, right.semantic], 1)));
        }

        Tensor::cat(features, 1)
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn weight_penalty(&self, device: &B::Device) -> Tensor<B, 1> {
        let mut total = self.encoder.weight_penalty(device);
        if let Some(pyramid) = &self.pyramid {
            total = total + pyramid.weight_penalty(device);
        }
        if let Some(deep) = &self.deep {
            total = total + deep.weight_penalty(device);
        }
        total
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct DsmmModel<B: Backend> {
    pub word:      GranularityNetwork<B>,
    pub character: GranularityNetwork<B>,
    pub head:      FeedForward<B>,
    pub logits:    Linear<B>,
    pub l2_lambda: f64,
}

pub struct DsmmOutput<B: Backend> {
    /// `[batch]`
    pub logits:        Tensor<B, 1>,
    /// `[batch]`, sigmoid of the logits
    pub probabilities: Tensor<B, 1>,
}

impl<B: Backend> DsmmModel<B> {
    pub fn forward(&self, word: &GranularityBatch<B>, character: &GranularityBatch<B>) -> DsmmOutput<B> {
        let features = Tensor::cat(
            vec![self.word.forward(word), self.character.forward(character)],
            1,
        );
        let [batch_size, _] = features.dims();

        let hidden = self.head.forward(features);
        let logits = self.logits.forward(hidden).reshape([batch_size]);
        let probabilities = sigmoid(logits.clone());

        DsmmOutput { logits, probabilities }
    }

    /// Mean sigmoid cross-entropy, plus the L2 term when `l2_lambda > 0`.
    pub fn forward_loss(&self, batch: &PairBatch<B>) -> (Tensor<B, 1>, DsmmOutput<B>) {
        let output = self.forward(&batch.word, &batch.character);
        let mut loss = sigmoid_cross_entropy(output.logits.clone(), batch.labels.clone());
        if self.l2_lambda > 0.0 {
            loss = loss + self.weight_penalty().mul_scalar(self.l2_lambda);
        }
        (loss, output)
    }

    /// `Σ ½‖W‖²` over dense, conv and attention kernels, trainable
    /// embeddings and batch-norm scale/shift. Biases are excluded.
    pub fn weight_penalty(&self) -> Tensor<B, 1> {
        let device = self.logits.weight.val().device();
        self.word.weight_penalty(&device)
            + self.character.weight_penalty(&device)
            + self.head.weight_penalty(&device)
            + half_squared_norm(self.logits.weight.val())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::PairBatcher, dataset::PairSample};
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::batcher::Batcher,
        module::{ModuleVisitor, ParamId},
    };

    type TestBackend = NdArray;
    type TrainBackend = Autodiff<NdArray>;

    /// `½‖t‖²` over every trainable tensor of rank two or more: kernels
    /// and unfrozen embedding tables, no bias or norm vector.
    struct KernelNorm {
        total: f64,
    }

    impl<B: Backend> ModuleVisitor<B> for KernelNorm {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
            if D >= 2 && tensor.is_require_grad() {
                let squared: f64 = tensor.clone().powf_scalar(2.0).sum().into_scalar().elem();
                self.total += 0.5 * squared;
            }
        }
    }

    fn kernel_norm(model: &DsmmModel<TrainBackend>) -> f64 {
        let mut visitor = KernelNorm { total: 0.0 };
        model.visit(&mut visitor);
        visitor.total
    }

    fn tiny_config() -> DsmmConfig {
        DsmmConfig::new()
            .with_word_vocab_size(30)
            .with_char_vocab_size(20)
            .with_max_seq_len_word(4)
            .with_max_seq_len_char(6)
            .with_word_embedding_dim(8)
            .with_char_embedding_dim(4)
            .with_cnn_num_filters(4)
            .with_mp_num_filters(vec![2])
            .with_mp_pool_size_word(2)
            .with_mp_pool_size_char(3)
            .with_fc_hidden_units(vec![8, 4])
            .with_fc_dropouts(vec![0.0, 0.0])
            .with_embedding_dropout(0.0)
    }

    fn batch(cfg: &DsmmConfig) -> PairBatch<TestBackend> {
        let batcher = PairBatcher::<TestBackend>::new(Default::default(), cfg.max_seq_len_word, cfg.max_seq_len_char);
        batcher.batch(vec![
            PairSample {
                word_left:  vec![2, 3, 4],
                word_right: vec![2, 5],
                char_left:  vec![6, 7, 8, 9],
                char_right: vec![6, 7],
                label:      1.0,
            },
            PairSample {
                word_left:  vec![10],
                word_right: vec![11, 12, 13, 14, 15],
                char_left:  vec![2],
                char_right: vec![3, 4, 5],
                label:      0.0,
            },
        ])
    }

    #[test]
    fn test_forward_shapes_and_probabilities() {
        let cfg   = tiny_config();
        let model = cfg.init::<TestBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();
        let out   = model.forward(&batch(&cfg).word, &batch(&cfg).character);

        assert_eq!(out.logits.dims(), [2]);
        let probs: Vec<f32> = out.probabilities.into_data().convert::<f32>().to_vec().unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_every_fc_type_builds() {
        for (fc_type, units) in [
            (FcType::Fc, vec![8, 4]),
            (FcType::DenseNet, vec![8, 4]),
            (FcType::ResNet, vec![8, 6, 4]),
        ] {
            let drops = vec![0.0; units.len()];
            let cfg = tiny_config()
                .with_fc_type(fc_type)
                .with_fc_hidden_units(units)
                .with_fc_dropouts(drops);
            let model = cfg.init::<TestBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();
            let (loss, _) = model.forward_loss(&batch(&cfg));
            let loss: f32 = loss.into_scalar().elem();
            assert!(loss.is_finite() && loss > 0.0);
        }
    }

    #[test]
    fn test_optional_signals_change_width() {
        let plain = tiny_config();
        let extra = tiny_config().with_signals(SignalConfig::new().with_abs_diff(true).with_deep(true));

        let a = plain.init::<TestBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();
        let b = extra.init::<TestBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();
        // fasttext+textcnn → 12 dims; deep adds the last hidden width (4)
        assert_eq!(b.word.output_dim(), a.word.output_dim() + 12 + 4);

        let (loss, _) = b.forward_loss(&batch(&extra));
        let loss: f32 = loss.into_scalar().elem();
        assert!(loss.is_finite());
    }

    #[test]
    fn test_l2_penalty_is_added_to_loss() {
        let cfg   = tiny_config().with_l2_lambda(0.1);
        let model = cfg.init::<TestBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();
        let batch = batch(&cfg);

        let (loss, output) = model.forward_loss(&batch);
        let ce: f32      = sigmoid_cross_entropy(output.logits, batch.labels).into_scalar().elem();
        let penalty: f32 = model.weight_penalty().into_scalar().elem();
        let loss: f32    = loss.into_scalar().elem();

        assert!(penalty > 0.0);
        assert!((loss - ce - 0.1 * penalty).abs() < 1e-3 * penalty.max(1.0));
    }

    #[test]
    fn test_weight_penalty_covers_every_kernel() {
        for trainable in [true, false] {
            let cfg = tiny_config()
                .with_attend_method(AttendMethod::Attention)
                .with_embedding_trainable(trainable)
                .with_signals(SignalConfig::new().with_deep(true));
            let model = cfg.init::<TrainBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();

            let penalty: f64 = model.weight_penalty().into_scalar().elem();
            let expected = kernel_norm(&model);
            assert!(
                (penalty - expected).abs() < 1e-3 * expected.max(1.0),
                "trainable={trainable}: {penalty} vs {expected}"
            );
        }
    }

    #[test]
    fn test_weight_penalty_includes_batch_norm_scale_and_shift() {
        let cfg = tiny_config()
            .with_fc_type(FcType::ResNet)
            .with_fc_hidden_units(vec![8, 6, 4])
            .with_fc_dropouts(vec![0.0; 3])
            .with_resnet_cardinality(2);
        let model = cfg.init::<TrainBackend>(&Default::default(), &PretrainedEmbeddings::default()).unwrap();

        let penalty: f64 = model.weight_penalty().into_scalar().elem();
        let kernels = kernel_norm(&model);

        // Fresh batch norms have gamma = 1 and beta = 0. Two branches of
        // 8 + 6 + 4 features plus a 4-wide shortcut norm: 40 gammas.
        let norms = 0.5 * 40.0;
        assert!(
            (penalty - kernels - norms).abs() < 1e-3 * penalty,
            "{penalty} vs {kernels} + {norms}"
        );
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(DsmmConfig::new().validate().is_err(), "vocab sizes unset");
        assert!(tiny_config().validate().is_ok());

        let cases = [
            tiny_config().with_fc_dropouts(vec![0.1]),
            tiny_config().with_fc_hidden_units(vec![]).with_fc_dropouts(vec![]),
            tiny_config().with_fc_type(FcType::ResNet),
            tiny_config().with_mp_pool_size_word(3),
            tiny_config().with_mp_filter_size(4),
            tiny_config().with_cnn_filter_size(2),
            tiny_config().with_signals(
                SignalConfig::new().with_product(false).with_fm(false).with_pyramid(false),
            ),
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn test_pretrained_shape_mismatch_is_error() {
        let cfg = tiny_config();
        let pretrained = PretrainedEmbeddings {
            word: Some(EmbeddingMatrix { values: vec![0.0; 30 * 5], rows: 30, dim: 5, hits: 0 }),
            character: None,
        };
        assert!(cfg.init::<TestBackend>(&Default::default(), &pretrained).is_err());
    }
}
