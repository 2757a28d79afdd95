// ============================================================
// Layer 5   Inferencer
// ============================================================
// Rebuilds a trained model and scores text pairs:
//
//   train_config.json → DsmmConfig → model skeleton
//   best (else latest) model_epoch_N → weights
//   word/char tokenizers → PairEncoder → PairBatcher
//   forward → sigmoid → calibrate → threshold

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::PairBatcher, encoder::PairEncoder};
use crate::domain::text_pair::{PairScore, TextPair};
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding_store::PretrainedEmbeddings,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{evaluation::calibrate, model::DsmmModel};

pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend> {
    model:          DsmmModel<B>,
    batcher:        PairBatcher<B>,
    word_tokenizer: Tokenizer,
    char_tokenizer: Tokenizer,
    config:         TrainConfig,
}

impl Inferencer<InferBackend> {
    pub fn from_checkpoint(checkpoint_dir: &str) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        Self::load(checkpoint_dir, &device)
    }
}

impl<B: Backend> Inferencer<B> {
    pub fn load(checkpoint_dir: &str, device: &B::Device) -> Result<Self> {
        let ckpt   = CheckpointManager::new(checkpoint_dir);
        let config = ckpt.load_config()?;

        let (word_tokenizer, char_tokenizer) = TokenizerStore::new(checkpoint_dir).load()?;

        // Pretrained vectors are already part of the saved weights
        let model: DsmmModel<B> = config.model.init(device, &PretrainedEmbeddings::default())?;
        let epoch = ckpt.checkpoint_epoch()?;
        let model = ckpt.load_model(model, epoch, device)?;

        let batcher = PairBatcher::new(
            device.clone(),
            config.model.max_seq_len_word,
            config.model.max_seq_len_char,
        );

        tracing::info!("Model loaded from '{}' (epoch {})", checkpoint_dir, epoch);
        Ok(Self { model, batcher, word_tokenizer, char_tokenizer, config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Uncalibrated match probabilities, one per pair.
    pub fn predict_proba(&self, pairs: &[TextPair]) -> Result<Vec<f32>> {
        let encoder = PairEncoder::new(
            &self.word_tokenizer,
            &self.char_tokenizer,
            self.config.model.max_seq_len_word,
            self.config.model.max_seq_len_char,
        );

        let mut out = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.config.batch_size.max(1)) {
            let batch  = self.batcher.batch(encoder.encode_all(chunk)?);
            let output = self.model.forward(&batch.word, &batch.character);
            let probs  = output
                .probabilities
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))?;
            out.extend(probs);
        }

        tracing::debug!("Scored {} pairs", out.len());
        Ok(out)
    }

    /// Calibrated, thresholded scores.
    pub fn score(
        &self,
        pairs:              &[TextPair],
        threshold:          f32,
        calibration_factor: f32,
    ) -> Result<Vec<PairScore>> {
        Ok(self
            .predict_proba(pairs)?
            .into_iter()
            .map(|p| PairScore::new(calibrate(p, calibration_factor), threshold))
            .collect())
    }
}
