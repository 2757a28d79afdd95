// ============================================================
// Layer 2   TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load labelled pairs            (Layer 4 - data)
//   Step 2: Split train/validation         (Layer 4 - data)
//   Step 3: Build word/char tokenizers     (Layer 6 - infra)
//   Step 4: Load pretrained embeddings     (Layer 6 - infra)
//   Step 5: Encode pairs into samples      (Layer 4 - data)
//   Step 6: Save config                    (Layer 6 - infra)
//   Step 7: Run training loop              (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::PairDataset,
    encoder::PairEncoder,
    loader::PairFileLoader,
    splitter::split_train_val,
};
use crate::domain::traits::PairSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding_store::{EmbeddingStore, PretrainedEmbeddings},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    model::DsmmConfig,
    trainer::{run_training, TrainingSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run needs. Saved next to the checkpoints so scoring
// rebuilds the same model and reuses the same threshold/calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_file:          String,
    pub checkpoint_dir:      String,
    #[serde(default)]
    pub word_embedding_file: Option<String>,
    #[serde(default)]
    pub char_embedding_file: Option<String>,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub lr:                  f64,
    /// Share of labelled pairs used for training; the rest validates.
    pub train_fraction:      f64,
    /// Vocabulary caps, [PAD] and [UNK] included
    pub word_vocab_size:     usize,
    pub char_vocab_size:     usize,
    pub min_count:           usize,
    /// Probability at or above which a pair counts as a match
    pub threshold:           f32,
    /// 1.0 leaves probabilities untouched
    pub calibration_factor:  f32,
    pub num_workers:         usize,
    pub model:               DsmmConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file:          "data/train.tsv".to_string(),
            checkpoint_dir:      "checkpoints".to_string(),
            word_embedding_file: None,
            char_embedding_file: None,
            batch_size:          32,
            epochs:              10,
            lr:                  1e-3,
            train_fraction:      0.8,
            word_vocab_size:     50_000,
            char_vocab_size:     2_000,
            min_count:           1,
            threshold:           0.5,
            calibration_factor:  1.0,
            num_workers:         1,
            model:               DsmmConfig::new(),
        }
    }
}

impl TrainConfig {
    /// Checks the run-level settings. Model hyper-parameters are
    /// validated by `DsmmConfig::init` once vocab sizes are known.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.lr > 0.0, "learning rate must be positive");
        ensure!(
            self.train_fraction > 0.0 && self.train_fraction <= 1.0,
            "train_fraction {} outside (0, 1]",
            self.train_fraction
        );
        check_decision_rule(self.threshold, self.calibration_factor)?;
        ensure!(self.num_workers > 0, "num_workers must be positive");
        Ok(())
    }
}

/// Range checks shared by training and by scoring-time overrides.
pub fn check_decision_rule(threshold: f32, calibration_factor: f32) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold {threshold} outside [0, 1]"
    );
    ensure!(
        calibration_factor.is_finite() && calibration_factor > 0.0,
        "calibration_factor must be positive, got {calibration_factor}"
    );
    Ok(())
}

/// Datasets and embeddings ready for the training loop, plus the
/// config with vocab sizes filled in.
pub struct PreparedData {
    pub config:     TrainConfig,
    pub train:      PairDataset,
    pub valid:      PairDataset,
    pub pretrained: PretrainedEmbeddings,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingSummary> {
        let prepared = self.prepare()?;

        let ckpt_manager = CheckpointManager::new(prepared.config.checkpoint_dir.clone());
        ckpt_manager.save_config(&prepared.config)?;

        run_training(
            &prepared.config,
            prepared.train,
            prepared.valid,
            &prepared.pretrained,
            &ckpt_manager,
        )
    }

    /// Steps 1–5: everything up to the training loop.
    pub fn prepare(&self) -> Result<PreparedData> {
        let mut cfg = self.config.clone();
        cfg.validate()?;

        // ── Step 1: Load labelled pairs ───────────────────────────────────────
        tracing::info!("Loading pairs from '{}'", cfg.train_file);
        let pairs = PairFileLoader::new(&cfg.train_file).load_all()?;
        let total = pairs.len();
        let pairs: Vec<_> = pairs.into_iter().filter(|p| p.is_labelled()).collect();
        if pairs.len() < total {
            tracing::warn!("Skipped {} unlabeled pairs", total - pairs.len());
        }
        ensure!(!pairs.is_empty(), "'{}' contains no labelled pairs", cfg.train_file);

        // ── Step 2: Train / validation split ──────────────────────────────────
        let (train_pairs, val_pairs) =
            split_train_val(pairs, cfg.train_fraction, cfg.model.random_seed);
        ensure!(!train_pairs.is_empty(), "training split is empty");
        tracing::info!("Split: {} train, {} validation", train_pairs.len(), val_pairs.len());

        // ── Step 3: Build tokenizers from the training texts ──────────────────
        let texts: Vec<String> = train_pairs
            .iter()
            .flat_map(|p| [p.left.clone(), p.right.clone()])
            .collect();
        let (word_tok, char_tok) = TokenizerStore::new(cfg.checkpoint_dir.clone()).build(
            &texts,
            cfg.word_vocab_size,
            cfg.char_vocab_size,
            cfg.min_count,
        )?;
        cfg.model = cfg
            .model
            .clone()
            .with_word_vocab_size(word_tok.get_vocab_size(true))
            .with_char_vocab_size(char_tok.get_vocab_size(true));

        // ── Step 4: Pretrained embeddings (optional) ──────────────────────────
        let seed = cfg.model.random_seed;
        let pretrained = PretrainedEmbeddings {
            word: match &cfg.word_embedding_file {
                Some(path) => Some(EmbeddingStore::new(path).load(
                    &word_tok.get_vocab(true),
                    cfg.model.word_embedding_dim,
                    seed,
                )?),
                None => None,
            },
            character: match &cfg.char_embedding_file {
                Some(path) => Some(EmbeddingStore::new(path).load(
                    &char_tok.get_vocab(true),
                    cfg.model.char_embedding_dim,
                    seed,
                )?),
                None => None,
            },
        };

        // ── Step 5: Encode ────────────────────────────────────────────────────
        let encoder = PairEncoder::new(
            &word_tok,
            &char_tok,
            cfg.model.max_seq_len_word,
            cfg.model.max_seq_len_char,
        );
        let train = PairDataset::new(encoder.encode_all(&train_pairs)?);
        let valid = PairDataset::new(encoder.encode_all(&val_pairs)?);
        tracing::info!(
            "Encoded {} training samples ({:.1}% positive)",
            train.sample_count(),
            train.positive_rate() * 100.0
        );

        Ok(PreparedData { config: cfg, train, valid, pretrained })
    }
}
