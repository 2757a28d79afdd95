// ============================================================
// Layer 1   CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict` and `score`
// and all their configurable flags.
//
// Model hyper-parameters come from an optional --params JSON
// file (a serialised DsmmConfig); the handful of flags below
// override it.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Context;
use burn::config::Config;
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::{
    blocks::FcType,
    model::DsmmConfig,
    semantic::{AttendMethod, EncodeMethod},
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the matcher on a labelled pairs file
    Train(TrainArgs),

    /// Score every pair in a file with a trained checkpoint
    Predict(PredictArgs),

    /// Score a single pair of texts
    Score(ScoreArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Labelled pairs: .jsonl, or TSV `label<TAB>left<TAB>right`
    #[arg(long)]
    pub train_file: String,

    /// Directory to save checkpoints, tokenizers and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// JSON file with model hyper-parameters
    #[arg(long)]
    pub params: Option<String>,

    /// Pretrained word vectors (text format, one token per line)
    #[arg(long)]
    pub word_embedding_file: Option<String>,

    /// Pretrained character vectors
    #[arg(long)]
    pub char_embedding_file: Option<String>,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Share of pairs used for training; the rest is validation
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 50_000)]
    pub word_vocab_size: usize,

    #[arg(long, default_value_t = 2_000)]
    pub char_vocab_size: usize,

    /// Tokens seen fewer times than this map to [UNK]
    #[arg(long, default_value_t = 1)]
    pub min_count: usize,

    /// Decision threshold saved with the checkpoint
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    /// Prior-shift calibration factor saved with the checkpoint
    #[arg(long, default_value_t = 1.0)]
    pub calibration_factor: f32,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// fc | densenet | resnet
    #[arg(long)]
    pub fc_type: Option<FcType>,

    /// fasttext | textcnn | fasttext_textcnn
    #[arg(long)]
    pub encode_method: Option<EncodeMethod>,

    /// mean | max | min | attention
    #[arg(long)]
    pub attend_method: Option<AttendMethod>,

    #[arg(long)]
    pub max_seq_len_word: Option<usize>,

    #[arg(long)]
    pub max_seq_len_char: Option<usize>,

    /// Weight of the L2 penalty; 0 disables it
    #[arg(long)]
    pub l2_lambda: Option<f64>,

    #[arg(long)]
    pub random_seed: Option<u64>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// Fails only when the --params file can't be read.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self, Self::Error> {
        let mut model = match &a.params {
            Some(path) => DsmmConfig::load(path)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("Cannot load model params from '{path}'"))?,
            None => DsmmConfig::new(),
        };

        if let Some(v) = a.fc_type          { model.fc_type = v; }
        if let Some(v) = a.encode_method    { model.encode_method = v; }
        if let Some(v) = a.attend_method    { model.attend_method = v; }
        if let Some(v) = a.max_seq_len_word { model.max_seq_len_word = v; }
        if let Some(v) = a.max_seq_len_char { model.max_seq_len_char = v; }
        if let Some(v) = a.l2_lambda        { model.l2_lambda = v; }
        if let Some(v) = a.random_seed      { model.random_seed = v; }

        Ok(TrainConfig {
            train_file:          a.train_file,
            checkpoint_dir:      a.checkpoint_dir,
            word_embedding_file: a.word_embedding_file,
            char_embedding_file: a.char_embedding_file,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            lr:                  a.lr,
            train_fraction:      a.train_fraction,
            word_vocab_size:     a.word_vocab_size,
            char_vocab_size:     a.char_vocab_size,
            min_count:           a.min_count,
            threshold:           a.threshold,
            calibration_factor:  a.calibration_factor,
            num_workers:         a.num_workers,
            model,
        })
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Pairs to score (.jsonl or TSV); labels, if present, are evaluated
    #[arg(long)]
    pub input_file: String,

    /// Where to write JSONL scores; stdout when omitted
    #[arg(long)]
    pub output_file: Option<String>,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Overrides the threshold saved at training time
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Overrides the calibration factor saved at training time
    #[arg(long)]
    pub calibration_factor: Option<f32>,
}

/// All arguments for the `score` command
#[derive(Args, Debug)]
pub struct ScoreArgs {
    #[arg(long)]
    pub left: String,

    #[arg(long)]
    pub right: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long)]
    pub threshold: Option<f32>,

    #[arg(long)]
    pub calibration_factor: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(extra: &[&str]) -> TrainArgs {
        let mut argv = vec!["dsmm", "train", "--train-file", "pairs.tsv"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_model_defaults() {
        let cfg = TrainConfig::try_from(train_args(&[
            "--fc-type", "resnet",
            "--attend-method", "max",
            "--l2-lambda", "0.01",
            "--epochs", "3",
        ]))
        .unwrap();

        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.model.fc_type, FcType::ResNet);
        assert_eq!(cfg.model.attend_method, AttendMethod::Max);
        assert_eq!(cfg.model.l2_lambda, 0.01);
        assert_eq!(cfg.model.encode_method, EncodeMethod::FastTextCnn);
    }

    #[test]
    fn test_params_file_is_loaded() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        DsmmConfig::new()
            .with_fc_hidden_units(vec![16, 8, 4])
            .with_fc_dropouts(vec![0.1, 0.1, 0.1])
            .save(&path)
            .unwrap();

        let path = path.to_string_lossy().to_string();
        let cfg  = TrainConfig::try_from(train_args(&["--params", &path, "--random-seed", "7"])).unwrap();
        assert_eq!(cfg.model.fc_hidden_units, vec![16, 8, 4]);
        assert_eq!(cfg.model.random_seed, 7);
    }

    #[test]
    fn test_missing_params_file_is_error() {
        assert!(TrainConfig::try_from(train_args(&["--params", "/no/such/params.json"])).is_err());
    }

    #[test]
    fn test_bad_enum_value_is_rejected() {
        let argv = ["dsmm", "train", "--train-file", "x", "--fc-type", "mlp"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
