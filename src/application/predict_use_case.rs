// ============================================================
// Layer 2   Predict Use Case
// ============================================================
// Scores pairs with a trained checkpoint:
//
//   Step 1: Rebuild model + tokenizers      (Layer 5 - ml)
//   Step 2: Load pairs                      (Layer 4 - data)
//   Step 3: Score, calibrate, threshold     (Layer 5 - ml)
//   Step 4: Write JSONL, report on labels   (this layer)
//
// Threshold and calibration default to the values saved with
// the checkpoint and can be overridden per call.

use anyhow::{Context, Result};
use burn::prelude::Backend;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::application::train_use_case::{check_decision_rule, TrainConfig};
use crate::data::loader::PairFileLoader;
use crate::domain::{
    text_pair::{PairScore, TextPair},
    traits::{PairScorer, PairSource},
};
use crate::ml::{
    evaluation::ClassificationReport,
    inferencer::{InferBackend, Inferencer},
};

pub struct PredictUseCase<B: Backend = InferBackend> {
    inferencer:         Inferencer<B>,
    threshold:          f32,
    calibration_factor: f32,
}

impl PredictUseCase<InferBackend> {
    pub fn new(
        checkpoint_dir:     &str,
        threshold:          Option<f32>,
        calibration_factor: Option<f32>,
    ) -> Result<Self> {
        let inferencer = Inferencer::from_checkpoint(checkpoint_dir)?;
        Self::with_inferencer(inferencer, threshold, calibration_factor)
    }
}

impl<B: Backend> PredictUseCase<B> {
    pub fn with_inferencer(
        inferencer:         Inferencer<B>,
        threshold:          Option<f32>,
        calibration_factor: Option<f32>,
    ) -> Result<Self> {
        let (threshold, calibration_factor) =
            decision_rule(inferencer.config(), threshold, calibration_factor)?;
        Ok(Self { inferencer, threshold, calibration_factor })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scores every pair in `input`; see [`score_file`].
    pub fn predict_file(&self, input: &str, output: Option<&str>) -> Result<PredictionOutcome> {
        score_file(self, input, output, self.threshold)
    }

    pub fn score_pair(&self, left: &str, right: &str) -> Result<PairScore> {
        let scores = self.score(&[TextPair::new(left, right)])?;
        scores
            .into_iter()
            .next()
            .context("Scorer returned no result")
    }
}

impl<B: Backend> PairScorer for PredictUseCase<B> {
    fn score(&self, pairs: &[TextPair]) -> Result<Vec<PairScore>> {
        self.inferencer.score(pairs, self.threshold, self.calibration_factor)
    }
}

/// Per-call overrides on top of the values saved at training time.
fn decision_rule(
    saved:              &TrainConfig,
    threshold:          Option<f32>,
    calibration_factor: Option<f32>,
) -> Result<(f32, f32)> {
    let threshold          = threshold.unwrap_or(saved.threshold);
    let calibration_factor = calibration_factor.unwrap_or(saved.calibration_factor);
    check_decision_rule(threshold, calibration_factor)?;
    Ok((threshold, calibration_factor))
}

// ─── File scoring ─────────────────────────────────────────────────────────────

/// One JSONL output line.
#[derive(Debug, Serialize)]
struct ScoredPair<'a> {
    left:        &'a str,
    right:       &'a str,
    probability: f32,
    prediction:  bool,
}

#[derive(Debug)]
pub struct PredictionOutcome {
    pub scored: usize,
    /// Present when at least one input pair carried a label
    pub report: Option<ClassificationReport>,
}

/// Loads `input`, scores it with `scorer` and writes one JSON object
/// per pair to `output` (stdout when `None`).
pub fn score_file<S: PairScorer>(
    scorer:    &S,
    input:     &str,
    output:    Option<&str>,
    threshold: f32,
) -> Result<PredictionOutcome> {
    let pairs  = PairFileLoader::new(input).load_all()?;
    let scores = scorer.score(&pairs)?;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(Path::new(path))
                .with_context(|| format!("Cannot create output file '{path}'"))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    for (pair, score) in pairs.iter().zip(&scores) {
        let line = ScoredPair {
            left:        &pair.left,
            right:       &pair.right,
            probability: score.probability,
            prediction:  score.prediction,
        };
        writeln!(writer, "{}", serde_json::to_string(&line)?)?;
    }
    writer.flush()?;

    let (labels, probabilities): (Vec<f32>, Vec<f32>) = pairs
        .iter()
        .zip(&scores)
        .filter_map(|(pair, score)| pair.label.map(|y| (y, score.probability)))
        .unzip();

    let report = if labels.is_empty() {
        None
    } else {
        let report = ClassificationReport::compute(&labels, &probabilities, threshold);
        tracing::info!("Evaluation on {} labelled pairs: {}", labels.len(), report);
        Some(report)
    };

    Ok(PredictionOutcome { scored: scores.len(), report })
}
