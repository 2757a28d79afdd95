// ============================================================
// Layer 5   ML / Model Layer (Burn)
// ============================================================
// Everything that builds or runs tensors lives here. The data
// layer only hands over tensors through the batcher.
//
//   semantic.rs      embedding → encoder → attend, per granularity
//   interaction.rs   FM interaction and the match pyramid
//   blocks.rs        fc / densenet / resnet feed-forward blocks
//   model.rs         DsmmConfig and the full DSMM network
//   loss.rs          stable sigmoid cross-entropy, L2 helper
//   evaluation.rs    logloss, accuracy, AUC, calibration
//   trainer.rs       Adam training loop with validation and
//                    checkpointing
//   inferencer.rs    checkpoint loading and pair scoring
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Pang et al. (2016) Text Matching as Image Recognition

pub mod semantic;

pub mod interaction;

pub mod blocks;

/// The DSMM network and its configuration
pub mod model;

pub mod loss;

pub mod evaluation;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine: loads a checkpoint and scores pairs
pub mod inferencer;
