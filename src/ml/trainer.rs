// ============================================================
// Layer 5   Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and Adam.
//
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend with
//     dropout and batch-norm switched to inference mode
//   - the validation batcher therefore uses B::InnerBackend
//
// After every epoch:
//   metrics.csv          gets one row
//   model_epoch_N        is checkpointed
//   best_epoch.json      moves when the monitored loss improves
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::PairBatcher, dataset::PairDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding_store::PretrainedEmbeddings,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{evaluation::ClassificationReport, model::DsmmModel};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub best_epoch: usize,
    pub best_loss:  f64,
    pub last:       Option<EpochMetrics>,
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: PairDataset,
    val_dataset:   PairDataset,
    pretrained:    &PretrainedEmbeddings,
    ckpt_manager:  &CheckpointManager,
) -> Result<TrainingSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, train_dataset, val_dataset, pretrained, ckpt_manager, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: PairDataset,
    val_dataset:   PairDataset,
    pretrained:    &PretrainedEmbeddings,
    ckpt_manager:  &CheckpointManager,
    device:        B::Device,
) -> Result<TrainingSummary> {
    let model_cfg = &cfg.model;

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: DsmmModel<B> = model_cfg.init(&device, pretrained)?;
    tracing::info!(
        "Model ready: {} params, fc_type={:?}, hidden={:?}",
        model.num_params(),
        model_cfg.fc_type,
        model_cfg.fc_hidden_units,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    let metrics = MetricsLogger::new(ckpt_manager.dir().to_string_lossy().to_string())?;

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = PairBatcher::<B>::new(
        device.clone(),
        model_cfg.max_seq_len_word,
        model_cfg.max_seq_len_char,
    );
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(model_cfg.random_seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend, no autodiff overhead) ───────────
    let has_validation = val_dataset.sample_count() > 0;
    let val_batcher = PairBatcher::<B::InnerBackend>::new(
        device.clone(),
        model_cfg.max_seq_len_word,
        model_cfg.max_seq_len_char,
    );
    let val_loader = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let mut summary = TrainingSummary { best_epoch: 0, best_loss: f64::INFINITY, last: None };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(&batch);

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let (val_logloss, val_accuracy, val_auc) = if has_validation {
            let model_valid = model.valid();
            let mut labels        = Vec::new();
            let mut probabilities = Vec::new();

            for batch in val_loader.iter() {
                let output = model_valid.forward(&batch.word, &batch.character);
                probabilities.extend(to_vec(output.probabilities)?);
                labels.extend(to_vec(batch.labels)?);
            }

            let report = ClassificationReport::compute(&labels, &probabilities, cfg.threshold);
            (report.logloss, report.accuracy, report.auc)
        } else {
            (f64::NAN, f64::NAN, f64::NAN)
        };

        let row = EpochMetrics::new(epoch, avg_train_loss, val_logloss, val_accuracy, val_auc);

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_logloss={:.4} | val_acc={:.1}% | val_auc={:.4}",
            epoch, cfg.epochs, avg_train_loss, val_logloss, val_accuracy * 100.0, val_auc,
        );

        metrics.log(&row)?;
        ckpt_manager.save_model(&model, epoch)?;

        if row.is_improvement(summary.best_loss) {
            summary.best_loss  = row.monitored_loss();
            summary.best_epoch = epoch;
            ckpt_manager.save_best_epoch(epoch)?;
            tracing::info!("New best epoch {} (loss={:.4})", epoch, summary.best_loss);
        }
        summary.last = Some(row);
    }

    tracing::info!(
        "Training complete! Best epoch {} with loss {:.4}",
        summary.best_epoch,
        summary.best_loss
    );
    Ok(summary)
}

fn to_vec<B: Backend>(t: Tensor<B, 1>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::PairSample;
    use crate::ml::model::DsmmConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn samples(n: usize) -> Vec<PairSample> {
        (0..n)
            .map(|i| {
                let same = i % 2 == 0;
                let left: Vec<u32> = vec![2 + (i % 5) as u32, 3];
                let right = if same { left.clone() } else { vec![9, 10, 11] };
                PairSample {
                    char_left:  left.clone(),
                    char_right: right.clone(),
                    word_left:  left,
                    word_right: right,
                    label:      if same { 1.0 } else { 0.0 },
                }
            })
            .collect()
    }

    fn config(dir: &tempfile::TempDir) -> TrainConfig {
        let model = DsmmConfig::new()
            .with_word_vocab_size(16)
            .with_char_vocab_size(16)
            .with_max_seq_len_word(4)
            .with_max_seq_len_char(4)
            .with_word_embedding_dim(4)
            .with_char_embedding_dim(4)
            .with_cnn_num_filters(2)
            .with_mp_num_filters(vec![2])
            .with_mp_pool_size_word(2)
            .with_mp_pool_size_char(2)
            .with_fc_hidden_units(vec![4])
            .with_fc_dropouts(vec![0.0]);
        TrainConfig {
            checkpoint_dir: dir.path().to_string_lossy().to_string(),
            batch_size:     4,
            epochs:         2,
            num_workers:    1,
            model,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_train_loop_writes_metrics_and_checkpoints() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = config(&dir);
        let ckpt = CheckpointManager::new(cfg.checkpoint_dir.clone());

        let summary = train_loop::<TestBackend>(
            &cfg,
            PairDataset::new(samples(8)),
            PairDataset::new(samples(4)),
            &PretrainedEmbeddings::default(),
            &ckpt,
            Default::default(),
        )
        .unwrap();

        assert!((1..=2).contains(&summary.best_epoch));
        assert!(summary.best_loss.is_finite());
        assert_eq!(ckpt.latest_epoch().unwrap(), 2);
        assert_eq!(ckpt.best_epoch().unwrap(), summary.best_epoch);

        let csv = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_train_loop_without_validation_monitors_train_loss() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = TrainConfig { epochs: 1, ..config(&dir) };
        let ckpt = CheckpointManager::new(cfg.checkpoint_dir.clone());

        let summary = train_loop::<TestBackend>(
            &cfg,
            PairDataset::new(samples(6)),
            PairDataset::new(Vec::new()),
            &PretrainedEmbeddings::default(),
            &ckpt,
            Default::default(),
        )
        .unwrap();

        let last = summary.last.unwrap();
        assert!(last.val_logloss.is_nan());
        assert_eq!(summary.best_loss, last.train_loss);
        assert_eq!(summary.best_epoch, 1);
    }
}
