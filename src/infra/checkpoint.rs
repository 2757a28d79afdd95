// ============================================================
// Layer 6   Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     latest_epoch.json      ← number of the last saved epoch
//     best_epoch.json        ← epoch with the lowest monitored loss
//     train_config.json      ← TrainConfig incl. the DsmmConfig
//
// The config is needed to rebuild the exact architecture before
// the weights can be loaded into it.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::DsmmModel;

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        // .ok(): an unwritable dir surfaces on the first save instead
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Writes `{dir}/model_epoch_{epoch}.mpk.gz` and moves the
    /// latest-epoch pointer.
    pub fn save_model<B: Backend>(&self, model: &DsmmModel<B>, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        self.write_epoch("latest_epoch.json", epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Loads the weights saved for `epoch` into `model`, which must
    /// have been built from the same config.
    pub fn load_model<B: Backend>(
        &self,
        model:  DsmmModel<B>,
        epoch:  usize,
        device: &B::Device,
    ) -> Result<DsmmModel<B>> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_best_epoch(&self, epoch: usize) -> Result<()> {
        self.write_epoch("best_epoch.json", epoch)
    }

    /// Best epoch when one was recorded, otherwise the latest.
    pub fn checkpoint_epoch(&self) -> Result<usize> {
        match self.read_epoch("best_epoch.json") {
            Ok(epoch) => Ok(epoch),
            Err(_) => self.latest_epoch(),
        }
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        self.read_epoch("latest_epoch.json")
    }

    pub fn best_epoch(&self) -> Result<usize> {
        self.read_epoch("best_epoch.json")
    }

    /// Must be called before training starts so scoring can
    /// rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before scoring.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    fn write_epoch(&self, name: &str, epoch: usize) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {name}"))
    }

    fn read_epoch(&self, name: &str) -> Result<usize> {
        let path = self.dir.join(name);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{name}'. Have you run 'train' first?"))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> CheckpointManager {
        CheckpointManager::new(dir.path().to_string_lossy().to_string())
    }

    #[test]
    fn test_epoch_pointers() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = manager(&dir);

        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.checkpoint_epoch().is_err());

        ckpt.write_epoch("latest_epoch.json", 4).unwrap();
        assert_eq!(ckpt.checkpoint_epoch().unwrap(), 4);

        ckpt.save_best_epoch(2).unwrap();
        assert_eq!(ckpt.best_epoch().unwrap(), 2);
        assert_eq!(ckpt.checkpoint_epoch().unwrap(), 2);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = manager(&dir);

        let mut cfg = TrainConfig::default();
        cfg.epochs = 3;
        cfg.model  = cfg.model.with_word_vocab_size(123);
        ckpt.save_config(&cfg).unwrap();

        let loaded = ckpt.load_config().unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.model.word_vocab_size, 123);
    }
}
