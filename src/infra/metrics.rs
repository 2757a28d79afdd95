// ============================================================
// Layer 6   Metrics Logger
// ============================================================
// Appends one CSV row per epoch to checkpoints/metrics.csv:
//
//   epoch,train_loss,val_logloss,val_accuracy,val_auc
//   1,0.612300,0.598100,0.684000,0.741200
//   2,0.541900,0.560300,0.712000,0.779800
//
// Validation columns are NaN when the run has no validation
// split. The monitored loss (for picking the best epoch) is
// val_logloss, falling back to train_loss in that case.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// One row of metrics for a single training epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    /// Mean training loss over batches, L2 term included
    pub train_loss: f64,

    pub val_logloss: f64,

    /// Accuracy at the configured threshold
    pub val_accuracy: f64,

    pub val_auc: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:        usize,
        train_loss:   f64,
        val_logloss:  f64,
        val_accuracy: f64,
        val_auc:      f64,
    ) -> Self {
        Self { epoch, train_loss, val_logloss, val_accuracy, val_auc }
    }

    pub fn monitored_loss(&self) -> f64 {
        if self.val_logloss.is_finite() {
            self.val_logloss
        } else {
            self.train_loss
        }
    }

    /// True if this epoch beats the previous best monitored loss.
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        self.monitored_loss() < best_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_logloss,val_accuracy,val_auc")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.val_logloss,
            m.val_accuracy,
            m.val_auc,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_logloss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_logloss,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 0.7, 0.5, 0.8, 0.85);
        assert!(m.is_improvement(0.6));
        assert!(!m.is_improvement(0.4));
    }

    #[test]
    fn test_falls_back_to_train_loss() {
        let m = EpochMetrics::new(1, 0.7, f64::NAN, f64::NAN, f64::NAN);
        assert_eq!(m.monitored_loss(), 0.7);
        assert!(m.is_improvement(f64::INFINITY));
    }

    #[test]
    fn test_appends_rows_after_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().to_string_lossy().to_string()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.5, 0.4, 0.75, 0.8)).unwrap();
        logger.log(&EpochMetrics::new(2, 0.3, 0.35, 0.8, 0.9)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,train_loss,val_logloss,val_accuracy,val_auc");
        assert_eq!(lines[1], "1,0.500000,0.400000,0.750000,0.800000");
    }
}
