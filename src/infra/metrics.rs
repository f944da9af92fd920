// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to log.csv after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:    the epoch number (1, 2, 3, ...)
//   - loss:     average masked MSE over the training batches
//   - val_loss: masked MSE on the validation set (empty when
//               training without a validation split)
//   - lr:       learning rate used during the epoch
//
// Example CSV output:
//   epoch,loss,val_loss,lr
//   1,0.912345,0.884211,0.005
//   2,0.611002,0.602391,0.005
//
// The file is appended to across runs; the header is written
// only when the file is new.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

pub const LOG_FILE: &str = "log.csv";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:    usize,
    pub loss:     f64,
    pub val_loss: Option<f64>,
    pub lr:       f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, loss: f64, val_loss: Option<f64>, lr: f64) -> Self {
        Self { epoch, loss, val_loss, lr }
    }

    fn to_csv_row(&self) -> String {
        let val = self.val_loss.map(|v| format!("{v:.6}")).unwrap_or_default();
        format!("{},{:.6},{},{}", self.epoch, self.loss, val, self.lr)
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(LOG_FILE);

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,loss,val_loss,lr")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;
        writeln!(f, "{}", m.to_csv_row())?;

        tracing::debug!("Logged epoch {} metrics: loss={:.4}", m.epoch, m.loss);
        Ok(())
    }
}
