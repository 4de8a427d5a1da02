// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each round.
//
// Output file: checkpoints/metrics.csv
//
//   round,samples,train_loss,train_accuracy
//   1,4096,6.912300,0.041000
//   2,4096,5.408100,0.087000
//
// The header is written once; later runs that resume from a
// checkpoint keep appending to the same file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

const HEADER: &str = "round,samples,train_loss,train_accuracy";

/// One row of metrics for a single training round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub round: usize,
    /// Training examples seen this round.
    pub samples: usize,
    /// Mean next-word cross-entropy over the round's batches.
    pub train_loss: f64,
    /// Fraction of targets predicted exactly (argmax).
    pub train_accuracy: f64,
}

impl RoundMetrics {
    pub fn new(round: usize, samples: usize, train_loss: f64, train_accuracy: f64) -> Self {
        Self {
            round,
            samples,
            train_loss,
            train_accuracy,
        }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &RoundMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{:.6},{:.6}",
            m.round, m.samples, m.train_loss, m.train_accuracy,
        )?;

        tracing::debug!(
            "Logged round {} metrics: train_loss={:.4}, train_accuracy={:.4}",
            m.round,
            m.train_loss,
            m.train_accuracy,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_written_once_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().to_string_lossy()).unwrap();
        logger.log(&RoundMetrics::new(1, 64, 2.5, 0.125)).unwrap();

        // reopening must not rewrite the header
        let logger = MetricsLogger::new(dir.path().to_string_lossy()).unwrap();
        logger.log(&RoundMetrics::new(2, 64, 2.25, 0.25)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                HEADER,
                "1,64,2.500000,0.125000",
                "2,64,2.250000,0.250000"
            ]
        );
    }
}
