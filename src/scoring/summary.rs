// ============================================================
// Layer 5 — Score Summary
// ============================================================
// Accumulates per-example Scores over an evaluation run:
// running means while iterating, descriptive statistics at the end.

use serde::Serialize;

use crate::scoring::Scores;

/// Descriptive statistics of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample variance (n - 1 denominator); 0 below two values.
    pub variance: f64,
}

impl MetricStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = if values.len() > 1 {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        Some(Self {
            count: values.len(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            variance,
        })
    }
}

#[derive(Debug, Default)]
pub struct ScoreSummary {
    bleu1: Vec<f64>,
    bleu2: Vec<f64>,
    rouge: Vec<f64>,
    likelihood: Vec<f64>,
}

impl ScoreSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, s: &Scores) {
        self.bleu1.push(s.bleu1);
        self.bleu2.push(s.bleu2);
        self.rouge.push(s.rouge);
        self.likelihood.push(s.likelihood);
    }

    pub fn len(&self) -> usize {
        self.bleu1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bleu1.is_empty()
    }

    /// Mean of every metric so far, or None before the first example.
    pub fn means(&self) -> Option<Scores> {
        if self.is_empty() {
            return None;
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        Some(Scores {
            bleu1: mean(&self.bleu1),
            bleu2: mean(&self.bleu2),
            rouge: mean(&self.rouge),
            likelihood: mean(&self.likelihood),
        })
    }

    /// `(metric name, statistics)` in a fixed order.
    pub fn statistics(&self) -> Vec<(&'static str, MetricStats)> {
        [
            ("bleu1", &self.bleu1),
            ("bleu2", &self.bleu2),
            ("rouge", &self.rouge),
            ("likelihood", &self.likelihood),
        ]
        .into_iter()
        .filter_map(|(name, v)| MetricStats::from_values(v).map(|s| (name, s)))
        .collect()
    }
}
