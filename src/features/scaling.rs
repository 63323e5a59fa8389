//! Frozen scaling constants

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-10;

/// Min-max normalization for bounded fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    /// `None` for an empty input.
    pub fn fit(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(s) => Some(Self {
                min: s.min.min(v),
                max: s.max.max(v),
            }),
        })
    }

    fn is_degenerate(&self) -> bool {
        (self.max - self.min).abs() < EPSILON
    }

    /// A degenerate range maps everything to 0.5.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            0.5
        } else {
            (value - self.min) / (self.max - self.min)
        }
    }

    pub fn denormalize(&self, scaled: f64) -> f64 {
        if self.is_degenerate() {
            self.min
        } else {
            scaled * (self.max - self.min) + self.min
        }
    }
}

/// Z-score standardization for unbounded fields (population standard deviation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreScaler {
    pub mean: f64,
    pub std_dev: f64,
}

impl ZScoreScaler {
    pub fn fit(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    fn is_degenerate(&self) -> bool {
        self.std_dev.abs() < EPSILON
    }

    /// A zero deviation maps everything to 0.0.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            (value - self.mean) / self.std_dev
        }
    }

    pub fn denormalize(&self, scaled: f64) -> f64 {
        if self.is_degenerate() {
            self.mean
        } else {
            scaled * self.std_dev + self.mean
        }
    }
}
