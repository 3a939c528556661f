//! Rolling z-score normalization.
//!
//! Converts a raw series into a bounded 0-100 stress/confidence score over a
//! trailing window (the shorter of `lookback` samples or all history).
//! Two mappings:
//! - linear: `clip(50 + 25*z, 0, 100)`, neutral 50 on zero dispersion
//! - blended: level z blended 75/25 with a 10-period momentum z, clamped to
//!   [-3, 3] and rescaled, for series where velocity matters as much as level

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Normalizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Trailing window length in samples.
    pub lookback: usize,
    /// Rate-of-change period for the momentum leg.
    pub momentum_period: usize,
    /// Weight of the level z in the blend (momentum gets the remainder).
    pub level_weight: f64,
    /// Symmetric clamp applied to the blended z.
    pub z_clamp: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            lookback: 520,
            momentum_period: 10,
            level_weight: 0.75,
            z_clamp: 3.0,
        }
    }
}

/// Rolling z-score normalizer.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    fn window<'a>(&self, values: &'a [f64]) -> &'a [f64] {
        let start = values.len().saturating_sub(self.config.lookback);
        &values[start..]
    }

    /// Z-score of the last value over the trailing window.
    ///
    /// `None` with fewer than two samples; `Some(0.0)` when the window has
    /// no dispersion (the caller maps that to neutral).
    pub fn zscore(&self, values: &[f64]) -> Option<f64> {
        let window = self.window(values);
        if window.len() < 2 {
            return None;
        }

        let last = *window.last()?;
        let mean = window.mean();
        let std = window.std_dev();

        if !std.is_finite() || std == 0.0 {
            return Some(0.0);
        }

        Some((last - mean) / std)
    }

    /// Linear stress mapping: `clip(50 + 25*z, 0, 100)`.
    ///
    /// `invert` negates z first, for series where a low raw value signals
    /// stress (e.g., yield-curve slope).
    pub fn linear_score(&self, values: &[f64], invert: bool) -> Option<f64> {
        let mut z = self.zscore(values)?;
        if invert {
            z = -z;
        }
        Some(clip(50.0 + 25.0 * z, 0.0, 100.0))
    }

    /// Clamped/blended mapping mixing level and momentum z-scores.
    pub fn blended_score(&self, values: &[f64], invert: bool) -> Option<f64> {
        let window = self.window(values);
        let z_base = self.zscore(values)?;

        let roc = rate_of_change(window, self.config.momentum_period);
        // Momentum leg needs its own dispersion; fall back to pure level
        // when the window is too short for any rate-of-change samples.
        let z_mom = if roc.len() >= 2 {
            let last = *roc.last()?;
            let mean = (&roc[..]).mean();
            let std = (&roc[..]).std_dev();
            if std.is_finite() && std > 0.0 {
                (last - mean) / std
            } else {
                0.0
            }
        } else {
            0.0
        };

        let w = self.config.level_weight;
        let mut z_blend = w * z_base + (1.0 - w) * z_mom;
        if invert {
            z_blend = -z_blend;
        }
        z_blend = clip(z_blend, -self.config.z_clamp, self.config.z_clamp);

        Some((z_blend + self.config.z_clamp) / (2.0 * self.config.z_clamp) * 100.0)
    }
}

/// `period`-sample rate of change over `values`.
pub fn rate_of_change(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() <= period {
        return Vec::new();
    }
    (period..values.len())
        .filter_map(|i| {
            let prev = values[i - period];
            if prev == 0.0 {
                None
            } else {
                Some((values[i] - prev) / prev)
            }
        })
        .collect()
}

/// Clamp `x` into `[lo, hi]`.
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}
