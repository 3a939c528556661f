//! Rolling statistics and alert flags over the reading history.
//!
//! Operates on the historical stability scores, not the raw components:
//! short/medium deltas, trailing averages, and the boolean alert conditions
//! the alerting layer consumes.

use serde::{Deserialize, Serialize};

use crate::regime::StabilityRegime;

/// Rolling statistics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingConfig {
    /// Score below this is critical.
    pub critical_threshold: f64,
    /// Volatility proxy at or above this activates the circuit breaker.
    pub circuit_breaker_level: f64,
    /// Trailing readings inspected for regime churn.
    pub transition_window: usize,
    /// Distinct regimes within the window that count as transitioning.
    pub transition_distinct: usize,
    pub short_avg_window: usize,
    pub long_avg_window: usize,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 30.0,
            circuit_breaker_level: 50.0,
            transition_window: 10,
            transition_distinct: 3,
            short_avg_window: 20,
            long_avg_window: 90,
        }
    }
}

/// Deltas and trailing averages; fields are `None` when history is short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub delta_1d: Option<f64>,
    pub delta_5d: Option<f64>,
    pub avg_20d: Option<f64>,
    pub avg_90d: Option<f64>,
}

/// Boolean alert conditions for one reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    pub is_critical: bool,
    /// Regime churn, not a single clean transition.
    pub is_transitioning: bool,
    pub circuit_breaker_active: bool,
}

/// Computes rolling statistics and flags from the reading history.
pub struct RollingAnalyzer {
    config: RollingConfig,
}

impl RollingAnalyzer {
    pub fn new(config: RollingConfig) -> Self {
        Self { config }
    }

    /// Stats over ascending historical scores, last element = current date.
    pub fn stats(&self, scores: &[f64]) -> RollingStats {
        let n = scores.len();
        let last = match scores.last() {
            Some(s) => *s,
            None => return RollingStats::default(),
        };

        let delta_1d = (n >= 2).then(|| last - scores[n - 2]);
        let delta_5d = (n >= 6).then(|| last - scores[n - 6]);
        let avg_20d = trailing_mean(scores, self.config.short_avg_window);
        let avg_90d = trailing_mean(scores, self.config.long_avg_window);

        RollingStats {
            delta_1d,
            delta_5d,
            avg_20d,
            avg_90d,
        }
    }

    /// Alert flags from the current score, trailing regimes (ascending,
    /// current last), and the contextual volatility proxy.
    pub fn flags(
        &self,
        score: f64,
        trailing_regimes: &[StabilityRegime],
        volatility_proxy: Option<f64>,
    ) -> AlertFlags {
        let window_start = trailing_regimes
            .len()
            .saturating_sub(self.config.transition_window);
        let mut distinct: Vec<StabilityRegime> = Vec::new();
        for regime in &trailing_regimes[window_start..] {
            if !distinct.contains(regime) {
                distinct.push(*regime);
            }
        }

        AlertFlags {
            is_critical: score < self.config.critical_threshold,
            is_transitioning: distinct.len() >= self.config.transition_distinct,
            circuit_breaker_active: volatility_proxy
                .map(|v| v >= self.config.circuit_breaker_level)
                .unwrap_or(false),
        }
    }
}

fn trailing_mean(scores: &[f64], window: usize) -> Option<f64> {
    if scores.len() < window || window == 0 {
        return None;
    }
    let tail = &scores[scores.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}
