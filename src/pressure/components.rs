//! Alternative Asset Pressure component signals.
//!
//! Eighteen components, nine per subsystem, each independently reduced to a
//! `[0,1]` pressure value (higher = more systemic pressure) or `None` when
//! its own minimum-history requirement is unmet. Absence is a first-class
//! outcome distinct from zero; the aggregator folds over present values
//! only.
//!
//! Components are declarative specs evaluated against an aligned frame, so
//! tests can inject alternate rosters.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::align::AlignedFrame;
use crate::score::normalize::{clip, rate_of_change};

/// Component grouping. Each subsystem's mean forms half the pressure index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Metals,
    Crypto,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metals => "metals",
            Self::Crypto => "crypto",
        }
    }
}

/// How a component reduces its input series to a pressure value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ComponentTransform {
    /// Percentile rank of current realized volatility within its own
    /// trailing distribution.
    VolatilityPercentile { return_window: usize },

    /// Z-score of the latest value over the trailing window, mapped to
    /// `[0,1]`. `invert` for series where a low value signals pressure.
    ZScoreStress { invert: bool },

    /// Peak-to-latest drawdown over the window, scaled by `full_depth`.
    DrawdownDepth { full_depth: f64 },

    /// Z-score of the ratio of the first input to the second.
    RatioDeviation { invert: bool },

    /// Rolling return correlation of two inputs mapped to `[0,1]`.
    /// `invert` when decoupling (low correlation) signals pressure.
    CorrelationStress { invert: bool },

    /// Z-score of the `period`-sample rate of change.
    MomentumStress { period: usize, invert: bool },
}

/// Declarative spec for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub subsystem: Subsystem,
    /// One series id, or two for ratio/correlation transforms.
    pub inputs: Vec<String>,
    pub transform: ComponentTransform,
    /// Minimum paired observations required before this component reports.
    pub min_history: usize,
}

/// A single pressure signal for one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub name: String,
    pub subsystem: Subsystem,
    /// `None` means the component's prerequisites were unmet, not zero.
    pub value: Option<f64>,
}

impl ComponentSpec {
    fn new(
        name: &str,
        subsystem: Subsystem,
        inputs: &[&str],
        transform: ComponentTransform,
        min_history: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            subsystem,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            transform,
            min_history,
        }
    }

    /// Evaluate this component at axis index `idx`.
    pub fn evaluate(&self, frame: &AlignedFrame, idx: usize) -> ComponentScore {
        let value = self.compute(frame, idx);
        ComponentScore {
            name: self.name.clone(),
            subsystem: self.subsystem,
            value,
        }
    }

    fn compute(&self, frame: &AlignedFrame, idx: usize) -> Option<f64> {
        match &self.transform {
            ComponentTransform::VolatilityPercentile { return_window } => {
                let history = self.single_history(frame, idx)?;
                volatility_percentile(&history, *return_window)
            }
            ComponentTransform::ZScoreStress { invert } => {
                let history = self.single_history(frame, idx)?;
                let z = zscore_last(&history)?;
                Some(map_z(if *invert { -z } else { z }))
            }
            ComponentTransform::DrawdownDepth { full_depth } => {
                let history = self.single_history(frame, idx)?;
                drawdown_depth(&history, *full_depth)
            }
            ComponentTransform::RatioDeviation { invert } => {
                let (a, b) = self.paired_history(frame, idx)?;
                let ratio: Vec<f64> = a
                    .iter()
                    .zip(&b)
                    .filter(|(_, bv)| **bv != 0.0)
                    .map(|(av, bv)| av / bv)
                    .collect();
                if ratio.len() < self.min_history {
                    return None;
                }
                let z = zscore_last(&ratio)?;
                Some(map_z(if *invert { -z } else { z }))
            }
            ComponentTransform::CorrelationStress { invert } => {
                let (a, b) = self.paired_history(frame, idx)?;
                let ra = rate_of_change(&a, 1);
                let rb = rate_of_change(&b, 1);
                let corr = pearson(&ra, &rb)?;
                let mapped = clip((corr + 1.0) / 2.0, 0.0, 1.0);
                Some(if *invert { 1.0 - mapped } else { mapped })
            }
            ComponentTransform::MomentumStress { period, invert } => {
                let history = self.single_history(frame, idx)?;
                let roc = rate_of_change(&history, *period);
                if roc.len() < 2 {
                    return None;
                }
                let z = zscore_last(&roc)?;
                Some(map_z(if *invert { -z } else { z }))
            }
        }
    }

    fn single_history(&self, frame: &AlignedFrame, idx: usize) -> Option<Vec<f64>> {
        let id = self.inputs.first()?;
        frame.column(id)?;
        let history = frame.column_history(id, idx);
        if history.len() < self.min_history {
            None
        } else {
            Some(history)
        }
    }

    /// Rows up to `idx` where both inputs are present.
    fn paired_history(&self, frame: &AlignedFrame, idx: usize) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.inputs.len() != 2 {
            return None;
        }
        let col_a = frame.column(&self.inputs[0])?;
        let col_b = frame.column(&self.inputs[1])?;

        let end = idx.min(col_a.len().saturating_sub(1));
        let mut a = Vec::new();
        let mut b = Vec::new();
        for i in 0..=end {
            if let (Some(av), Some(bv)) = (col_a[i], col_b[i]) {
                a.push(av);
                b.push(bv);
            }
        }
        if a.len() < self.min_history {
            None
        } else {
            Some((a, b))
        }
    }
}

/// Map a z-score into `[0,1]` pressure (z of +3 saturates).
fn map_z(z: f64) -> f64 {
    clip((z + 3.0) / 6.0, 0.0, 1.0)
}

/// Z-score of the last value against the whole slice.
fn zscore_last(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let last = *values.last()?;
    let mean = values.mean();
    let std = values.std_dev();
    if !std.is_finite() || std == 0.0 {
        return Some(0.0);
    }
    Some((last - mean) / std)
}

/// Percentile rank of the latest realized vol within trailing vols.
fn volatility_percentile(values: &[f64], return_window: usize) -> Option<f64> {
    let returns = rate_of_change(values, 1);
    if returns.len() < return_window + 2 {
        return None;
    }

    let vols: Vec<f64> = returns
        .windows(return_window)
        .map(|w| w.std_dev())
        .filter(|v| v.is_finite())
        .collect();
    let current = *vols.last()?;
    if vols.len() < 2 {
        return None;
    }
    let below = vols.iter().filter(|v| **v <= current).count();
    Some(below as f64 / vols.len() as f64)
}

/// Drawdown from running peak to last value, scaled so `full_depth` maps
/// to 1.0.
fn drawdown_depth(values: &[f64], full_depth: f64) -> Option<f64> {
    let last = *values.last()?;
    let peak = values.iter().cloned().fold(f64::MIN, f64::max);
    if peak <= 0.0 || full_depth <= 0.0 {
        return None;
    }
    let dd = (peak - last) / peak;
    Some(clip(dd / full_depth, 0.0, 1.0))
}

/// Pearson correlation over paired slices.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 3 {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];

    let mean_a = a.mean();
    let mean_b = b.mean();
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// The production 18-component roster: nine metals, nine crypto.
pub fn default_components() -> Vec<ComponentSpec> {
    use ComponentTransform::*;
    use Subsystem::*;

    vec![
        // Metals subsystem
        ComponentSpec::new(
            "gold_volatility",
            Metals,
            &["GOLD_PM_FIX"],
            VolatilityPercentile { return_window: 20 },
            30,
        ),
        ComponentSpec::new(
            "silver_volatility",
            Metals,
            &["SILVER_FIX"],
            VolatilityPercentile { return_window: 20 },
            30,
        ),
        ComponentSpec::new(
            "silver_gold_ratio",
            Metals,
            &["SILVER_FIX", "GOLD_PM_FIX"],
            RatioDeviation { invert: true },
            30,
        ),
        ComponentSpec::new(
            "gold_momentum",
            Metals,
            &["GOLD_PM_FIX"],
            MomentumStress {
                period: 10,
                invert: false,
            },
            20,
        ),
        ComponentSpec::new(
            "gold_miners_ratio",
            Metals,
            &["GDX_CLOSE", "GOLD_PM_FIX"],
            RatioDeviation { invert: true },
            30,
        ),
        // COMEX registered inventory drawdown; the classifier reads this
        // one by name for the liquidity stress type.
        ComponentSpec::new(
            "inventory_stress",
            Metals,
            &["COMEX_GOLD_INVENTORY"],
            ZScoreStress { invert: true },
            12,
        ),
        ComponentSpec::new(
            "platinum_gold_ratio",
            Metals,
            &["PLATINUM_FIX", "GOLD_PM_FIX"],
            RatioDeviation { invert: true },
            30,
        ),
        ComponentSpec::new(
            "safe_haven_flow",
            Metals,
            &["GOLD_PM_FIX", "SPX_CLOSE"],
            CorrelationStress { invert: true },
            30,
        ),
        ComponentSpec::new(
            "real_yield_divergence",
            Metals,
            &["GOLD_PM_FIX", "TIPS_10Y_YIELD"],
            CorrelationStress { invert: false },
            30,
        ),
        // Crypto subsystem
        ComponentSpec::new(
            "btc_volatility",
            Crypto,
            &["BTC_USD"],
            VolatilityPercentile { return_window: 20 },
            30,
        ),
        ComponentSpec::new(
            "eth_volatility",
            Crypto,
            &["ETH_USD"],
            VolatilityPercentile { return_window: 20 },
            30,
        ),
        ComponentSpec::new(
            "btc_drawdown",
            Crypto,
            &["BTC_USD"],
            DrawdownDepth { full_depth: 0.5 },
            30,
        ),
        ComponentSpec::new(
            "eth_btc_ratio",
            Crypto,
            &["ETH_USD", "BTC_USD"],
            RatioDeviation { invert: true },
            30,
        ),
        ComponentSpec::new(
            "stablecoin_peg",
            Crypto,
            &["USDT_USD"],
            ZScoreStress { invert: true },
            10,
        ),
        ComponentSpec::new(
            "crypto_equity_correlation",
            Crypto,
            &["BTC_USD", "SPX_CLOSE"],
            CorrelationStress { invert: false },
            30,
        ),
        ComponentSpec::new(
            "btc_momentum",
            Crypto,
            &["BTC_USD"],
            MomentumStress {
                period: 10,
                invert: true,
            },
            20,
        ),
        ComponentSpec::new(
            "altcoin_breadth",
            Crypto,
            &["ALTCOIN_BREADTH"],
            ZScoreStress { invert: true },
            15,
        ),
        ComponentSpec::new(
            "exchange_volume_stress",
            Crypto,
            &["CRYPTO_VOLUME"],
            ZScoreStress { invert: false },
            15,
        ),
    ]
}
