//! Generic indicator definitions and composite scoring.
//!
//! A simple indicator maps one series through the normalizer. A composite
//! indicator normalizes each source series individually and combines them
//! with a weight set selected from a predefined table keyed by which
//! optional sources are present. Redistribution is a table lookup, never a
//! runtime proportional split, so a 4-source composite ships one weight set
//! per presence combination it actually expects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::AlignedFrame;
use crate::data::SeriesRole;

use super::normalize::Normalizer;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Insufficient data for {indicator}: required series {series} absent")]
    InsufficientData { indicator: String, series: String },

    #[error("No weight set for {indicator} with optional sources present: {present:?}")]
    NoWeightSet {
        indicator: String,
        present: Vec<String>,
    },

    #[error("Indicator {indicator} produced no score (no sources present)")]
    NoSources { indicator: String },
}

/// Which normalization mapping an indicator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    #[default]
    Linear,
    Blended,
}

/// Dashboard status derived from score thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStatus {
    Green,
    Yellow,
    Red,
}

/// Static configuration for a single-series indicator. Never mutated by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    /// Stable identifier (e.g., "vix_stress", "yield_curve_slope").
    pub code: String,

    /// Source series id.
    pub series_id: String,

    /// +1 when a high raw value signals stress, -1 when a low one does.
    pub direction: i8,

    /// Trailing normalization window in samples.
    pub lookback_window: usize,

    /// Scores at or below this are green.
    pub threshold_green_max: f64,

    /// Scores at or below this (and above green) are yellow.
    pub threshold_yellow_max: f64,

    /// Relative weight when this indicator feeds a dashboard aggregate.
    pub weight: f64,

    /// Normalization mapping.
    #[serde(default)]
    pub mode: ScoreMode,
}

impl IndicatorDefinition {
    pub fn invert(&self) -> bool {
        self.direction < 0
    }

    /// Classify a 0-100 score against the configured thresholds.
    pub fn status(&self, score: f64) -> IndicatorStatus {
        if score <= self.threshold_green_max {
            IndicatorStatus::Green
        } else if score <= self.threshold_yellow_max {
            IndicatorStatus::Yellow
        } else {
            IndicatorStatus::Red
        }
    }
}

/// One source of a composite indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeSource {
    pub series_id: String,
    pub role: SeriesRole,
    /// Negate the z-score before mapping (low raw value = stress).
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub mode: ScoreMode,
}

/// Weights to use for one exact combination of present optional sources.
///
/// `present` lists the optional source ids available (sorted); `weights`
/// covers every active source including required ones. Every shipped set
/// must sum to the same total as the full-presence set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSet {
    pub present: Vec<String>,
    pub weights: BTreeMap<String, f64>,
}

impl WeightSet {
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Static configuration for a multi-source composite indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeDefinition {
    pub code: String,
    pub sources: Vec<CompositeSource>,
    pub weight_sets: Vec<WeightSet>,
}

impl CompositeDefinition {
    /// Check that every weight set sums to the full-presence total.
    /// Returns the offending set's presence list on failure.
    pub fn validate_weight_sets(&self) -> Result<(), Vec<String>> {
        let full_total = match self.full_presence_set() {
            Some(set) => set.total(),
            None => return Ok(()),
        };
        for set in &self.weight_sets {
            if (set.total() - full_total).abs() > 1e-9 {
                return Err(set.present.clone());
            }
        }
        Ok(())
    }

    fn optional_source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sources
            .iter()
            .filter(|s| !s.role.is_required())
            .map(|s| s.series_id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn full_presence_set(&self) -> Option<&WeightSet> {
        let all = self.optional_source_ids();
        self.weight_sets.iter().find(|s| {
            let mut p = s.present.clone();
            p.sort();
            p == all
        })
    }

    fn weight_set_for(&self, present: &[String]) -> Option<&WeightSet> {
        self.weight_sets.iter().find(|s| {
            let mut p = s.present.clone();
            p.sort();
            p == present
        })
    }
}

/// Result of scoring a composite for one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    pub code: String,
    pub score: f64,
    /// Per-source normalized scores that went into the weighted sum.
    pub source_scores: BTreeMap<String, f64>,
    /// Weights actually applied (the selected set).
    pub applied_weights: BTreeMap<String, f64>,
    /// Optional sources that were present.
    pub present_optional: Vec<String>,
}

/// Scores simple and composite indicators against an aligned frame.
pub struct CompositeScorer {
    normalizer: Normalizer,
}

impl CompositeScorer {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    /// Score a single-series indicator at axis index `idx`.
    pub fn score_indicator(
        &self,
        def: &IndicatorDefinition,
        frame: &AlignedFrame,
        idx: usize,
    ) -> Result<f64, ScoreError> {
        let mut history = frame.column_history(&def.series_id, idx);
        // The definition's own window wins over the normalizer default.
        if history.len() > def.lookback_window {
            history.drain(..history.len() - def.lookback_window);
        }
        let score = match def.mode {
            ScoreMode::Linear => self.normalizer.linear_score(&history, def.invert()),
            ScoreMode::Blended => self.normalizer.blended_score(&history, def.invert()),
        };
        score.ok_or_else(|| ScoreError::InsufficientData {
            indicator: def.code.clone(),
            series: def.series_id.clone(),
        })
    }

    /// Score a composite indicator at axis index `idx`.
    ///
    /// Required source absence is fatal; optional absence selects a
    /// different weight set from the table.
    pub fn score_composite(
        &self,
        def: &CompositeDefinition,
        frame: &AlignedFrame,
        idx: usize,
    ) -> Result<CompositeScore, ScoreError> {
        let mut source_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut present_optional: Vec<String> = Vec::new();

        for source in &def.sources {
            let history = frame.column_history(&source.series_id, idx);
            let score = match source.mode {
                ScoreMode::Linear => self.normalizer.linear_score(&history, source.invert),
                ScoreMode::Blended => self.normalizer.blended_score(&history, source.invert),
            };

            match (score, source.role) {
                (Some(s), role) => {
                    source_scores.insert(source.series_id.clone(), s);
                    if !role.is_required() {
                        present_optional.push(source.series_id.clone());
                    }
                }
                (None, SeriesRole::Required) => {
                    return Err(ScoreError::InsufficientData {
                        indicator: def.code.clone(),
                        series: source.series_id.clone(),
                    });
                }
                (None, SeriesRole::Optional) => {}
            }
        }

        if source_scores.is_empty() {
            return Err(ScoreError::NoSources {
                indicator: def.code.clone(),
            });
        }

        present_optional.sort();
        let weight_set =
            def.weight_set_for(&present_optional)
                .ok_or_else(|| ScoreError::NoWeightSet {
                    indicator: def.code.clone(),
                    present: present_optional.clone(),
                })?;

        let mut score = 0.0;
        let mut applied_weights = BTreeMap::new();
        for (series_id, source_score) in &source_scores {
            if let Some(w) = weight_set.weights.get(series_id) {
                score += w * source_score;
                applied_weights.insert(series_id.clone(), *w);
            }
        }

        Ok(CompositeScore {
            code: def.code.clone(),
            score,
            source_scores,
            applied_weights,
            present_optional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{AlignInput, AlignerConfig, SeriesAligner};
    use crate::data::ObservationSeries;
    use crate::score::normalize::NormalizerConfig;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn flat(id: &str, n: usize, value: f64) -> ObservationSeries {
        let start = d(2024, 1, 1);
        let points = (0..n)
            .map(|i| (start + chrono::Duration::days(i as i64), value))
            .collect();
        ObservationSeries::from_points(id, points)
    }

    fn scorer() -> CompositeScorer {
        CompositeScorer::new(Normalizer::new(NormalizerConfig::default()))
    }

    fn four_source_def() -> CompositeDefinition {
        let weights = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };
        CompositeDefinition {
            code: "bond_composite".to_string(),
            sources: vec![
                CompositeSource {
                    series_id: "T10Y".to_string(),
                    role: SeriesRole::Required,
                    invert: true,
                    mode: ScoreMode::Linear,
                },
                CompositeSource {
                    series_id: "HY_OAS".to_string(),
                    role: SeriesRole::Optional,
                    invert: false,
                    mode: ScoreMode::Linear,
                },
                CompositeSource {
                    series_id: "IG_OAS".to_string(),
                    role: SeriesRole::Optional,
                    invert: false,
                    mode: ScoreMode::Linear,
                },
                CompositeSource {
                    series_id: "MOVE".to_string(),
                    role: SeriesRole::Optional,
                    invert: false,
                    mode: ScoreMode::Blended,
                },
            ],
            weight_sets: vec![
                WeightSet {
                    present: vec![
                        "HY_OAS".to_string(),
                        "IG_OAS".to_string(),
                        "MOVE".to_string(),
                    ],
                    weights: weights(&[
                        ("T10Y", 0.40),
                        ("HY_OAS", 0.25),
                        ("IG_OAS", 0.15),
                        ("MOVE", 0.20),
                    ]),
                },
                WeightSet {
                    present: vec!["HY_OAS".to_string()],
                    weights: weights(&[("T10Y", 0.55), ("HY_OAS", 0.45)]),
                },
                WeightSet {
                    present: vec![],
                    weights: weights(&[("T10Y", 1.0)]),
                },
            ],
        }
    }

    fn frame_for(ids: &[&str]) -> AlignedFrame {
        let inputs: Vec<AlignInput> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let series = flat(id, 60, 10.0 + i as f64);
                if i == 0 {
                    AlignInput::required(series)
                } else {
                    AlignInput::optional(series)
                }
            })
            .collect();
        SeriesAligner::new(AlignerConfig::default())
            .align(&inputs)
            .unwrap()
    }

    #[test]
    fn test_weight_sets_sum_preserved() {
        let def = four_source_def();
        assert!(def.validate_weight_sets().is_ok());
        for set in &def.weight_sets {
            assert!((set.total() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_partial_presence_uses_table_not_proportional_split() {
        let def = four_source_def();
        let frame = frame_for(&["T10Y", "HY_OAS"]);
        let idx = frame.len() - 1;

        let result = scorer().score_composite(&def, &frame, idx).unwrap();
        assert_eq!(result.present_optional, vec!["HY_OAS".to_string()]);
        // The documented 2-source set, not a rescale of the 4-source one.
        assert_eq!(result.applied_weights.get("T10Y"), Some(&0.55));
        assert_eq!(result.applied_weights.get("HY_OAS"), Some(&0.45));
    }

    #[test]
    fn test_required_source_absent_is_fatal() {
        let def = four_source_def();
        let frame = frame_for(&["HY_OAS"]); // no T10Y at all

        // HY_OAS is the only column; T10Y required and absent.
        let err = scorer()
            .score_composite(&def, &frame, frame.len() - 1)
            .unwrap_err();
        match &err {
            ScoreError::InsufficientData { indicator, series } => {
                assert_eq!(indicator, "bond_composite");
                assert_eq!(series, "T10Y");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The variant must render through Display (std::error::Error impl).
        assert!(err.to_string().contains("required series T10Y"));
    }

    #[test]
    fn test_unexpected_presence_combination_errors() {
        let def = four_source_def();
        // IG_OAS present alone has no table entry.
        let frame = frame_for(&["T10Y", "IG_OAS"]);
        let err = scorer()
            .score_composite(&def, &frame, frame.len() - 1)
            .unwrap_err();
        assert!(matches!(err, ScoreError::NoWeightSet { .. }));
    }

    #[test]
    fn test_flat_sources_score_neutral() {
        let def = four_source_def();
        let frame = frame_for(&["T10Y", "HY_OAS", "IG_OAS", "MOVE"]);
        let result = scorer()
            .score_composite(&def, &frame, frame.len() - 1)
            .unwrap();
        // All-flat history normalizes each source to 50.
        assert!((result.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_indicator_status_thresholds() {
        let def = IndicatorDefinition {
            code: "vix_stress".to_string(),
            series_id: "VIX".to_string(),
            direction: 1,
            lookback_window: 520,
            threshold_green_max: 40.0,
            threshold_yellow_max: 70.0,
            weight: 1.0,
            mode: ScoreMode::Blended,
        };
        assert_eq!(def.status(12.0), IndicatorStatus::Green);
        assert_eq!(def.status(40.0), IndicatorStatus::Green);
        assert_eq!(def.status(55.0), IndicatorStatus::Yellow);
        assert_eq!(def.status(90.0), IndicatorStatus::Red);
    }
}
