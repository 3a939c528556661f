//! Parallel batch scoring of independent indicators.
//!
//! Indicator definitions are independent of one another, so one date's
//! dashboard scores fan out across a rayon pool. Each indicator carries its
//! own `Result`: one failing definition never poisons the batch. The regime
//! tracker is deliberately not driven from here; segment transitions are
//! order-dependent and stay on the sequential path.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::AlignedFrame;
use crate::score::{
    CompositeDefinition, CompositeScore, CompositeScorer, IndicatorDefinition, IndicatorStatus,
    ScoreError,
};

/// One scored single-series indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReading {
    pub code: String,
    pub date: NaiveDate,
    pub score: f64,
    pub status: IndicatorStatus,
}

/// Per-indicator outcome; failures are isolated, not propagated.
#[derive(Debug)]
pub struct IndicatorOutcome {
    pub code: String,
    pub result: Result<IndicatorReading, ScoreError>,
}

/// Score every indicator definition at `date` in parallel.
///
/// Output order matches `defs` regardless of scheduling.
pub fn score_indicators(
    scorer: &CompositeScorer,
    defs: &[IndicatorDefinition],
    frame: &AlignedFrame,
    date: NaiveDate,
) -> Vec<IndicatorOutcome> {
    let idx = match frame.index_at_or_before(date) {
        Some(idx) => idx,
        None => {
            return defs
                .iter()
                .map(|def| IndicatorOutcome {
                    code: def.code.clone(),
                    result: Err(ScoreError::InsufficientData {
                        indicator: def.code.clone(),
                        series: def.series_id.clone(),
                    }),
                })
                .collect();
        }
    };

    debug!(count = defs.len(), %date, "scoring indicator batch");

    defs.par_iter()
        .map(|def| {
            let result = scorer.score_indicator(def, frame, idx).map(|score| {
                IndicatorReading {
                    code: def.code.clone(),
                    date,
                    score,
                    status: def.status(score),
                }
            });
            IndicatorOutcome {
                code: def.code.clone(),
                result,
            }
        })
        .collect()
}

/// Score every composite definition at `date` in parallel.
pub fn score_composites(
    scorer: &CompositeScorer,
    defs: &[CompositeDefinition],
    frame: &AlignedFrame,
    date: NaiveDate,
) -> Vec<Result<CompositeScore, ScoreError>> {
    let Some(idx) = frame.index_at_or_before(date) else {
        return defs
            .iter()
            .map(|def| {
                Err(ScoreError::InsufficientData {
                    indicator: def.code.clone(),
                    series: def
                        .sources
                        .first()
                        .map(|s| s.series_id.clone())
                        .unwrap_or_default(),
                })
            })
            .collect();
    };

    defs.par_iter()
        .map(|def| scorer.score_composite(def, frame, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{AlignInput, AlignerConfig, SeriesAligner};
    use crate::data::ObservationSeries;
    use crate::score::{Normalizer, NormalizerConfig, ScoreMode};

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

    fn definition(code: &str, series_id: &str) -> IndicatorDefinition {
        IndicatorDefinition {
            code: code.to_string(),
            series_id: series_id.to_string(),
            direction: 1,
            lookback_window: 520,
            threshold_green_max: 40.0,
            threshold_yellow_max: 70.0,
            weight: 1.0,
            mode: ScoreMode::Linear,
        }
    }

    #[test]
    fn test_batch_preserves_order_and_isolates_failures() {
        let frame = SeriesAligner::new(AlignerConfig::default())
            .align(&[
                AlignInput::required(flat("VIX", 60, 18.0)),
                AlignInput::optional(flat("DXY", 60, 104.0)),
            ])
            .unwrap();

        let defs = vec![
            definition("vix_stress", "VIX"),
            definition("missing_series", "NOPE"),
            definition("dollar_stress", "DXY"),
        ];

        let scorer = CompositeScorer::new(Normalizer::new(NormalizerConfig::default()));
        let outcomes = score_indicators(&scorer, &defs, &frame, d(2024, 2, 20));

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].code, "vix_stress");
        assert_eq!(outcomes[1].code, "missing_series");
        assert_eq!(outcomes[2].code, "dollar_stress");

        let vix = outcomes[0].result.as_ref().unwrap();
        assert!((vix.score - 50.0).abs() < 1e-9);
        assert_eq!(vix.status, IndicatorStatus::Yellow);

        assert!(matches!(
            outcomes[1].result,
            Err(ScoreError::InsufficientData { .. })
        ));
        assert!(outcomes[2].result.is_ok());
    }

    fn composite_def() -> CompositeDefinition {
        use crate::data::SeriesRole;
        use crate::score::{CompositeSource, WeightSet};
        use std::collections::BTreeMap;

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
            ],
            weight_sets: vec![
                WeightSet {
                    present: vec!["HY_OAS".to_string()],
                    weights: weights(&[("T10Y", 0.6), ("HY_OAS", 0.4)]),
                },
                WeightSet {
                    present: vec![],
                    weights: weights(&[("T10Y", 1.0)]),
                },
            ],
        }
    }

    #[test]
    fn test_composite_batch_scores_and_date_errors() {
        let frame = SeriesAligner::new(AlignerConfig::default())
            .align(&[
                AlignInput::required(flat("T10Y", 60, 4.2)),
                AlignInput::optional(flat("HY_OAS", 60, 3.5)),
            ])
            .unwrap();

        let defs = vec![composite_def()];
        let scorer = CompositeScorer::new(Normalizer::new(NormalizerConfig::default()));

        let results = score_composites(&scorer, &defs, &frame, d(2024, 2, 20));
        assert_eq!(results.len(), 1);
        let score = results[0].as_ref().unwrap();
        assert!((score.score - 50.0).abs() < 1e-9);
        assert_eq!(score.present_optional, vec!["HY_OAS".to_string()]);

        // Date before the axis fails with the same variant the indicator
        // path uses.
        let results = score_composites(&scorer, &defs, &frame, d(2020, 1, 1));
        assert!(matches!(
            results[0],
            Err(ScoreError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_date_before_axis_fails_every_indicator() {
        let frame = SeriesAligner::new(AlignerConfig::default())
            .align(&[AlignInput::required(flat("VIX", 60, 18.0))])
            .unwrap();

        let defs = vec![definition("vix_stress", "VIX")];
        let scorer = CompositeScorer::new(Normalizer::new(NormalizerConfig::default()));
        let outcomes = score_indicators(&scorer, &defs, &frame, d(2020, 1, 1));
        assert!(outcomes[0].result.is_err());
    }
}
