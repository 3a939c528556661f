//! Stability engine orchestration.
//!
//! Runs the per-date pipeline:
//! 1. Fetch configured series through the provider seam
//! 2. Align them onto the common date axis
//! 3. Evaluate the component roster
//! 4. Aggregate subsystem instability and the cross-asset multiplier
//! 5. Classify the regime and advance the segment tracker
//! 6. Derive rolling statistics and alert flags
//! 7. Upsert the reading (idempotent; recomputes overwrite, never duplicate)

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::align::{AlignError, AlignInput, AlignedFrame, AlignerConfig, SeriesAligner};
use crate::data::{FetchError, SeriesProvider, SeriesRole};
use crate::pressure::{
    AggregationOutcome, AggregatorConfig, ComponentScore, ComponentSpec, CrossAssetMultiplier,
    InstabilityAggregator, MarketContext, SubsystemInstability,
};
use crate::regime::{
    PrimaryDriver, RegimeClassifier, RegimeSegment, RegimeThresholds, RegimeTracker,
    StabilityRegime, StressType, TrackerError,
};
use crate::score::normalize::rate_of_change;
use crate::stats::{AlertFlags, RollingAnalyzer, RollingConfig, RollingStats};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Required series fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("No aligned data on or before {0}")]
    NoData(NaiveDate),
}

/// One series the engine consumes, with its alignment role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub series_id: String,
    pub role: SeriesRole,
}

impl SeriesSpec {
    pub fn required(series_id: &str) -> Self {
        Self {
            series_id: series_id.to_string(),
            role: SeriesRole::Required,
        }
    }

    pub fn optional(series_id: &str) -> Self {
        Self {
            series_id: series_id.to_string(),
            role: SeriesRole::Optional,
        }
    }
}

/// Context-series wiring for the multiplier modifiers and the circuit
/// breaker flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Volatility proxy series (e.g., a VIX close).
    pub volatility_series: Option<String>,
    /// Proxy level counting as elevated volatility.
    pub volatility_elevated_level: f64,
    /// Liquidity aggregate series (e.g., net liquidity).
    pub liquidity_series: Option<String>,
    /// Trailing change at or below this reads as tightening.
    pub liquidity_drop_pct: f64,
    /// Window for the liquidity change, in axis samples.
    pub liquidity_window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            volatility_series: None,
            volatility_elevated_level: 30.0,
            liquidity_series: None,
            liquidity_drop_pct: -0.02,
            liquidity_window: 20,
        }
    }
}

/// Immutable engine configuration, injected at construction so tests can
/// swap rosters and thresholds deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Every series the roster and context need, with roles.
    pub series: Vec<SeriesSpec>,
    /// Component roster (production: the 18-component set).
    pub components: Vec<ComponentSpec>,
    pub aligner: AlignerConfig,
    pub aggregator: AggregatorConfig,
    pub thresholds: RegimeThresholds,
    pub rolling: RollingConfig,
    pub context: ContextConfig,
    /// Fetch horizon for provider calls.
    pub history_start: NaiveDate,
}

impl EngineConfig {
    /// Production configuration: the default 18-component roster with the
    /// gold and bitcoin closes anchoring the date axis.
    pub fn default_market(history_start: NaiveDate) -> Self {
        let components = crate::pressure::default_components();

        let mut series: Vec<SeriesSpec> = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for spec in &components {
            for id in &spec.inputs {
                if seen.insert(id.clone()) {
                    let spec = if id == "GOLD_PM_FIX" || id == "BTC_USD" {
                        SeriesSpec::required(id)
                    } else {
                        SeriesSpec::optional(id)
                    };
                    series.push(spec);
                }
            }
        }
        series.push(SeriesSpec::optional("VIX_CLOSE"));
        series.push(SeriesSpec::optional("NET_LIQUIDITY"));

        Self {
            series,
            components,
            aligner: AlignerConfig {
                // Crypto history is short relative to metals.
                min_overlap: 12,
                ..Default::default()
            },
            aggregator: AggregatorConfig::default(),
            thresholds: RegimeThresholds::default(),
            rolling: RollingConfig::default(),
            context: ContextConfig {
                volatility_series: Some("VIX_CLOSE".to_string()),
                liquidity_series: Some("NET_LIQUIDITY".to_string()),
                ..Default::default()
            },
            history_start,
        }
    }
}

/// One computed stability observation. Keyed uniquely by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReading {
    pub date: NaiveDate,
    /// Bounded `[0,100]`; exactly `100 - 100 * pressure_index`.
    pub stability_score: f64,
    /// Bounded `[0,1]`.
    pub pressure_index: f64,
    pub regime: StabilityRegime,
    pub regime_confidence: f64,
    pub primary_driver: PrimaryDriver,
    pub stress_type: Option<StressType>,
    pub subsystems: SubsystemInstability,
    pub multiplier: CrossAssetMultiplier,
    pub rolling: RollingStats,
    pub flags: AlertFlags,
    pub data_completeness: f64,
    pub degraded: bool,
}

/// Outcome of computing one date.
#[derive(Debug, Clone)]
pub enum ComputeOutcome {
    Reading(Box<StabilityReading>),
    /// Component coverage below the floor; nothing was written.
    Insufficient { completeness: f64 },
}

impl ComputeOutcome {
    pub fn reading(&self) -> Option<&StabilityReading> {
        match self {
            Self::Reading(r) => Some(r),
            Self::Insufficient { .. } => None,
        }
    }
}

/// The composite indicator engine.
pub struct StabilityEngine {
    config: EngineConfig,
    provider: Arc<dyn SeriesProvider>,
    aligner: SeriesAligner,
    aggregator: InstabilityAggregator,
    classifier: RegimeClassifier,
    analyzer: RollingAnalyzer,
    tracker: RegimeTracker,
    readings: BTreeMap<NaiveDate, StabilityReading>,
    breakdowns: BTreeMap<NaiveDate, Vec<ComponentScore>>,
}

impl StabilityEngine {
    pub fn new(config: EngineConfig, provider: Arc<dyn SeriesProvider>) -> Self {
        let aligner = SeriesAligner::new(config.aligner.clone());
        let aggregator = InstabilityAggregator::new(config.aggregator.clone());
        let classifier = RegimeClassifier::new(config.thresholds.clone());
        let analyzer = RollingAnalyzer::new(config.rolling.clone());
        Self {
            config,
            provider,
            aligner,
            aggregator,
            classifier,
            analyzer,
            tracker: RegimeTracker::new(),
            readings: BTreeMap::new(),
            breakdowns: BTreeMap::new(),
        }
    }

    /// Fetch and align every configured series.
    ///
    /// A required series failing to fetch is fatal; an optional one is
    /// logged and treated as absent.
    fn load_frame(&self) -> Result<AlignedFrame, EngineError> {
        let mut inputs = Vec::with_capacity(self.config.series.len());
        for spec in &self.config.series {
            match self
                .provider
                .fetch_series(&spec.series_id, self.config.history_start)
            {
                Ok(series) => inputs.push(AlignInput {
                    series,
                    role: spec.role,
                }),
                Err(e) if spec.role.is_required() => return Err(EngineError::Fetch(e)),
                Err(e) => {
                    warn!(series_id = %spec.series_id, error = %e, "optional series absent");
                }
            }
        }
        Ok(self.aligner.align(&inputs)?)
    }

    /// Compute (or recompute) the reading for one date.
    pub fn compute(&mut self, date: NaiveDate) -> Result<ComputeOutcome, EngineError> {
        let frame = self.load_frame()?;
        self.compute_with_frame(&frame, date)
    }

    /// Compute every axis date within `[start, end]` in ascending order.
    ///
    /// A single date's failure is logged and skipped; it never rolls back
    /// earlier dates or stops later ones.
    pub fn backfill(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, ComputeOutcome)>, EngineError> {
        let frame = self.load_frame()?;
        let dates: Vec<NaiveDate> = frame
            .dates
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect();

        info!(count = dates.len(), %start, %end, "backfilling readings");

        let mut out = Vec::with_capacity(dates.len());
        for date in dates {
            match self.compute_with_frame(&frame, date) {
                Ok(outcome) => out.push((date, outcome)),
                Err(e) => {
                    warn!(%date, error = %e, "skipping date after compute failure");
                }
            }
        }
        Ok(out)
    }

    fn compute_with_frame(
        &mut self,
        frame: &AlignedFrame,
        date: NaiveDate,
    ) -> Result<ComputeOutcome, EngineError> {
        let idx = frame
            .index_at_or_before(date)
            .ok_or(EngineError::NoData(date))?;

        let components: Vec<ComponentScore> = self
            .config
            .components
            .iter()
            .map(|spec| spec.evaluate(frame, idx))
            .collect();

        let context = self.market_context(frame, idx);

        let snapshot = match self.aggregator.aggregate(components, &context) {
            AggregationOutcome::Complete(s) => s,
            AggregationOutcome::Insufficient { completeness } => {
                // Prior readings and segments stay untouched.
                return Ok(ComputeOutcome::Insufficient { completeness });
            }
        };

        let classification =
            self.classifier
                .classify(snapshot.stability_score, &snapshot.subsystems, &snapshot.components);

        // The tracker only moves forward; recomputing a strictly historical
        // date updates the stored reading but leaves closed segments alone.
        match self.tracker.last_date() {
            Some(last) if date < last => {
                warn!(%date, %last, "historical recompute; segment history unchanged");
            }
            _ => {
                self.tracker
                    .advance(date, classification.regime, snapshot.stability_score)?;
            }
        }

        // Rolling inputs: strictly-prior readings plus the current value.
        let mut scores: Vec<f64> = self
            .readings
            .range(..date)
            .map(|(_, r)| r.stability_score)
            .collect();
        scores.push(snapshot.stability_score);

        let mut regimes: Vec<StabilityRegime> = self
            .readings
            .range(..date)
            .map(|(_, r)| r.regime)
            .collect();
        regimes.push(classification.regime);

        let rolling = self.analyzer.stats(&scores);
        let flags = self
            .analyzer
            .flags(snapshot.stability_score, &regimes, context.volatility_proxy);

        let reading = StabilityReading {
            date,
            stability_score: snapshot.stability_score,
            pressure_index: snapshot.pressure_index,
            regime: classification.regime,
            regime_confidence: classification.confidence,
            primary_driver: classification.primary_driver,
            stress_type: classification.stress_type,
            subsystems: snapshot.subsystems,
            multiplier: snapshot.multiplier,
            rolling,
            flags,
            data_completeness: snapshot.data_completeness,
            degraded: snapshot.degraded,
        };

        self.readings.insert(date, reading.clone());
        self.breakdowns.insert(date, snapshot.components);

        Ok(ComputeOutcome::Reading(Box::new(reading)))
    }

    fn market_context(&self, frame: &AlignedFrame, idx: usize) -> MarketContext {
        let ctx = &self.config.context;

        let volatility_proxy = ctx
            .volatility_series
            .as_deref()
            .and_then(|id| frame.column(id))
            .and_then(|col| col[..=idx.min(col.len() - 1)].iter().rev().find_map(|v| *v));

        let liquidity_tightening = ctx
            .liquidity_series
            .as_deref()
            .map(|id| frame.column_history(id, idx))
            .map(|history| {
                let changes = rate_of_change(&history, ctx.liquidity_window);
                changes
                    .last()
                    .map(|c| *c <= ctx.liquidity_drop_pct)
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        MarketContext {
            liquidity_tightening,
            volatility_elevated: volatility_proxy
                .map(|v| v >= ctx.volatility_elevated_level)
                .unwrap_or(false),
            volatility_proxy,
        }
    }

    // Read-only accessors for the presentation layer.

    pub fn latest_reading(&self) -> Option<&StabilityReading> {
        self.readings.values().next_back()
    }

    pub fn reading(&self, date: NaiveDate) -> Option<&StabilityReading> {
        self.readings.get(&date)
    }

    pub fn readings_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&StabilityReading> {
        self.readings.range(start..=end).map(|(_, r)| r).collect()
    }

    pub fn component_breakdown(&self, date: NaiveDate) -> Option<&[ComponentScore]> {
        self.breakdowns.get(&date).map(Vec::as_slice)
    }

    pub fn regime_history(&self) -> Vec<RegimeSegment> {
        self.tracker.history()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryProvider, ObservationSeries};
    use crate::pressure::{ComponentTransform, Subsystem};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(id: &str, values: &[f64]) -> ObservationSeries {
        let start = d(2024, 1, 1);
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + chrono::Duration::days(i as i64), *v))
            .collect();
        ObservationSeries::from_points(id, points)
    }

    fn component(name: &str, subsystem: Subsystem, input: &str) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            subsystem,
            inputs: vec![input.to_string()],
            transform: ComponentTransform::ZScoreStress { invert: false },
            min_history: 10,
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            series: vec![
                SeriesSpec::required("GOLD_PM_FIX"),
                SeriesSpec::required("BTC_USD"),
                SeriesSpec::optional("SILVER_FIX"),
                SeriesSpec::optional("ETH_USD"),
            ],
            components: vec![
                component("gold_stress", Subsystem::Metals, "GOLD_PM_FIX"),
                component("silver_stress", Subsystem::Metals, "SILVER_FIX"),
                component("btc_stress", Subsystem::Crypto, "BTC_USD"),
                component("eth_stress", Subsystem::Crypto, "ETH_USD"),
            ],
            aligner: AlignerConfig {
                min_overlap: 12,
                ..Default::default()
            },
            aggregator: AggregatorConfig::default(),
            thresholds: RegimeThresholds::default(),
            rolling: RollingConfig::default(),
            context: ContextConfig::default(),
            history_start: d(2023, 1, 1),
        }
    }

    fn flat_provider(n: usize) -> MemoryProvider {
        MemoryProvider::new()
            .with_series(series("GOLD_PM_FIX", &vec![2000.0; n]))
            .with_series(series("BTC_USD", &vec![40_000.0; n]))
            .with_series(series("SILVER_FIX", &vec![23.0; n]))
            .with_series(series("ETH_USD", &vec![2_500.0; n]))
    }

    fn engine_with(provider: MemoryProvider) -> StabilityEngine {
        StabilityEngine::new(test_config(), Arc::new(provider))
    }

    #[test]
    fn test_compute_reading_invariants() {
        let mut engine = engine_with(flat_provider(40));
        let outcome = engine.compute(d(2024, 2, 5)).unwrap();
        let reading = outcome.reading().expect("reading");

        assert!((0.0..=1.0).contains(&reading.pressure_index));
        assert!((0.0..=100.0).contains(&reading.stability_score));
        assert!(
            (reading.stability_score - (100.0 - 100.0 * reading.pressure_index)).abs() < 1e-12
        );
        assert_eq!(reading.data_completeness, 1.0);
        assert!(!reading.degraded);
        // Flat inputs: every component neutral, convergent multiplier 1.1.
        assert!((reading.pressure_index - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let mut engine = engine_with(flat_provider(40));
        let date = d(2024, 2, 5);

        let first = engine.compute(date).unwrap();
        let second = engine.compute(date).unwrap();

        assert_eq!(
            first.reading().unwrap(),
            second.reading().unwrap()
        );
        // No duplicate segment from the recompute.
        assert_eq!(engine.regime_history().len(), 1);
        assert_eq!(engine.readings_range(date, date).len(), 1);
    }

    #[test]
    fn test_backfill_ascending_and_contiguous() {
        let mut engine = engine_with(flat_provider(40));
        let results = engine.backfill(d(2024, 1, 20), d(2024, 2, 9)).unwrap();

        assert_eq!(results.len(), 21);
        let mut prev = None;
        for (date, outcome) in &results {
            if let Some(p) = prev {
                assert!(*date > p);
            }
            prev = Some(*date);
            assert!(outcome.reading().is_some());
        }

        let history = engine.regime_history();
        let open_count = history.iter().filter(|s| s.regime_end.is_none()).count();
        assert_eq!(open_count, 1);
        for pair in history.windows(2) {
            assert_eq!(pair[0].regime_end, Some(pair[1].regime_start));
        }
    }

    #[test]
    fn test_insufficient_components_leaves_state_untouched() {
        // Only GOLD and BTC exist: silver and eth components absent, and a
        // roster of 8 with 2 present sits below the 50% floor.
        let provider = MemoryProvider::new()
            .with_series(series("GOLD_PM_FIX", &vec![2000.0; 40]))
            .with_series(series("BTC_USD", &vec![40_000.0; 40]));

        let mut config = test_config();
        config.components = vec![
            component("gold_stress", Subsystem::Metals, "GOLD_PM_FIX"),
            component("m2", Subsystem::Metals, "MISSING_A"),
            component("m3", Subsystem::Metals, "MISSING_B"),
            component("m4", Subsystem::Metals, "MISSING_C"),
            component("btc_stress", Subsystem::Crypto, "BTC_USD"),
            component("c2", Subsystem::Crypto, "MISSING_D"),
            component("c3", Subsystem::Crypto, "MISSING_E"),
            component("c4", Subsystem::Crypto, "MISSING_F"),
        ];
        let mut engine = StabilityEngine::new(config, Arc::new(provider));

        let outcome = engine.compute(d(2024, 2, 5)).unwrap();
        assert!(matches!(
            outcome,
            ComputeOutcome::Insufficient { completeness } if (completeness - 0.25).abs() < 1e-12
        ));
        assert!(engine.latest_reading().is_none());
        assert!(engine.regime_history().is_empty());
    }

    #[test]
    fn test_degraded_band_records_completeness() {
        // 2 of 4 components present: 50%, degraded but emitted.
        let provider = MemoryProvider::new()
            .with_series(series("GOLD_PM_FIX", &vec![2000.0; 40]))
            .with_series(series("BTC_USD", &vec![40_000.0; 40]));
        let mut engine = StabilityEngine::new(test_config(), Arc::new(provider));

        let outcome = engine.compute(d(2024, 2, 5)).unwrap();
        let reading = outcome.reading().expect("degraded reading");
        assert!(reading.degraded);
        assert!((reading.data_completeness - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_required_fetch_failure_is_fatal() {
        let provider = MemoryProvider::new().with_series(series("BTC_USD", &vec![40_000.0; 40]));
        let mut engine = StabilityEngine::new(test_config(), Arc::new(provider));
        let err = engine.compute(d(2024, 2, 5)).unwrap_err();
        assert!(matches!(err, EngineError::Fetch(_)));
    }

    #[test]
    fn test_historical_recompute_keeps_segments() {
        let mut engine = engine_with(flat_provider(40));
        engine.backfill(d(2024, 1, 20), d(2024, 2, 9)).unwrap();
        let segments_before = engine.regime_history();

        // Recompute an interior date.
        let outcome = engine.compute(d(2024, 1, 25)).unwrap();
        assert!(outcome.reading().is_some());
        assert_eq!(engine.regime_history(), segments_before);
    }

    #[test]
    fn test_volatility_context_raises_multiplier_and_trips_breaker() {
        let provider = flat_provider(40).with_series(series("VIX_CLOSE", &vec![60.0; 40]));
        let mut config = test_config();
        config.series.push(SeriesSpec::optional("VIX_CLOSE"));
        config.context.volatility_series = Some("VIX_CLOSE".to_string());
        let mut engine = StabilityEngine::new(config, Arc::new(provider));

        let outcome = engine.compute(d(2024, 2, 5)).unwrap();
        let reading = outcome.reading().expect("reading");

        // Convergent base 1.1 plus the elevated-volatility modifier.
        assert!((reading.multiplier.value - 1.15).abs() < 1e-9);
        assert!((reading.pressure_index - 0.575).abs() < 1e-9);
        // Proxy at 60 sits above the circuit breaker level.
        assert!(reading.flags.circuit_breaker_active);
    }

    #[test]
    fn test_liquidity_tightening_raises_multiplier() {
        let liquidity: Vec<f64> = (0..40).map(|i| 1000.0 - 2.0 * i as f64).collect();
        let provider = flat_provider(40).with_series(series("NET_LIQUIDITY", &liquidity));
        let mut config = test_config();
        config.series.push(SeriesSpec::optional("NET_LIQUIDITY"));
        config.context.liquidity_series = Some("NET_LIQUIDITY".to_string());
        let mut engine = StabilityEngine::new(config, Arc::new(provider));

        let outcome = engine.compute(d(2024, 2, 5)).unwrap();
        let reading = outcome.reading().expect("reading");

        // 20-sample drop of roughly -4% clears the -2% tightening bar.
        assert!((reading.multiplier.value - 1.2).abs() < 1e-9);
        assert!((reading.pressure_index - 0.6).abs() < 1e-9);
        assert!(!reading.flags.circuit_breaker_active);
    }

    #[test]
    fn test_default_market_config_roster() {
        let config = EngineConfig::default_market(d(2020, 1, 1));
        assert_eq!(config.components.len(), 18);
        // Axis anchors are required, everything else optional.
        let required: Vec<&str> = config
            .series
            .iter()
            .filter(|s| s.role.is_required())
            .map(|s| s.series_id.as_str())
            .collect();
        assert_eq!(required, vec!["GOLD_PM_FIX", "BTC_USD"]);
    }
}
