//! Instability aggregation and cross-asset confirmation.
//!
//! Folds the component roster into per-subsystem instability means, combines
//! them into one pressure index, and amplifies or damps it depending on
//! whether the two subsystems confirm each other. Crypto-only stress is
//! treated as likely speculative rather than systemic, hence the sub-1.0
//! crypto-led multiplier.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::score::normalize::clip;

use super::components::{ComponentScore, Subsystem};

/// Aggregator thresholds and multiplier table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Component presence ratio for a normal reading.
    pub normal_completeness: f64,
    /// Presence ratio floor below which no reading is emitted.
    pub min_completeness: f64,
    /// Subsystem instability above this counts as stressed.
    pub stress_threshold: f64,
    /// Subsystem instability below this counts as quiet.
    pub quiet_threshold: f64,
    /// Subsystems within this band of each other are convergent.
    pub convergence_band: f64,

    pub coordinated_multiplier: f64,
    pub convergent_multiplier: f64,
    pub metals_led_multiplier: f64,
    pub crypto_led_multiplier: f64,
    pub divergent_multiplier: f64,

    /// Added when a liquidity-tightening regime prevails.
    pub liquidity_modifier: f64,
    /// Added when volatility is elevated alongside a coordinated signal.
    pub volatility_modifier: f64,

    pub multiplier_floor: f64,
    pub multiplier_cap: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            normal_completeness: 0.70,
            min_completeness: 0.50,
            stress_threshold: 0.60,
            quiet_threshold: 0.40,
            convergence_band: 0.15,
            coordinated_multiplier: 1.3,
            convergent_multiplier: 1.1,
            metals_led_multiplier: 1.0,
            crypto_led_multiplier: 0.7,
            divergent_multiplier: 0.9,
            liquidity_modifier: 0.10,
            volatility_modifier: 0.05,
            multiplier_floor: 0.6,
            multiplier_cap: 1.4,
        }
    }
}

/// Cross-asset agreement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationRegime {
    Coordinated,
    Divergent,
    MetalsLed,
    CryptoLed,
}

impl CorrelationRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinated => "coordinated",
            Self::Divergent => "divergent",
            Self::MetalsLed => "metals_led",
            Self::CryptoLed => "crypto_led",
        }
    }
}

/// Multiplier applied to the combined pressure index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossAssetMultiplier {
    /// Always within `[0.6, 1.4]`.
    pub value: f64,
    pub regime: CorrelationRegime,
}

/// Per-subsystem instability means.
///
/// Invariant: each equals the unweighted mean of only the components present
/// for that subsystem; zero present components default to 0.5 (neutral).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubsystemInstability {
    pub metals: f64,
    pub crypto: f64,
    pub metals_present: usize,
    pub crypto_present: usize,
}

impl SubsystemInstability {
    /// Fold present component values into per-subsystem means.
    pub fn from_components(components: &[ComponentScore]) -> Self {
        let mean_of = |subsystem: Subsystem| {
            let values: Vec<f64> = components
                .iter()
                .filter(|c| c.subsystem == subsystem)
                .filter_map(|c| c.value)
                .collect();
            if values.is_empty() {
                (0.5, 0)
            } else {
                (values.iter().sum::<f64>() / values.len() as f64, values.len())
            }
        };

        let (metals, metals_present) = mean_of(Subsystem::Metals);
        let (crypto, crypto_present) = mean_of(Subsystem::Crypto);
        Self {
            metals,
            crypto,
            metals_present,
            crypto_present,
        }
    }
}

/// Context inputs for the multiplier modifiers, derived from series outside
/// the component roster. Neutral when those series are unavailable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MarketContext {
    pub liquidity_tightening: bool,
    pub volatility_elevated: bool,
    /// Raw volatility proxy (e.g., VIX level) for the circuit-breaker flag.
    pub volatility_proxy: Option<f64>,
}

/// One fully aggregated pressure observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureSnapshot {
    /// Bounded `[0,1]`; higher = more systemic pressure.
    pub pressure_index: f64,
    /// Exactly `100 - 100 * pressure_index`.
    pub stability_score: f64,
    pub subsystems: SubsystemInstability,
    pub multiplier: CrossAssetMultiplier,
    /// Present components / roster size.
    pub data_completeness: f64,
    /// True when completeness fell in the degraded band.
    pub degraded: bool,
    pub components: Vec<ComponentScore>,
}

/// Outcome of one aggregation pass.
#[derive(Debug, Clone)]
pub enum AggregationOutcome {
    Complete(Box<PressureSnapshot>),
    /// Too few components; no reading should be emitted for the date.
    Insufficient { completeness: f64 },
}

/// Combines component scores into the pressure index.
pub struct InstabilityAggregator {
    config: AggregatorConfig,
}

impl InstabilityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Aggregate one date's component scores.
    ///
    /// Completeness policy: at or above `normal_completeness` proceed
    /// normally; between `min_completeness` and that, proceed degraded;
    /// below, emit nothing and leave prior state untouched.
    pub fn aggregate(
        &self,
        components: Vec<ComponentScore>,
        context: &MarketContext,
    ) -> AggregationOutcome {
        let roster = components.len();
        let present = components.iter().filter(|c| c.value.is_some()).count();
        let completeness = if roster == 0 {
            0.0
        } else {
            present as f64 / roster as f64
        };

        if completeness < self.config.min_completeness {
            warn!(
                present,
                roster, "insufficient component coverage, skipping reading"
            );
            return AggregationOutcome::Insufficient { completeness };
        }

        let degraded = completeness < self.config.normal_completeness;
        if degraded {
            warn!(
                present,
                roster, "proceeding with degraded component coverage"
            );
        }

        let subsystems = SubsystemInstability::from_components(&components);
        let multiplier = self.multiplier(&subsystems, context);

        let combined = 0.5 * subsystems.metals + 0.5 * subsystems.crypto;
        let pressure_index = clip(combined * multiplier.value, 0.0, 1.0);
        let stability_score = 100.0 - 100.0 * pressure_index;

        debug!(
            metals = subsystems.metals,
            crypto = subsystems.crypto,
            multiplier = multiplier.value,
            regime = multiplier.regime.as_str(),
            pressure_index,
            "aggregated pressure"
        );

        AggregationOutcome::Complete(Box::new(PressureSnapshot {
            pressure_index,
            stability_score,
            subsystems,
            multiplier,
            data_completeness: completeness,
            degraded,
            components,
        }))
    }

    /// Cross-asset confirmation multiplier, clamped to the configured range.
    pub fn multiplier(
        &self,
        subsystems: &SubsystemInstability,
        context: &MarketContext,
    ) -> CrossAssetMultiplier {
        let c = &self.config;
        let metals = subsystems.metals;
        let crypto = subsystems.crypto;

        let (regime, base) = if metals > c.stress_threshold && crypto > c.stress_threshold {
            (CorrelationRegime::Coordinated, c.coordinated_multiplier)
        } else if metals > c.stress_threshold && crypto < c.quiet_threshold {
            (CorrelationRegime::MetalsLed, c.metals_led_multiplier)
        } else if crypto > c.stress_threshold && metals < c.quiet_threshold {
            (CorrelationRegime::CryptoLed, c.crypto_led_multiplier)
        } else if (metals - crypto).abs() <= c.convergence_band {
            (CorrelationRegime::Coordinated, c.convergent_multiplier)
        } else {
            (CorrelationRegime::Divergent, c.divergent_multiplier)
        };

        let mut value = base;
        if context.liquidity_tightening {
            value += c.liquidity_modifier;
        }
        if context.volatility_elevated && regime == CorrelationRegime::Coordinated {
            value += c.volatility_modifier;
        }

        CrossAssetMultiplier {
            value: clip(value, c.multiplier_floor, c.multiplier_cap),
            regime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, subsystem: Subsystem, value: Option<f64>) -> ComponentScore {
        ComponentScore {
            name: name.to_string(),
            subsystem,
            value,
        }
    }

    /// Roster with `metals_n` metals and `crypto_n` crypto components
    /// present at the given values; the rest absent, 18 total.
    fn roster(
        metals_n: usize,
        metals_value: f64,
        crypto_n: usize,
        crypto_value: f64,
    ) -> Vec<ComponentScore> {
        let mut out = Vec::new();
        for i in 0..9 {
            let value = (i < metals_n).then_some(metals_value);
            out.push(component(&format!("m{i}"), Subsystem::Metals, value));
        }
        for i in 0..9 {
            let value = (i < crypto_n).then_some(crypto_value);
            out.push(component(&format!("c{i}"), Subsystem::Crypto, value));
        }
        out
    }

    fn aggregator() -> InstabilityAggregator {
        InstabilityAggregator::new(AggregatorConfig::default())
    }

    #[test]
    fn test_subsystem_mean_ignores_absent() {
        let components = vec![
            component("a", Subsystem::Metals, Some(0.4)),
            component("b", Subsystem::Metals, Some(0.8)),
            component("c", Subsystem::Metals, None),
            component("d", Subsystem::Crypto, None),
        ];
        let s = SubsystemInstability::from_components(&components);
        assert!((s.metals - 0.6).abs() < 1e-12);
        assert_eq!(s.metals_present, 2);
        // No crypto components present: neutral default.
        assert_eq!(s.crypto, 0.5);
        assert_eq!(s.crypto_present, 0);
    }

    #[test]
    fn test_adding_absent_component_never_perturbs_mean() {
        let mut components = vec![
            component("a", Subsystem::Metals, Some(0.3)),
            component("b", Subsystem::Metals, Some(0.9)),
        ];
        let before = SubsystemInstability::from_components(&components);
        components.push(component("c", Subsystem::Metals, None));
        let after = SubsystemInstability::from_components(&components);
        assert_eq!(before.metals, after.metals);
    }

    #[test]
    fn test_metals_led_scenario() {
        // 13/18 present: metals mean 0.72, crypto mean 0.30.
        let components = roster(7, 0.72, 6, 0.30);
        let outcome = aggregator().aggregate(components, &MarketContext::default());

        let snapshot = match outcome {
            AggregationOutcome::Complete(s) => s,
            AggregationOutcome::Insufficient { .. } => panic!("expected reading"),
        };

        assert!((snapshot.data_completeness - 13.0 / 18.0).abs() < 1e-12);
        assert!(!snapshot.degraded);
        assert_eq!(snapshot.multiplier.regime, CorrelationRegime::MetalsLed);
        assert!((snapshot.multiplier.value - 1.0).abs() < 1e-12);
        assert!((snapshot.pressure_index - 0.51).abs() < 1e-9);
        assert!((snapshot.stability_score - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_stability_is_complement_of_pressure() {
        for (m, c) in [(0.1, 0.1), (0.9, 0.9), (0.2, 0.8)] {
            let outcome = aggregator().aggregate(roster(9, m, 9, c), &MarketContext::default());
            if let AggregationOutcome::Complete(s) = outcome {
                assert!((s.stability_score - (100.0 - 100.0 * s.pressure_index)).abs() < 1e-12);
                assert!((0.0..=1.0).contains(&s.pressure_index));
                assert!((0.0..=100.0).contains(&s.stability_score));
            } else {
                panic!("expected reading");
            }
        }
    }

    #[test]
    fn test_completeness_bands() {
        // 12/18 = 66.7%: degraded but emitted.
        let outcome = aggregator().aggregate(roster(6, 0.5, 6, 0.5), &MarketContext::default());
        match outcome {
            AggregationOutcome::Complete(s) => assert!(s.degraded),
            AggregationOutcome::Insufficient { .. } => panic!("expected degraded reading"),
        }

        // 8/18 = 44.4%: below the floor, nothing emitted.
        let outcome = aggregator().aggregate(roster(4, 0.5, 4, 0.5), &MarketContext::default());
        assert!(matches!(
            outcome,
            AggregationOutcome::Insufficient { .. }
        ));
    }

    #[test]
    fn test_multiplier_regimes() {
        let agg = aggregator();
        let ctx = MarketContext::default();
        let sub = |m, c| SubsystemInstability {
            metals: m,
            crypto: c,
            metals_present: 9,
            crypto_present: 9,
        };

        let both = agg.multiplier(&sub(0.8, 0.7), &ctx);
        assert_eq!(both.regime, CorrelationRegime::Coordinated);
        assert!((both.value - 1.3).abs() < 1e-12);

        let crypto_led = agg.multiplier(&sub(0.2, 0.8), &ctx);
        assert_eq!(crypto_led.regime, CorrelationRegime::CryptoLed);
        assert!((crypto_led.value - 0.7).abs() < 1e-12);

        let convergent = agg.multiplier(&sub(0.45, 0.5), &ctx);
        assert_eq!(convergent.regime, CorrelationRegime::Coordinated);
        assert!((convergent.value - 1.1).abs() < 1e-12);

        let divergent = agg.multiplier(&sub(0.55, 0.2), &ctx);
        assert_eq!(divergent.regime, CorrelationRegime::Divergent);
        assert!((divergent.value - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_multiplier_clamped_under_modifiers() {
        let agg = aggregator();
        let sub = SubsystemInstability {
            metals: 0.9,
            crypto: 0.9,
            metals_present: 9,
            crypto_present: 9,
        };
        let ctx = MarketContext {
            liquidity_tightening: true,
            volatility_elevated: true,
            volatility_proxy: Some(60.0),
        };
        // 1.3 + 0.10 + 0.05 = 1.45, clamped to the cap.
        let m = agg.multiplier(&sub, &ctx);
        assert!((m.value - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_pressure_clamped() {
        let outcome = aggregator().aggregate(roster(9, 1.0, 9, 1.0), &MarketContext::default());
        if let AggregationOutcome::Complete(s) = outcome {
            // 1.0 * 1.3 would exceed the bound without the clamp.
            assert_eq!(s.pressure_index, 1.0);
            assert_eq!(s.stability_score, 0.0);
        } else {
            panic!("expected reading");
        }
    }
}
