//! Stability regime classification.
//!
//! Maps the bounded stability score to one of five ordered regimes with a
//! fixed confidence constant per regime. The ambiguous 40-70 band is split
//! by which subsystem dominates instability: metals dominance reads as
//! monetary stress, crypto dominance as ordinary caution.

use serde::{Deserialize, Serialize};

use crate::pressure::{ComponentScore, SubsystemInstability};

/// Discrete stability regime, ordered from calmest to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityRegime {
    Calm,
    MildCaution,
    MonetaryStress,
    LiquidityCrisis,
    SystemicBreakdown,
}

impl StabilityRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::MildCaution => "mild_caution",
            Self::MonetaryStress => "monetary_stress",
            Self::LiquidityCrisis => "liquidity_crisis",
            Self::SystemicBreakdown => "systemic_breakdown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Calm => "Markets calm, no systemic pressure",
            Self::MildCaution => "Mildly elevated pressure, monitoring",
            Self::MonetaryStress => "Monetary stress led by hard assets",
            Self::LiquidityCrisis => "Liquidity crisis conditions",
            Self::SystemicBreakdown => "Systemic breakdown",
        }
    }
}

/// Which subsystem drives the current reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryDriver {
    Metals,
    Crypto,
    Broad,
}

impl PrimaryDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metals => "metals",
            Self::Crypto => "crypto",
            Self::Broad => "broad",
        }
    }
}

/// Nature of the prevailing stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressType {
    Monetary,
    Speculative,
    Liquidity,
    Systemic,
}

impl StressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monetary => "monetary",
            Self::Speculative => "speculative",
            Self::Liquidity => "liquidity",
            Self::Systemic => "systemic",
        }
    }
}

/// Classifier thresholds and confidence constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub calm_min: f64,
    pub caution_min: f64,
    pub stress_min: f64,
    pub crisis_min: f64,

    pub calm_confidence: f64,
    pub caution_confidence: f64,
    pub monetary_confidence: f64,
    /// Confidence when the ambiguous band resolves to caution.
    pub ambiguous_caution_confidence: f64,
    pub crisis_confidence: f64,
    pub breakdown_confidence: f64,

    /// Subsystem gap needed to name a single driver.
    pub driver_band: f64,
    /// Inventory-stress component above this forces the liquidity type.
    pub inventory_liquidity_threshold: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            calm_min: 90.0,
            caution_min: 70.0,
            stress_min: 40.0,
            crisis_min: 20.0,
            calm_confidence: 0.90,
            caution_confidence: 0.75,
            monetary_confidence: 0.65,
            ambiguous_caution_confidence: 0.60,
            crisis_confidence: 0.80,
            breakdown_confidence: 0.95,
            driver_band: 0.15,
            inventory_liquidity_threshold: 0.70,
        }
    }
}

/// Full classification for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime: StabilityRegime,
    pub confidence: f64,
    pub primary_driver: PrimaryDriver,
    /// `None` in calm conditions.
    pub stress_type: Option<StressType>,
}

/// Threshold-ladder regime classifier. Stateless; the segment history lives
/// in the tracker.
pub struct RegimeClassifier {
    thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify a stability score with its subsystem breakdown.
    pub fn classify(
        &self,
        stability_score: f64,
        subsystems: &SubsystemInstability,
        components: &[ComponentScore],
    ) -> RegimeClassification {
        let t = &self.thresholds;
        let metals_dominant = subsystems.metals > subsystems.crypto;

        let (regime, confidence) = if stability_score >= t.calm_min {
            (StabilityRegime::Calm, t.calm_confidence)
        } else if stability_score >= t.caution_min {
            (StabilityRegime::MildCaution, t.caution_confidence)
        } else if stability_score >= t.stress_min {
            // Ambiguous band: resolved by the dominant subsystem.
            if metals_dominant {
                (StabilityRegime::MonetaryStress, t.monetary_confidence)
            } else {
                (StabilityRegime::MildCaution, t.ambiguous_caution_confidence)
            }
        } else if stability_score >= t.crisis_min {
            (StabilityRegime::LiquidityCrisis, t.crisis_confidence)
        } else {
            (StabilityRegime::SystemicBreakdown, t.breakdown_confidence)
        };

        let primary_driver = self.primary_driver(subsystems);
        let stress_type = if regime == StabilityRegime::Calm {
            None
        } else {
            Some(self.stress_type(primary_driver, components))
        };

        RegimeClassification {
            regime,
            confidence,
            primary_driver,
            stress_type,
        }
    }

    fn primary_driver(&self, subsystems: &SubsystemInstability) -> PrimaryDriver {
        let diff = subsystems.metals - subsystems.crypto;
        if diff.abs() < self.thresholds.driver_band {
            PrimaryDriver::Broad
        } else if diff > 0.0 {
            PrimaryDriver::Metals
        } else {
            PrimaryDriver::Crypto
        }
    }

    fn stress_type(&self, driver: PrimaryDriver, components: &[ComponentScore]) -> StressType {
        let inventory_elevated = components
            .iter()
            .find(|c| c.name == "inventory_stress")
            .and_then(|c| c.value)
            .map(|v| v > self.thresholds.inventory_liquidity_threshold)
            .unwrap_or(false);

        if inventory_elevated {
            return StressType::Liquidity;
        }

        match driver {
            PrimaryDriver::Metals => StressType::Monetary,
            PrimaryDriver::Crypto => StressType::Speculative,
            PrimaryDriver::Broad => StressType::Systemic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pressure::Subsystem;

    fn subsystems(metals: f64, crypto: f64) -> SubsystemInstability {
        SubsystemInstability {
            metals,
            crypto,
            metals_present: 9,
            crypto_present: 9,
        }
    }

    fn classifier() -> RegimeClassifier {
        RegimeClassifier::new(RegimeThresholds::default())
    }

    fn inventory(value: f64) -> Vec<ComponentScore> {
        vec![ComponentScore {
            name: "inventory_stress".to_string(),
            subsystem: Subsystem::Metals,
            value: Some(value),
        }]
    }

    #[test]
    fn test_threshold_ladder() {
        let c = classifier();
        let sub = subsystems(0.1, 0.1);

        assert_eq!(c.classify(95.0, &sub, &[]).regime, StabilityRegime::Calm);
        assert_eq!(
            c.classify(75.0, &sub, &[]).regime,
            StabilityRegime::MildCaution
        );
        assert_eq!(
            c.classify(25.0, &sub, &[]).regime,
            StabilityRegime::LiquidityCrisis
        );
        assert_eq!(
            c.classify(10.0, &sub, &[]).regime,
            StabilityRegime::SystemicBreakdown
        );
    }

    #[test]
    fn test_ambiguous_band_split() {
        let c = classifier();

        let metals_led = c.classify(49.0, &subsystems(0.72, 0.30), &[]);
        assert_eq!(metals_led.regime, StabilityRegime::MonetaryStress);
        assert_eq!(metals_led.confidence, 0.65);
        assert_eq!(metals_led.primary_driver, PrimaryDriver::Metals);
        assert_eq!(metals_led.stress_type, Some(StressType::Monetary));

        let crypto_led = c.classify(49.0, &subsystems(0.30, 0.72), &[]);
        assert_eq!(crypto_led.regime, StabilityRegime::MildCaution);
        assert_eq!(crypto_led.confidence, 0.60);
        assert_eq!(crypto_led.stress_type, Some(StressType::Speculative));
    }

    #[test]
    fn test_broad_driver_within_band() {
        let c = classifier();
        let result = c.classify(55.0, &subsystems(0.55, 0.50), &[]);
        assert_eq!(result.primary_driver, PrimaryDriver::Broad);
        assert_eq!(result.stress_type, Some(StressType::Systemic));
    }

    #[test]
    fn test_calm_has_no_stress_type() {
        let c = classifier();
        let result = c.classify(95.0, &subsystems(0.1, 0.05), &[]);
        assert_eq!(result.stress_type, None);
        assert_eq!(result.confidence, 0.90);
    }

    #[test]
    fn test_inventory_stress_forces_liquidity_type() {
        let c = classifier();
        let result = c.classify(35.0, &subsystems(0.8, 0.3), &inventory(0.85));
        assert_eq!(result.regime, StabilityRegime::LiquidityCrisis);
        assert_eq!(result.stress_type, Some(StressType::Liquidity));

        // Below the component threshold the driver decides.
        let result = c.classify(35.0, &subsystems(0.8, 0.3), &inventory(0.5));
        assert_eq!(result.stress_type, Some(StressType::Monetary));
    }
}
