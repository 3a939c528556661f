//! Regime classification and segment history.

pub mod classifier;
pub mod tracker;

pub use classifier::{
    PrimaryDriver, RegimeClassification, RegimeClassifier, RegimeThresholds, StabilityRegime,
    StressType,
};
pub use tracker::{RegimeSegment, RegimeTracker, TrackerError};
