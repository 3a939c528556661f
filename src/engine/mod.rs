//! Engine orchestration: the per-date pipeline and batch scoring.

pub mod batch;
pub mod stability;

pub use batch::{score_composites, score_indicators, IndicatorOutcome, IndicatorReading};
pub use stability::{
    ComputeOutcome, ContextConfig, EngineConfig, EngineError, SeriesSpec, StabilityEngine,
    StabilityReading,
};
