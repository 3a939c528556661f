//! Alternative Asset Pressure model: component roster and aggregation.

pub mod aggregator;
pub mod components;

pub use aggregator::{
    AggregationOutcome, AggregatorConfig, CorrelationRegime, CrossAssetMultiplier,
    InstabilityAggregator, MarketContext, PressureSnapshot, SubsystemInstability,
};
pub use components::{
    default_components, ComponentScore, ComponentSpec, ComponentTransform, Subsystem,
};
