pub mod align;
pub mod data;
pub mod engine;
pub mod pressure;
pub mod regime;
pub mod score;
pub mod stats;

// Re-export commonly used types
pub use align::{AlignedFrame, AlignerConfig, SeriesAligner};
pub use data::{FredClient, MemoryProvider, ObservationSeries, SeriesProvider, SeriesStore};
pub use engine::{ComputeOutcome, EngineConfig, StabilityEngine, StabilityReading};
pub use pressure::{InstabilityAggregator, PressureSnapshot, SubsystemInstability};
pub use regime::{RegimeClassifier, RegimeSegment, RegimeTracker, StabilityRegime};
pub use score::{CompositeDefinition, CompositeScorer, IndicatorDefinition};
pub use stats::{AlertFlags, RollingAnalyzer, RollingStats};
