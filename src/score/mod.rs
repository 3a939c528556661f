//! Normalization and indicator scoring.

pub mod composite;
pub mod normalize;

pub use composite::{
    CompositeDefinition, CompositeScore, CompositeScorer, CompositeSource, IndicatorDefinition,
    IndicatorStatus, ScoreError, ScoreMode, WeightSet,
};
pub use normalize::{Normalizer, NormalizerConfig};
