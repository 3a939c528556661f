//! Multi-frequency alignment onto a shared date axis.

pub mod aligner;

pub use aligner::{
    AlignError, AlignInput, AlignedFrame, AlignerConfig, AxisMode, SeriesAligner,
};
