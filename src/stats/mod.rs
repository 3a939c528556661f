//! Rolling statistics over the reading history.

pub mod rolling;

pub use rolling::{AlertFlags, RollingAnalyzer, RollingConfig, RollingStats};
