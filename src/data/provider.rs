//! Series provider seam.
//!
//! The engine never talks to a network client directly; it consumes series
//! through [`SeriesProvider`]. Production wires a cache-backed provider fed
//! by the downloader; tests use [`MemoryProvider`].

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use super::types::ObservationSeries;

/// Fetch failure taxonomy.
///
/// The engine maps `Transient` and `NotFound` to "source absent"; whether
/// that aborts a computation depends on the series' configured role.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Series not found: {0}")]
    NotFound(String),

    #[error("Transient fetch failure for {series_id}: {message}")]
    Transient { series_id: String, message: String },

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Read access to named series.
pub trait SeriesProvider: Send + Sync {
    /// Fetch all observations for `series_id` on or after `start`.
    fn fetch_series(
        &self,
        series_id: &str,
        start: NaiveDate,
    ) -> Result<ObservationSeries, FetchError>;
}

/// In-memory provider backed by preloaded series.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    series: HashMap<String, ObservationSeries>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: ObservationSeries) {
        self.series.insert(series.series_id.clone(), series);
    }

    pub fn with_series(mut self, series: ObservationSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn series_ids(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }
}

impl SeriesProvider for MemoryProvider {
    fn fetch_series(
        &self,
        series_id: &str,
        start: NaiveDate,
    ) -> Result<ObservationSeries, FetchError> {
        let series = self
            .series
            .get(series_id)
            .ok_or_else(|| FetchError::NotFound(series_id.to_string()))?;

        let points = series
            .points()
            .iter()
            .filter(|(d, _)| *d >= start)
            .copied()
            .collect();

        Ok(ObservationSeries::from_points(series_id, points))
    }
}
