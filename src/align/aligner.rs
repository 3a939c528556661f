//! Multi-frequency series alignment.
//!
//! Merges N raw series of differing cadence (daily closes, weekly prints,
//! monthly releases) onto one ascending date axis, forward-filling stale
//! values. The axis is built from the series tagged required; optional
//! series are forward-filled onto that axis and dropped entirely when they
//! never cover any axis date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{ObservationSeries, SeriesRole};

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("Insufficient overlap: {found} common dates, need at least {required}")]
    InsufficientOverlap { found: usize, required: usize },

    #[error("No required series supplied")]
    NoRequiredSeries,
}

/// How the common date axis is built from the required series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisMode {
    /// Union of all required series' dates (default).
    Union,
    /// Only dates present in every required series.
    Intersection,
}

/// Aligner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Minimum axis length for a usable alignment.
    pub min_overlap: usize,
    /// Axis construction policy.
    pub axis_mode: AxisMode,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_overlap: 30,
            axis_mode: AxisMode::Union,
        }
    }
}

/// One series with its alignment role.
#[derive(Debug, Clone)]
pub struct AlignInput {
    pub series: ObservationSeries,
    pub role: SeriesRole,
}

impl AlignInput {
    pub fn required(series: ObservationSeries) -> Self {
        Self {
            series,
            role: SeriesRole::Required,
        }
    }

    pub fn optional(series: ObservationSeries) -> Self {
        Self {
            series,
            role: SeriesRole::Optional,
        }
    }
}

/// Aligned view of several series on a shared date axis.
///
/// `columns[id][i]` is the forward-filled value of series `id` at
/// `dates[i]`, or `None` for dates before that series' first observation.
/// Ephemeral: recomputed per invocation, never persisted.
#[derive(Debug, Clone, Default)]
pub struct AlignedFrame {
    pub dates: Vec<NaiveDate>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl AlignedFrame {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, series_id: &str) -> Option<&[Option<f64>]> {
        self.columns.get(series_id).map(Vec::as_slice)
    }

    /// Index of `date` on the axis, if present.
    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Index of the latest axis date on or before `date`.
    pub fn index_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        let end = self.dates.partition_point(|d| *d <= date);
        end.checked_sub(1)
    }

    /// Contiguous non-`None` values of a column up to and including `idx`.
    pub fn column_history(&self, series_id: &str, idx: usize) -> Vec<f64> {
        match self.columns.get(series_id) {
            Some(col) => col[..=idx.min(col.len() - 1)]
                .iter()
                .filter_map(|v| *v)
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Aligns raw series onto a common axis.
pub struct SeriesAligner {
    config: AlignerConfig,
}

impl SeriesAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Align `inputs` onto a shared date axis.
    ///
    /// Fails with `InsufficientOverlap` when the resulting axis is shorter
    /// than `min_overlap`. Optional series that would be `None` on every
    /// axis date are dropped from the frame rather than zero-filled.
    pub fn align(&self, inputs: &[AlignInput]) -> Result<AlignedFrame, AlignError> {
        let required: Vec<&ObservationSeries> = inputs
            .iter()
            .filter(|i| i.role.is_required())
            .map(|i| &i.series)
            .collect();

        if required.is_empty() {
            return Err(AlignError::NoRequiredSeries);
        }

        let dates = match self.config.axis_mode {
            AxisMode::Union => union_axis(&required),
            AxisMode::Intersection => intersection_axis(&required),
        };

        if dates.len() < self.config.min_overlap {
            return Err(AlignError::InsufficientOverlap {
                found: dates.len(),
                required: self.config.min_overlap,
            });
        }

        let mut columns = BTreeMap::new();
        for input in inputs {
            let col: Vec<Option<f64>> = dates
                .iter()
                .map(|d| input.series.value_at(*d))
                .collect();

            // An optional series with no coverage contributes nothing.
            if !input.role.is_required() && col.iter().all(Option::is_none) {
                continue;
            }

            columns.insert(input.series.series_id.clone(), col);
        }

        Ok(AlignedFrame { dates, columns })
    }
}

fn union_axis(series: &[&ObservationSeries]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points().iter().map(|(d, _)| *d))
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

fn intersection_axis(series: &[&ObservationSeries]) -> Vec<NaiveDate> {
    let (first, rest) = match series.split_first() {
        Some(split) => split,
        None => return Vec::new(),
    };

    first
        .points()
        .iter()
        .map(|(d, _)| *d)
        .filter(|d| rest.iter().all(|s| s.points().iter().any(|(sd, _)| sd == d)))
        .collect()
}
