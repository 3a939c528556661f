//! Core data types for series ingestion.
//!
//! These types represent raw provider observations and the in-memory series
//! the engine computes over. Raw values arrive as `Decimal` (providers report
//! exact quoted values); everything downstream of ingestion works in `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Update cadence of a series, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Irregular,
}

impl Frequency {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "D" | "DAILY" => Some(Self::Daily),
            "W" | "WEEKLY" => Some(Self::Weekly),
            "M" | "MONTHLY" => Some(Self::Monthly),
            "I" | "IRREGULAR" => Some(Self::Irregular),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "D",
            Self::Weekly => "W",
            Self::Monthly => "M",
            Self::Irregular => "I",
        }
    }
}

/// Whether a series is required for a computation or merely enriches it.
///
/// A required series failing to fetch aborts the computation; an optional
/// series failing to fetch only triggers weight redistribution or component
/// absence downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesRole {
    Required,
    Optional,
}

impl SeriesRole {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }
}

/// A single provider datum. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Provider series identifier (e.g., "GOLD_PM_FIX", "BTC_USD").
    pub series_id: String,

    /// Observation date.
    pub date: NaiveDate,

    /// Observed value. `None` when the provider reported the date but no
    /// value (FRED publishes "." placeholders).
    pub value: Option<Decimal>,
}

impl RawObservation {
    pub fn new(series_id: &str, date: NaiveDate, value: Decimal) -> Self {
        Self {
            series_id: series_id.to_string(),
            date,
            value: Some(value),
        }
    }

    /// Value as f64 for computation, if present.
    pub fn value_f64(&self) -> Option<f64> {
        self.value.and_then(|v| v.try_into().ok())
    }
}

/// An ordered series of dated values for one series id.
///
/// Invariant: points are sorted ascending by date with no duplicate dates.
/// Construct through `from_points` to get that invariant enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    pub series_id: String,
    points: Vec<(NaiveDate, f64)>,
}

impl ObservationSeries {
    /// Build a series from unordered points. Sorts, and on duplicate dates
    /// keeps the last value seen (provider revisions overwrite).
    pub fn from_points(series_id: &str, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(d, _)| *d);
        points.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1 = b.1;
                true
            } else {
                false
            }
        });
        Self {
            series_id: series_id.to_string(),
            points,
        }
    }

    /// Build from raw observations, dropping missing values.
    pub fn from_observations(series_id: &str, obs: &[RawObservation]) -> Self {
        let points = obs
            .iter()
            .filter(|o| o.series_id == series_id)
            .filter_map(|o| o.value_f64().map(|v| (o.date, v)))
            .collect();
        Self::from_points(series_id, points)
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }

    /// Last value on or before `date` (forward-fill lookup).
    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        match self.points.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(idx) => Some(self.points[idx].1),
            Err(0) => None,
            Err(idx) => Some(self.points[idx - 1].1),
        }
    }

    /// All points up to and including `date`, at the raw cadence.
    pub fn values_through(&self, date: NaiveDate) -> &[(NaiveDate, f64)] {
        let end = self.points.partition_point(|(d, _)| *d <= date);
        &self.points[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!(Frequency::from_str("d"), Some(Frequency::Daily));
        assert_eq!(Frequency::from_str("MONTHLY"), Some(Frequency::Monthly));
        assert_eq!(Frequency::from_str("X"), None);
    }

    #[test]
    fn test_observation_value() {
        let obs = RawObservation::new("GOLD_PM_FIX", d(2024, 1, 2), dec!(2065.40));
        assert_eq!(obs.value_f64(), Some(2065.40));

        let missing = RawObservation {
            series_id: "GOLD_PM_FIX".to_string(),
            date: d(2024, 1, 3),
            value: None,
        };
        assert_eq!(missing.value_f64(), None);
    }

    #[test]
    fn test_series_sorts_and_dedups() {
        let series = ObservationSeries::from_points(
            "BTC_USD",
            vec![
                (d(2024, 1, 3), 43_000.0),
                (d(2024, 1, 1), 42_000.0),
                (d(2024, 1, 3), 43_500.0), // revision wins
            ],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[1], (d(2024, 1, 3), 43_500.0));
    }

    #[test]
    fn test_value_at_forward_fill() {
        let series = ObservationSeries::from_points(
            "M2_MONTHLY",
            vec![(d(2024, 1, 1), 20.8), (d(2024, 2, 1), 20.9)],
        );
        assert_eq!(series.value_at(d(2023, 12, 31)), None);
        assert_eq!(series.value_at(d(2024, 1, 1)), Some(20.8));
        assert_eq!(series.value_at(d(2024, 1, 15)), Some(20.8));
        assert_eq!(series.value_at(d(2024, 3, 1)), Some(20.9));
    }

    #[test]
    fn test_values_through() {
        let series = ObservationSeries::from_points(
            "SLV_CLOSE",
            vec![
                (d(2024, 1, 1), 23.0),
                (d(2024, 1, 2), 23.5),
                (d(2024, 1, 3), 22.9),
            ],
        );
        assert_eq!(series.values_through(d(2024, 1, 2)).len(), 2);
        assert_eq!(series.values_through(d(2023, 1, 1)).len(), 0);
    }
}
