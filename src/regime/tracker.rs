//! Regime segment history tracking.
//!
//! A strictly sequential state machine: exactly one open segment exists at
//! any time, and advancing it with a new date either extends the open
//! segment (same regime) or closes it and opens a new one (regime change).
//! Closing computes summary stats over every reading in `[start, end)`.
//! Dates must arrive in non-decreasing order; the tracker cannot be
//! parallelized across dates because each transition depends on the prior
//! segment's state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::classifier::StabilityRegime;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Out-of-order regime advance: {given} after {last}")]
    OutOfOrder { last: NaiveDate, given: NaiveDate },
}

/// A maximal contiguous date range with one regime label.
///
/// `regime_end` is `None` for the single ongoing segment. Consecutive
/// segments share a boundary date: a closed segment covers
/// `[regime_start, regime_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSegment {
    pub regime_start: NaiveDate,
    pub regime_end: Option<NaiveDate>,
    pub regime: StabilityRegime,
    pub duration_days: i64,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone)]
struct OpenSegment {
    start: NaiveDate,
    regime: StabilityRegime,
    /// Readings inside this segment, ascending by date.
    scores: Vec<(NaiveDate, f64)>,
}

impl OpenSegment {
    fn stats(&self) -> (f64, f64, f64) {
        if self.scores.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        for (_, s) in &self.scores {
            min = min.min(*s);
            max = max.max(*s);
            sum += *s;
        }
        (sum / self.scores.len() as f64, min, max)
    }

    fn to_segment(&self, end: Option<NaiveDate>, last_date: NaiveDate) -> RegimeSegment {
        let (avg, min, max) = self.stats();
        let span_end = end.unwrap_or(last_date);
        RegimeSegment {
            regime_start: self.start,
            regime_end: end,
            regime: self.regime,
            duration_days: (span_end - self.start).num_days().max(0) + i64::from(end.is_none()),
            avg_score: avg,
            min_score: min,
            max_score: max,
        }
    }
}

/// Sequential regime segment tracker.
#[derive(Debug, Clone, Default)]
pub struct RegimeTracker {
    closed: Vec<RegimeSegment>,
    open: Option<OpenSegment>,
    last_date: Option<NaiveDate>,
}

impl RegimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state machine with one date's classified regime.
    ///
    /// Re-advancing the most recent date is an idempotent upsert of that
    /// date's score; a strictly earlier date is rejected.
    pub fn advance(
        &mut self,
        date: NaiveDate,
        regime: StabilityRegime,
        score: f64,
    ) -> Result<(), TrackerError> {
        if let Some(last) = self.last_date {
            if date < last {
                return Err(TrackerError::OutOfOrder { last, given: date });
            }
            if date == last {
                return self.readvance_same_date(date, regime, score);
            }
        }

        match &mut self.open {
            None => {
                self.open = Some(OpenSegment {
                    start: date,
                    regime,
                    scores: vec![(date, score)],
                });
            }
            Some(open) if open.regime == regime => {
                open.scores.push((date, score));
            }
            Some(open) => {
                debug!(
                    from = open.regime.as_str(),
                    to = regime.as_str(),
                    %date,
                    "regime transition"
                );
                let closed = open.to_segment(Some(date), date);
                self.closed.push(closed);
                self.open = Some(OpenSegment {
                    start: date,
                    regime,
                    scores: vec![(date, score)],
                });
            }
        }

        self.last_date = Some(date);
        Ok(())
    }

    /// Recompute of the date already at the head of the chain.
    fn readvance_same_date(
        &mut self,
        date: NaiveDate,
        regime: StabilityRegime,
        score: f64,
    ) -> Result<(), TrackerError> {
        if let Some(open) = &mut self.open {
            if open.regime == regime {
                if let Some(last) = open.scores.last_mut() {
                    *last = (date, score);
                }
            } else if open.start == date && open.scores.len() == 1 {
                // The segment was opened by this very date; a changed
                // classification rewrites it in place.
                open.regime = regime;
                open.scores = vec![(date, score)];
            }
            // A same-date regime flip on an older segment would require
            // rewriting closed history; the sequential pass is
            // authoritative, so it is ignored.
        }
        Ok(())
    }

    /// All segments in order, the open one last with `regime_end = None`.
    pub fn history(&self) -> Vec<RegimeSegment> {
        let mut out = self.closed.clone();
        if let (Some(open), Some(last)) = (&self.open, self.last_date) {
            out.push(open.to_segment(None, last));
        }
        out
    }

    /// The ongoing segment, if any date has been processed.
    pub fn current(&self) -> Option<RegimeSegment> {
        match (&self.open, self.last_date) {
            (Some(open), Some(last)) => Some(open.to_segment(None, last)),
            _ => None,
        }
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }
}
