//! FRED API client for downloading observation series.
//!
//! API Constraints:
//! - Rate limit: 120 requests/minute per API key
//! - Missing values published as "." placeholders
//! - Dates formatted YYYY-MM-DD

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Frequency, ObservationSeries, RawObservation};

/// FRED API base URL.
const BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Minimum interval between requests (600ms = max 100 req/min, under limit).
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(600);

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FRED_API_KEY";

/// FRED API errors.
#[derive(Error, Debug)]
pub enum FredError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Missing API key: set FRED_API_KEY")]
    MissingApiKey,
}

/// Observations response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationsResponse {
    pub observations: Vec<RawFredObservation>,
}

/// Series metadata response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesResponse {
    pub seriess: Vec<SeriesInfo>,
}

/// Series metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub id: String,
    pub title: String,
    pub frequency_short: String,
    pub observation_start: String,
    pub observation_end: String,
}

impl SeriesInfo {
    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::from_str(&self.frequency_short)
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.observation_start, "%Y-%m-%d").ok()
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.observation_end, "%Y-%m-%d").ok()
    }
}

/// Raw observation record as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFredObservation {
    pub date: String,
    pub value: String,
}

impl RawFredObservation {
    /// Parse into a typed observation. The "." placeholder becomes a present
    /// date with no value.
    pub fn to_observation(&self, series_id: &str) -> Option<RawObservation> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        let value = if self.value == "." {
            None
        } else {
            Some(self.value.parse::<Decimal>().ok()?)
        };
        Some(RawObservation {
            series_id: series_id.to_string(),
            date,
            value,
        })
    }
}

/// FRED API client.
pub struct FredClient {
    client: Client,
    api_key: String,
    last_request: Instant,
    request_count: u64,
}

impl FredClient {
    /// Create a new FRED client.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            last_request: Instant::now() - MIN_REQUEST_INTERVAL,
            request_count: 0,
        }
    }

    /// Create a client from the `FRED_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, FredError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| FredError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Rate-limited request helper.
    async fn request<T: for<'de> Deserialize<'de>>(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FredError> {
        let elapsed = self.last_request.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }

        let url = format!("{}/{}", BASE_URL, endpoint);
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("api_key", &self.api_key));
        all_params.push(("file_type", "json"));

        let response = self.client.get(&url).query(&all_params).send().await?;

        self.last_request = Instant::now();
        self.request_count += 1;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FredError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FredError::ApiError(format!("{}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| FredError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Get series metadata.
    pub async fn get_series_info(&mut self, series_id: &str) -> Result<SeriesInfo, FredError> {
        let params = vec![("series_id", series_id)];
        let response: SeriesResponse = self.request("series", &params).await?;
        response
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| FredError::SeriesNotFound(series_id.to_string()))
    }

    /// Get raw observations for a series from `start` onward.
    pub async fn get_observations(
        &mut self,
        series_id: &str,
        start: NaiveDate,
    ) -> Result<Vec<RawObservation>, FredError> {
        let start_str = start.format("%Y-%m-%d").to_string();
        let params = vec![
            ("series_id", series_id),
            ("observation_start", start_str.as_str()),
        ];

        let response: ObservationsResponse = self.request("series/observations", &params).await?;
        Ok(response
            .observations
            .iter()
            .filter_map(|o| o.to_observation(series_id))
            .collect())
    }

    /// Fetch a full observation series, dropping "." placeholders.
    pub async fn get_series(
        &mut self,
        series_id: &str,
        start: NaiveDate,
    ) -> Result<ObservationSeries, FredError> {
        let observations = self.get_observations(series_id, start).await?;
        if observations.is_empty() {
            return Err(FredError::SeriesNotFound(series_id.to_string()));
        }
        Ok(ObservationSeries::from_observations(series_id, &observations))
    }
}
