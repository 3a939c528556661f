//! Parquet-backed series store.
//!
//! The downloader writes one parquet file per series; the engine reads them
//! back through the [`SeriesProvider`] impl. Files hold normalized rows
//! with two columns: date (string, YYYY-MM-DD) and value (f64).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use super::provider::{FetchError, SeriesProvider};
use super::types::ObservationSeries;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet store for observation series.
pub struct SeriesStore {
    data_dir: String,
}

impl SeriesStore {
    /// Create a store pointing at the series data directory.
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    fn parquet_path(&self, series_id: &str) -> String {
        format!("{}/series/{}.parquet", self.data_dir, series_id)
    }

    /// List series ids with a cached file.
    pub fn available_series(&self) -> Result<Vec<String>, StoreError> {
        let dir_path = format!("{}/series", self.data_dir);
        let path = Path::new(&dir_path);

        if !path.exists() {
            return Ok(vec![]);
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".parquet") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn contains(&self, series_id: &str) -> bool {
        Path::new(&self.parquet_path(series_id)).exists()
    }

    /// Write a series, replacing any existing file.
    pub fn save_series(&self, series: &ObservationSeries) -> Result<(), StoreError> {
        let path = PathBuf::from(self.parquet_path(&series.series_id));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let dates: Vec<String> = series
            .points()
            .iter()
            .map(|(d, _)| d.to_string())
            .collect();
        let values: Vec<f64> = series.points().iter().map(|(_, v)| *v).collect();

        let mut df = DataFrame::new(vec![
            Series::new("date".into(), dates).into(),
            Series::new("value".into(), values).into(),
        ])?;

        let file = std::fs::File::create(&path)?;
        ParquetWriter::new(file).finish(&mut df)?;
        Ok(())
    }

    /// Load raw parquet data for a series as a LazyFrame.
    pub fn load_lazy(&self, series_id: &str) -> Result<LazyFrame, StoreError> {
        let path = self.parquet_path(series_id);
        if !Path::new(&path).exists() {
            return Err(StoreError::FileNotFound(path));
        }
        let lf = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?;
        Ok(lf)
    }

    /// Load a full series from its cached file.
    pub fn load_series(&self, series_id: &str) -> Result<ObservationSeries, StoreError> {
        self.load_series_from(series_id, None)
    }

    /// Load a series filtered to dates on or after `start`.
    pub fn load_series_from(
        &self,
        series_id: &str,
        start: Option<NaiveDate>,
    ) -> Result<ObservationSeries, StoreError> {
        let mut lf = self.load_lazy(series_id)?;
        if let Some(start) = start {
            // Dates stored as strings; lexicographic order matches date order.
            lf = lf.filter(col("date").gt_eq(lit(start.to_string())));
        }
        let df = lf.collect()?;

        let date_col = df.column("date")?;
        let value_col = df.column("value")?;

        let dates = date_col
            .str()
            .map_err(|_| StoreError::InvalidData("date column has unexpected type".to_string()))?;
        let values = value_col
            .f64()
            .map_err(|_| StoreError::InvalidData("value column has unexpected type".to_string()))?;

        let points: Vec<(NaiveDate, f64)> = dates
            .into_iter()
            .zip(values.into_iter())
            .filter_map(|(d, v)| {
                let date = d.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
                Some((date, v?))
            })
            .collect();

        Ok(ObservationSeries::from_points(series_id, points))
    }

    /// Date range covered by a cached series.
    pub fn date_range(&self, series_id: &str) -> Result<(NaiveDate, NaiveDate), StoreError> {
        let lf = self.load_lazy(series_id)?;
        let stats = lf
            .select([
                col("date").min().alias("min_date"),
                col("date").max().alias("max_date"),
            ])
            .collect()?;

        let min_str = stats
            .column("min_date")?
            .str()?
            .get(0)
            .ok_or_else(|| StoreError::InvalidData("No min date".to_string()))?;
        let max_str = stats
            .column("max_date")?
            .str()?
            .get(0)
            .ok_or_else(|| StoreError::InvalidData("No max date".to_string()))?;

        let min_date = NaiveDate::parse_from_str(min_str, "%Y-%m-%d")
            .map_err(|e| StoreError::InvalidData(format!("Invalid min date: {}", e)))?;
        let max_date = NaiveDate::parse_from_str(max_str, "%Y-%m-%d")
            .map_err(|e| StoreError::InvalidData(format!("Invalid max date: {}", e)))?;

        Ok((min_date, max_date))
    }

    /// Row count of a cached series.
    pub fn row_count(&self, series_id: &str) -> Result<usize, StoreError> {
        let lf = self.load_lazy(series_id)?;
        let df = lf.select([col("date")]).collect()?;
        Ok(df.height())
    }
}

impl SeriesProvider for SeriesStore {
    fn fetch_series(
        &self,
        series_id: &str,
        start: NaiveDate,
    ) -> Result<ObservationSeries, FetchError> {
        match self.load_series_from(series_id, Some(start)) {
            Ok(series) if series.is_empty() => Err(FetchError::NotFound(series_id.to_string())),
            Ok(series) => Ok(series),
            Err(StoreError::FileNotFound(_)) => Err(FetchError::NotFound(series_id.to_string())),
            Err(e) => Err(FetchError::Provider(e.to_string())),
        }
    }
}
