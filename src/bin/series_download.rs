//! FRED Series Downloader
//!
//! Downloads observation series from the FRED API and stores them in
//! Parquet format for the engine to consume.
//!
//! # Usage
//!
//! ```bash
//! # Set API key
//! export FRED_API_KEY=your-key
//!
//! # Check series availability
//! series-download explore
//!
//! # Download the default series set
//! series-download download --start 2015-01-01
//!
//! # Download specific series (FRED_ID=LOCAL_ID pairs)
//! series-download download --series GOLDPMGBD228NLBM=GOLD_PM_FIX,VIXCLS=VIX_CLOSE
//!
//! # Resume interrupted download
//! series-download download --resume
//!
//! # Validate cached data
//! series-download validate
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stresswatch::data::{FredClient, SeriesStore};

const SEPARATOR: &str = "============================================================";

/// Default FRED_ID=LOCAL_ID mapping for the production roster.
const DEFAULT_SERIES: &[(&str, &str)] = &[
    ("GOLDPMGBD228NLBM", "GOLD_PM_FIX"),
    ("SLVPRUSD", "SILVER_FIX"),
    ("PLATINUM", "PLATINUM_FIX"),
    ("CBBTCUSD", "BTC_USD"),
    ("CBETHUSD", "ETH_USD"),
    ("SP500", "SPX_CLOSE"),
    ("DFII10", "TIPS_10Y_YIELD"),
    ("VIXCLS", "VIX_CLOSE"),
];

/// FRED series downloader CLI.
#[derive(Parser)]
#[command(name = "series-download")]
#[command(about = "Download observation series from the FRED API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data output directory
    #[arg(long, default_value = "data/fred")]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Check series availability and metadata
    Explore {
        /// Comma-separated FRED_ID=LOCAL_ID pairs (default: production set)
        #[arg(long)]
        series: Option<String>,
    },

    /// Download series observations
    Download {
        /// Comma-separated FRED_ID=LOCAL_ID pairs (default: production set)
        #[arg(long)]
        series: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2015-01-01")]
        start: String,

        /// Resume from previous progress
        #[arg(long)]
        resume: bool,
    },

    /// Validate cached data
    Validate,
}

/// Download progress tracking.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DownloadProgress {
    completed_series: Vec<String>,
    total_observations: u64,
    total_requests_made: u64,
    last_updated: String,
    errors: Vec<DownloadError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownloadError {
    series_id: String,
    error: String,
    timestamp: String,
}

impl DownloadProgress {
    fn load(path: &PathBuf) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Self::default(),
            }
        } else {
            Self::default()
        }
    }

    fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Parse "FRED_ID=LOCAL_ID,..." into (fred_id, local_id) pairs.
fn parse_series_arg(arg: Option<String>) -> Result<Vec<(String, String)>> {
    match arg {
        None => Ok(DEFAULT_SERIES
            .iter()
            .map(|(f, l)| (f.to_string(), l.to_string()))
            .collect()),
        Some(s) => s
            .split(',')
            .map(|pair| {
                let (fred_id, local_id) = pair
                    .trim()
                    .split_once('=')
                    .with_context(|| format!("Expected FRED_ID=LOCAL_ID, got: {}", pair))?;
                Ok((fred_id.to_string(), local_id.to_string()))
            })
            .collect(),
    }
}

async fn cmd_explore(series: Vec<(String, String)>) -> Result<()> {
    let mut client = FredClient::from_env()?;

    println!("{}", SEPARATOR);
    println!("FRED API Exploration");
    println!("{}", SEPARATOR);

    println!("\nChecking series availability...");
    for (fred_id, local_id) in &series {
        match client.get_series_info(fred_id).await {
            Ok(info) => {
                println!(
                    "   {} ({}): {} [{}] {} to {}",
                    fred_id,
                    local_id,
                    info.title,
                    info.frequency_short,
                    info.observation_start,
                    info.observation_end
                );
            }
            Err(e) => {
                println!("   {} ({}): ERROR - {}", fred_id, local_id, e);
            }
        }
    }

    println!("\n{}", SEPARATOR);
    Ok(())
}

async fn cmd_download(
    data_dir: PathBuf,
    series: Vec<(String, String)>,
    start_date: NaiveDate,
    resume: bool,
) -> Result<()> {
    let mut client = FredClient::from_env()?;
    let store = SeriesStore::new(data_dir.to_str().context("Invalid data directory path")?);

    let progress_file = data_dir.join("download_progress.json");
    let mut progress = if resume {
        DownloadProgress::load(&progress_file)
    } else {
        DownloadProgress::default()
    };
    let completed: HashSet<String> = progress.completed_series.iter().cloned().collect();

    println!("\nDownload Plan:");
    println!("  Series: {}", series.len());
    println!("  Start date: {}", start_date);

    let pb = ProgressBar::new(series.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let start_time = Instant::now();

    for (fred_id, local_id) in &series {
        if completed.contains(local_id) {
            pb.inc(1);
            continue;
        }
        pb.set_message(local_id.clone());

        // Download with retries
        let mut fetched = None;
        for attempt in 0..3u32 {
            match client.get_observations(fred_id, start_date).await {
                Ok(observations) => {
                    fetched = Some(observations);
                    break;
                }
                Err(e) => {
                    if attempt < 2 {
                        tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(attempt)))
                            .await;
                    } else {
                        warn!(series_id = %fred_id, error = %e, "download failed");
                        progress.errors.push(DownloadError {
                            series_id: fred_id.clone(),
                            error: format!("{}", e),
                            timestamp: Utc::now().to_rfc3339(),
                        });
                    }
                }
            }
        }
        progress.total_requests_made += 1;

        if let Some(observations) = fetched {
            // Re-key under the engine's local id before caching.
            let renamed: Vec<_> = observations
                .into_iter()
                .map(|mut o| {
                    o.series_id = local_id.clone();
                    o
                })
                .collect();
            let cached = stresswatch::data::ObservationSeries::from_observations(
                local_id, &renamed,
            );

            if cached.is_empty() {
                warn!(series_id = %fred_id, "no observations returned");
            } else {
                progress.total_observations += cached.len() as u64;
                store.save_series(&cached)?;
                progress.completed_series.push(local_id.clone());
            }
        }

        progress.last_updated = Utc::now().to_rfc3339();
        progress.save(&progress_file)?;
        pb.inc(1);
    }

    pb.finish_with_message("complete");

    let elapsed = start_time.elapsed();
    println!("\nDownload Complete!");
    println!("  Total requests: {}", progress.total_requests_made);
    println!("  Total observations: {}", progress.total_observations);
    println!("  Elapsed time: {:.1} seconds", elapsed.as_secs_f64());
    println!("  Errors: {}", progress.errors.len());

    Ok(())
}

fn cmd_validate(data_dir: PathBuf) -> Result<()> {
    println!("Validating cached data...\n");

    let store = SeriesStore::new(data_dir.to_str().context("Invalid data directory path")?);
    let series_ids = store.available_series()?;

    if series_ids.is_empty() {
        println!("No cached series found in {}", data_dir.display());
        return Ok(());
    }

    for series_id in &series_ids {
        let rows = store.row_count(series_id)?;
        let (min_date, max_date) = store.date_range(series_id)?;
        println!("{}:", series_id);
        println!("  Observations: {}", rows);
        println!("  Date range: {} to {}", min_date, max_date);
        println!();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stresswatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    fs::create_dir_all(&cli.data_dir)?;

    match cli.command {
        Commands::Explore { series } => {
            cmd_explore(parse_series_arg(series)?).await?;
        }
        Commands::Download {
            series,
            start,
            resume,
        } => {
            let start_date = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
                .context("Invalid start date format")?;
            cmd_download(cli.data_dir, parse_series_arg(series)?, start_date, resume).await?;
        }
        Commands::Validate => {
            cmd_validate(cli.data_dir)?;
        }
    }

    Ok(())
}
