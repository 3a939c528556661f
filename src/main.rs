//! # Compute the latest stability reading
//! stresswatch compute --data data/fred
//!
//! # Backfill readings over a date range
//! stresswatch backfill --data data/fred --start 2022-01-01 --end 2024-01-01
//!
//! # Print regime segment history
//! stresswatch history --data data/fred --start 2022-01-01 --end 2024-01-01
//!
//! # Component breakdown for one date
//! stresswatch breakdown --data data/fred --date 2023-06-15

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use stresswatch::data::SeriesStore;
use stresswatch::engine::{ComputeOutcome, EngineConfig, StabilityEngine};

#[derive(Parser)]
#[command(name = "stresswatch")]
#[command(about = "Composite market stability indicator engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to series data directory
    #[arg(long, default_value = "data/fred")]
    data: String,

    /// Fetch horizon start date (YYYY-MM-DD)
    #[arg(long, default_value = "2015-01-01")]
    history_start: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the reading for one date (default: today)
    Compute {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Compute every available date in a range, ascending
    Backfill {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Print regime segment history over a range
    History {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Print the component breakdown for one date
    Breakdown {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {} (expected YYYY-MM-DD)", s))
}

fn build_engine(cli: &Cli) -> Result<StabilityEngine> {
    let history_start = parse_date(&cli.history_start)?;
    let store = SeriesStore::new(&cli.data);
    let config = EngineConfig::default_market(history_start);
    Ok(StabilityEngine::new(config, Arc::new(store)))
}

fn print_outcome(date: NaiveDate, outcome: &ComputeOutcome) {
    match outcome {
        ComputeOutcome::Reading(r) => {
            println!(
                "{}  score {:>5.1}  pressure {:.3}  {} (conf {:.2})  driver {}  mult {:.2} [{}]{}",
                date,
                r.stability_score,
                r.pressure_index,
                r.regime.as_str(),
                r.regime_confidence,
                r.primary_driver.as_str(),
                r.multiplier.value,
                r.multiplier.regime.as_str(),
                if r.degraded { "  DEGRADED" } else { "" },
            );
        }
        ComputeOutcome::Insufficient { completeness } => {
            println!(
                "{}  no reading (component coverage {:.0}%)",
                date,
                completeness * 100.0
            );
        }
    }
}

fn cmd_compute(cli: &Cli, date: Option<String>) -> Result<()> {
    let date = match date {
        Some(s) => parse_date(&s)?,
        None => Utc::now().date_naive(),
    };

    let mut engine = build_engine(cli)?;
    let outcome = engine.compute(date)?;
    print_outcome(date, &outcome);

    if let ComputeOutcome::Reading(r) = &outcome {
        println!(
            "  subsystems: metals {:.3} ({} present), crypto {:.3} ({} present)",
            r.subsystems.metals,
            r.subsystems.metals_present,
            r.subsystems.crypto,
            r.subsystems.crypto_present
        );
        if let Some(stress) = r.stress_type {
            println!("  stress type: {}", stress.as_str());
        }
        if r.flags.is_critical || r.flags.is_transitioning || r.flags.circuit_breaker_active {
            println!(
                "  flags: critical={} transitioning={} circuit_breaker={}",
                r.flags.is_critical, r.flags.is_transitioning, r.flags.circuit_breaker_active
            );
        }
    }
    Ok(())
}

fn cmd_backfill(cli: &Cli, start: String, end: Option<String>) -> Result<()> {
    let start = parse_date(&start)?;
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => Utc::now().date_naive(),
    };

    let mut engine = build_engine(cli)?;
    let results = engine.backfill(start, end)?;

    let readings = results
        .iter()
        .filter(|(_, o)| matches!(o, ComputeOutcome::Reading(_)))
        .count();
    for (date, outcome) in &results {
        print_outcome(*date, outcome);
    }
    println!("\n{} dates processed, {} readings", results.len(), readings);
    Ok(())
}

fn cmd_history(cli: &Cli, start: String, end: Option<String>) -> Result<()> {
    let start = parse_date(&start)?;
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => Utc::now().date_naive(),
    };

    let mut engine = build_engine(cli)?;
    engine.backfill(start, end)?;

    println!("Regime history:");
    for segment in engine.regime_history() {
        let end_str = segment
            .regime_end
            .map(|d| d.to_string())
            .unwrap_or_else(|| "ongoing".to_string());
        println!(
            "  {} -> {}  {:<18} {:>4} days  avg {:>5.1}  min {:>5.1}  max {:>5.1}",
            segment.regime_start,
            end_str,
            segment.regime.as_str(),
            segment.duration_days,
            segment.avg_score,
            segment.min_score,
            segment.max_score
        );
    }
    Ok(())
}

fn cmd_breakdown(cli: &Cli, date: String) -> Result<()> {
    let date = parse_date(&date)?;

    let mut engine = build_engine(cli)?;
    let outcome = engine.compute(date)?;
    print_outcome(date, &outcome);

    if let Some(components) = engine.component_breakdown(date) {
        println!("\nComponents:");
        for c in components {
            match c.value {
                Some(v) => println!("  {:<28} {:<8} {:.3}", c.name, c.subsystem.as_str(), v),
                None => println!("  {:<28} {:<8} absent", c.name, c.subsystem.as_str()),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stresswatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Compute { date } => cmd_compute(&cli, date.clone()),
        Commands::Backfill { start, end } => cmd_backfill(&cli, start.clone(), end.clone()),
        Commands::History { start, end } => cmd_history(&cli, start.clone(), end.clone()),
        Commands::Breakdown { date } => cmd_breakdown(&cli, date.clone()),
    }
}
