mod clean;
mod config;
mod crawl;
mod db;
mod dedup;
mod errors;
mod export;
mod extract;
mod fetch;
mod model;
mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use clean::gazetteer::Gazetteer;
use config::{CrawlConfig, FetchBackend};
use fetch::{Fetcher, HttpFetcher, Politeness, SpiderFetcher};

#[derive(Parser)]
#[command(name = "directory_crawler", about = "Doctor directory crawler and cleaner")]
struct Cli {
    /// JSON config file (defaults apply to missing keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listings and profiles, then store the deduplicated records
    Crawl {
        /// Only these regions (repeatable)
        #[arg(short, long)]
        region: Vec<String>,
        /// Only these categories (repeatable)
        #[arg(short = 't', long)]
        category: Vec<String>,
        /// Listing pages per target
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
    },
    /// Re-clean stored rows and drop duplicates left by earlier runs
    Clean,
    /// Write stored rows to CSV
    Export {
        #[arg(short, long, default_value = "data/doctors.csv")]
        out: PathBuf,
    },
    /// Row count and per-column fill rates
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = CrawlConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Crawl {
            region,
            category,
            max_pages,
        } => {
            if !region.is_empty() {
                config.regions = region;
            }
            if !category.is_empty() {
                config.categories = category;
            }
            if let Some(n) = max_pages {
                config.max_pages = n;
            }
            config.validate()?;

            let gazetteer = Arc::new(load_gazetteer(&config)?);
            let fetcher = build_fetcher(&config)?;
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;

            let summary = pipeline::run(&config, fetcher, gazetteer).await?;
            let rows: Vec<_> = summary.records.iter().map(|r| r.to_row()).collect();
            let saved = db::save_rows(&conn, &rows)?;

            let partial = summary.reports.iter().filter(|r| r.is_partial()).count();
            println!(
                "Saved {} records from {} targets ({} partial, {} duplicates merged).",
                saved,
                summary.reports.len(),
                partial,
                summary.dedup.superseded + summary.dedup.rejected
            );
            Ok(())
        }
        Commands::Clean => {
            let gazetteer = load_gazetteer(&config)?;
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let s = db::apply_clean(&conn, &gazetteer)?;
            info!(
                "Cleaned {} rows: {} changed, {} locations cleared, {} resolved, {} duplicates removed",
                s.total, s.changed, s.locations_cleared, s.locations_resolved, s.duplicates_removed
            );
            println!("Rows:      {}", s.total);
            println!("Changed:   {}", s.changed);
            println!("Cleared:   {}", s.locations_cleared);
            println!("Resolved:  {}", s.locations_resolved);
            println!("Removed:   {}", s.duplicates_removed);
            Ok(())
        }
        Commands::Export { out } => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let rows: Vec<_> = db::fetch_rows(&conn)?.into_iter().map(|(_, r)| r).collect();
            export::export_csv(&out, &rows)?;
            println!("Wrote {} rows to {}", rows.len(), out.display());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total: {}", s.total);
            for (column, filled) in &s.filled {
                let rate = s.fill_rate(column).unwrap_or(0.0);
                println!("  {:<12} {:>7} {:>6.1}%", column, filled, rate);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// A configured gazetteer that fails to load stops the command; without one
/// the built-in table is used.
fn load_gazetteer(config: &CrawlConfig) -> anyhow::Result<Gazetteer> {
    let gazetteer = match &config.gazetteer_path {
        Some(path) => Gazetteer::load(path, config.max_resolve_radius_km)?,
        None => Gazetteer::builtin(config.max_resolve_radius_km),
    };
    info!("Gazetteer: {} areas", gazetteer.len());
    Ok(gazetteer)
}

fn build_fetcher(config: &CrawlConfig) -> anyhow::Result<Arc<dyn Fetcher>> {
    let politeness = Arc::new(Politeness::new(config.politeness_interval()));
    let fetcher: Arc<dyn Fetcher> = match config.backend {
        FetchBackend::Http => Arc::new(HttpFetcher::new(config, politeness)?),
        FetchBackend::Spider => Arc::new(
            SpiderFetcher::from_env(politeness).context("Spider backend unavailable")?,
        ),
    };
    Ok(fetcher)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
