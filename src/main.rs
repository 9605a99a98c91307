//! LeadForge: lead insights CLI
//!
//! This is the main entrypoint that orchestrates data loading, insight
//! generation and report output.

use anyhow::Context;
use clap::Parser;
use leadforge::{Args, InsightAggregator, InsightsRecord, Result};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Insights plus the dashboard link, as returned to the caller
#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    insights: &'a InsightsRecord,
    #[serde(rename = "Power BI Dashboard")]
    dashboard: &'a str,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries only the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let start_time = Instant::now();

    // Step 1: Load the lead table
    let loader = args.loader()?;
    debug!("Loading leads from {}", loader.describe());
    let load_start = Instant::now();
    let mut table = loader
        .load()
        .with_context(|| format!("could not load {}", loader.describe()))?;
    debug!("Load time: {:.2}s", load_start.elapsed().as_secs_f64());

    // Step 2: Generate insights
    let aggregator = InsightAggregator::new(&args.pipeline_config());
    let insights_start = Instant::now();
    let insights = aggregator
        .run(&mut table)
        .context("could not generate insights")?;
    debug!(
        "Insight generation time: {:.2}s",
        insights_start.elapsed().as_secs_f64()
    );

    // Step 3: Write the report
    let report = Report {
        insights: &insights,
        dashboard: &args.dashboard_url,
    };
    let json = serde_json::to_string_pretty(&report)?;

    match args.output {
        Some(ref path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("could not write report to {}", path))?;
            info!("Report saved to {}", path);
        }
        None => println!("{}", json),
    }

    info!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
