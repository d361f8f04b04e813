mod analysis;
mod config;
mod data;
mod error;
mod pipeline;
mod presentation;

use anyhow::Context;
use config::Config;
use data::{Metric, YahooChartProvider};
use dotenv::dotenv;
use pipeline::AnalysisSnapshot;
use tracing_subscriber::EnvFilter;

/// Prints the per-metric summary of a finished run.
///
/// For each of CCL, MEP and Canje shows how many rows survived filtering and
/// the x/y extrema the range controls were built from.
fn print_summary(snapshot: &AnalysisSnapshot) {
    let stats = &snapshot.stats;

    println!("\nCEDEAR Analysis ({})", snapshot.computed_at.format("%Y-%m-%d %H:%M UTC"));
    println!("Reference rows: {}", stats.rows_loaded);
    println!(
        "Tickers quoted: {} of {}",
        stats.quotes_received, stats.tickers_requested
    );
    if !stats.unavailable_tickers.is_empty() {
        println!("Without data: {}", stats.unavailable_tickers.join(", "));
    }
    println!("Fully quoted rows: {}", stats.rows_complete);
    println!("Rows past liquidity gate: {}", stats.rows_liquid);

    for metric in Metric::ALL {
        println!("\n{}", metric.title());
        let Some(view) = snapshot.view(metric).filter(|v| !v.is_empty()) else {
            println!("No rows survived filtering");
            continue;
        };
        if let (Some(x), Some(y)) = (view.x_extent(), view.y_extent()) {
            println!("Rows: {}", view.points.len());
            println!("X_{}: {:.4} .. {:.4}", metric, x.min, x.max);
            println!("Y_{}: {:.2} .. {:.2}", metric, y.min, y.max);
        }
    }
}

/// Computes the CCL, MEP and Canje views once, then hands them to the
/// interactive explorer (unless running headless) and prints a summary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Logs go to stderr so they never draw over the explorer on stdout
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let provider = YahooChartProvider::new(&config.provider_url, config.request_timeout)?;

    let snapshot = pipeline::compute(&config, provider).await?;

    if !config.headless {
        presentation::run(&snapshot).context("interactive view failed")?;
    }

    print_summary(&snapshot);

    Ok(())
}
