use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analysis::MetricView;
use crate::config::Config;
use crate::data::{
    derive_all, liquidity_gate, retain_quoted, Metric, QuoteFetcher, QuoteProvider, ReferenceTable,
};

/// Row and ticker counts recorded at each stage of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub rows_loaded: usize,
    pub tickers_requested: usize,
    pub quotes_received: usize,
    pub unavailable_tickers: Vec<String>,
    pub rows_complete: usize,
    pub rows_liquid: usize,
}

/// Everything the presentation layer needs, computed once per run.
#[derive(Debug, Clone)]
pub struct AnalysisSnapshot {
    pub views: Vec<MetricView>,
    pub stats: RunStats,
    pub computed_at: DateTime<Utc>,
}

impl AnalysisSnapshot {
    pub fn view(&self, metric: Metric) -> Option<&MetricView> {
        self.views.iter().find(|v| v.metric == metric)
    }
}

/// Filter settings applied after derivation.
#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub liquidity_floor: f64,
    pub iqr_multiplier: f64,
}

impl From<&Config> for FilterSettings {
    fn from(config: &Config) -> Self {
        Self {
            liquidity_floor: config.liquidity_floor,
            iqr_multiplier: config.iqr_multiplier,
        }
    }
}

/// Fetches quotes for `table`, derives the three metrics and filters them.
///
/// This is the only place quotes are requested; the presentation layer works
/// exclusively from the returned snapshot.
///
/// # Arguments
/// * `table`: The loaded reference rows
/// * `fetcher`: Quote fetcher wrapping the market-data provider
/// * `settings`: Liquidity floor and IQR multiplier
///
/// # Behavior
/// - Requests every distinct ticker once
/// - Drops rows with any unquoted ticker before deriving anything
/// - Applies the joint liquidity gate, then trims outliers per metric
///
/// # Errors
/// Returns an error only if derivation meets an unquoted ticker, which the
/// completeness filter rules out
///
/// # Returns
/// One `MetricView` per metric, in CCL, MEP, Canje order, plus run statistics
pub async fn analyze<P: QuoteProvider>(
    table: &ReferenceTable,
    fetcher: &QuoteFetcher<P>,
    settings: FilterSettings,
) -> Result<AnalysisSnapshot> {
    if table.is_empty() {
        warn!("Reference table has no usable rows");
    }
    let tickers = table.distinct_tickers();
    info!(rows = table.len(), tickers = tickers.len(), "Fetching quotes");

    let book = fetcher.fetch_all(&tickers).await;
    if book.is_empty() {
        warn!("Provider returned no quotes; every view will be empty");
    }

    let complete = retain_quoted(&table.rows, &book);
    let derived = derive_all(&complete, &book)
        .context("derivation ran against a row with an unquoted ticker")?;
    let liquid = liquidity_gate(derived, settings.liquidity_floor);

    let views = Metric::ALL
        .iter()
        .map(|&metric| MetricView::build(metric, &liquid, settings.iqr_multiplier))
        .collect();

    Ok(AnalysisSnapshot {
        views,
        stats: RunStats {
            rows_loaded: table.len(),
            tickers_requested: tickers.len(),
            quotes_received: book.len(),
            unavailable_tickers: book.unavailable().to_vec(),
            rows_complete: complete.len(),
            rows_liquid: liquid.len(),
        },
        computed_at: Utc::now(),
    })
}

/// Runs the whole compute phase for one invocation.
///
/// # Arguments
/// * `config`: Supplies the reference table path and filter settings
/// * `provider`: Market-data source used for every quote request
///
/// # Errors
/// Returns an error if the reference table cannot be loaded
///
/// # Returns
/// The snapshot the explorer and the summary are rendered from
pub async fn compute<P: QuoteProvider>(config: &Config, provider: P) -> Result<AnalysisSnapshot> {
    let table = ReferenceTable::load(&config.reference_path).with_context(|| {
        format!(
            "could not read reference table {}",
            config.reference_path.display()
        )
    })?;

    let fetcher = QuoteFetcher::new(provider);
    analyze(&table, &fetcher, FilterSettings::from(config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ingestion::tests::StaticProvider;
    use crate::data::InstrumentMapping;

    fn mapping(local: &str, dollar: &str, underlying: &str, ratio: f64) -> InstrumentMapping {
        InstrumentMapping {
            local_ticker: local.to_string(),
            dollar_ticker: dollar.to_string(),
            underlying_ticker: underlying.to_string(),
            ratio,
        }
    }

    fn settings() -> FilterSettings {
        FilterSettings {
            liquidity_floor: 1.0,
            iqr_multiplier: 1.5,
        }
    }

    #[tokio::test]
    async fn test_single_row_example_survives() {
        let table = ReferenceTable::from(vec![mapping("X", "XD", "U", 10.0)]);
        let provider =
            StaticProvider::new(&[("X", 100.0, 50.0), ("XD", 0.9, 60.0), ("U", 1000.0, 1_000_000.0)]);
        let fetcher = QuoteFetcher::new(provider);

        let snapshot = analyze(&table, &fetcher, settings()).await.unwrap();

        let ccl = snapshot.view(Metric::Ccl).unwrap();
        assert_eq!(ccl.points.len(), 1);
        assert!((ccl.points[0].x - 1.0).abs() < 1e-12);
        assert!((ccl.points[0].y - 5000.0).abs() < 1e-9);

        let canje = snapshot.view(Metric::Canje).unwrap();
        assert_eq!(canje.points[0].label, "XD");
        assert_eq!(snapshot.stats.rows_liquid, 1);
    }

    #[tokio::test]
    async fn test_unquoted_shared_ticker_is_excluded_from_every_view() {
        let table = ReferenceTable::from(vec![
            mapping("A.BA", "AD.BA", "GONE", 5.0),
            mapping("B.BA", "BD.BA", "GONE", 2.0),
            mapping("C.BA", "CD.BA", "C", 1.0),
        ]);
        let provider = StaticProvider::new(&[
            ("A.BA", 10.0, 10.0),
            ("AD.BA", 0.01, 1000.0),
            ("B.BA", 10.0, 10.0),
            ("BD.BA", 0.01, 1000.0),
            ("C.BA", 10.0, 10.0),
            ("CD.BA", 0.01, 1000.0),
            ("C", 5.0, 100.0),
        ]);
        let fetcher = QuoteFetcher::new(provider);

        let snapshot = analyze(&table, &fetcher, settings()).await.unwrap();

        for view in &snapshot.views {
            assert!(view
                .points
                .iter()
                .all(|p| !p.label.starts_with('A') && !p.label.starts_with('B')));
        }
        assert_eq!(snapshot.stats.unavailable_tickers, vec!["GONE".to_string()]);
        assert_eq!(snapshot.stats.rows_complete, 1);
        assert_eq!(snapshot.stats.tickers_requested, 7);
    }

    #[tokio::test]
    async fn test_all_tickers_unavailable_yields_empty_views() {
        let table = ReferenceTable::from(vec![mapping("X", "XD", "U", 10.0)]);
        let fetcher = QuoteFetcher::new(StaticProvider::new(&[]));

        let snapshot = analyze(&table, &fetcher, settings()).await.unwrap();

        assert_eq!(snapshot.views.len(), 3);
        assert!(snapshot.views.iter().all(|v| v.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_reference_table_requests_nothing() {
        let table = ReferenceTable::default();
        let fetcher = QuoteFetcher::new(StaticProvider::new(&[("X", 1.0, 1.0)]));

        let snapshot = analyze(&table, &fetcher, settings()).await.unwrap();

        assert_eq!(snapshot.stats.tickers_requested, 0);
        assert_eq!(snapshot.stats.quotes_received, 0);
        for metric in Metric::ALL {
            assert!(snapshot.view(metric).is_some_and(|v| v.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_compute_surfaces_missing_reference_file() {
        let config = Config {
            reference_path: "does/not/exist.csv".into(),
            ..Config::default()
        };

        let result = compute(&config, StaticProvider::new(&[])).await;
        assert!(result.is_err());
    }
}
