use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CedearError, Result};

/// Latest trade price and traded volume for one ticker.
///
/// A `Quote` is always complete: a ticker either has both fields or is absent
/// from the `QuoteBook` altogether.
///
/// # Fields
/// * `last_price`: Close of the most recent session bar, always positive
/// * `last_volume`: Volume traded in that bar
/// * `as_of`: Start of the session bar, when the provider reports it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: f64,
    pub last_volume: f64,
    pub as_of: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl Quote {
    pub fn new(last_price: f64, last_volume: f64) -> Self {
        Self {
            last_price,
            last_volume,
            as_of: None,
        }
    }
}

/// Quotes gathered during one run, keyed by ticker.
///
/// Prices and volumes live in the same entry, so every ticker with a price
/// also has a volume and vice versa.
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    quotes: HashMap<String, Quote>,
    unavailable: Vec<String>,
}

impl QuoteBook {
    pub fn insert(&mut self, ticker: impl Into<String>, quote: Quote) {
        self.quotes.insert(ticker.into(), quote);
    }

    pub fn mark_unavailable(&mut self, ticker: impl Into<String>) {
        self.unavailable.push(ticker.into());
    }

    pub fn get(&self, ticker: &str) -> Option<&Quote> {
        self.quotes.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.quotes.contains_key(ticker)
    }

    /// Tickers that were requested but produced no usable quote.
    pub fn unavailable(&self) -> &[String] {
        &self.unavailable
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

// Accessors for tests
#[cfg(test)]
impl QuoteBook {
    pub fn price(&self, ticker: &str) -> Option<f64> {
        self.get(ticker).map(|q| q.last_price)
    }

    pub fn volume(&self, ticker: &str) -> Option<f64> {
        self.get(ticker).map(|q| q.last_volume)
    }
}

#[cfg(test)]
impl FromIterator<(String, Quote)> for QuoteBook {
    fn from_iter<I: IntoIterator<Item = (String, Quote)>>(iter: I) -> Self {
        Self {
            quotes: iter.into_iter().collect(),
            unavailable: Vec::new(),
        }
    }
}

/// A source of latest-session quotes, queried one symbol at a time.
///
/// Implementations return `QuoteUnavailable` when the symbol is unknown,
/// delisted or has no complete bar for the session, and `Provider` when the
/// request itself failed.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn latest_quote(&self, symbol: &str) -> Result<Quote>;

    fn name(&self) -> &str;
}

/// Quote provider backed by the Yahoo Finance chart endpoint.
///
/// Requests `/v8/finance/chart/{symbol}` for the current daily session and
/// turns the last complete bar into a `Quote`.
///
/// # Key Features
/// * One HTTP request per symbol, with a configurable timeout
/// * Symbols are percent-encoded as a single path segment
/// * Provider-side "not found" answers map to `QuoteUnavailable`
pub struct YahooChartProvider {
    base_url: Url,
    client: reqwest::Client,
}

impl YahooChartProvider {
    /// Creates a provider rooted at `base_url`.
    ///
    /// # Arguments
    /// * `base_url`: Scheme and host of the chart API, e.g. `https://query1.finance.yahoo.com`
    /// * `timeout`: Upper bound for each individual request
    ///
    /// # Errors
    /// Returns an error if `base_url` is not an absolute http(s) URL or the
    /// HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid provider URL `{base_url}`"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("provider URL `{base_url}` cannot carry a path");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cedear_spreads/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { base_url, client })
    }

    fn chart_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects URLs that cannot be a base, so segments are always available
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", symbol]);
        }
        url
    }
}

#[async_trait]
impl QuoteProvider for YahooChartProvider {
    /// Fetches the latest daily bar for `symbol`.
    ///
    /// # Arguments
    /// * `symbol`: Yahoo ticker, e.g. `AAPL` or `AAPL.BA`
    ///
    /// # Errors
    /// Returns `QuoteUnavailable` if the provider has no data for the symbol or
    /// no complete bar in the session, and `Provider` if the request or the
    /// response decoding failed
    ///
    /// # Returns
    /// The close and volume of the most recent bar carrying both
    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let provider_error = |source| CedearError::Provider {
            ticker: symbol.to_string(),
            source,
        };

        // Unknown symbols come back as 404 with a JSON error body, so the
        // status is not checked before decoding.
        let envelope = self
            .client
            .get(self.chart_url(symbol))
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await
            .map_err(provider_error)?
            .json::<ChartEnvelope>()
            .await
            .map_err(provider_error)?;

        parse_chart(symbol, envelope)
    }

    fn name(&self) -> &str {
        "yahoo-chart"
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBars>,
}

#[derive(Debug, Deserialize)]
struct QuoteBars {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Picks the latest bar that carries both a close and a volume.
fn parse_chart(symbol: &str, envelope: ChartEnvelope) -> Result<Quote> {
    if let Some(error) = envelope.chart.error {
        let reason = match error.description {
            Some(description) => format!("{}: {}", error.code, description),
            None => error.code,
        };
        return Err(CedearError::unavailable(symbol, reason));
    }

    let result = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| CedearError::unavailable(symbol, "empty chart result"))?;

    let bars = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| CedearError::unavailable(symbol, "no price history"))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let latest = bars
        .close
        .iter()
        .zip(bars.volume.iter())
        .enumerate()
        .rev()
        .find_map(|(idx, (close, volume))| match (close, volume) {
            (Some(close), Some(volume)) => Some((idx, *close, *volume)),
            _ => None,
        });

    let (idx, last_price, last_volume) =
        latest.ok_or_else(|| CedearError::unavailable(symbol, "no complete bar in session"))?;

    if !last_price.is_finite() || last_price <= 0.0 {
        return Err(CedearError::unavailable(
            symbol,
            format!("non-positive close {last_price}"),
        ));
    }
    if !last_volume.is_finite() || last_volume < 0.0 {
        return Err(CedearError::unavailable(
            symbol,
            format!("invalid volume {last_volume}"),
        ));
    }

    let as_of = timestamps
        .get(idx)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(*secs, 0));

    Ok(Quote {
        last_price,
        last_volume,
        as_of,
    })
}

/// Retrieves quotes for a set of tickers, one request per ticker.
///
/// A ticker whose request fails for any reason is logged and left out of the
/// resulting book; it never aborts the run.
pub struct QuoteFetcher<P> {
    provider: P,
}

impl<P: QuoteProvider> QuoteFetcher<P> {
    /// Wraps `provider`; no request is made until `fetch_all`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Requests the latest quote for every ticker, sequentially.
    ///
    /// Each ticker gets its own request. A ticker the provider cannot quote,
    /// whether for lack of data or a failed request, is recorded as
    /// unavailable and the remaining tickers are still fetched.
    ///
    /// # Arguments
    /// * `tickers`: Symbols to request, in request order
    ///
    /// # Returns
    /// A `QuoteBook` holding one complete quote per available ticker and the
    /// list of tickers that produced none
    pub async fn fetch_all<I, S>(&self, tickers: I) -> QuoteBook
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut book = QuoteBook::default();
        let mut requested = 0usize;

        for ticker in tickers {
            let ticker = ticker.as_ref();
            requested += 1;

            match self.provider.latest_quote(ticker).await {
                Ok(quote) => {
                    debug!(
                        ticker,
                        price = quote.last_price,
                        volume = quote.last_volume,
                        as_of = ?quote.as_of,
                        "Received quote"
                    );
                    book.insert(ticker, quote);
                }
                Err(err) => {
                    warn!(ticker, provider = self.provider.name(), error = %err, "Skipping ticker without quote");
                    book.mark_unavailable(ticker);
                }
            }
        }

        info!(
            requested,
            received = book.len(),
            unavailable = book.unavailable().len(),
            "Fetched quotes"
        );
        book
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory provider; symbols without an entry are unavailable.
    pub(crate) struct StaticProvider {
        pub quotes: HashMap<String, Quote>,
        pub unreachable: Vec<String>,
    }

    impl StaticProvider {
        pub(crate) fn new(entries: &[(&str, f64, f64)]) -> Self {
            Self {
                quotes: entries
                    .iter()
                    .map(|(t, p, v)| (t.to_string(), Quote::new(*p, *v)))
                    .collect(),
                unreachable: Vec::new(),
            }
        }

        /// Requests for `symbols` fail at the transport level.
        pub(crate) fn with_unreachable(mut self, symbols: &[&str]) -> Self {
            self.unreachable = symbols.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    fn transport_error() -> reqwest::Error {
        reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
    }

    #[async_trait]
    impl QuoteProvider for StaticProvider {
        async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
            if self.unreachable.iter().any(|s| s == symbol) {
                return Err(CedearError::Provider {
                    ticker: symbol.to_string(),
                    source: transport_error(),
                });
            }
            self.quotes
                .get(symbol)
                .copied()
                .ok_or_else(|| CedearError::unavailable(symbol, "not listed"))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn parse(symbol: &str, body: &str) -> Result<Quote> {
        let envelope: ChartEnvelope = serde_json::from_str(body).unwrap();
        parse_chart(symbol, envelope)
    }

    #[test]
    fn test_parse_latest_complete_bar() {
        let body = r#"{
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "currency": "USD"},
                    "timestamp": [1700000000, 1700086400],
                    "indicators": {"quote": [{
                        "open": [189.0, 190.0],
                        "close": [189.5, 191.25],
                        "volume": [1000, 52000000]
                    }]}
                }],
                "error": null
            }
        }"#;

        let quote = parse("AAPL", body).unwrap();
        assert_eq!(quote.last_price, 191.25);
        assert_eq!(quote.last_volume, 52_000_000.0);
        assert_eq!(quote.as_of.unwrap().timestamp(), 1700086400);
    }

    #[test]
    fn test_parse_skips_trailing_null_bar() {
        let body = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1700000000, 1700086400],
                    "indicators": {"quote": [{
                        "close": [4500.0, null],
                        "volume": [320, null]
                    }]}
                }],
                "error": null
            }
        }"#;

        let quote = parse("KO.BA", body).unwrap();
        assert_eq!(quote.last_price, 4500.0);
        assert_eq!(quote.last_volume, 320.0);
    }

    #[test]
    fn test_parse_provider_error_is_unavailable() {
        let body = r#"{
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        }"#;

        let err = parse("GONE.BA", body).unwrap_err();
        match err {
            CedearError::QuoteUnavailable { ticker, reason } => {
                assert_eq!(ticker, "GONE.BA");
                assert!(reason.contains("delisted"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_session_without_trades_is_unavailable() {
        let body = r#"{
            "chart": {
                "result": [{
                    "indicators": {"quote": [{}]}
                }],
                "error": null
            }
        }"#;

        assert!(matches!(
            parse("IDLE.BA", body),
            Err(CedearError::QuoteUnavailable { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_positive_close() {
        let body = r#"{
            "chart": {
                "result": [{
                    "indicators": {"quote": [{"close": [0.0], "volume": [10]}]}
                }],
                "error": null
            }
        }"#;

        assert!(matches!(
            parse("ZERO.BA", body),
            Err(CedearError::QuoteUnavailable { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_negative_volume() {
        let body = r#"{
            "chart": {
                "result": [{
                    "indicators": {"quote": [{"close": [5.0], "volume": [-3]}]}
                }],
                "error": null
            }
        }"#;

        match parse("NEG.BA", body) {
            Err(CedearError::QuoteUnavailable { ticker, reason }) => {
                assert_eq!(ticker, "NEG.BA");
                assert!(reason.contains("volume"));
            }
            other => panic!("expected QuoteUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bar_without_close_is_unavailable() {
        let body = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1700000000],
                    "indicators": {"quote": [{"close": [null], "volume": [10]}]}
                }],
                "error": null
            }
        }"#;

        assert!(matches!(
            parse("HALF.BA", body),
            Err(CedearError::QuoteUnavailable { .. })
        ));
    }

    #[test]
    fn test_chart_url_encodes_symbol_as_one_segment() {
        let provider =
            YahooChartProvider::new("https://query1.finance.yahoo.com/", Duration::from_secs(5))
                .unwrap();

        let url = provider.chart_url("AAPL.BA");
        assert_eq!(url.as_str(), "https://query1.finance.yahoo.com/v8/finance/chart/AAPL.BA");

        let url = provider.chart_url("BRK/B");
        assert_eq!(url.path(), "/v8/finance/chart/BRK%2FB");

        let url = provider.chart_url("^MERV");
        assert_eq!(url.path_segments().unwrap().count(), 4);
        assert!(url.path().ends_with("MERV"));
    }

    #[test]
    fn test_provider_rejects_invalid_base_url() {
        assert!(YahooChartProvider::new("query1.finance.yahoo.com", Duration::from_secs(5)).is_err());
        assert!(YahooChartProvider::new("mailto:quotes@example.com", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_fetch_all_tolerates_transport_failure() {
        let provider = StaticProvider::new(&[("AAPL", 190.0, 1000.0), ("KO", 60.0, 500.0)])
            .with_unreachable(&["AAPL"]);
        let fetcher = QuoteFetcher::new(provider);

        let book = fetcher.fetch_all(["AAPL", "KO"]).await;

        assert_eq!(book.len(), 1);
        assert!(!book.contains("AAPL"));
        assert_eq!(book.price("KO"), Some(60.0));
        assert_eq!(book.unavailable(), &["AAPL".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_all_excludes_unavailable_tickers() {
        let provider = StaticProvider::new(&[("AAPL", 190.0, 1000.0), ("AAPL.BA", 15000.0, 40.0)]);
        let fetcher = QuoteFetcher::new(provider);

        let book = fetcher.fetch_all(["AAPL", "AAPL.BA", "AAPLD.BA"]).await;

        assert_eq!(book.len(), 2);
        assert_eq!(book.price("AAPL"), Some(190.0));
        assert_eq!(book.volume("AAPL.BA"), Some(40.0));
        assert!(!book.contains("AAPLD.BA"));
        assert_eq!(book.unavailable(), &["AAPLD.BA".to_string()]);
    }

    #[tokio::test]
    async fn test_price_and_volume_keys_match() {
        let provider = StaticProvider::new(&[("A", 1.0, 2.0), ("B", 3.0, 4.0)]);
        let book = QuoteFetcher::new(provider).fetch_all(["A", "B", "C"]).await;

        for ticker in ["A", "B", "C"] {
            assert_eq!(book.price(ticker).is_some(), book.volume(ticker).is_some());
        }
    }
}
