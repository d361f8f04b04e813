use std::path::PathBuf;

use thiserror::Error;

use crate::data::Metric;

/// Failures produced while loading, fetching, deriving or presenting CEDEAR data.
///
/// Only `SourceLoad`, `MissingColumn` and `Config` abort a run. The rest are
/// recovered where they occur: an unavailable ticker is dropped, an empty
/// series renders an empty panel.
#[derive(Debug, Error)]
pub enum CedearError {
    #[error("failed to load reference table {path}: {source}")]
    SourceLoad {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("reference table {path} is missing column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("no quote available for {ticker}: {reason}")]
    QuoteUnavailable { ticker: String, reason: String },

    #[error("market data request for {ticker} failed: {source}")]
    Provider {
        ticker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("row {local_ticker} references {ticker}, which has no quote")]
    MissingQuote {
        local_ticker: String,
        ticker: String,
    },

    #[error("{metric} has no rows to display")]
    EmptySeries { metric: Metric },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CedearError {
    pub fn unavailable(ticker: &str, reason: impl Into<String>) -> Self {
        Self::QuoteUnavailable {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CedearError>;
