use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ingestion::QuoteBook;
use super::reference::InstrumentMapping;
use crate::error::{CedearError, Result};

/// The three implied-rate views computed for every reference row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Ccl,
    Mep,
    Canje,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Ccl, Metric::Mep, Metric::Canje];

    pub fn title(&self) -> &'static str {
        match self {
            Metric::Ccl => "Dólar CCL de CEDEARs",
            Metric::Mep => "Dólar MEP de CEDEARs",
            Metric::Canje => "CANJE CEDEARS",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Metric::Ccl => "CCL",
            Metric::Mep => "MEP",
            Metric::Canje => "Canje",
        }
    }

    /// Ticker used to identify a row in this metric's chart.
    pub fn label<'a>(&self, row: &'a InstrumentMapping) -> &'a str {
        match self {
            Metric::Ccl | Metric::Mep => &row.local_ticker,
            Metric::Canje => &row.dollar_ticker,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// An implied rate (`x`) and the liquidity proxy of the leg it trades on (`y`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub x: f64,
    pub y: f64,
}

/// A reference row together with its three derived metric points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    pub mapping: InstrumentMapping,
    pub ccl: MetricPoint,
    pub mep: MetricPoint,
    pub canje: MetricPoint,
}

impl DerivedRow {
    pub fn point(&self, metric: Metric) -> MetricPoint {
        match metric {
            Metric::Ccl => self.ccl,
            Metric::Mep => self.mep,
            Metric::Canje => self.canje,
        }
    }
}

/// Keeps only the rows whose three tickers all have a quote.
pub fn retain_quoted(rows: &[InstrumentMapping], book: &QuoteBook) -> Vec<InstrumentMapping> {
    let complete: Vec<InstrumentMapping> = rows
        .iter()
        .filter(|row| {
            let quoted = row.tickers().iter().all(|t| book.contains(t));
            if !quoted {
                debug!(local = %row.local_ticker, "Dropping row with unquoted ticker");
            }
            quoted
        })
        .cloned()
        .collect();

    info!(
        rows = rows.len(),
        complete = complete.len(),
        "Filtered rows to fully quoted instruments"
    );
    complete
}

/// Computes CCL, MEP and Canje for one row.
///
/// # Arguments
/// * `row`: The reference row, supplying the three tickers and the ratio
/// * `book`: Quotes fetched for this run
///
/// # Formulas
/// - CCL: `x = P(local) * ratio / P(underlying)`, `y = P(local) * V(local)`
/// - MEP: `x = P(local) * ratio / P(dollar)`, `y = P(dollar) * V(dollar)`
/// - Canje: `x = P(dollar) * ratio / P(underlying)`, `y = P(dollar) * V(dollar)`
///
/// # Errors
/// Returns `MissingQuote` naming the first ticker of the row that has no
/// quote in `book`; callers are expected to run `retain_quoted` first
///
/// # Returns
/// The row together with its three `(x, y)` points
pub fn derive_row(row: &InstrumentMapping, book: &QuoteBook) -> Result<DerivedRow> {
    let quote = |ticker: &str| {
        book.get(ticker).copied().ok_or_else(|| CedearError::MissingQuote {
            local_ticker: row.local_ticker.clone(),
            ticker: ticker.to_string(),
        })
    };

    let local = quote(&row.local_ticker)?;
    let dollar = quote(&row.dollar_ticker)?;
    let underlying = quote(&row.underlying_ticker)?;

    let local_turnover = local.last_price * local.last_volume;
    let dollar_turnover = dollar.last_price * dollar.last_volume;

    Ok(DerivedRow {
        mapping: row.clone(),
        ccl: MetricPoint {
            x: local.last_price * row.ratio / underlying.last_price,
            y: local_turnover,
        },
        mep: MetricPoint {
            x: local.last_price * row.ratio / dollar.last_price,
            y: dollar_turnover,
        },
        canje: MetricPoint {
            x: dollar.last_price * row.ratio / underlying.last_price,
            y: dollar_turnover,
        },
    })
}

/// Applies `derive_row` to every row, stopping at the first failure.
pub fn derive_all(rows: &[InstrumentMapping], book: &QuoteBook) -> Result<Vec<DerivedRow>> {
    rows.iter().map(|row| derive_row(row, book)).collect()
}

/// Drops every row where any metric's liquidity proxy is at or below `floor`.
///
/// The gate is joint: a row thin on one leg disappears from all three views.
///
/// # Arguments
/// * `rows`: Derived rows for the run
/// * `floor`: Exclusive lower bound for `y`, 1.0 unless configured otherwise
///
/// # Returns
/// The rows whose CCL, MEP and Canje `y` all exceed `floor`
pub fn liquidity_gate(rows: Vec<DerivedRow>, floor: f64) -> Vec<DerivedRow> {
    let before = rows.len();
    let liquid: Vec<DerivedRow> = rows
        .into_iter()
        .filter(|row| Metric::ALL.iter().all(|m| row.point(*m).y > floor))
        .collect();

    info!(before, after = liquid.len(), floor, "Applied liquidity gate");
    liquid
}
