pub mod ingestion;
pub mod processing;
pub mod reference;

pub use ingestion::{QuoteFetcher, QuoteProvider, YahooChartProvider};
pub use processing::{derive_all, liquidity_gate, retain_quoted, DerivedRow, Metric};
pub use reference::ReferenceTable;

// Re-export for tests
#[cfg(test)]
pub use processing::MetricPoint;
#[cfg(test)]
pub use reference::InstrumentMapping;
