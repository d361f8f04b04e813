use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CedearError, Result};

pub const LOCAL_COLUMN: &str = "CEDEAR-ARS";
pub const DOLLAR_COLUMN: &str = "CEDEARD";
pub const UNDERLYING_COLUMN: &str = "Subyacente";
pub const RATIO_COLUMN: &str = "Ratio";

const REQUIRED_COLUMNS: [&str; 4] = [LOCAL_COLUMN, DOLLAR_COLUMN, UNDERLYING_COLUMN, RATIO_COLUMN];

/// One row of the reference table: a CEDEAR, its dollar line and the foreign share it wraps.
///
/// `ratio` is how many CEDEAR units make up one underlying share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMapping {
    #[serde(rename = "CEDEAR-ARS")]
    pub local_ticker: String,
    #[serde(rename = "CEDEARD")]
    pub dollar_ticker: String,
    #[serde(rename = "Subyacente")]
    pub underlying_ticker: String,
    #[serde(rename = "Ratio")]
    pub ratio: f64,
}

impl InstrumentMapping {
    pub fn tickers(&self) -> [&str; 3] {
        [
            &self.local_ticker,
            &self.dollar_ticker,
            &self.underlying_ticker,
        ]
    }
}

/// The static instrument relationships, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    pub rows: Vec<InstrumentMapping>,
}

impl ReferenceTable {
    /// Loads the reference table from a CSV file.
    ///
    /// Fields are trimmed and columns other than the four required ones are
    /// ignored. Rows with a non-positive ratio or an empty ticker are dropped
    /// with a warning.
    ///
    /// # Arguments
    /// * `path`: Location of the table, e.g. `data/CEDEARcsv.csv`
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file is missing or unreadable (`SourceLoad`)
    /// - The header lacks `CEDEAR-ARS`, `CEDEARD`, `Subyacente` or `Ratio` (`MissingColumn`)
    /// - A row's ratio is not a number (`SourceLoad`)
    ///
    /// # Returns
    /// The rows in file order
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| CedearError::SourceLoad {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_csv(reader, path)
    }

    /// Parses a table from any reader; `origin` only names it in errors.
    #[cfg(test)]
    pub fn from_reader<R: Read>(reader: R, origin: impl AsRef<Path>) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(reader, origin.as_ref())
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, origin: &Path) -> Result<Self> {
        let load_error = |source| CedearError::SourceLoad {
            path: origin.to_path_buf(),
            source,
        };

        let headers = reader.headers().map_err(load_error)?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(CedearError::MissingColumn {
                    path: origin.to_path_buf(),
                    column,
                });
            }
        }

        let mut rows = Vec::new();
        for record in reader.deserialize::<InstrumentMapping>() {
            let row = record.map_err(load_error)?;

            if !row.ratio.is_finite() || row.ratio <= 0.0 {
                warn!(
                    local = %row.local_ticker,
                    ratio = row.ratio,
                    "Dropping reference row with non-positive ratio"
                );
                continue;
            }
            if row.tickers().iter().any(|t| t.is_empty()) {
                warn!(local = %row.local_ticker, "Dropping reference row with an empty ticker");
                continue;
            }

            rows.push(row);
        }

        info!(rows = rows.len(), path = %origin.display(), "Loaded reference table");
        Ok(Self { rows })
    }

    /// Sorted union of every ticker referenced in any of the three ticker columns.
    pub fn distinct_tickers(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.tickers())
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
impl From<Vec<InstrumentMapping>> for ReferenceTable {
    fn from(rows: Vec<InstrumentMapping>) -> Self {
        Self { rows }
    }
}
