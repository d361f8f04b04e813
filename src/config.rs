use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CedearError, Result};

pub const DEFAULT_REFERENCE_PATH: &str = "data/CEDEARcsv.csv";
pub const DEFAULT_PROVIDER_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LIQUIDITY_FLOOR: f64 = 1.0;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Runtime settings for a single analysis run.
///
/// Every key is optional. With an empty environment the run reads
/// `data/CEDEARcsv.csv`, quotes from Yahoo Finance, gates rows at a
/// liquidity proxy of 1 and trims outliers with the classic 1.5 IQR fence.
#[derive(Debug, Clone)]
pub struct Config {
    pub reference_path: PathBuf,
    pub provider_url: String,
    pub request_timeout: Duration,
    pub liquidity_floor: f64,
    pub iqr_multiplier: f64,
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from(DEFAULT_REFERENCE_PATH),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            liquidity_floor: DEFAULT_LIQUIDITY_FLOOR,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            headless: false,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Call `dotenv()` beforehand if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let reference_path = get("CEDEAR_REFERENCE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.reference_path);

        let provider_url = get("CEDEAR_PROVIDER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.provider_url);

        let timeout_secs: u64 = parse_or(
            get("CEDEAR_REQUEST_TIMEOUT_SECS"),
            "CEDEAR_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(CedearError::Config(
                "CEDEAR_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let liquidity_floor: f64 = parse_or(
            get("CEDEAR_LIQUIDITY_FLOOR"),
            "CEDEAR_LIQUIDITY_FLOOR",
            defaults.liquidity_floor,
        )?;
        if !liquidity_floor.is_finite() {
            return Err(CedearError::Config(
                "CEDEAR_LIQUIDITY_FLOOR must be a finite number".to_string(),
            ));
        }

        let iqr_multiplier: f64 = parse_or(
            get("CEDEAR_IQR_MULTIPLIER"),
            "CEDEAR_IQR_MULTIPLIER",
            defaults.iqr_multiplier,
        )?;
        if !iqr_multiplier.is_finite() || iqr_multiplier < 0.0 {
            return Err(CedearError::Config(
                "CEDEAR_IQR_MULTIPLIER must be a non-negative number".to_string(),
            ));
        }

        let headless = get("CEDEAR_HEADLESS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.headless);

        Ok(Self {
            reference_path,
            provider_url,
            request_timeout: Duration::from_secs(timeout_secs),
            liquidity_floor,
            iqr_multiplier,
            headless,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| CedearError::Config(format!("{key} has unparseable value `{value}`"))),
        None => Ok(default),
    }
}
