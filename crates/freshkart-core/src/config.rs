use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::PipelineError;

const DEFAULT_INPUT_DIR: &str = "data/input";
const DEFAULT_OUTPUT_DIR: &str = "data/out";
const DATABASE_FILE: &str = "sales.db";

/// The calendar day a run processes, validated as strict `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunDate(NaiveDate);

impl RunDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for RunDate {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            PipelineError::InputValidation(format!(
                "'{value}' is not a date (expected format: YYYY-MM-DD)"
            ))
        };

        // chrono accepts single-digit months and days; the file naming does not.
        let shape_ok = value.len() == 10
            && value.char_indices().all(|(idx, ch)| match idx {
                4 | 7 => ch == '-',
                _ => ch.is_ascii_digit(),
            });
        if !shape_ok {
            return Err(invalid());
        }

        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(RunDate)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// File locations for one run. Every stage that touches storage receives this explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_dirs(DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR)
    }
}

impl PipelineConfig {
    /// Input and output directories with the database stored under the output directory.
    pub fn with_dirs(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            input_dir: input_dir.into(),
            database_path: output_dir.join(DATABASE_FILE),
            output_dir,
        }
    }

    /// Reads `FRESHKART_INPUT_DIR`, `FRESHKART_OUTPUT_DIR` and `FRESHKART_DATABASE_PATH`,
    /// loading a `.env` file first when one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let input_dir =
            std::env::var("FRESHKART_INPUT_DIR").unwrap_or_else(|_| DEFAULT_INPUT_DIR.to_string());
        let output_dir = std::env::var("FRESHKART_OUTPUT_DIR")
            .unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string());

        let mut config = Self::with_dirs(input_dir, output_dir);
        if let Ok(path) = std::env::var("FRESHKART_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        config
    }

    pub fn customers_path(&self) -> PathBuf {
        self.input_dir.join("customers.csv")
    }

    pub fn orders_path(&self, date: RunDate) -> PathBuf {
        self.input_dir.join(format!("orders_{date}.json"))
    }

    pub fn refunds_path(&self) -> PathBuf {
        self.input_dir.join("refunds.csv")
    }

    pub fn rejected_items_path(&self, date: RunDate) -> PathBuf {
        self.output_dir.join(format!("rejected_items_{date}.csv"))
    }

    pub fn daily_summary_path(&self, date: RunDate) -> PathBuf {
        self.output_dir.join(format!("daily_summary_{date}.csv"))
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_dates() {
        let date: RunDate = "2024-01-15".parse().unwrap();
        assert_eq!(date.as_naive(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(date.to_string(), "2024-01-15");
    }

    #[test]
    fn rejects_malformed_dates() {
        for value in ["2024-1-15", "15/01/2024", "2024-02-30", "2024-01-15T00:00", "", "tomorrow"] {
            let err = value.parse::<RunDate>().unwrap_err();
            assert!(
                matches!(err, PipelineError::InputValidation(_)),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn derives_paths_from_date() {
        let config = PipelineConfig::with_dirs("in", "out");
        let date: RunDate = "2024-01-15".parse().unwrap();

        assert_eq!(config.orders_path(date), PathBuf::from("in/orders_2024-01-15.json"));
        assert_eq!(config.customers_path(), PathBuf::from("in/customers.csv"));
        assert_eq!(config.refunds_path(), PathBuf::from("in/refunds.csv"));
        assert_eq!(
            config.rejected_items_path(date),
            PathBuf::from("out/rejected_items_2024-01-15.csv")
        );
        assert_eq!(
            config.daily_summary_path(date),
            PathBuf::from("out/daily_summary_2024-01-15.csv")
        );
        assert_eq!(config.database_path(), Path::new("out/sales.db"));
    }
}
