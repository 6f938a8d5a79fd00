// src/config.rs

use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::extract::TableSelection;

pub const DEFAULT_SOURCE_URL: &str =
    "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks";

/// Everything a run needs to know. Each field falls back to the value the
/// batch job has always used, so an empty YAML file is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source_url: String,
    pub rate_path: PathBuf,
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub table_name: String,
    pub target_currencies: Vec<String>,
    pub log_path: PathBuf,
    /// Class attribute marking candidate data tables in the source page.
    pub table_class: String,
    pub table_selection: TableSelection,
    /// Currency whose converted column the average query reports.
    pub average_currency: String,
    /// Echo the fixed query results to stdout as they complete.
    pub print_queries: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            rate_path: PathBuf::from("exchange_rate.csv"),
            csv_path: PathBuf::from("./Largest_banks_data.csv"),
            db_path: PathBuf::from("Banks.db"),
            table_name: "Largest_banks".to_string(),
            target_currencies: vec!["GBP".into(), "EUR".into(), "INR".into()],
            log_path: PathBuf::from("./code_log.txt"),
            table_class: "wikitable".to_string(),
            table_selection: TableSelection::First,
            average_currency: "GBP".to_string(),
            print_queries: true,
        }
    }
}

impl Config {
    /// Read overrides from a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // serde_yaml treats an empty document as null, not as an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn source_url(&self) -> Result<Url> {
        Url::parse(&self.source_url)
            .map_err(|e| PipelineError::Config(format!("source_url {:?}: {}", self.source_url, e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.source_url()?;

        let mut chars = self.table_name.chars();
        let ident_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !ident_ok {
            return Err(PipelineError::Config(format!(
                "table_name {:?} is not a plain SQL identifier",
                self.table_name
            )));
        }

        if self.target_currencies.is_empty() {
            return Err(PipelineError::Config(
                "target_currencies must name at least one currency".into(),
            ));
        }
        for code in &self.target_currencies {
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(PipelineError::Config(format!(
                    "currency code {:?} is not three letters",
                    code
                )));
            }
        }
        if !self.target_currencies.contains(&self.average_currency) {
            return Err(PipelineError::Config(format!(
                "average_currency {:?} is not one of the target currencies",
                self.average_currency
            )));
        }
        if self.table_class.trim().is_empty() {
            return Err(PipelineError::Config("table_class is empty".into()));
        }
        Ok(())
    }
}
