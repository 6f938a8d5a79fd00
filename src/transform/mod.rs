// src/transform/mod.rs

use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::extract::RawRow;

/// Units of the target currency per 1 USD, keyed by currency code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRateTable {
    rates: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct RateRecord {
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "Rate")]
    rate: f64,
}

impl ExchangeRateTable {
    /// Load a `Currency,Rate` CSV. Rates must be finite and positive;
    /// a repeated code keeps its last value.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let rate_err = |message: String| PipelineError::RateTable {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| rate_err(e.to_string()))?;

        let mut rates = BTreeMap::new();
        for record in reader.deserialize::<RateRecord>() {
            let record = record.map_err(|e| rate_err(e.to_string()))?;
            if !record.rate.is_finite() || record.rate <= 0.0 {
                return Err(rate_err(format!(
                    "rate for {} must be positive, got {}",
                    record.currency, record.rate
                )));
            }
            rates.insert(record.currency, record.rate);
        }
        debug!(currencies = rates.len(), "loaded exchange rates");
        Ok(Self { rates })
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ExchangeRateTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            rates: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub code: String,
    pub value: f64,
}

impl Conversion {
    pub fn column_name(&self) -> String {
        currency_column(&self.code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub name: String,
    pub market_cap_usd: f64,
    /// One entry per target currency, in configured order.
    pub conversions: Vec<Conversion>,
}

impl EnrichedRow {
    pub fn converted(&self, code: &str) -> Option<f64> {
        self.conversions
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.value)
    }
}

/// `MC_<CODE>_Billion`
pub fn currency_column(code: &str) -> String {
    format!("MC_{}_Billion", code)
}

/// Two decimals, ties to even (`0.125` becomes `0.12`).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Add one converted column per target currency. Every code must be present
/// in `rates` before any row is touched, so a missing rate yields no output.
pub fn transform(
    rows: &[RawRow],
    rates: &ExchangeRateTable,
    target_currencies: &[String],
) -> Result<Vec<EnrichedRow>> {
    let resolved = target_currencies
        .iter()
        .map(|code| {
            rates
                .get(code)
                .map(|rate| (code.as_str(), rate))
                .ok_or_else(|| PipelineError::MissingRate { code: code.clone() })
        })
        .collect::<Result<Vec<_>>>()?;

    let out: Vec<EnrichedRow> = rows
        .iter()
        .map(|row| EnrichedRow {
            name: row.name.clone(),
            market_cap_usd: row.market_cap_usd,
            conversions: resolved
                .iter()
                .map(|&(code, rate)| Conversion {
                    code: code.to_string(),
                    value: round2(row.market_cap_usd * rate),
                })
                .collect(),
        })
        .collect();

    info!(rows = out.len(), currencies = resolved.len(), "converted market caps");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn codes() -> Vec<String> {
        vec!["GBP".into(), "EUR".into(), "INR".into()]
    }

    fn rates() -> ExchangeRateTable {
        [("GBP", 0.8), ("EUR", 0.93), ("INR", 82.5)].into_iter().collect()
    }

    #[test]
    fn test_transform_rounds_to_two_places() {
        let rows = vec![RawRow {
            name: "A".into(),
            market_cap_usd: 100.0,
        }];
        let out = transform(&rows, &rates(), &codes()).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].converted("GBP"), Some(80.0));
        assert_eq!(out[0].converted("EUR"), Some(93.0));
        assert_eq!(out[0].converted("INR"), Some(8250.0));
        let cols: Vec<_> = out[0].conversions.iter().map(|c| c.column_name()).collect();
        assert_eq!(cols, vec!["MC_GBP_Billion", "MC_EUR_Billion", "MC_INR_Billion"]);

        // 0.5 * 0.25 is exactly 0.125, a tie at the second decimal
        let tie = vec![RawRow {
            name: "B".into(),
            market_cap_usd: 0.5,
        }];
        let quarter: ExchangeRateTable = [("GBP", 0.25)].into_iter().collect();
        let out = transform(&tie, &quarter, &["GBP".to_string()]).unwrap();
        assert_eq!(out[0].converted("GBP"), Some(0.12));
        assert_eq!(round2(0.375), 0.38);
    }

    #[test]
    fn test_missing_rate_fails_without_output() {
        let partial: ExchangeRateTable = [("GBP", 0.8), ("INR", 82.5)].into_iter().collect();
        let rows = vec![RawRow {
            name: "A".into(),
            market_cap_usd: 100.0,
        }];
        match transform(&rows, &partial, &codes()) {
            Err(PipelineError::MissingRate { code }) => assert_eq!(code, "EUR"),
            other => panic!("expected MissingRate, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_csv_loading() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("exchange_rate.csv");
        fs::write(&path, "Currency,Rate\nEUR,0.93\nGBP, 0.8\nINR,82.95\n").unwrap();

        let table = ExchangeRateTable::from_csv_path(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("GBP"), Some(0.8));
        assert_eq!(table.get("INR"), Some(82.95));
        assert_eq!(table.get("JPY"), None);
    }

    #[test]
    fn test_rate_csv_rejects_bad_rates() {
        let tmp = tempdir().unwrap();
        let zero = tmp.path().join("zero.csv");
        fs::write(&zero, "Currency,Rate\nEUR,0\n").unwrap();
        assert!(matches!(
            ExchangeRateTable::from_csv_path(&zero),
            Err(PipelineError::RateTable { .. })
        ));

        let text = tmp.path().join("text.csv");
        fs::write(&text, "Currency,Rate\nEUR,lots\n").unwrap();
        assert!(ExchangeRateTable::from_csv_path(&text).is_err());

        assert!(ExchangeRateTable::from_csv_path(tmp.path().join("absent.csv")).is_err());
    }
}
