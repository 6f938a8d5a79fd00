// src/load/flat_file.rs

use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::extract::TABLE_ATTRIBS;
use crate::transform::{currency_column, Conversion, EnrichedRow};

/// Header row: a blank name over the positional index, then the row fields.
pub fn header(rows: &[EnrichedRow], target_currencies: &[String]) -> Vec<String> {
    let mut cols = vec![String::new()];
    cols.extend(TABLE_ATTRIBS.iter().map(|s| s.to_string()));
    match rows.first() {
        Some(first) => cols.extend(first.conversions.iter().map(Conversion::column_name)),
        None => cols.extend(target_currencies.iter().map(|c| currency_column(c))),
    }
    cols
}

/// Debug formatting keeps a decimal point on whole numbers (`80.0`, not `80`).
fn fmt_float(v: f64) -> String {
    format!("{:?}", v)
}

/// Write every row with a leading 0-based index column, replacing `path`.
pub fn write_csv<P: AsRef<Path>>(
    rows: &[EnrichedRow],
    target_currencies: &[String],
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record(header(rows, target_currencies))
        .map_err(csv_err)?;

    for (idx, row) in rows.iter().enumerate() {
        let mut record = vec![
            idx.to_string(),
            row.name.clone(),
            fmt_float(row.market_cap_usd),
        ];
        record.extend(row.conversions.iter().map(|c| fmt_float(c.value)));
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(rows = rows.len(), path = %path.display(), "wrote csv");
    Ok(())
}

/// Read a file produced by [`write_csv`] back into rows, in file order.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EnrichedRow>> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let bad = |message: String| PipelineError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let codes: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .skip(1 + TABLE_ATTRIBS.len())
        .map(|h| {
            h.strip_prefix("MC_")
                .and_then(|s| s.strip_suffix("_Billion"))
                .map(str::to_string)
                .ok_or_else(|| bad(format!("unexpected column {:?}", h)))
        })
        .collect::<Result<_>>()?;

    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|e| bad(format!("{:?}: {}", s, e)))
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let field = |i: usize| {
            record
                .get(i)
                .ok_or_else(|| bad(format!("row has no column {}", i)))
        };
        let conversions = codes
            .iter()
            .enumerate()
            .map(|(i, code)| {
                Ok(Conversion {
                    code: code.clone(),
                    value: parse(field(3 + i)?)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(EnrichedRow {
            name: field(1)?.to_string(),
            market_cap_usd: parse(field(2)?)?,
            conversions,
        });
    }
    Ok(rows)
}
