// src/error.rs

use std::path::PathBuf;

use crate::pipeline::Stage;

/// Every fatal failure a run can hit. Per-row extraction problems are not
/// errors; see [`crate::extract::SkipReason`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("no table with class `{class}` matched the selection policy")]
    NoTable { class: String },

    #[error("exchange rate for `{code}` is missing from the rate table")]
    MissingRate { code: String },

    #[error("reading rate table {path:?}: {message}")]
    RateTable { path: PathBuf, message: String },

    #[error("writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("query `{query}` failed: {source}")]
    Query {
        query: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query `{0}` is not read-only")]
    NotReadOnly(String),

    #[error("appending to progress log {path:?}: {source}")]
    ProgressLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot move from {from} to {to}")]
    OutOfOrder { from: Stage, to: Stage },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
